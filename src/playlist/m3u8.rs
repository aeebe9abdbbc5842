//! m3u8 playlist model, parser and serializer
//!
//! A playlist is split into header tags, file entries and footer lines.
//! Parsing followed by serialization reproduces the input exactly as long as
//! it is normalized (LF line endings, no blank lines, no surrounding
//! whitespace), which is what the encoder and packager emit.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use super::tag::{quote, PlaylistTag};
use crate::error::{HlsError, PlaylistError, Result};

pub const TAG_STREAM_INF: &str = "#EXT-X-STREAM-INF";
pub const TAG_INF: &str = "#EXTINF";
pub const TAG_MEDIA: &str = "#EXT-X-MEDIA";
pub const TAG_IFRAME_STREAM_INF: &str = "#EXT-X-I-FRAME-STREAM-INF";
pub const TAG_MAP: &str = "#EXT-X-MAP";
pub const TAG_ENDLIST: &str = "#EXT-X-ENDLIST";

/// One entry of a playlist body.
///
/// A standalone entry (`#EXTINF`, `#EXT-X-STREAM-INF`) is followed by its
/// filename on a line of its own. A referential entry (`#EXT-X-MEDIA`,
/// `#EXT-X-I-FRAME-STREAM-INF`) is a single tag whose filename lives in its
/// `URI` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistFile {
    pub tags: Vec<PlaylistTag>,
    pub filename: String,
    pub standalone: bool,
}

impl PlaylistFile {
    pub fn standalone(tags: Vec<PlaylistTag>, filename: impl Into<String>) -> Self {
        Self {
            tags,
            filename: filename.into(),
            standalone: true,
        }
    }

    /// Build a referential entry from a tag carrying a `URI` attribute
    pub fn referential(tag: PlaylistTag) -> std::result::Result<Self, PlaylistError> {
        let filename = tag
            .get("URI")
            .ok_or_else(|| PlaylistError::MissingUri(tag.key.clone()))?
            .to_string();
        Ok(Self {
            tags: vec![tag],
            filename,
            standalone: false,
        })
    }

    /// The tag that opened this entry
    pub fn leading_tag(&self) -> Option<&PlaylistTag> {
        self.tags.first()
    }

    pub fn leading_tag_mut(&mut self) -> Option<&mut PlaylistTag> {
        self.tags.first_mut()
    }

    /// Key of the leading tag, empty if the entry has no tags
    pub fn kind(&self) -> &str {
        self.leading_tag().map(|t| t.key.as_str()).unwrap_or("")
    }

    /// Point the entry at another file, updating `URI` for referential entries
    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = filename.into();
        if !self.standalone {
            let uri = quote(&self.filename);
            if let Some(tag) = self.tags.first_mut() {
                tag.set("URI", &uri);
            }
        }
    }

    fn write_lines(&self, out: &mut String) {
        for tag in &self.tags {
            out.push_str(&tag.to_string());
            out.push('\n');
        }
        if self.standalone {
            out.push_str(&self.filename);
            out.push('\n');
        }
    }
}

/// Parsed m3u8 playlist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    pub headers: Vec<PlaylistTag>,
    pub files: Vec<PlaylistFile>,
    pub footer: Vec<String>,
}

enum ParseState {
    /// Before the first file entry
    Header,
    /// A standalone entry is waiting for its filename line
    InFile(PlaylistFile),
    /// Files have started
    Body,
}

impl Playlist {
    /// Parse playlist text
    pub fn parse(text: &str) -> std::result::Result<Self, PlaylistError> {
        let mut pl = Playlist::default();
        let mut state = ParseState::Header;

        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = || PlaylistError::Malformed {
                line: n + 1,
                content: line.to_string(),
            };

            if !line.starts_with('#') {
                // filename line
                match std::mem::replace(&mut state, ParseState::Body) {
                    ParseState::InFile(mut file) => {
                        file.filename = line.to_string();
                        pl.files.push(file);
                    }
                    _ => return Err(malformed()),
                }
                continue;
            }

            let tag = PlaylistTag::parse(line);
            match tag.key.as_str() {
                TAG_STREAM_INF | TAG_INF => {
                    if matches!(state, ParseState::InFile(_)) {
                        return Err(malformed());
                    }
                    state = ParseState::InFile(PlaylistFile::standalone(vec![tag], ""));
                }
                TAG_IFRAME_STREAM_INF => {
                    if matches!(state, ParseState::InFile(_)) {
                        return Err(malformed());
                    }
                    pl.files.push(PlaylistFile::referential(tag)?);
                    state = ParseState::Body;
                }
                TAG_MEDIA if tag.has("URI") => {
                    if matches!(state, ParseState::InFile(_)) {
                        return Err(malformed());
                    }
                    pl.files.push(PlaylistFile::referential(tag)?);
                    state = ParseState::Body;
                }
                TAG_ENDLIST => {
                    if matches!(state, ParseState::InFile(_)) {
                        return Err(malformed());
                    }
                    pl.footer.push(line.to_string());
                    state = ParseState::Body;
                }
                _ => match &mut state {
                    ParseState::InFile(file) => file.tags.push(tag),
                    ParseState::Header => pl.headers.push(tag),
                    ParseState::Body => return Err(malformed()),
                },
            }
        }

        if matches!(state, ParseState::InFile(_)) {
            return Err(PlaylistError::UnexpectedEnd);
        }
        Ok(pl)
    }

    /// Read and parse a playlist file
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!("m3u8: parsing {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| HlsError::referenced(e, path))?;
        Ok(Self::parse(&text)?)
    }

    /// Serialize and write to `path`
    pub fn save_as(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string())?;
        Ok(())
    }

    /// Serialized form as bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Serialize into a writer, returning the number of bytes written
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<usize> {
        let buf = self.to_bytes();
        w.write_all(&buf)?;
        Ok(buf.len())
    }

    /// Remove and return the file entry with exactly this filename.
    ///
    /// The playlist is left untouched when no entry matches.
    pub fn take_file(&mut self, filename: &str) -> std::result::Result<PlaylistFile, PlaylistError> {
        let pos = self
            .files
            .iter()
            .position(|f| f.filename == filename)
            .ok_or_else(|| PlaylistError::NotFound(filename.to_string()))?;
        Ok(self.files.remove(pos))
    }

    /// Header tags with the given key
    pub fn headers_with_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a PlaylistTag> {
        self.headers.iter().filter(move |t| t.key == key)
    }

    /// Entries whose filename line follows their tags
    pub fn standalone_files_mut(&mut self) -> impl Iterator<Item = &mut PlaylistFile> {
        self.files.iter_mut().filter(|f| f.standalone)
    }

    /// Insert a referential entry after the last leading referential entry,
    /// so alternate renditions render ahead of the variants that use them.
    pub fn insert_rendition(&mut self, file: PlaylistFile) {
        let pos = self
            .files
            .iter()
            .position(|f| f.standalone)
            .unwrap_or(self.files.len());
        self.files.insert(pos, file);
    }
}

impl FromStr for Playlist {
    type Err = PlaylistError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Playlist::parse(s)
    }
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for tag in &self.headers {
            out.push_str(&tag.to_string());
            out.push('\n');
        }
        for file in &self.files {
            file.write_lines(&mut out);
        }
        for line in &self.footer {
            out.push_str(line);
            out.push('\n');
        }
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:6
#EXT-X-INDEPENDENT-SEGMENTS
#EXT-X-STREAM-INF:BANDWIDTH=6220800,RESOLUTION=1920x1080,CODECS=\"avc1.640028\"
stream_0.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2764800,RESOLUTION=1280x720,CODECS=\"avc1.64001f\"
stream_1.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=105600,CODECS=\"mp4a.40.2\"
stream_2.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-VERSION:7
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-PLAYLIST-TYPE:VOD
#EXT-X-INDEPENDENT-SEGMENTS
#EXT-X-MAP:URI=\"init_0.mp4\"
#EXTINF:10.000000,
stream_0_0.mp4
#EXTINF:10.000000,
#EXT-X-BYTERANGE:1000@0
stream_0_1.mp4
#EXTINF:3.500000,
stream_0_2.mp4
#EXT-X-ENDLIST
";

    const CMAF_MASTER: &str = "#EXTM3U
## Generated with https://github.com/shaka-project/shaka-packager version v3.0.0
#EXT-X-INDEPENDENT-SEGMENTS
#EXT-X-MEDIA:TYPE=AUDIO,URI=\"stream_2.m3u8\",GROUP-ID=\"audio\",LANGUAGE=\"en\",NAME=\"stream_2\",DEFAULT=YES,AUTOSELECT=YES,CHANNELS=\"2\"
#EXT-X-STREAM-INF:BANDWIDTH=6220800,AVERAGE-BANDWIDTH=5000000,CODECS=\"avc1.640028,mp4a.40.2\",RESOLUTION=1920x1080,AUDIO=\"audio\"
stream_0.m3u8
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=400000,CODECS=\"avc1.640028\",RESOLUTION=1920x1080,URI=\"stream_0_iframe.m3u8\"
";

    #[test]
    fn test_round_trip() {
        for text in [MASTER, MEDIA, CMAF_MASTER] {
            let pl = Playlist::parse(text).unwrap();
            assert_eq!(pl.to_string(), text);
        }
    }

    #[test]
    fn test_master_structure() {
        let pl = Playlist::parse(MASTER).unwrap();
        assert_eq!(pl.headers.len(), 3);
        assert_eq!(pl.files.len(), 3);
        assert!(pl.files.iter().all(|f| f.standalone));
        assert_eq!(pl.files[2].filename, "stream_2.m3u8");
        assert!(pl.footer.is_empty());
    }

    #[test]
    fn test_media_structure() {
        let pl = Playlist::parse(MEDIA).unwrap();
        assert_eq!(pl.headers_with_key(TAG_MAP).count(), 1);
        assert_eq!(pl.files.len(), 3);
        assert_eq!(pl.files[1].tags.len(), 2);
        assert_eq!(pl.files[1].tags[1].key, "#EXT-X-BYTERANGE");
        assert_eq!(pl.footer, vec![TAG_ENDLIST.to_string()]);
    }

    #[test]
    fn test_referential_entries() {
        let pl = Playlist::parse(CMAF_MASTER).unwrap();
        assert_eq!(pl.files.len(), 3);
        assert!(!pl.files[0].standalone);
        assert_eq!(pl.files[0].filename, "stream_2.m3u8");
        assert_eq!(pl.files[0].kind(), TAG_MEDIA);
        assert!(pl.files[1].standalone);
        assert!(!pl.files[2].standalone);
        assert_eq!(pl.files[2].filename, "stream_0_iframe.m3u8");
    }

    #[test]
    fn test_set_filename() {
        let mut pl = Playlist::parse(CMAF_MASTER).unwrap();
        for (n, f) in pl.files.iter_mut().enumerate() {
            f.set_filename(format!("{}.m3u8", n));
        }
        let out = pl.to_string();
        assert!(out.contains("#EXT-X-MEDIA:TYPE=AUDIO,URI=\"0.m3u8\",GROUP-ID"));
        assert!(out.contains("AUDIO=\"audio\"\n1.m3u8\n"));
        assert!(out.contains("URI=\"2.m3u8\"\n"));
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let text = "#EXTM3U\r\n\r\n#EXTINF:4.0,\r\n\r\na.ts\r\n#EXT-X-ENDLIST\r\n";
        let pl = Playlist::parse(text).unwrap();
        assert_eq!(pl.to_string(), "#EXTM3U\n#EXTINF:4.0,\na.ts\n#EXT-X-ENDLIST\n");
    }

    #[test]
    fn test_filename_without_tag_is_malformed() {
        let err = Playlist::parse("#EXTM3U\nstray.ts\n").unwrap_err();
        assert_eq!(
            err,
            PlaylistError::Malformed {
                line: 2,
                content: "stray.ts".into()
            }
        );
    }

    #[test]
    fn test_header_tag_after_files_is_malformed() {
        let text = "#EXTM3U\n#EXTINF:4.0,\na.ts\n#EXT-X-DISCONTINUITY-SEQUENCE:1\n";
        assert!(matches!(
            Playlist::parse(text),
            Err(PlaylistError::Malformed { line: 4, .. })
        ));
    }

    #[test]
    fn test_nested_file_is_malformed() {
        let text = "#EXTM3U\n#EXTINF:4.0,\n#EXTINF:4.0,\na.ts\n";
        assert!(matches!(
            Playlist::parse(text),
            Err(PlaylistError::Malformed { line: 3, .. })
        ));
    }

    #[test]
    fn test_truncated_playlist() {
        let text = "#EXTM3U\n#EXTINF:4.0,\n";
        assert_eq!(Playlist::parse(text), Err(PlaylistError::UnexpectedEnd));
    }

    #[test]
    fn test_iframe_without_uri() {
        let text = "#EXTM3U\n#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=1\n";
        assert_eq!(
            Playlist::parse(text),
            Err(PlaylistError::MissingUri(TAG_IFRAME_STREAM_INF.into()))
        );
    }

    #[test]
    fn test_media_without_uri_is_header() {
        let text = "#EXTM3U\n#EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",NAME=\"cc1\",INSTREAM-ID=\"CC1\"\n";
        let pl = Playlist::parse(text).unwrap();
        assert_eq!(pl.headers.len(), 2);
        assert!(pl.files.is_empty());
    }

    #[test]
    fn test_take_file() {
        let mut pl = Playlist::parse(MASTER).unwrap();
        let f = pl.take_file("stream_2.m3u8").unwrap();
        assert_eq!(f.tags[0].get("CODECS"), Some("mp4a.40.2"));
        assert_eq!(pl.files.len(), 2);
    }

    #[test]
    fn test_take_missing_file_leaves_playlist() {
        let mut pl = Playlist::parse(MASTER).unwrap();
        let before = pl.clone();
        assert_eq!(
            pl.take_file("stream_9.m3u8"),
            Err(PlaylistError::NotFound("stream_9.m3u8".into()))
        );
        assert_eq!(pl, before);
    }

    #[test]
    fn test_insert_rendition_goes_before_variants() {
        let mut pl = Playlist::parse(MASTER).unwrap();
        let tag = PlaylistTag::parse("#EXT-X-MEDIA:TYPE=AUDIO,URI=\"a.m3u8\"");
        pl.insert_rendition(PlaylistFile::referential(tag).unwrap());
        assert_eq!(pl.files[0].filename, "a.m3u8");
        let out = pl.to_string();
        assert!(out.find("#EXT-X-MEDIA").unwrap() < out.find("#EXT-X-STREAM-INF").unwrap());
        // Re-parsing yields the same structure
        assert_eq!(Playlist::parse(&out).unwrap(), pl);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Playlist::load(&dir.path().join("nope.m3u8")).unwrap_err();
        assert!(matches!(err, HlsError::NotFound(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.m3u8");
        let pl = Playlist::parse(MEDIA).unwrap();
        pl.save_as(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), MEDIA);
        assert_eq!(Playlist::load(&path).unwrap(), pl);
    }
}
