//! Container packager
//!
//! Packs a master playlist, every playlist it references and every media
//! file those reference into one file. Media files are copied once, in
//! first-reference order, and every reference is renamed to
//! `<slot><extension>` so the packed playlists address index slots.
//!
//! The `HLS` marker at offset 0 is written only after everything else has
//! been written and synced. A build that fails at any point leaves a file
//! without the marker, which readers reject.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::format::{dotted_extension, reserved_size, EntryKind, IndexEntry, MAGIC, VERSION};
use crate::error::{HlsError, Result};
use crate::playlist::m3u8::TAG_MAP;
use crate::playlist::tag::quote;
use crate::playlist::Playlist;

/// Output of the packager
pub trait ContainerSink: Write + Seek {
    /// Make everything written so far durable
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContainerSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl ContainerSink for Cursor<Vec<u8>> {}

impl<S: ContainerSink + ?Sized> ContainerSink for &mut S {
    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// What a successful build produced
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Sub-playlists packed, slots `0..playlists`
    pub playlists: usize,
    /// Unique media files packed
    pub media_files: usize,
    /// Total size of the container
    pub bytes: u64,
    /// The master playlist as stored, with renumbered references
    pub master: Playlist,
}

impl ContainerSummary {
    pub fn entries(&self) -> usize {
        self.playlists + self.media_files
    }
}

/// Pack the playlist tree rooted at `master_path` into `output_path`.
///
/// Files are resolved relative to the master's directory.
pub fn build_container(master_path: &Path, output_path: &Path) -> Result<ContainerSummary> {
    let master = Playlist::load(master_path)?;
    let work_dir = master_path.parent().unwrap_or_else(|| Path::new("."));
    let out = File::create(output_path)?;
    ContainerWriter::new(out, work_dir).write(master)
}

/// Single-use packager writing into `out`
pub struct ContainerWriter<W: ContainerSink> {
    out: W,
    work_dir: PathBuf,
    created: u32,
    playlist_count: usize,
    /// Media entries in slot order, starting at `playlist_count`
    media: Vec<IndexEntry>,
    /// Filename as referenced in the work dir, to slot
    media_slots: HashMap<String, usize>,
    position: u64,
}

impl<W: ContainerSink> ContainerWriter<W> {
    pub fn new(out: W, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            out,
            work_dir: work_dir.into(),
            created: chrono::Utc::now().timestamp() as u32,
            playlist_count: 0,
            media: Vec::new(),
            media_slots: HashMap::new(),
            position: 0,
        }
    }

    /// Override the creation timestamp stored in the header
    pub fn with_timestamp(mut self, created: u32) -> Self {
        self.created = created;
        self
    }

    /// Pack `master` and everything it references
    pub fn write(mut self, mut master: Playlist) -> Result<ContainerSummary> {
        let mut playlists = self.load_playlists(&mut master)?;
        self.playlist_count = playlists.len();

        // every media file must have a type before anything is written
        let mut seen = HashSet::new();
        let mut unique = 0;
        for pl in &playlists {
            for name in media_references(pl) {
                if seen.insert(name.to_string()) {
                    EntryKind::from_filename(name)?;
                    unique += 1;
                }
            }
        }
        info!(
            "identified {} playlists and {} unique media files",
            playlists.len(),
            unique
        );

        let total = playlists.len() + unique;
        let reserved = reserved_size(total);
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(&vec![0u8; reserved as usize])?;
        self.position = reserved;

        for pl in playlists.iter_mut() {
            self.pack_media(pl)?;
        }
        debug_assert_eq!(self.media.len(), unique);

        let mut playlist_entries = Vec::with_capacity(playlists.len());
        for (slot, pl) in playlists.iter().enumerate() {
            let entry = self.append(&pl.to_bytes(), &format!("{}.m3u8", slot))?;
            playlist_entries.push(entry);
        }
        let master_entry = self.append(&master.to_bytes(), "master")?;

        self.commit(master_entry, &playlist_entries, total)?;
        debug!("container complete: {} entries, {} bytes", total, self.position);

        Ok(ContainerSummary {
            playlists: self.playlist_count,
            media_files: self.media.len(),
            bytes: self.position,
            master,
        })
    }

    /// Load every playlist the master references and renumber the master's
    /// references to their slots. A playlist referenced twice is loaded once.
    fn load_playlists(&self, master: &mut Playlist) -> Result<Vec<Playlist>> {
        let mut playlists = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        for file in master.files.iter_mut() {
            let slot = match slots.get(&file.filename) {
                Some(&slot) => slot,
                None => {
                    let pl = Playlist::load(&self.work_dir.join(&file.filename))?;
                    playlists.push(pl);
                    slots.insert(file.filename.clone(), playlists.len() - 1);
                    playlists.len() - 1
                }
            };
            let renamed = format!("{}{}", slot, dotted_extension(&file.filename));
            file.set_filename(renamed);
        }
        Ok(playlists)
    }

    /// Copy the media a playlist references and point it at their slots
    fn pack_media(&mut self, pl: &mut Playlist) -> Result<()> {
        for tag in pl.headers.iter_mut().filter(|t| t.key == TAG_MAP) {
            if let Some(uri) = tag.get("URI").map(str::to_string) {
                let renamed = self.media_name(&uri)?;
                tag.set("URI", &quote(&renamed));
            }
        }
        for file in pl.files.iter_mut() {
            for tag in file.tags.iter_mut().filter(|t| t.key == TAG_MAP) {
                if let Some(uri) = tag.get("URI").map(str::to_string) {
                    let renamed = self.media_name(&uri)?;
                    tag.set("URI", &quote(&renamed));
                }
            }
            let renamed = self.media_name(&file.filename)?;
            file.set_filename(renamed);
        }
        Ok(())
    }

    /// Renamed reference for a media file, copying it on first use
    fn media_name(&mut self, name: &str) -> Result<String> {
        let slot = match self.media_slots.get(name) {
            Some(&slot) => slot,
            None => self.copy_media(name)?,
        };
        Ok(format!("{}{}", slot, dotted_extension(name)))
    }

    fn copy_media(&mut self, name: &str) -> Result<usize> {
        let kind = EntryKind::from_filename(name)?;
        let path = self.work_dir.join(name);
        let mut src = File::open(&path).map_err(|e| HlsError::referenced(e, &path))?;
        let expected = src.metadata()?.len();
        check_length(name, expected)?;

        let offset = self.position;
        let copied = io::copy(&mut src, &mut self.out)?;
        let length = check_length(name, copied)?;
        self.position += copied;

        let slot = self.playlist_count + self.media.len();
        self.media.push(IndexEntry {
            offset,
            kind,
            length,
        });
        self.media_slots.insert(name.to_string(), slot);
        debug!("container: {} -> slot {} ({} bytes at {})", name, slot, copied, offset);
        Ok(slot)
    }

    fn append(&mut self, bytes: &[u8], name: &str) -> Result<IndexEntry> {
        let length = check_length(name, bytes.len() as u64)?;
        let offset = self.position;
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(IndexEntry {
            offset,
            kind: EntryKind::Playlist,
            length,
        })
    }

    /// Write header and index, sync, then stamp the marker
    fn commit(&mut self, master: IndexEntry, playlists: &[IndexEntry], total: usize) -> Result<()> {
        let mut head = Vec::with_capacity(reserved_size(total) as usize);
        head.extend_from_slice(&[0u8; 4]);
        head.extend_from_slice(&0u32.to_be_bytes());
        head.extend_from_slice(&(total as u32).to_be_bytes());
        head.extend_from_slice(&self.created.to_be_bytes());
        head.extend_from_slice(&master.encode());
        for entry in playlists.iter().chain(self.media.iter()) {
            head.extend_from_slice(&entry.encode());
        }

        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(&head)?;
        self.out.flush()?;
        self.out.sync()?;

        let mut marker = [0u8; 4];
        marker[..3].copy_from_slice(&MAGIC);
        marker[3] = VERSION;
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(&marker)?;
        self.out.flush()?;
        self.out.sync()?;
        Ok(())
    }
}

/// Media filenames a playlist references, in traversal order, duplicates
/// included: `#EXT-X-MAP` headers, then per entry its `#EXT-X-MAP` tags and
/// its filename.
pub fn media_references(pl: &Playlist) -> Vec<&str> {
    let mut refs = Vec::new();
    for tag in pl.headers.iter().filter(|t| t.key == TAG_MAP) {
        if let Some(uri) = tag.get("URI") {
            refs.push(uri);
        }
    }
    for file in &pl.files {
        for tag in file.tags.iter().filter(|t| t.key == TAG_MAP) {
            if let Some(uri) = tag.get("URI") {
                refs.push(uri);
            }
        }
        refs.push(file.filename.as_str());
    }
    refs
}

fn check_length(name: &str, len: u64) -> Result<u32> {
    u32::try_from(len).map_err(|_| HlsError::EntryTooLarge {
        name: name.to_string(),
        len,
    })
}
