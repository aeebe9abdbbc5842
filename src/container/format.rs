//! Container binary layout
//!
//! All integers are big endian.
//!
//! ```text
//! 0       "HLS" + version byte, written last
//! 4       flags (0)
//! 8       entry count N
//! 12      creation time, unix seconds
//! 16      master entry: offset u64, type u32, length u32
//! 32+16n  entry n
//! ```
//!
//! Entries `0..P` are the sub-playlists in master order, entries `P..N` the
//! deduplicated media files in first-reference order.

use std::fmt;
use std::path::Path;

use crate::error::{HlsError, Result};

pub const MAGIC: [u8; 3] = *b"HLS";
pub const VERSION: u8 = 1;

/// Size of one index entry
pub const ENTRY_SIZE: u64 = 16;
/// Position of the master entry
pub const MASTER_ENTRY_POS: u64 = 16;
/// Position of entry 0
pub const FIRST_ENTRY_POS: u64 = 32;

/// Bytes reserved ahead of the content for a container with `entries` slots
pub fn reserved_size(entries: usize) -> u64 {
    FIRST_ENTRY_POS + ENTRY_SIZE * entries as u64
}

/// Position of the index entry for `slot`
pub fn entry_pos(slot: usize) -> u64 {
    FIRST_ENTRY_POS + ENTRY_SIZE * slot as u64
}

/// Type flag stored with every index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EntryKind {
    Playlist = 0,
    MpegTs = 1,
    Mp4 = 2,
    Vtt = 3,
    /// Fragmented MP4 media segment (`.m4s`)
    Fmp4Segment = 4,
}

impl EntryKind {
    /// Type of a file from its extension
    pub fn from_filename(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        match ext {
            "m3u8" => Ok(EntryKind::Playlist),
            "ts" => Ok(EntryKind::MpegTs),
            "mp4" => Ok(EntryKind::Mp4),
            "vtt" => Ok(EntryKind::Vtt),
            "m4s" => Ok(EntryKind::Fmp4Segment),
            _ => Err(HlsError::UnsupportedMediaType(name.to_string())),
        }
    }

    pub fn from_flag(flag: u32) -> Option<Self> {
        match flag {
            0 => Some(EntryKind::Playlist),
            1 => Some(EntryKind::MpegTs),
            2 => Some(EntryKind::Mp4),
            3 => Some(EntryKind::Vtt),
            4 => Some(EntryKind::Fmp4Segment),
            _ => None,
        }
    }

    pub fn flag(&self) -> u32 {
        *self as u32
    }

    /// Extension including the dot
    pub fn extension(&self) -> &'static str {
        match self {
            EntryKind::Playlist => ".m3u8",
            EntryKind::MpegTs => ".ts",
            EntryKind::Mp4 => ".mp4",
            EntryKind::Vtt => ".vtt",
            EntryKind::Fmp4Segment => ".m4s",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::Playlist => "playlist",
            EntryKind::MpegTs => "mpegts",
            EntryKind::Mp4 => "mp4",
            EntryKind::Vtt => "vtt",
            EntryKind::Fmp4Segment => "m4s",
        })
    }
}

/// Extension of `name` including the dot, empty if there is none
pub fn dotted_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// One index slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    pub kind: EntryKind,
    pub length: u32,
}

impl IndexEntry {
    pub fn encode(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..8].copy_from_slice(&self.offset.to_be_bytes());
        buf[8..12].copy_from_slice(&self.kind.flag().to_be_bytes());
        buf[12..16].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; 16]) -> Result<Self> {
        let offset = u64::from_be_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        let flag = be_u32(&buf[8..12]);
        let length = be_u32(&buf[12..16]);
        let kind = EntryKind::from_flag(flag)
            .ok_or_else(|| HlsError::InvalidContainer(format!("unknown entry type {}", flag)))?;
        Ok(Self {
            offset,
            kind,
            length,
        })
    }

    /// End of the byte range covered in the container file, `None` if it
    /// does not fit in a u64
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length as u64)
    }
}

/// Fixed 32-byte header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u8,
    pub flags: u32,
    pub entry_count: u32,
    pub created: u32,
    pub master: IndexEntry,
}

impl ContainerHeader {
    /// Decode and validate the first 32 bytes of a container
    pub fn decode(buf: &[u8; 32]) -> Result<Self> {
        if buf[0..3] != MAGIC {
            return Err(HlsError::InvalidContainer(
                "missing HLS marker (incomplete or not a container)".into(),
            ));
        }
        if buf[3] != VERSION {
            return Err(HlsError::InvalidContainer(format!(
                "unsupported version {}",
                buf[3]
            )));
        }
        let mut master = [0u8; 16];
        master.copy_from_slice(&buf[16..32]);
        Ok(Self {
            version: buf[3],
            flags: be_u32(&buf[4..8]),
            entry_count: be_u32(&buf[8..12]),
            created: be_u32(&buf[12..16]),
            master: IndexEntry::decode(&master)?,
        })
    }
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_filename() {
        assert_eq!(EntryKind::from_filename("stream_0.m3u8").unwrap(), EntryKind::Playlist);
        assert_eq!(EntryKind::from_filename("a.ts").unwrap().flag(), 1);
        assert_eq!(EntryKind::from_filename("init_0.mp4").unwrap().flag(), 2);
        assert_eq!(EntryKind::from_filename("stream_4.vtt").unwrap().flag(), 3);
        assert_eq!(EntryKind::from_filename("stream_1_7.m4s").unwrap().flag(), 4);
    }

    #[test]
    fn test_unknown_extension() {
        for name in ["master.key", "noext", "x.MP4"] {
            assert!(matches!(
                EntryKind::from_filename(name),
                Err(HlsError::UnsupportedMediaType(n)) if n == name
            ));
        }
    }

    #[test]
    fn test_entry_layout() {
        let entry = IndexEntry {
            offset: 0x0102030405060708,
            kind: EntryKind::Vtt,
            length: 0xAABBCCDD,
        };
        let buf = entry.encode();
        assert_eq!(
            buf,
            [1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 3, 0xAA, 0xBB, 0xCC, 0xDD]
        );
        assert_eq!(IndexEntry::decode(&buf).unwrap(), entry);
    }

    #[test]
    fn test_bad_entry_type() {
        let mut buf = [0u8; 16];
        buf[11] = 9;
        assert!(matches!(
            IndexEntry::decode(&buf),
            Err(HlsError::InvalidContainer(_))
        ));
    }

    #[test]
    fn test_reserved_size() {
        assert_eq!(reserved_size(0), 32);
        assert_eq!(reserved_size(5), 112);
        assert_eq!(entry_pos(2), 64);
    }

    #[test]
    fn test_header_without_marker() {
        let buf = [0u8; 32];
        assert!(matches!(
            ContainerHeader::decode(&buf),
            Err(HlsError::InvalidContainer(_))
        ));
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension("init_0.mp4"), ".mp4");
        assert_eq!(dotted_extension("stream_0_1.m4s"), ".m4s");
        assert_eq!(dotted_extension("plain"), "");
    }
}
