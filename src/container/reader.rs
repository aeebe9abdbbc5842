//! Container reader
//!
//! Validates the header of a packed file and gives access to its entries.
//! Used by the `inspect` / `extract` commands and by tests.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::format::{ContainerHeader, IndexEntry, ENTRY_SIZE, FIRST_ENTRY_POS};
use crate::error::{HlsError, Result};
use crate::playlist::Playlist;

pub struct ContainerReader<R> {
    inner: R,
    header: ContainerHeader,
    entries: Vec<IndexEntry>,
}

impl ContainerReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| HlsError::referenced(e, path))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Read and validate header and index
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        if len < FIRST_ENTRY_POS {
            return Err(HlsError::InvalidContainer(format!(
                "file too short ({} bytes)",
                len
            )));
        }

        inner.seek(SeekFrom::Start(0))?;
        let mut head = [0u8; 32];
        inner.read_exact(&mut head)?;
        let header = ContainerHeader::decode(&head)?;

        let index_end = FIRST_ENTRY_POS + ENTRY_SIZE * header.entry_count as u64;
        if index_end > len {
            return Err(HlsError::InvalidContainer(format!(
                "index of {} entries exceeds file size",
                header.entry_count
            )));
        }

        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            let mut buf = [0u8; 16];
            inner.read_exact(&mut buf)?;
            entries.push(IndexEntry::decode(&buf)?);
        }

        for (slot, entry) in entries.iter().chain(std::iter::once(&header.master)).enumerate() {
            match entry.end() {
                Some(end) if entry.offset >= index_end && end <= len => {}
                _ => {
                    return Err(HlsError::InvalidContainer(format!(
                        "entry {} (offset {}, {} bytes) outside the data area",
                        slot, entry.offset, entry.length
                    )))
                }
            }
        }

        Ok(Self {
            inner,
            header,
            entries,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Index entries, slot order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Bytes of the entry in `slot`
    pub fn read_entry(&mut self, slot: usize) -> Result<Vec<u8>> {
        let entry = *self
            .entries
            .get(slot)
            .ok_or_else(|| HlsError::InvalidContainer(format!("no entry {}", slot)))?;
        self.read(entry)
    }

    /// Bytes of the master playlist
    pub fn read_master(&mut self) -> Result<Vec<u8>> {
        let entry = self.header.master;
        self.read(entry)
    }

    pub fn master_playlist(&mut self) -> Result<Playlist> {
        let bytes = self.read_master()?;
        let text = String::from_utf8(bytes)
            .map_err(|_| HlsError::InvalidContainer("master playlist is not UTF-8".into()))?;
        Ok(Playlist::parse(&text)?)
    }

    /// Write every entry to `dir` under its slot name plus `master.m3u8`,
    /// giving a directory the packed playlists play from directly.
    pub fn extract_all(&mut self, dir: &Path) -> Result<usize> {
        std::fs::create_dir_all(dir)?;
        for slot in 0..self.entries.len() {
            let entry = self.entries[slot];
            let bytes = self.read(entry)?;
            let name = format!("{}{}", slot, entry.kind.extension());
            std::fs::write(dir.join(name), bytes)?;
        }
        std::fs::write(dir.join("master.m3u8"), self.read_master()?)?;
        Ok(self.entries.len() + 1)
    }

    fn read(&mut self, entry: IndexEntry) -> Result<Vec<u8>> {
        self.inner.seek(SeekFrom::Start(entry.offset))?;
        let mut buf = vec![0u8; entry.length as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }
}
