//! Single-file HLS container
//!
//! - `format`: binary layout and entry types
//! - `writer`: packs a playlist tree into one file
//! - `reader`: validates and reads packed files

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{ContainerHeader, EntryKind, IndexEntry};
pub use reader::ContainerReader;
pub use writer::{build_container, ContainerSink, ContainerSummary, ContainerWriter};
