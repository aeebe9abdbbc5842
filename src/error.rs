use thiserror::Error;

/// Main error type for the packer
#[derive(Error, Debug)]
pub enum HlsError {
    /// A playlist could not be parsed or mutated
    #[error("Playlist error: {0}")]
    Playlist(#[from] PlaylistError),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A file referenced by a playlist does not exist in the working directory
    #[error("Referenced file not found: {0}")]
    NotFound(String),

    /// A referenced file has an extension with no container type flag
    #[error("Unsupported media type for file: {0}")]
    UnsupportedMediaType(String),

    /// A file is too large for the 32-bit length field of an index entry
    #[error("File {name} is too large for the container index ({len} bytes)")]
    EntryTooLarge { name: String, len: u64 },

    /// The source file does not contain a usable video track
    #[error("No video stream found in source file")]
    MissingVideoTrack,

    /// A probed track has a type that cannot become a stream
    #[error("Unsupported stream type: {0}")]
    UnsupportedStream(String),

    /// An external tool failed to run or exited unsuccessfully
    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    /// Every encode attempt failed
    #[error("Encoding failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// Probe output could not be interpreted
    #[error("Probe error: {0}")]
    Probe(String),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A container file is incomplete or corrupt
    #[error("Invalid container: {0}")]
    InvalidContainer(String),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Playlist parsing and mutation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlaylistError {
    /// A line appeared where the playlist structure does not allow it
    #[error("Malformed playlist at line {line}: unexpected {content}")]
    Malformed { line: usize, content: String },

    /// Input ended while a segment or variant was waiting for its filename
    #[error("Unexpected end of playlist")]
    UnexpectedEnd,

    /// No file entry with the given filename
    #[error("File not found in playlist: {0}")]
    NotFound(String),

    /// A referential tag carries no URI attribute
    #[error("Tag {0} has no URI attribute")]
    MissingUri(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, HlsError>;

impl HlsError {
    /// Map an I/O failure on a file a playlist points at. A missing file
    /// becomes `NotFound`, anything else stays an I/O error.
    pub fn referenced(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            HlsError::NotFound(path.display().to_string())
        } else {
            HlsError::Io(err)
        }
    }
}

impl From<tokio::task::JoinError> for HlsError {
    fn from(err: tokio::task::JoinError) -> Self {
        HlsError::Task(err.to_string())
    }
}
