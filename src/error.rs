//! Error types for seglog

use thiserror::Error;

/// Result type alias for seglog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for seglog
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk or in-flight data failed an integrity check
    #[error("Corruption: {0}")]
    Corruption(String),

    /// A previous corruption halted the write path of this segment
    #[error("Write path of segment {base_offset} is halted after a corruption")]
    WriteHalted {
        /// Base offset of the halted segment
        base_offset: i64,
    },

    /// Appended batch does not extend the segment
    #[error("Batch at offset {base_offset} does not extend segment (base {segment_base}, dirty {dirty_offset:?})")]
    OffsetOutOfOrder {
        /// Base offset of the rejected batch
        base_offset: i64,
        /// Base offset of the segment
        segment_base: i64,
        /// Current dirty offset of the segment
        dirty_offset: Option<i64>,
    },

    /// Truncation request outside of the segment's current bounds
    #[error("Invalid truncation: {0}")]
    InvalidTruncation(String),

    /// Operation on a closed component
    #[error("{0} is closed")]
    Closed(&'static str),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Wire protocol framing errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether the error leaves the segment's write path unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::WriteHalted { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
