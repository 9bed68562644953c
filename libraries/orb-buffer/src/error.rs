//! Error types for the chunk cache.

use thiserror::Error;

/// Errors surfaced by chunk fetches and cache reads.
///
/// `Clone` because one fetch result is shared by every reader waiting on
/// the same chunk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Track (or session) does not exist on the server
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server rejected the byte range
    #[error("Range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    /// Credentials were rejected (expired token, kicked guest, ended session)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Network or server hiccup; the next demand read retries
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    /// Read starts at or beyond the end of the object
    #[error("Read at {offset} is outside object of {size} bytes")]
    OutOfRange { offset: u64, size: u64 },

    /// Server response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl BufferError {
    /// Whether retrying the same request later might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BufferError::Transient(_))
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, BufferError>;
