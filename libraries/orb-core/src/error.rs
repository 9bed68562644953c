/// Core error types for Orb
use thiserror::Error;

/// Result type alias using `OrbError`
pub type Result<T> = std::result::Result<T, OrbError>;

/// Core error type for Orb
#[derive(Error, Debug)]
pub enum OrbError {
    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Requested bytes lie outside the object
    #[error("Range not satisfiable: start {start} for object of {size} bytes")]
    RangeNotSatisfiable { start: u64, size: u64 },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrbError {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
