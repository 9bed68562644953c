//! Error types for the listen party client

use thiserror::Error;

/// Listen party client errors
#[derive(Debug, Error)]
pub enum PartyError {
    /// Frame from the server was not a valid protocol message
    #[error("Invalid server message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    /// Local playback rejected a reconciliation step
    #[error("Playback error: {0}")]
    Playback(#[from] orb_playback::PlaybackError),
}

/// Result type for listen party client operations
pub type Result<T> = std::result::Result<T, PartyError>;
