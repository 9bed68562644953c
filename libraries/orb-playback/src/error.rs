//! Error types for playback

use thiserror::Error;

/// Playback errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No track is currently loaded
    #[error("No track loaded")]
    NoTrackLoaded,

    /// The backend cannot decode this stream (missing codec, unsupported
    /// bit depth). The adapter recovers from this on the high-resolution
    /// path by falling back to native decoding.
    #[error("Decode unavailable: {0}")]
    DecodeUnavailable(String),

    /// Seek target is negative or not a number
    #[error("Invalid seek position: {0}")]
    InvalidSeekPosition(f64),

    /// Volume is not a number
    #[error("Invalid volume: {0}")]
    InvalidVolume(f32),

    /// Backend failure other than an unsupported stream
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
