//! Decoder backend trait
//!
//! Abstracts the platform decoder so the adapter can drive a native decoder
//! and a high-resolution decoder through the same calls.

use crate::error::Result;
use orb_core::AudioFormat;
use std::time::Duration;

/// Everything a backend needs to open a stream
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    /// Absolute stream URL (bearer or guest-token scoped)
    pub url: String,
    /// Bearer token sent with range requests, if the URL does not carry one
    pub auth_token: Option<String>,
    /// Where playback starts
    pub start_offset: Duration,
    pub format: AudioFormat,
    pub bit_depth: Option<u8>,
    pub sample_rate: u32,
}

/// Snapshot of a backend's progress
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BackendStatus {
    pub position: Duration,
    /// `None` until the decoder has read enough to know
    pub duration: Option<Duration>,
    /// Fraction of the stream buffered locally, in `[0, 1]`
    pub buffered: f32,
    /// No more samples will be produced
    pub finished: bool,
}

/// Platform decoder
///
/// `load` returns [`PlaybackError::DecodeUnavailable`](crate::PlaybackError::DecodeUnavailable)
/// when the stream's format or bit depth is not supported.
pub trait DecodeBackend: Send {
    /// Open a stream, replacing whatever was loaded
    fn load(&mut self, request: &LoadRequest) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Seek to a position from the start of the track
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// Output gain in `[0, 1]`
    fn set_gain(&mut self, gain: f32);

    /// Release the stream
    fn stop(&mut self);

    fn status(&self) -> BackendStatus;
}
