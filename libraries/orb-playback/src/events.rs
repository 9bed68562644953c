//! Playback Events
//!
//! Emitted by the adapter over a crossbeam channel for UI updates and, on a
//! listen-party host, for publishing state to guests.

use crate::decode_path::DecodePath;
use orb_core::TrackId;
use serde::{Deserialize, Serialize};

/// Player state as seen by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    /// Nothing loaded, or the track ended
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Events emitted by the playback adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// A track was loaded on `path`
    PathSelected {
        track_id: TrackId,
        path: DecodePath,
        /// Bit depth the output actually carries
        advertised_bit_depth: Option<u8>,
        /// The high-resolution decoder refused the stream
        fell_back: bool,
        /// Where playback starts
        #[serde(default)]
        start_ms: u64,
    },

    StateChanged { state: PlayerState },

    /// Periodic position, and immediately after a seek
    Position { position_ms: u64 },

    /// Track duration, once known or when it changes
    Duration { duration_ms: u64 },

    /// Buffered share of the stream (0-100)
    Buffered { percent: u8 },

    /// Track played to the end; emitted once per track
    Ended { track_id: TrackId },

    /// Seek requested by the user (not by reconciliation)
    Seeked { position_ms: u64 },
}
