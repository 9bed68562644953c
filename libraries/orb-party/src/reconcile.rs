//! Reconciliation actions for a guest's local player

use crate::error::Result;
use orb_core::TrackInfo;
use orb_playback::{DecodeBackend, PlaybackAdapter};

/// One step that brings the local player in line with the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    /// Switch to the host's track at `position_ms`
    LoadTrack {
        track: TrackInfo,
        position_ms: u64,
        playing: bool,
    },
    /// Jump to the host's position
    Seek { position_ms: u64 },
    Play,
    Pause,
    /// Release the stream (host cleared the track, or the guest was removed)
    Stop,
}

impl Reconcile {
    /// Apply this step to a playback adapter
    ///
    /// `stream_url` builds the guest-scoped URL for a track.
    pub fn apply<N, H>(
        &self,
        adapter: &mut PlaybackAdapter<N, H>,
        stream_url: impl Fn(&TrackInfo) -> String,
    ) -> Result<()>
    where
        N: DecodeBackend,
        H: DecodeBackend,
    {
        match self {
            Reconcile::LoadTrack {
                track,
                position_ms,
                playing,
            } => {
                adapter.play(&stream_url(track), None, ms_to_secs(*position_ms), track)?;
                if !playing {
                    adapter.pause()?;
                }
            }
            Reconcile::Seek { position_ms } => adapter.seek(ms_to_secs(*position_ms))?,
            Reconcile::Play => adapter.resume()?,
            Reconcile::Pause => adapter.pause()?,
            Reconcile::Stop => adapter.stop(),
        }
        Ok(())
    }
}

fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}
