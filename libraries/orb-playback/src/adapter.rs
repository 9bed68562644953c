//! Playback adapter
//!
//! Owns one native and one high-resolution backend and routes each track to
//! exactly one of them. Progress is reported by polling the active backend
//! from [`PlaybackAdapter::tick`] and turning changes into
//! [`PlaybackEvent`]s.

use crate::backend::{BackendStatus, DecodeBackend, LoadRequest};
use crate::decode_path::DecodePath;
use crate::error::{PlaybackError, Result};
use crate::events::{PlaybackEvent, PlayerState};
use crate::volume::Volume;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use orb_core::TrackInfo;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Events buffered before the adapter starts dropping them
pub const EVENT_CAPACITY: usize = 256;

/// Run `$body` with `$b` bound to the backend serving `$path`
macro_rules! on_backend {
    ($adapter:expr, $path:expr, |$b:ident| $body:expr) => {
        match $path {
            DecodePath::Native => {
                let $b = &mut $adapter.native;
                $body
            }
            DecodePath::HighRes => {
                let $b = &mut $adapter.high_res;
                $body
            }
        }
    };
}

#[derive(Debug, Clone)]
struct LoadedTrack {
    info: TrackInfo,
    path: DecodePath,
    advertised_bit_depth: Option<u8>,
    ended: bool,
}

/// Last values sent, so `tick` only emits changes
#[derive(Debug, Default)]
struct Reported {
    position_ms: Option<u64>,
    duration_ms: Option<u64>,
    buffered_percent: Option<u8>,
}

/// Drives a native and a high-resolution backend
pub struct PlaybackAdapter<N: DecodeBackend, H: DecodeBackend> {
    native: N,
    high_res: H,
    loaded: Option<LoadedTrack>,
    state: PlayerState,
    volume: Volume,
    events: Sender<PlaybackEvent>,
    reported: Reported,
}

impl<N: DecodeBackend, H: DecodeBackend> PlaybackAdapter<N, H> {
    /// Create an adapter and the receiving end of its event channel
    pub fn new(native: N, high_res: H) -> (Self, Receiver<PlaybackEvent>) {
        let (events, rx) = bounded(EVENT_CAPACITY);
        let adapter = Self {
            native,
            high_res,
            loaded: None,
            state: PlayerState::Stopped,
            volume: Volume::default(),
            events,
            reported: Reported::default(),
        };
        (adapter, rx)
    }

    /// Load `track` from `url` and start playing at `start_offset_secs`
    ///
    /// Deep lossless tracks go to the high-resolution backend. If it reports
    /// [`PlaybackError::DecodeUnavailable`], the track is loaded natively and
    /// advertised at no more than 16 bits; the caller sees success.
    pub fn play(
        &mut self,
        url: &str,
        auth_token: Option<&str>,
        start_offset_secs: f64,
        track: &TrackInfo,
    ) -> Result<()> {
        let start_offset = to_duration(start_offset_secs)?;
        self.stop();

        let request = LoadRequest {
            url: url.to_string(),
            auth_token: auth_token.map(str::to_string),
            start_offset,
            format: track.format,
            bit_depth: track.bit_depth,
            sample_rate: track.sample_rate,
        };

        let (path, fell_back) = match DecodePath::for_track(track.format, track.bit_depth) {
            DecodePath::Native => {
                self.native.load(&request)?;
                (DecodePath::Native, false)
            }
            DecodePath::HighRes => match self.high_res.load(&request) {
                Ok(()) => (DecodePath::HighRes, false),
                Err(PlaybackError::DecodeUnavailable(reason)) => {
                    warn!(
                        track_id = %track.id,
                        bit_depth = ?track.bit_depth,
                        reason = %reason,
                        "High-resolution decode unavailable, falling back to native"
                    );
                    self.native.load(&request)?;
                    (DecodePath::Native, true)
                }
                Err(e) => return Err(e),
            },
        };

        let gain = self.volume.effective_gain();
        on_backend!(self, path, |backend| {
            backend.set_gain(gain);
            backend.play()
        })?;

        let advertised_bit_depth = path.advertised_bit_depth(track.bit_depth);
        let start_ms = u64::try_from(start_offset.as_millis()).unwrap_or(u64::MAX);
        info!(
            track_id = %track.id,
            path = ?path,
            advertised_bit_depth = ?advertised_bit_depth,
            start_ms,
            "Playing track"
        );

        self.loaded = Some(LoadedTrack {
            info: track.clone(),
            path,
            advertised_bit_depth,
            ended: false,
        });
        self.reported = Reported::default();
        self.emit(PlaybackEvent::PathSelected {
            track_id: track.id.clone(),
            path,
            advertised_bit_depth,
            fell_back,
            start_ms,
        });
        self.set_state(PlayerState::Playing);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        let path = self.loaded_path()?;
        on_backend!(self, path, |backend| backend.pause())?;
        self.set_state(PlayerState::Paused);
        Ok(())
    }

    /// Resume after a pause; after the track ended, restart it from the top
    pub fn resume(&mut self) -> Result<()> {
        let path = self.loaded_path()?;
        if self.loaded.as_ref().is_some_and(|t| t.ended) {
            on_backend!(self, path, |backend| backend.seek(Duration::ZERO))?;
            if let Some(track) = self.loaded.as_mut() {
                track.ended = false;
            }
        }
        on_backend!(self, path, |backend| backend.play())?;
        self.set_state(PlayerState::Playing);
        Ok(())
    }

    /// Seek to `secs` from the start of the track
    pub fn seek(&mut self, secs: f64) -> Result<()> {
        let position = to_duration(secs)?;
        let path = self.loaded_path()?;
        on_backend!(self, path, |backend| backend.seek(position))?;

        if let Some(track) = self.loaded.as_mut() {
            track.ended = false;
        }
        let position_ms = position.as_millis() as u64;
        debug!(position_ms, "Seeked");
        self.reported.position_ms = Some(position_ms);
        self.emit(PlaybackEvent::Seeked { position_ms });
        self.emit(PlaybackEvent::Position { position_ms });
        Ok(())
    }

    /// Set the local output gain, clamped to `[0, 1]`
    ///
    /// Returns the gain actually applied. NaN is rejected.
    pub fn set_volume(&mut self, gain: f32) -> Result<f32> {
        let applied = self.volume.set_gain(gain)?;
        self.push_gain();
        Ok(applied)
    }

    pub fn set_muted(&mut self, muted: bool) {
        if muted {
            self.volume.mute();
        } else {
            self.volume.unmute();
        }
        self.push_gain();
    }

    /// Release the current track
    pub fn stop(&mut self) {
        if let Some(track) = self.loaded.take() {
            on_backend!(self, track.path, |backend| backend.stop());
            self.set_state(PlayerState::Stopped);
        }
    }

    /// Poll the active backend and emit what changed since the last tick
    ///
    /// Call periodically (every 250-500 ms) from the UI loop.
    pub fn tick(&mut self) {
        let Some(status) = self.status() else {
            return;
        };

        if let Some(duration) = status.duration {
            let duration_ms = duration.as_millis() as u64;
            if self.reported.duration_ms != Some(duration_ms) {
                self.reported.duration_ms = Some(duration_ms);
                self.emit(PlaybackEvent::Duration { duration_ms });
            }
        }

        let position_ms = status.position.as_millis() as u64;
        if self.reported.position_ms != Some(position_ms) {
            self.reported.position_ms = Some(position_ms);
            self.emit(PlaybackEvent::Position { position_ms });
        }

        let percent = (status.buffered.clamp(0.0, 1.0) * 100.0).round() as u8;
        if self.reported.buffered_percent != Some(percent) {
            self.reported.buffered_percent = Some(percent);
            self.emit(PlaybackEvent::Buffered { percent });
        }

        if status.finished {
            let newly_ended = match self.loaded.as_mut() {
                Some(track) if !track.ended => {
                    track.ended = true;
                    Some(track.info.id.clone())
                }
                _ => None,
            };
            if let Some(track_id) = newly_ended {
                info!(track_id = %track_id, "Track ended");
                self.emit(PlaybackEvent::Ended { track_id });
                self.set_state(PlayerState::Stopped);
            }
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current_track(&self) -> Option<&TrackInfo> {
        self.loaded.as_ref().map(|t| &t.info)
    }

    pub fn decode_path(&self) -> Option<DecodePath> {
        self.loaded.as_ref().map(|t| t.path)
    }

    /// Bit depth the output carries for the current track
    pub fn advertised_bit_depth(&self) -> Option<u8> {
        self.loaded.as_ref().and_then(|t| t.advertised_bit_depth)
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// Current position of the active backend
    pub fn position_ms(&self) -> Option<u64> {
        self.status().map(|s| s.position.as_millis() as u64)
    }

    fn status(&self) -> Option<BackendStatus> {
        let track = self.loaded.as_ref()?;
        Some(match track.path {
            DecodePath::Native => self.native.status(),
            DecodePath::HighRes => self.high_res.status(),
        })
    }

    fn loaded_path(&self) -> Result<DecodePath> {
        self.loaded
            .as_ref()
            .map(|t| t.path)
            .ok_or(PlaybackError::NoTrackLoaded)
    }

    fn push_gain(&mut self) {
        let gain = self.volume.effective_gain();
        if let Some(path) = self.loaded.as_ref().map(|t| t.path) {
            on_backend!(self, path, |backend| backend.set_gain(gain));
        }
    }

    fn set_state(&mut self, state: PlayerState) {
        if self.state != state {
            self.state = state;
            self.emit(PlaybackEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            trace!(?event, "Event channel full, dropping event");
        }
    }
}

/// Seconds from a caller into a `Duration`, rejecting negatives and NaN
fn to_duration(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(PlaybackError::InvalidSeekPosition(secs));
    }
    Ok(Duration::from_secs_f64(secs))
}
