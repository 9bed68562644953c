//! Host-side state publisher
//!
//! Turns the host adapter's events into `state_update` messages. Discrete
//! changes (track, play/pause, seek, end) go out immediately; otherwise a
//! heartbeat is sent once per interval so late or lossy guests catch up.
//! Both share one message shape.

use orb_core::protocol::ClientMessage;
use orb_core::TrackId;
use orb_playback::{PlaybackEvent, PlayerState};
use std::time::Duration;

/// Default time between heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Decides when the host publishes its playback state
#[derive(Debug, Clone)]
pub struct HostPublisher {
    heartbeat_interval_ms: i64,
    track_id: Option<TrackId>,
    position_ms: u64,
    /// When `position_ms` was observed
    position_at_ms: i64,
    playing: bool,
    last_sent_ms: Option<i64>,
}

impl Default for HostPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT_INTERVAL)
    }
}

impl HostPublisher {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval_ms: i64::try_from(heartbeat_interval.as_millis()).unwrap_or(i64::MAX),
            track_id: None,
            position_ms: 0,
            position_at_ms: 0,
            playing: false,
            last_sent_ms: None,
        }
    }

    /// Feed one adapter event; returns a message to send, if any
    pub fn on_event(&mut self, event: &PlaybackEvent, now_ms: i64) -> Option<ClientMessage> {
        match event {
            PlaybackEvent::PathSelected {
                track_id, start_ms, ..
            } => {
                self.track_id = Some(track_id.clone());
                self.set_position(*start_ms, now_ms);
                Some(self.publish(now_ms))
            }
            PlaybackEvent::StateChanged { state } => {
                let playing = *state == PlayerState::Playing;
                if playing == self.playing {
                    return None;
                }
                // Freeze or restart the clock at the current position
                let position = self.position_now(now_ms);
                self.playing = playing;
                self.set_position(position, now_ms);
                Some(self.publish(now_ms))
            }
            PlaybackEvent::Seeked { position_ms } => {
                self.set_position(*position_ms, now_ms);
                Some(self.publish(now_ms))
            }
            PlaybackEvent::Ended { .. } => {
                self.playing = false;
                Some(self.publish(now_ms))
            }
            PlaybackEvent::Position { position_ms } => {
                self.set_position(*position_ms, now_ms);
                self.heartbeat(now_ms)
            }
            PlaybackEvent::Duration { .. } | PlaybackEvent::Buffered { .. } => self.heartbeat(now_ms),
        }
    }

    /// Heartbeat without a new event (call from the UI loop)
    pub fn tick(&mut self, now_ms: i64) -> Option<ClientMessage> {
        self.heartbeat(now_ms)
    }

    /// Current state as a message, regardless of timing
    pub fn snapshot(&self, now_ms: i64) -> ClientMessage {
        ClientMessage::StateUpdate {
            track_id: self.track_id.clone(),
            position_ms: self.position_now(now_ms),
            playing: self.playing,
        }
    }

    fn heartbeat(&mut self, now_ms: i64) -> Option<ClientMessage> {
        let due = match self.last_sent_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.heartbeat_interval_ms,
            None => true,
        };
        due.then(|| self.publish(now_ms))
    }

    fn publish(&mut self, now_ms: i64) -> ClientMessage {
        self.last_sent_ms = Some(now_ms);
        self.snapshot(now_ms)
    }

    fn set_position(&mut self, position_ms: u64, now_ms: i64) {
        self.position_ms = position_ms;
        self.position_at_ms = now_ms;
    }

    fn position_now(&self, now_ms: i64) -> u64 {
        if self.playing {
            let elapsed = u64::try_from(now_ms.saturating_sub(self.position_at_ms)).unwrap_or(0);
            self.position_ms.saturating_add(elapsed)
        } else {
            self.position_ms
        }
    }
}
