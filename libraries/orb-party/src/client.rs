//! Listen party client state
//!
//! Tracks one connection's view of a session and decides how the local
//! player must move to follow the host. Pure state: the caller owns the
//! socket and the clock.

use crate::error::Result;
use crate::reconcile::Reconcile;
use orb_buffer::StreamAuth;
use orb_core::protocol::{EndReason, ErrorCode, Participant, PlaybackState, Role, ServerMessage};
use orb_core::{GuestToken, ParticipantId, SessionId};
use tracing::{debug, info, warn};

/// Default position drift tolerated before a guest seeks
pub const DEFAULT_DRIFT_TOLERANCE_MS: u64 = 1500;

/// Where the connection stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Socket open, `joined` not yet received
    Connecting,
    Connected,
    /// Removed by the host
    Kicked,
    Ended(EndReason),
    /// Join refused (full, unknown session, bad credentials)
    Rejected(ErrorCode),
}

impl ConnectionStatus {
    /// No further messages change anything
    pub fn is_terminal(self) -> bool {
        !matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Connected)
    }
}

/// Where the local player is believed to be
#[derive(Debug, Clone, Copy)]
struct LocalAnchor {
    position_ms: u64,
    playing: bool,
    at_ms: i64,
}

impl LocalAnchor {
    fn position_at(self, now_ms: i64) -> u64 {
        if self.playing {
            self.position_ms
                .saturating_add(elapsed_ms(self.at_ms, now_ms))
        } else {
            self.position_ms
        }
    }
}

/// One connection's view of a listen party
#[derive(Debug, Clone)]
pub struct PartyClient {
    role: Role,
    status: ConnectionStatus,
    session_id: Option<SessionId>,
    participant_id: Option<ParticipantId>,
    guest_token: Option<GuestToken>,
    roster: Vec<Participant>,
    host_state: PlaybackState,
    local: Option<LocalAnchor>,
    last_seen_ms: Option<i64>,
    drift_tolerance_ms: u64,
}

impl PartyClient {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            status: ConnectionStatus::Connecting,
            session_id: None,
            participant_id: None,
            guest_token: None,
            roster: Vec::new(),
            host_state: PlaybackState::default(),
            local: None,
            last_seen_ms: None,
            drift_tolerance_ms: DEFAULT_DRIFT_TOLERANCE_MS,
        }
    }

    pub fn with_drift_tolerance(mut self, drift_tolerance_ms: u64) -> Self {
        self.drift_tolerance_ms = drift_tolerance_ms;
        self
    }

    /// Parse a text frame and apply it
    pub fn apply_text(&mut self, frame: &str, now_ms: i64) -> Result<Vec<Reconcile>> {
        let message: ServerMessage = serde_json::from_str(frame)?;
        Ok(self.apply(message, now_ms))
    }

    /// Apply one server message
    ///
    /// Idempotent: a repeated heartbeat with unchanged track, position and
    /// play state only refreshes `last_seen`. Once terminal, every message
    /// is ignored.
    pub fn apply(&mut self, message: ServerMessage, now_ms: i64) -> Vec<Reconcile> {
        if self.status.is_terminal() {
            debug!(status = ?self.status, "Ignoring message on closed party connection");
            return Vec::new();
        }
        self.last_seen_ms = Some(now_ms);

        match message {
            ServerMessage::Joined {
                role,
                session_id,
                participant_id,
                guest_token,
                state,
            } => {
                info!(session_id = %session_id, role = ?role, "Joined listen party");
                self.role = role;
                self.status = ConnectionStatus::Connected;
                self.session_id = Some(session_id);
                self.participant_id = participant_id;
                self.guest_token = guest_token;
                self.follow(state, now_ms)
            }
            ServerMessage::RosterUpdate { participants } => {
                self.roster = participants;
                Vec::new()
            }
            ServerMessage::StateUpdate { state } => {
                if self.host_state.same_playback(&state) {
                    return Vec::new();
                }
                self.follow(state, now_ms)
            }
            ServerMessage::Kicked => {
                info!("Removed from listen party by host");
                self.close(ConnectionStatus::Kicked)
            }
            ServerMessage::Ended { reason } => {
                info!(reason = ?reason, "Listen party ended");
                self.close(ConnectionStatus::Ended(reason))
            }
            ServerMessage::Error { code, message } => {
                warn!(code = ?code, message = %message, "Listen party error");
                if self.status == ConnectionStatus::Connecting {
                    self.status = ConnectionStatus::Rejected(code);
                }
                Vec::new()
            }
            ServerMessage::Pong => Vec::new(),
        }
    }

    /// Record where the local player actually is
    ///
    /// Feeds real drift into the next reconciliation.
    pub fn report_local_position(&mut self, position_ms: u64, now_ms: i64) {
        if let Some(local) = self.local.as_mut() {
            local.position_ms = position_ms;
            local.at_ms = now_ms;
        }
    }

    /// Whether guest-scoped stream and cover requests can still succeed
    pub fn can_stream(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Credentials for the guest stream endpoint, while streaming is allowed
    pub fn stream_auth(&self) -> Option<StreamAuth> {
        if !self.can_stream() {
            return None;
        }
        Some(StreamAuth::Guest {
            session_id: self.session_id.clone()?,
            token: self.guest_token.clone()?,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn participant_id(&self) -> Option<&ParticipantId> {
        self.participant_id.as_ref()
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    /// Last host state received
    pub fn host_state(&self) -> &PlaybackState {
        &self.host_state
    }

    /// Time of the last message, in the caller's clock
    pub fn last_seen_ms(&self) -> Option<i64> {
        self.last_seen_ms
    }

    /// Host position extrapolated to `now_ms`
    pub fn expected_position_ms(&self, now_ms: i64) -> u64 {
        expected_position(&self.host_state, now_ms)
    }

    fn close(&mut self, status: ConnectionStatus) -> Vec<Reconcile> {
        self.status = status;
        self.guest_token = None;
        if self.local.take().is_some() {
            vec![Reconcile::Stop]
        } else {
            Vec::new()
        }
    }

    /// Adopt a new host state and work out the local steps
    fn follow(&mut self, state: PlaybackState, now_ms: i64) -> Vec<Reconcile> {
        let mut actions = Vec::new();
        let target = expected_position(&state, now_ms);

        match (&state.track, self.local) {
            (None, Some(_)) => {
                actions.push(Reconcile::Stop);
                self.local = None;
            }
            (None, None) => {}
            (Some(track), local) => {
                let same_track = local.is_some()
                    && self.host_state.track.as_ref().map(|t| &t.id) == Some(&track.id);

                match local.filter(|_| same_track) {
                    None => {
                        actions.push(Reconcile::LoadTrack {
                            track: track.clone(),
                            position_ms: target,
                            playing: state.playing,
                        });
                        self.local = Some(LocalAnchor {
                            position_ms: target,
                            playing: state.playing,
                            at_ms: now_ms,
                        });
                    }
                    Some(anchor) => {
                        let local_position = anchor.position_at(now_ms);
                        let drift = local_position.abs_diff(target);
                        let position_ms = if drift > self.drift_tolerance_ms {
                            debug!(drift_ms = drift, target_ms = target, "Re-syncing to host");
                            actions.push(Reconcile::Seek { position_ms: target });
                            target
                        } else {
                            local_position
                        };

                        if state.playing != anchor.playing {
                            actions.push(if state.playing {
                                Reconcile::Play
                            } else {
                                Reconcile::Pause
                            });
                        }

                        self.local = Some(LocalAnchor {
                            position_ms,
                            playing: state.playing,
                            at_ms: now_ms,
                        });
                    }
                }
            }
        }

        self.host_state = state;
        actions
    }
}

/// Host position at `now_ms`, advancing a playing state by the time since
/// it was stamped and stopping at the track's end
fn expected_position(state: &PlaybackState, now_ms: i64) -> u64 {
    let mut position = state.position_ms;
    if state.playing && state.updated_at_ms > 0 {
        position = position.saturating_add(elapsed_ms(state.updated_at_ms, now_ms));
    }
    match state.track.as_ref().map(|t| t.duration_ms) {
        Some(duration) if duration > 0 => position.min(duration),
        _ => position,
    }
}

fn elapsed_ms(since_ms: i64, now_ms: i64) -> u64 {
    u64::try_from(now_ms.saturating_sub(since_ms)).unwrap_or(0)
}
