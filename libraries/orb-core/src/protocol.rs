//! Listen party wire protocol
//!
//! JSON messages exchanged over the listen party push channel. Every message
//! carries a `type` tag in snake_case, e.g. `{"type":"state_update", ...}`.

use crate::error::{OrbError, Result};
use crate::types::{GuestToken, ParticipantId, SessionId, TrackId, TrackInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest nickname a guest may choose, in characters
pub const MAX_NICKNAME_LEN: usize = 32;

/// Role of a connection within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

/// Host playback snapshot, as broadcast to guests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    #[serde(default)]
    pub track: Option<TrackInfo>,
    pub position_ms: u64,
    pub playing: bool,
    /// Server wall-clock time (unix ms) when the host last set this state
    #[serde(default)]
    pub updated_at_ms: i64,
}

impl PlaybackState {
    /// Same track, position and play state, ignoring the timestamp
    pub fn same_playback(&self, other: &PlaybackState) -> bool {
        self.track.as_ref().map(|t| &t.id) == other.track.as_ref().map(|t| &t.id)
            && self.position_ms == other.position_ms
            && self.playing == other.playing
    }
}

/// Roster entry; never carries the participant's guest token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub nickname: String,
    pub joined_at: DateTime<Utc>,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Host ended the session explicitly
    HostEnded,
    /// Host connection was lost, or never opened, within the grace period
    HostDisconnected,
    /// Session reached its maximum lifetime
    Expired,
}

/// Machine-readable error category sent in `error` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    SessionFull,
    InvalidMessage,
    NotFound,
}

/// Messages sent by the hub to a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted; carries the current snapshot so a late joiner
    /// does not wait for the next heartbeat
    Joined {
        role: Role,
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_id: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guest_token: Option<GuestToken>,
        state: PlaybackState,
    },
    /// Full participant list after any membership change
    RosterUpdate { participants: Vec<Participant> },
    /// Host playback state (heartbeat or discrete event; same shape)
    StateUpdate { state: PlaybackState },
    /// The receiving guest was removed by the host
    Kicked,
    /// The session is over
    Ended { reason: EndReason },
    /// A request from this connection was rejected
    Error { code: ErrorCode, message: String },
    Pong,
}

/// Messages sent by a connection to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message of a guest connection
    Join { nickname: String },
    /// Host playback state; the server resolves `track_id` to `TrackInfo`
    StateUpdate {
        #[serde(default)]
        track_id: Option<TrackId>,
        position_ms: u64,
        playing: bool,
    },
    Kick { participant_id: ParticipantId },
    End,
    Ping,
    Play,
    Pause,
    Seek { position_ms: u64 },
}

impl ClientMessage {
    /// Whether this message writes shared playback or session state and so
    /// may only come from the host
    pub fn requires_host(&self) -> bool {
        matches!(
            self,
            ClientMessage::StateUpdate { .. }
                | ClientMessage::Kick { .. }
                | ClientMessage::End
                | ClientMessage::Play
                | ClientMessage::Pause
                | ClientMessage::Seek { .. }
        )
    }
}

/// Trim and validate a guest nickname
pub fn validate_nickname(raw: &str) -> Result<String> {
    let nickname = raw.trim();
    if nickname.is_empty() {
        return Err(OrbError::invalid_input("nickname must not be empty"));
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(OrbError::invalid_input(format!(
            "nickname longer than {} characters",
            MAX_NICKNAME_LEN
        )));
    }
    Ok(nickname.to_string())
}
