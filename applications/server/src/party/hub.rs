//! Listen party hub
//!
//! One task per session owns every piece of session state and applies
//! commands from its queue strictly in order. Connection handlers never touch
//! the session directly: they send a [`HubCommand`] through a [`HubHandle`]
//! and forward whatever arrives on their outbound channel to the socket.
//!
//! Lifecycle: `Active` while the host is connected or has never left,
//! `Ending` once the host connection drops (a reconnect within the grace
//! period returns to `Active`), and terminal once the task exits. A session
//! that is not in the registry is idle. A host that never opens its first
//! connection within the grace period, or a session older than its TTL, also
//! ends the session.

use crate::config::PartySettings;
use crate::error::{Result, ServerError};
use crate::services::catalog::TrackCatalog;
use chrono::{DateTime, Utc};
use orb_core::protocol::{
    validate_nickname, ClientMessage, EndReason, ErrorCode, Participant, PlaybackState, Role,
    ServerMessage,
};
use orb_core::{GuestToken, ParticipantId, SessionId, TrackId, TrackInfo, UserId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Commands queued per session before senders wait
const COMMAND_CAPACITY: usize = 256;

/// Upper bound on a catalog lookup while resolving the host's track
const TRACK_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-connection queue of messages for the socket writer
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Identifies one host connection, so a stale disconnect cannot detach a
/// host that has already reconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// Who sent an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Host(ConnectionId),
    Guest(ParticipantId),
}

/// Credentials handed to a guest that joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestTicket {
    pub participant_id: ParticipantId,
    pub guest_token: GuestToken,
}

/// Public session summary
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub host_name: String,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
    pub host_connected: bool,
}

#[derive(Debug)]
pub enum HubCommand {
    AttachHost {
        outbound: Outbound,
        reply: oneshot::Sender<ConnectionId>,
    },
    DetachHost {
        connection: ConnectionId,
    },
    Join {
        nickname: String,
        outbound: Outbound,
        reply: oneshot::Sender<Result<GuestTicket>>,
    },
    Inbound {
        origin: Origin,
        message: ClientMessage,
    },
    Leave {
        participant_id: ParticipantId,
    },
    End {
        reason: EndReason,
    },
    ValidateToken {
        token: GuestToken,
        reply: oneshot::Sender<Option<ParticipantId>>,
    },
    Info {
        reply: oneshot::Sender<SessionInfo>,
    },
}

/// Handle to a running session
#[derive(Debug, Clone)]
pub struct HubHandle {
    session_id: SessionId,
    host_id: UserId,
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Start the session task
    ///
    /// `on_close` runs inside the task right before guests are told the
    /// session ended.
    pub(crate) fn spawn(
        host_id: UserId,
        host_name: String,
        settings: PartySettings,
        catalog: Arc<dyn TrackCatalog>,
        on_close: Box<dyn FnOnce(&SessionId) + Send>,
    ) -> (Self, JoinHandle<()>) {
        let session_id = SessionId::generate();
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let now = Instant::now();
        let unclaimed_until = now.checked_add(Duration::from_secs(settings.host_grace_secs));
        let expires_at = now.checked_add(Duration::from_secs(settings.session_ttl_secs));

        let hub = Hub {
            session_id: session_id.clone(),
            host_name,
            created_at: Utc::now(),
            settings,
            catalog,
            ending_at: None,
            unclaimed_until,
            expires_at,
            host: None,
            next_connection: 0,
            guests: Vec::new(),
            tokens: HashMap::new(),
            state: PlaybackState::default(),
            last_track: None,
        };
        let task = tokio::spawn(hub.run(rx, on_close));

        let handle = Self {
            session_id,
            host_id,
            commands,
        };
        (handle, task)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn host_id(&self) -> &UserId {
        &self.host_id
    }

    pub fn is_host(&self, user_id: &UserId) -> bool {
        &self.host_id == user_id
    }

    /// Whether the session task has exited
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Register the host's connection; the host receives `joined` and the roster
    pub async fn attach_host(&self, user_id: &UserId, outbound: Outbound) -> Result<ConnectionId> {
        if !self.is_host(user_id) {
            return Err(ServerError::Forbidden("Not the session host".to_string()));
        }
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::AttachHost { outbound, reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    /// Host connection lost; starts the grace period
    pub async fn detach_host(&self, connection: ConnectionId) {
        // Session may already be over
        let _ = self.send(HubCommand::DetachHost { connection }).await;
    }

    /// Add a guest; the guest receives `joined` and everyone gets the new roster
    pub async fn join(&self, nickname: &str, outbound: Outbound) -> Result<GuestTicket> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Join {
            nickname: nickname.to_string(),
            outbound,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.gone())?
    }

    /// Forward a message received on a connection
    pub async fn inbound(&self, origin: Origin, message: ClientMessage) -> Result<()> {
        self.send(HubCommand::Inbound { origin, message }).await
    }

    /// Guest left or its connection dropped
    pub async fn leave(&self, participant_id: ParticipantId) {
        let _ = self.send(HubCommand::Leave { participant_id }).await;
    }

    pub async fn end(&self, reason: EndReason) -> Result<()> {
        self.send(HubCommand::End { reason }).await
    }

    /// Participant owning `token`, if it is still valid
    pub async fn validate_token(&self, token: &GuestToken) -> Result<Option<ParticipantId>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ValidateToken {
            token: token.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.gone())
    }

    pub async fn info(&self) -> Result<SessionInfo> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Info { reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    async fn send(&self, command: HubCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| self.gone())
    }

    fn gone(&self) -> ServerError {
        ServerError::NotFound(format!("Session {}", self.session_id))
    }
}

struct HostConnection {
    id: ConnectionId,
    outbound: Outbound,
}

struct Guest {
    participant: Participant,
    token: GuestToken,
    outbound: Outbound,
    last_seen_at: DateTime<Utc>,
}

/// Session state, owned by the session task
struct Hub {
    session_id: SessionId,
    host_name: String,
    created_at: DateTime<Utc>,
    settings: PartySettings,
    catalog: Arc<dyn TrackCatalog>,
    /// Set while the host is away
    ending_at: Option<Instant>,
    /// Set until the host opens its first connection
    unclaimed_until: Option<Instant>,
    expires_at: Option<Instant>,
    host: Option<HostConnection>,
    next_connection: u64,
    /// In join order
    guests: Vec<Guest>,
    tokens: HashMap<GuestToken, ParticipantId>,
    state: PlaybackState,
    /// Last resolved track, so heartbeats do not hit the catalog
    last_track: Option<TrackInfo>,
}

impl Hub {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<HubCommand>,
        on_close: Box<dyn FnOnce(&SessionId) + Send>,
    ) {
        info!(session_id = %self.session_id, host = %self.host_name, "Listen party started");

        let reason = loop {
            let deadline = self.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Some(reason) = self.handle(command).await {
                            break reason;
                        }
                    }
                    None => break EndReason::HostEnded,
                },
                kind = deadline_elapsed(deadline) => break self.expire(kind),
            }
        };

        commands.close();
        on_close(&self.session_id);
        self.shutdown(reason);
    }

    /// Earliest pending deadline, if any
    fn next_deadline(&self) -> Option<(Instant, Deadline)> {
        [
            (self.ending_at, Deadline::HostGrace),
            (self.unclaimed_until, Deadline::Unclaimed),
            (self.expires_at, Deadline::Lifetime),
        ]
        .into_iter()
        .filter_map(|(at, kind)| at.map(|at| (at, kind)))
        .min_by_key(|(at, _)| *at)
    }

    fn expire(&self, kind: Deadline) -> EndReason {
        match kind {
            Deadline::HostGrace => {
                warn!(
                    session_id = %self.session_id,
                    grace_secs = self.settings.host_grace_secs,
                    "Host did not reconnect in time"
                );
                EndReason::HostDisconnected
            }
            Deadline::Unclaimed => {
                warn!(
                    session_id = %self.session_id,
                    grace_secs = self.settings.host_grace_secs,
                    "Host never connected"
                );
                EndReason::HostDisconnected
            }
            Deadline::Lifetime => {
                info!(
                    session_id = %self.session_id,
                    ttl_secs = self.settings.session_ttl_secs,
                    "Session reached its maximum lifetime"
                );
                EndReason::Expired
            }
        }
    }

    async fn handle(&mut self, command: HubCommand) -> Option<EndReason> {
        match command {
            HubCommand::AttachHost { outbound, reply } => {
                let id = self.attach_host(outbound);
                let _ = reply.send(id);
            }
            HubCommand::DetachHost { connection } => self.detach_host(connection),
            HubCommand::Join {
                nickname,
                outbound,
                reply,
            } => {
                let result = self.join(&nickname, outbound);
                let joined = result.is_ok();
                let _ = reply.send(result);
                if joined {
                    self.broadcast_roster();
                }
            }
            HubCommand::Inbound { origin, message } => {
                return self.inbound(origin, message).await;
            }
            HubCommand::Leave { participant_id } => {
                if self.remove_guest(&participant_id).is_some() {
                    info!(session_id = %self.session_id, participant_id = %participant_id, "Guest left");
                    self.broadcast_roster();
                }
            }
            HubCommand::End { reason } => return Some(reason),
            HubCommand::ValidateToken { token, reply } => {
                let _ = reply.send(self.tokens.get(&token).cloned());
            }
            HubCommand::Info { reply } => {
                let _ = reply.send(SessionInfo {
                    session_id: self.session_id.clone(),
                    host_name: self.host_name.clone(),
                    participant_count: self.guests.len(),
                    created_at: self.created_at,
                    host_connected: self.host.is_some(),
                });
            }
        }
        None
    }

    fn attach_host(&mut self, outbound: Outbound) -> ConnectionId {
        self.next_connection += 1;
        let id = ConnectionId(self.next_connection);

        self.unclaimed_until = None;
        if self.ending_at.take().is_some() {
            info!(session_id = %self.session_id, "Host reconnected within grace period");
        }
        if self.host.is_some() {
            debug!(session_id = %self.session_id, "Replacing previous host connection");
        }

        deliver(
            &outbound,
            ServerMessage::Joined {
                role: Role::Host,
                session_id: self.session_id.clone(),
                participant_id: None,
                guest_token: None,
                state: self.snapshot(now_ms()),
            },
        );
        deliver(&outbound, self.roster_message());

        self.host = Some(HostConnection { id, outbound });
        id
    }

    fn detach_host(&mut self, connection: ConnectionId) {
        if self.host.as_ref().map(|h| h.id) != Some(connection) {
            debug!(session_id = %self.session_id, "Ignoring detach of a replaced host connection");
            return;
        }
        self.host = None;
        let grace = Duration::from_secs(self.settings.host_grace_secs);
        self.ending_at = Some(Instant::now() + grace);
        info!(
            session_id = %self.session_id,
            grace_secs = grace.as_secs(),
            "Host disconnected, waiting for reconnect"
        );
    }

    fn join(&mut self, nickname: &str, outbound: Outbound) -> Result<GuestTicket> {
        if self.ending_at.is_some() {
            return Err(ServerError::NotFound(format!(
                "Session {} is ending",
                self.session_id
            )));
        }
        let nickname = validate_nickname(nickname)?;
        if self.guests.len() >= self.settings.max_participants {
            warn!(
                session_id = %self.session_id,
                limit = self.settings.max_participants,
                "Join rejected, session full"
            );
            return Err(ServerError::SessionCapacityExceeded {
                limit: self.settings.max_participants,
            });
        }

        let now = Utc::now();
        let ticket = GuestTicket {
            participant_id: ParticipantId::generate(),
            guest_token: GuestToken::generate(),
        };

        deliver(
            &outbound,
            ServerMessage::Joined {
                role: Role::Guest,
                session_id: self.session_id.clone(),
                participant_id: Some(ticket.participant_id.clone()),
                guest_token: Some(ticket.guest_token.clone()),
                state: self.snapshot(now.timestamp_millis()),
            },
        );

        info!(
            session_id = %self.session_id,
            participant_id = %ticket.participant_id,
            nickname = %nickname,
            "Guest joined"
        );

        self.tokens
            .insert(ticket.guest_token.clone(), ticket.participant_id.clone());
        self.guests.push(Guest {
            participant: Participant {
                id: ticket.participant_id.clone(),
                nickname,
                joined_at: now,
            },
            token: ticket.guest_token.clone(),
            outbound,
            last_seen_at: now,
        });

        Ok(ticket)
    }

    async fn inbound(&mut self, origin: Origin, message: ClientMessage) -> Option<EndReason> {
        let reply_to = match &origin {
            Origin::Host(id) => match &self.host {
                Some(host) if host.id == *id => host.outbound.clone(),
                _ => {
                    debug!(session_id = %self.session_id, "Dropping message from replaced host connection");
                    return None;
                }
            },
            Origin::Guest(participant_id) => {
                let Some(guest) = self
                    .guests
                    .iter_mut()
                    .find(|g| &g.participant.id == participant_id)
                else {
                    debug!(session_id = %self.session_id, participant_id = %participant_id, "Dropping message from departed guest");
                    return None;
                };
                guest.last_seen_at = Utc::now();
                if message.requires_host() {
                    warn!(
                        session_id = %self.session_id,
                        participant_id = %participant_id,
                        attempted = ?message,
                        "Guest tried to control the session"
                    );
                    deliver(
                        &guest.outbound,
                        ServerMessage::Error {
                            code: ErrorCode::Forbidden,
                            message: "only the host controls playback".to_string(),
                        },
                    );
                    return None;
                }
                guest.outbound.clone()
            }
        };

        match message {
            ClientMessage::Ping => deliver(&reply_to, ServerMessage::Pong),
            ClientMessage::Join { .. } => deliver(
                &reply_to,
                ServerMessage::Error {
                    code: ErrorCode::InvalidMessage,
                    message: "already joined".to_string(),
                },
            ),
            ClientMessage::StateUpdate {
                track_id,
                position_ms,
                playing,
            } => {
                let track = match self.resolve_track(track_id.as_ref()).await {
                    Ok(track) => track,
                    Err(err) => {
                        warn!(session_id = %self.session_id, error = %err, "Rejected host state update");
                        deliver(
                            &reply_to,
                            ServerMessage::Error {
                                code: err.error_code(),
                                message: err.to_string(),
                            },
                        );
                        return None;
                    }
                };
                self.set_state(track, position_ms, playing);
            }
            ClientMessage::Play => {
                let now = now_ms();
                self.set_state(self.state.track.clone(), self.position_at(now), true);
            }
            ClientMessage::Pause => {
                let now = now_ms();
                self.set_state(self.state.track.clone(), self.position_at(now), false);
            }
            ClientMessage::Seek { position_ms } => {
                self.set_state(self.state.track.clone(), position_ms, self.state.playing);
            }
            ClientMessage::Kick { participant_id } => self.kick(&participant_id, &reply_to),
            ClientMessage::End => return Some(EndReason::HostEnded),
        }
        None
    }

    /// Resolve the host's track, reusing the last lookup when it has not changed
    async fn resolve_track(&mut self, track_id: Option<&TrackId>) -> Result<Option<TrackInfo>> {
        let Some(track_id) = track_id else {
            return Ok(None);
        };
        if let Some(track) = self.last_track.as_ref().filter(|t| &t.id == track_id) {
            return Ok(Some(track.clone()));
        }

        let lookup = tokio::time::timeout(
            TRACK_LOOKUP_TIMEOUT,
            self.catalog.get_track_by_id(track_id),
        )
        .await
        .map_err(|_| ServerError::Internal("Track lookup timed out".to_string()))??;

        let info = lookup
            .ok_or_else(|| ServerError::NotFound(format!("Track {}", track_id)))?
            .info();
        self.last_track = Some(info.clone());
        Ok(Some(info))
    }

    fn set_state(&mut self, track: Option<TrackInfo>, position_ms: u64, playing: bool) {
        let position_ms = clamp_to_track(track.as_ref(), position_ms);
        self.state = PlaybackState {
            track,
            position_ms,
            playing,
            updated_at_ms: now_ms(),
        };
        debug!(
            session_id = %self.session_id,
            position_ms,
            playing,
            "Host state updated"
        );

        let message = ServerMessage::StateUpdate {
            state: self.state.clone(),
        };
        for guest in &self.guests {
            deliver(&guest.outbound, message.clone());
        }
    }

    fn kick(&mut self, participant_id: &ParticipantId, host: &Outbound) {
        let Some(guest) = self.remove_guest(participant_id) else {
            deliver(
                host,
                ServerMessage::Error {
                    code: ErrorCode::NotFound,
                    message: format!("no participant {}", participant_id),
                },
            );
            return;
        };

        info!(session_id = %self.session_id, participant_id = %participant_id, "Guest kicked");
        // Dropping the guest's sender closes its connection once `kicked` is flushed
        deliver(&guest.outbound, ServerMessage::Kicked);
        drop(guest);
        self.broadcast_roster();
    }

    fn remove_guest(&mut self, participant_id: &ParticipantId) -> Option<Guest> {
        let index = self
            .guests
            .iter()
            .position(|g| &g.participant.id == participant_id)?;
        let guest = self.guests.remove(index);
        self.tokens.remove(&guest.token);
        debug!(
            participant_id = %participant_id,
            connected_secs = (Utc::now() - guest.participant.joined_at).num_seconds(),
            idle_secs = (Utc::now() - guest.last_seen_at).num_seconds(),
            "Guest removed"
        );
        Some(guest)
    }

    fn roster_message(&self) -> ServerMessage {
        ServerMessage::RosterUpdate {
            participants: self.guests.iter().map(|g| g.participant.clone()).collect(),
        }
    }

    fn broadcast_roster(&self) {
        let message = self.roster_message();
        if let Some(host) = &self.host {
            deliver(&host.outbound, message.clone());
        }
        for guest in &self.guests {
            deliver(&guest.outbound, message.clone());
        }
    }

    /// Host position at `now`, extrapolated while playing
    fn position_at(&self, now: i64) -> u64 {
        let state = &self.state;
        let mut position = state.position_ms;
        if state.playing && state.updated_at_ms > 0 {
            let elapsed = u64::try_from(now.saturating_sub(state.updated_at_ms)).unwrap_or(0);
            position = position.saturating_add(elapsed);
        }
        clamp_to_track(state.track.as_ref(), position)
    }

    /// Current state as of `now`, for late joiners
    fn snapshot(&self, now: i64) -> PlaybackState {
        if self.state.updated_at_ms == 0 {
            return self.state.clone();
        }
        PlaybackState {
            track: self.state.track.clone(),
            position_ms: self.position_at(now),
            playing: self.state.playing,
            updated_at_ms: now,
        }
    }

    fn shutdown(mut self, reason: EndReason) {
        info!(
            session_id = %self.session_id,
            reason = ?reason,
            guests = self.guests.len(),
            "Listen party ended"
        );

        self.tokens.clear();
        let message = ServerMessage::Ended { reason };
        for guest in self.guests.drain(..) {
            deliver(&guest.outbound, message.clone());
        }
        if let Some(host) = self.host.take() {
            deliver(&host.outbound, message);
        }
    }
}

/// Timers that end a session without a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    HostGrace,
    Unclaimed,
    Lifetime,
}

async fn deadline_elapsed(deadline: Option<(Instant, Deadline)>) -> Deadline {
    match deadline {
        Some((at, kind)) => {
            sleep_until(at).await;
            kind
        }
        None => std::future::pending().await,
    }
}

/// Positions past the end of a known track are pinned to its duration
fn clamp_to_track(track: Option<&TrackInfo>, position_ms: u64) -> u64 {
    match track.map(|t| t.duration_ms) {
        Some(duration) if duration > 0 => position_ms.min(duration),
        _ => position_ms,
    }
}

/// Queue a message without waiting; a full queue drops it for this connection only
fn deliver(outbound: &Outbound, message: ServerMessage) {
    match outbound.try_send(message) {
        Ok(()) => {}
        Err(TrySendError::Full(message)) => {
            warn!(kind = kind(&message), "Connection queue full, dropping message");
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Connection already closed");
        }
    }
}

fn kind(message: &ServerMessage) -> &'static str {
    match message {
        ServerMessage::Joined { .. } => "joined",
        ServerMessage::RosterUpdate { .. } => "roster_update",
        ServerMessage::StateUpdate { .. } => "state_update",
        ServerMessage::Kicked => "kicked",
        ServerMessage::Ended { .. } => "ended",
        ServerMessage::Error { .. } => "error",
        ServerMessage::Pong => "pong",
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
