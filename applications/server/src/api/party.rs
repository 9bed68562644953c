//! Listen party API
//!
//! REST endpoints create, describe and end sessions. Each WebSocket
//! connection runs two halves: a writer task forwarding the connection's
//! outbound queue to the socket (plus keepalive pings), and the reader below
//! turning frames into hub commands. Neither half touches session state.

use crate::{
    api::{covers, stream},
    error::{Result, ServerError},
    middleware::{bearer_token, AuthenticatedUser},
    party::{GuestTicket, HubHandle, Origin, Outbound, SessionInfo},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode, Uri},
    response::Response,
    Json,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use orb_core::{
    protocol::{ClientMessage, ErrorCode, ServerMessage},
    GuestToken, SessionId, TrackId, UserId,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

/// Limit on a single socket write
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// A connection that sends nothing (not even a pong) for this long is dropped
const PONG_WAIT: Duration = Duration::from_secs(60);

/// Keepalive ping period, comfortably inside `PONG_WAIT`
const PING_PERIOD: Duration = Duration::from_secs(54);

/// A guest must send `join` within this long of connecting
const JOIN_WAIT: Duration = Duration::from_secs(30);

/// Largest inbound frame; every client message fits well inside it
pub const MAX_MESSAGE_SIZE: usize = 4096;

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct GuestQuery {
    #[serde(default)]
    pub guest_token: Option<String>,
    #[serde(default)]
    pub t: Option<u64>,
}

/// POST /api/listen
pub async fn create_session(
    State(app_state): State<AppState>,
    auth: AuthenticatedUser,
) -> (StatusCode, Json<CreatedSession>) {
    let handle = app_state
        .parties
        .create(auth.user_id.clone(), auth.name.clone());

    (
        StatusCode::CREATED,
        Json(CreatedSession {
            session_id: handle.session_id().clone(),
        }),
    )
}

/// GET /api/listen/:session_id
pub async fn session_info(
    Path(session_id): Path<String>,
    State(app_state): State<AppState>,
) -> Result<Json<SessionInfo>> {
    let handle = app_state.parties.get(&SessionId::new(session_id))?;
    Ok(Json(handle.info().await?))
}

/// DELETE /api/listen/:session_id
pub async fn end_session(
    Path(session_id): Path<String>,
    State(app_state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<StatusCode> {
    app_state
        .parties
        .end(&SessionId::new(session_id), auth.user_id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/listen/:session_id/stream/:track_id?guest_token=
pub async fn guest_stream(
    Path((session_id, track_id)): Path<(String, String)>,
    State(app_state): State<AppState>,
    Query(query): Query<GuestQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    authorize_guest(&app_state, session_id, query.guest_token).await?;
    stream::serve_track(&app_state, &TrackId::new(track_id), query.t, &headers).await
}

/// GET /api/listen/:session_id/cover/:album_id?guest_token=
pub async fn guest_cover(
    Path((session_id, album_id)): Path<(String, String)>,
    State(app_state): State<AppState>,
    Query(query): Query<GuestQuery>,
) -> Result<Response> {
    authorize_guest(&app_state, session_id, query.guest_token).await?;
    covers::serve_cover(&app_state, &album_id).await
}

async fn authorize_guest(
    app_state: &AppState,
    session_id: String,
    guest_token: Option<String>,
) -> Result<()> {
    let token = guest_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServerError::Unauthorized("Missing guest token".to_string()))?;

    app_state
        .parties
        .validate_guest_token(&SessionId::new(session_id), &GuestToken::new(token))
        .await
        .map(|_| ())
}

/// Who is on the other end of a socket
enum Peer {
    Host(UserId),
    Guest,
}

/// GET /api/listen/:session_id/ws
///
/// The host authenticates with a bearer header or `?token=`. A connection
/// without a token is a guest and must open with `join`.
pub async fn session_ws(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(app_state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response> {
    let handle = app_state.parties.get(&SessionId::new(session_id))?;

    let peer = match bearer_token(&headers, &uri) {
        Some(token) => {
            let user_id = app_state.auth_service.verify(&token)?.user_id();
            if handle.is_host(&user_id) {
                Peer::Host(user_id)
            } else {
                Peer::Guest
            }
        }
        None => Peer::Guest,
    };

    let (outbound, outbound_rx) = app_state.parties.outbound_channel();
    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .max_frame_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| run_connection(socket, handle, peer, outbound, outbound_rx)))
}

async fn run_connection(
    socket: WebSocket,
    handle: HubHandle,
    peer: Peer,
    outbound: Outbound,
    outbound_rx: mpsc::Receiver<ServerMessage>,
) {
    let session_id = handle.session_id().clone();
    let (sink, mut frames) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, outbound_rx));

    // The hub holds the only strong sender once attached; when it lets go
    // (kick, leave, end) the writer drains and closes the socket
    let local = outbound.downgrade();

    let origin = match peer {
        Peer::Host(user_id) => match handle.attach_host(&user_id, outbound.clone()).await {
            Ok(connection) => Some(Origin::Host(connection)),
            Err(err) => {
                reply_error(&outbound, &err);
                None
            }
        },
        Peer::Guest => await_join(&mut frames, &handle, &outbound)
            .await
            .map(|ticket| Origin::Guest(ticket.participant_id)),
    };
    drop(outbound);

    let Some(origin) = origin else {
        finish_writer(&mut writer).await;
        return;
    };

    tracing::debug!(session_id = %session_id, origin = ?origin, "Party connection open");

    let writer_done = tokio::select! {
        () = read_loop(&mut frames, &handle, &origin, &local) => false,
        _ = &mut writer => true,
    };

    match &origin {
        Origin::Host(connection) => handle.detach_host(*connection).await,
        Origin::Guest(participant_id) => handle.leave(participant_id.clone()).await,
    }
    if !writer_done {
        finish_writer(&mut writer).await;
    }

    tracing::debug!(session_id = %session_id, origin = ?origin, "Party connection closed");
}

/// Wait for the writer to flush, then give up on it
async fn finish_writer(writer: &mut tokio::task::JoinHandle<()>) {
    if timeout(WRITE_WAIT, &mut *writer).await.is_err() {
        writer.abort();
    }
}

/// First frame from a guest must be `join`
async fn await_join(
    frames: &mut SplitStream<WebSocket>,
    handle: &HubHandle,
    outbound: &Outbound,
) -> Option<GuestTicket> {
    let Ok(Some(text)) = timeout(JOIN_WAIT, next_text(frames)).await else {
        tracing::debug!(session_id = %handle.session_id(), "Guest never joined");
        return None;
    };

    let nickname = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Join { nickname }) => nickname,
        _ => {
            reply(
                outbound,
                ErrorCode::InvalidMessage,
                "first message must be join".to_string(),
            );
            return None;
        }
    };

    match handle.join(&nickname, outbound.clone()).await {
        Ok(ticket) => Some(ticket),
        Err(err) => {
            reply_error(outbound, &err);
            None
        }
    }
}

async fn read_loop(
    frames: &mut SplitStream<WebSocket>,
    handle: &HubHandle,
    origin: &Origin,
    local: &mpsc::WeakSender<ServerMessage>,
) {
    while let Some(text) = next_text(frames).await {
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => {
                if handle.inbound(origin.clone(), message).await.is_err() {
                    // Session over
                    return;
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "Unparseable party message");
                if let Some(outbound) = local.upgrade() {
                    reply(&outbound, ErrorCode::InvalidMessage, err.to_string());
                }
            }
        }
    }
}

/// Next text frame, or `None` once the peer is gone or silent past `PONG_WAIT`
async fn next_text(frames: &mut SplitStream<WebSocket>) -> Option<String> {
    loop {
        let frame = match timeout(PONG_WAIT, frames.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => {
                tracing::debug!(error = %err, "WebSocket read failed");
                return None;
            }
            Ok(None) => return None,
            Err(_) => {
                tracing::debug!("WebSocket idle past read deadline");
                return None;
            }
        };

        match frame {
            Message::Text(text) => return Some(text),
            Message::Close(_) => return None,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
) {
    let mut ping = tokio::time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to encode party message");
                        continue;
                    }
                };
                if !send(&mut sink, Message::Text(text)).await {
                    return;
                }
            }
            _ = ping.tick() => {
                if !send(&mut sink, Message::Ping(Vec::new())).await {
                    return;
                }
            }
        }
    }

    let _ = send(&mut sink, Message::Close(None)).await;
}

async fn send(sink: &mut SplitSink<WebSocket, Message>, message: Message) -> bool {
    match timeout(WRITE_WAIT, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "WebSocket write failed");
            false
        }
        Err(_) => {
            tracing::debug!("WebSocket write timed out");
            false
        }
    }
}

fn reply_error(outbound: &Outbound, err: &ServerError) {
    reply(outbound, err.error_code(), err.to_string());
}

fn reply(outbound: &Outbound, code: ErrorCode, message: String) {
    let _ = outbound.try_send(ServerMessage::Error { code, message });
}
