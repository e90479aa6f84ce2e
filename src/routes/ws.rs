//! WebSocket handler: per-connection event relay.
//!
//! DESIGN
//! ======
//! On upgrade, assigns a client ID and enters a `select!` loop:
//! - Incoming client events -> parse + dispatch by event kind
//! - Relayed events from room peers -> forward to client
//!
//! Handlers validate and return an `Outcome`. The dispatch layer owns all
//! outbound concerns: reply to sender and relay to peers. The relay never
//! echoes an event back to its sender and never looks inside a shape.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade -> send `connected` with `client_id` and `user_id`
//! 2. `join` -> part any previous board, join the room, relay `peer_joined`
//! 3. Board events -> membership and edit checks -> relay to peers
//! 4. Close -> relay `peer_left` -> part the room

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use frames::{ANONYMOUS, BoardId, ClientEvent, E_FORBIDDEN, ErrorCode, ServerEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::room::{RoomError, RoomHandle};
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send events directly.
#[derive(Debug)]
enum Outcome {
    /// Send to the sender only.
    Reply(ServerEvent),
    /// Send to every room peer except the sender.
    Relay(ServerEvent),
    /// Reply to the sender with one event, relay a different one to peers.
    ReplyAndRelay { reply: ServerEvent, relay: ServerEvent },
    /// Nothing to send.
    Silent,
}

#[derive(Debug, thiserror::Error)]
enum WsError {
    #[error("invalid event: {0}")]
    InvalidFrame(String),
    #[error("not joined to board {0}")]
    NotJoined(BoardId),
    #[error("not allowed to edit board {0}")]
    Forbidden(BoardId),
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl ErrorCode for WsError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidFrame(_) => "E_INVALID_FRAME",
            Self::NotJoined(_) => "E_NOT_JOINED",
            Self::Forbidden(_) => E_FORBIDDEN,
            Self::Room(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Room(e) => e.retryable(),
            _ => false,
        }
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Per-socket state owned by the connection task.
struct Connection {
    client_id: Uuid,
    user_id: Uuid,
    username: String,
    /// Queue the room fans out into; drained by the `select!` loop.
    tx: mpsc::Sender<ServerEvent>,
    room: Option<RoomHandle>,
}

impl Connection {
    fn new(user_id: Uuid, username: String, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { client_id: Uuid::new_v4(), user_id, username, tx, room: None }
    }

    fn board_id(&self) -> Option<&str> {
        self.room.as_ref().map(RoomHandle::board_id)
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

/// Identity supplied by the auth layer in front of the relay.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match params.user_id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Uuid::new_v4(),
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => id,
            Err(_) => return (StatusCode::BAD_REQUEST, "invalid user_id").into_response(),
        },
    };
    let username = params
        .username
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_owned();

    ws.on_upgrade(move |socket| run_ws(socket, state, user_id, username))
}

async fn run_ws(mut socket: WebSocket, state: AppState, user_id: Uuid, username: String) {
    let (client_tx, mut client_rx) = mpsc::channel::<ServerEvent>(state.config.client_queue_capacity);
    let mut conn = Connection::new(user_id, username, client_tx);
    let client_id = conn.client_id;

    if send_event(&mut socket, &ServerEvent::Connected { client_id, user_id }).await.is_err() {
        return;
    }
    info!(%client_id, %user_id, username = %conn.username, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut conn, &text).await;
                        if send_all(&mut socket, &replies).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = client_rx.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    leave_room(&state, &mut conn).await;
    let rooms = state.rooms.len().await;
    info!(%client_id, rooms, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse and process one inbound text message and return events for the
/// sender. Relays to peers happen here too, so tests can drive dispatch
/// without a socket.
async fn process_inbound_text(state: &AppState, conn: &mut Connection, text: &str) -> Vec<ServerEvent> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(client_id = %conn.client_id, error = %e, "ws: invalid inbound event");
            return vec![ServerEvent::error_from(&WsError::InvalidFrame(e.to_string()))];
        }
    };

    if matches!(event, ClientEvent::CursorMove { .. } | ClientEvent::DrawingMove { .. }) {
        debug!(client_id = %conn.client_id, event = event.name(), "ws: recv event");
    } else {
        info!(client_id = %conn.client_id, event = event.name(), board_id = event.board_id(), "ws: recv event");
    }

    let result = match event {
        ClientEvent::Join { board_id } => handle_join(state, conn, board_id).await,
        other => handle_board_event(state, conn, other),
    };

    match result {
        Ok(outcome) => apply_outcome(conn, outcome).await,
        Err(e) => {
            warn!(client_id = %conn.client_id, code = e.error_code(), error = %e, "ws: event rejected");
            vec![ServerEvent::error_from(&e)]
        }
    }
}

async fn apply_outcome(conn: &Connection, outcome: Outcome) -> Vec<ServerEvent> {
    match outcome {
        Outcome::Reply(reply) => vec![reply],
        Outcome::Relay(event) => {
            relay(conn, event).await;
            Vec::new()
        }
        Outcome::ReplyAndRelay { reply, relay: event } => {
            relay(conn, event).await;
            vec![reply]
        }
        Outcome::Silent => Vec::new(),
    }
}

async fn relay(conn: &Connection, event: ServerEvent) {
    let Some(room) = &conn.room else { return };
    if let Err(e) = room.relay(conn.client_id, event).await {
        warn!(client_id = %conn.client_id, error = %e, "ws: relay failed");
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn handle_join(state: &AppState, conn: &mut Connection, board_id: BoardId) -> Result<Outcome, WsError> {
    if board_id.trim().is_empty() {
        return Err(WsError::InvalidFrame("board_id must not be empty".into()));
    }
    let already_joined = conn.board_id() == Some(board_id.as_str());
    if !already_joined {
        leave_room(state, conn).await;
    }

    let (room, members) = state
        .rooms
        .join(&board_id, conn.client_id, conn.tx.clone())
        .await?;
    conn.room = Some(room);

    let joined = ServerEvent::Joined { board_id, client_id: conn.client_id, members };
    if already_joined {
        return Ok(Outcome::Reply(joined));
    }
    let peer = ServerEvent::PeerJoined {
        client_id: conn.client_id,
        user_id: conn.user_id,
        username: conn.username.clone(),
    };
    Ok(Outcome::ReplyAndRelay { reply: joined, relay: peer })
}

/// Membership and edit checks, then translate into the relayed form. The
/// sender's identity comes from the connection, not the payload.
fn handle_board_event(state: &AppState, conn: &Connection, event: ClientEvent) -> Result<Outcome, WsError> {
    let board_id = event.board_id();
    if conn.board_id() != Some(board_id) {
        return Err(WsError::NotJoined(board_id.to_owned()));
    }
    if event.is_mutation() && !state.policy.may_edit(board_id, &conn.user_id.to_string()) {
        return Err(WsError::Forbidden(board_id.to_owned()));
    }

    let from = conn.client_id;
    let relayed = match event {
        ClientEvent::DrawStroke { shape, .. } => ServerEvent::ShapeFinalized { from, shape },
        ClientEvent::DrawingMove { shape, .. } => ServerEvent::ShapeInProgress { from, shape },
        ClientEvent::CursorMove { x, y, .. } => ServerEvent::CursorMoved {
            from,
            user_id: conn.user_id.to_string(),
            username: conn.username.clone(),
            x,
            y,
        },
        ClientEvent::EraseShape { shape_id, .. } => ServerEvent::ShapeErased { from, shape_id },
        ClientEvent::ReplaceShape { shape, .. } => ServerEvent::ShapeReplaced { from, shape },
        ClientEvent::Join { .. } => return Ok(Outcome::Silent),
    };
    Ok(Outcome::Relay(relayed))
}

/// Relay `peer_left` while still a member, then part.
async fn leave_room(state: &AppState, conn: &mut Connection) {
    let Some(room) = conn.room.take() else { return };
    let left = ServerEvent::PeerLeft { client_id: conn.client_id, user_id: conn.user_id };
    if let Err(e) = room.relay(conn.client_id, left).await {
        debug!(client_id = %conn.client_id, error = %e, "ws: peer_left not relayed");
    }
    let remaining = state.rooms.part(room.board_id(), conn.client_id).await;
    info!(client_id = %conn.client_id, board_id = room.board_id(), remaining, "ws: left board");
}

// =============================================================================
// SEND
// =============================================================================

async fn send_all(socket: &mut WebSocket, events: &[ServerEvent]) -> Result<(), axum::Error> {
    for event in events {
        send_event(socket, event).await?;
    }
    Ok(())
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            error!(event = event.name(), error = %e, "ws: failed to encode event");
            return Ok(());
        }
    };
    if !event.is_ephemeral() {
        debug!(event = event.name(), "ws: send event");
    }
    socket.send(Message::Text(json.into())).await
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
