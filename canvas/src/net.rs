//! Session driver: runs a `BoardSession` against the relay or local storage.
//!
//! ARCHITECTURE
//! ============
//! One task per open board. Socket frames, UI `Input`s, and throttle deadlines
//! are serialised onto a single `select!` loop, so the session is only ever
//! touched by that task and needs no locking. After every step the queued
//! effects are executed and a fresh `View` is published on a `watch` channel.
//!
//! RECONNECT
//! =========
//! When the socket fails, peer overlays are purged, held payloads are dropped,
//! and the driver keeps applying local input while it waits out a jittered
//! exponential back-off. Each new connection re-sends `join`. Events missed
//! while offline are not replayed.

#[cfg(test)]
#[path = "net_test.rs"]
mod net_test;

use std::sync::Arc;
use std::time::{Duration, Instant};

use frames::{ClientEvent, Point, ServerEvent, ShapeId, ShapeStore, StoreError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::consts::{GUEST_BOARD_ALIAS, RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY};
use crate::engine::{BoardSession, Effect, Identity, View};
use crate::input::{Style, Tool};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    #[error("server refused the connection: HTTP {0}")]
    Rejected(u16),
    #[error("websocket send failed: {0}")]
    Send(Box<tungstenite::Error>),
    #[error("event encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where and as whom to open a board.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP base URL of the relay, e.g. `http://127.0.0.1:3000`.
    pub server_url: String,
    pub user_id: Uuid,
    pub username: String,
    pub board_id: String,
    pub may_edit: bool,
}

/// One UI action, fed to the driver over an mpsc channel.
#[derive(Debug)]
pub enum Input {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp,
    SetTool(Tool),
    SetStyle(Style),
    Erase(ShapeId),
    EditText { id: ShapeId, text: String },
    MoveShape { id: ShapeId, dx: f64, dy: f64 },
    Undo,
    Redo,
    /// Write the committed list to the store and report the outcome.
    Save(oneshot::Sender<Result<(), StoreError>>),
    /// Close the board and stop the driver.
    Quit,
}

/// Whether a board id opens the local-only guest board.
#[must_use]
pub fn is_guest_board(board_id: Option<&str>) -> bool {
    board_id.is_none_or(|id| id.is_empty() || id == GUEST_BOARD_ALIAS)
}

/// Websocket endpoint for `server_url`, carrying the caller's identity.
pub fn ws_url(server_url: &str, user_id: Uuid, username: &str) -> Result<String, NetError> {
    let mut url = reqwest::Url::parse(server_url).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(NetError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| NetError::InvalidUrl(server_url.to_owned()))?;
    url.set_path("/api/ws");
    url.query_pairs_mut()
        .clear()
        .append_pair("user_id", &user_id.to_string())
        .append_pair("username", username);
    Ok(url.into())
}

/// Delay before reconnect attempt `attempt` (zero-based): doubling from the
/// base, capped, plus up to half the base as jitter.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
    let delay = RECONNECT_BASE_DELAY.saturating_mul(factor).min(RECONNECT_MAX_DELAY);
    let jitter_cap = u64::try_from(RECONNECT_BASE_DELAY.as_millis() / 2).unwrap_or(0);
    delay + Duration::from_millis(rand::rng().random_range(0..=jitter_cap))
}

/// HTTP status of a handshake the server answered with a client error.
fn refused_status(err: &tungstenite::Error) -> Option<u16> {
    match err {
        tungstenite::Error::Http(response) if response.status().is_client_error() => Some(response.status().as_u16()),
        _ => None,
    }
}

enum Step {
    /// Input channel closed or `Quit` received.
    Closed,
    /// Socket failed or the server closed it.
    Disconnected,
}

// =============================================================================
// ONLINE
// =============================================================================

/// Run an online board until the input channel closes or `Quit` arrives.
pub async fn run_session(
    config: SessionConfig,
    store: Arc<dyn ShapeStore>,
    mut inputs: mpsc::Receiver<Input>,
    view: watch::Sender<View>,
) -> Result<(), NetError> {
    let url = ws_url(&config.server_url, config.user_id, &config.username)?;
    let shapes = store.load(&config.board_id).await?;
    info!(board_id = %config.board_id, shapes = shapes.len(), "board loaded");

    let identity = Identity {
        board_id: config.board_id.clone(),
        user_id: config.user_id.to_string(),
        username: config.username.clone(),
    };
    let mut session = BoardSession::online(identity, shapes, config.may_edit);
    publish(&view, &session);

    let mut attempt = 0u32;
    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                attempt = 0;
                info!(board_id = %config.board_id, "connected");
                let (sink, source) = socket.split();
                if let Step::Closed = pump(&mut session, sink, source, &mut inputs, &view, store.as_ref()).await {
                    return Ok(());
                }
                session.on_disconnected();
                publish(&view, &session);
            }
            Err(e) => {
                if let Some(status) = refused_status(&e) {
                    warn!(board_id = %config.board_id, status, "connection refused by server");
                    return Err(NetError::Rejected(status));
                }
                warn!(board_id = %config.board_id, error = %e, attempt, "connect failed");
            }
        }

        let delay = backoff_delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(?delay, attempt, "reconnecting after delay");
        if let Step::Closed = offline(&mut session, delay, &mut inputs, &view, store.as_ref()).await {
            return Ok(());
        }
    }
}

async fn pump(
    session: &mut BoardSession,
    mut sink: WsSink,
    mut source: WsSource,
    inputs: &mut mpsc::Receiver<Input>,
    view: &watch::Sender<View>,
    store: &dyn ShapeStore,
) -> Step {
    if let Some(join) = session.join_event()
        && let Err(e) = send_event(&mut sink, &join).await
    {
        warn!(error = %e, "join failed");
        return Step::Disconnected;
    }

    loop {
        let wake = session.next_deadline();
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                    Ok(event) => {
                        if !event.is_ephemeral() {
                            debug!(event = event.name(), "server event");
                        }
                        session.apply_remote(event);
                    }
                    Err(e) => warn!(error = %e, "undecodable server event"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("server closed the connection");
                    return Step::Disconnected;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    return Step::Disconnected;
                }
            },
            input = inputs.recv() => {
                let Some(input) = input else {
                    close(&mut sink).await;
                    return Step::Closed;
                };
                if let Input::Quit = input {
                    close(&mut sink).await;
                    return Step::Closed;
                }
                handle_input(session, input, store).await;
            }
            () = sleep_until(wake), if wake.is_some() => session.poll(Instant::now()),
        }

        if let Err(e) = run_effects(session, Some(&mut sink), store).await {
            warn!(error = %e, "websocket write failed");
            return Step::Disconnected;
        }
        publish(view, session);
    }
}

/// Keep serving local input while no socket is available.
async fn offline(
    session: &mut BoardSession,
    delay: Duration,
    inputs: &mut mpsc::Receiver<Input>,
    view: &watch::Sender<View>,
    store: &dyn ShapeStore,
) -> Step {
    let retry = tokio::time::sleep(delay);
    tokio::pin!(retry);
    loop {
        tokio::select! {
            () = &mut retry => return Step::Disconnected,
            input = inputs.recv() => match input {
                None | Some(Input::Quit) => return Step::Closed,
                Some(input) => handle_input(session, input, store).await,
            },
        }
        if let Err(e) = run_effects(session, None, store).await {
            warn!(error = %e, "effect failed while offline");
        }
        publish(view, session);
    }
}

// =============================================================================
// GUEST
// =============================================================================

/// Run the local-only guest board. Never opens a socket.
pub async fn run_guest(
    store: Arc<dyn ShapeStore>,
    mut inputs: mpsc::Receiver<Input>,
    view: watch::Sender<View>,
) -> Result<(), NetError> {
    let shapes = store.load(GUEST_BOARD_ALIAS).await?;
    info!(shapes = shapes.len(), "guest board loaded");
    let mut session = BoardSession::guest(shapes);
    publish(&view, &session);

    loop {
        let wake = session.next_deadline();
        tokio::select! {
            input = inputs.recv() => match input {
                None | Some(Input::Quit) => return Ok(()),
                Some(input) => handle_input(&mut session, input, store.as_ref()).await,
            },
            () = sleep_until(wake), if wake.is_some() => session.poll(Instant::now()),
        }
        run_effects(&mut session, None, store.as_ref()).await?;
        publish(&view, &session);
    }
}

// =============================================================================
// SHARED
// =============================================================================

async fn handle_input(session: &mut BoardSession, input: Input, store: &dyn ShapeStore) {
    let now = Instant::now();
    match input {
        Input::PointerDown(point) => session.pointer_down(point, now),
        Input::PointerMove(point) => session.pointer_move(point, now),
        Input::PointerUp => session.pointer_up(now),
        Input::SetTool(tool) => session.set_tool(tool),
        Input::SetStyle(style) => session.set_style(style),
        Input::Erase(id) => {
            session.erase(&id);
        }
        Input::EditText { id, text } => {
            session.edit_text(&id, &text);
        }
        Input::MoveShape { id, dx, dy } => {
            session.move_shape(&id, dx, dy);
        }
        Input::Undo => {
            session.undo();
        }
        Input::Redo => {
            session.redo();
        }
        Input::Save(reply) => {
            let board_id = session.board_id().unwrap_or(GUEST_BOARD_ALIAS).to_owned();
            let result = store.save(&board_id, session.committed()).await;
            match &result {
                Ok(()) => info!(%board_id, shapes = session.committed().len(), "board saved"),
                Err(e) => warn!(%board_id, error = %e, "board save failed"),
            }
            if reply.send(result).is_err() {
                debug!(%board_id, "save caller went away");
            }
        }
        Input::Quit => {}
    }
}

/// Execute queued effects. Errors only for socket writes; a failed local
/// persist is logged and the session carries on.
async fn run_effects(
    session: &mut BoardSession,
    mut sink: Option<&mut WsSink>,
    store: &dyn ShapeStore,
) -> Result<(), NetError> {
    for effect in session.drain_effects() {
        match effect {
            Effect::Send(event) => match sink.as_deref_mut() {
                Some(sink) => send_event(sink, &event).await?,
                None => debug!(event = event.name(), "offline; event dropped"),
            },
            Effect::PersistLocal(shapes) => {
                if let Err(e) = store.save(GUEST_BOARD_ALIAS, &shapes).await {
                    warn!(error = %e, "local persist failed");
                }
            }
        }
    }
    Ok(())
}

async fn send_event(sink: &mut WsSink, event: &ClientEvent) -> Result<(), NetError> {
    let text = serde_json::to_string(event)?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| NetError::Send(Box::new(e)))
}

async fn close(sink: &mut WsSink) {
    if let Err(e) = sink.close().await {
        debug!(error = %e, "websocket close failed");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

fn publish(view: &watch::Sender<View>, session: &BoardSession) {
    view.send_replace(session.view());
}
