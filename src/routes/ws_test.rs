use super::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use canvas::engine::{BoardSession, Effect, Identity};
use frames::{Geometry, Point, Shape, ShapeId};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite;

use crate::services::access::{Role, RoleTable};
use crate::state::test_helpers;

// =============================================================================
// Helpers
// =============================================================================

fn connection(name: &str) -> (Connection, mpsc::Receiver<ServerEvent>) {
    let (tx, rx) = mpsc::channel(64);
    (Connection::new(Uuid::new_v4(), name.into(), tx), rx)
}

fn text(event: &ClientEvent) -> String {
    serde_json::to_string(event).unwrap()
}

fn join(board_id: &str) -> String {
    text(&ClientEvent::Join { board_id: board_id.into() })
}

fn rect(id: &str) -> Shape {
    Shape {
        id: ShapeId::from(id),
        stroke: "#000000".into(),
        stroke_width: 2.0,
        fill: None,
        geometry: Geometry::Rect { x: 1.0, y: 1.0, width: 4.0, height: 4.0 },
    }
}

fn stroke(board_id: &str, id: &str) -> String {
    text(&ClientEvent::DrawStroke { board_id: board_id.into(), shape: rect(id) })
}

fn error_code(events: &[ServerEvent]) -> Option<&str> {
    events.iter().find_map(|event| match event {
        ServerEvent::Error { code, .. } => Some(code.as_str()),
        _ => None,
    })
}

async fn recv_relayed(rx: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("relay receive timed out")
        .expect("relay channel closed unexpectedly")
}

async fn assert_no_relay(rx: &mut mpsc::Receiver<ServerEvent>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no relayed event"
    );
}

/// Two connections joined to `b1`, with `a`'s `peer_joined` notice drained.
async fn joined_pair(
    state: &AppState,
) -> ((Connection, mpsc::Receiver<ServerEvent>), (Connection, mpsc::Receiver<ServerEvent>)) {
    let (mut a, mut a_rx) = connection("alice");
    let (mut b, b_rx) = connection("bob");
    process_inbound_text(state, &mut a, &join("b1")).await;
    process_inbound_text(state, &mut b, &join("b1")).await;
    assert!(matches!(recv_relayed(&mut a_rx).await, ServerEvent::PeerJoined { .. }));
    ((a, a_rx), (b, b_rx))
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn invalid_json_is_rejected() {
    let state = test_helpers::test_app_state();
    let (mut conn, _rx) = connection("alice");
    let replies = process_inbound_text(&state, &mut conn, "{not json").await;
    assert_eq!(error_code(&replies), Some("E_INVALID_FRAME"));

    let replies = process_inbound_text(&state, &mut conn, r#"{"event":"teleport","data":{}}"#).await;
    assert_eq!(error_code(&replies), Some("E_INVALID_FRAME"));
}

#[tokio::test]
async fn join_replies_and_announces() {
    let state = test_helpers::test_app_state();
    let (mut a, mut a_rx) = connection("alice");
    let (mut b, _b_rx) = connection("bob");

    let replies = process_inbound_text(&state, &mut a, &join("b1")).await;
    assert!(matches!(&replies[..], [ServerEvent::Joined { members: 1, .. }]));

    let replies = process_inbound_text(&state, &mut b, &join("b1")).await;
    assert!(matches!(&replies[..], [ServerEvent::Joined { members: 2, .. }]));

    match recv_relayed(&mut a_rx).await {
        ServerEvent::PeerJoined { client_id, username, .. } => {
            assert_eq!(client_id, b.client_id);
            assert_eq!(username, "bob");
        }
        other => panic!("expected peer_joined, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_board_id_is_rejected() {
    let state = test_helpers::test_app_state();
    let (mut conn, _rx) = connection("alice");
    let replies = process_inbound_text(&state, &mut conn, &join("  ")).await;
    assert_eq!(error_code(&replies), Some("E_INVALID_FRAME"));
    assert_eq!(state.rooms.len().await, 0);
}

#[tokio::test]
async fn rejoining_the_same_board_does_not_reannounce() {
    let state = test_helpers::test_app_state();
    let ((mut a, _a_rx), (_b, mut b_rx)) = joined_pair(&state).await;

    let replies = process_inbound_text(&state, &mut a, &join("b1")).await;
    assert!(matches!(&replies[..], [ServerEvent::Joined { members: 2, .. }]));
    assert_no_relay(&mut b_rx).await;
}

#[tokio::test]
async fn events_before_join_are_rejected() {
    let state = test_helpers::test_app_state();
    let (mut conn, _rx) = connection("alice");
    let replies = process_inbound_text(&state, &mut conn, &stroke("b1", "s1")).await;
    assert_eq!(error_code(&replies), Some("E_NOT_JOINED"));
}

#[tokio::test]
async fn events_for_another_board_are_rejected() {
    let state = test_helpers::test_app_state();
    let ((mut a, _a_rx), (_b, mut b_rx)) = joined_pair(&state).await;
    let replies = process_inbound_text(&state, &mut a, &stroke("b2", "s1")).await;
    assert_eq!(error_code(&replies), Some("E_NOT_JOINED"));
    assert_no_relay(&mut b_rx).await;
}

#[tokio::test]
async fn stroke_is_relayed_to_peers_without_echo() {
    let state = test_helpers::test_app_state();
    let ((mut a, mut a_rx), (_b, mut b_rx)) = joined_pair(&state).await;

    let replies = process_inbound_text(&state, &mut a, &stroke("b1", "s1")).await;
    assert!(replies.is_empty());

    match recv_relayed(&mut b_rx).await {
        ServerEvent::ShapeFinalized { from, shape } => {
            assert_eq!(from, a.client_id);
            assert_eq!(shape, rect("s1"));
        }
        other => panic!("expected shape_finalized, got {other:?}"),
    }
    assert_no_relay(&mut a_rx).await;
}

#[tokio::test]
async fn erase_and_replace_are_relayed() {
    let state = test_helpers::test_app_state();
    let ((mut a, _a_rx), (_b, mut b_rx)) = joined_pair(&state).await;

    let erase = text(&ClientEvent::EraseShape { board_id: "b1".into(), shape_id: "s1".into() });
    process_inbound_text(&state, &mut a, &erase).await;
    assert!(matches!(
        recv_relayed(&mut b_rx).await,
        ServerEvent::ShapeErased { shape_id, .. } if shape_id.as_str() == "s1"
    ));

    let replace = text(&ClientEvent::ReplaceShape { board_id: "b1".into(), shape: rect("s2") });
    process_inbound_text(&state, &mut a, &replace).await;
    assert!(matches!(recv_relayed(&mut b_rx).await, ServerEvent::ShapeReplaced { .. }));
}

#[tokio::test]
async fn viewer_mutations_are_forbidden_but_cursors_flow() {
    let viewer = Uuid::new_v4();
    let policy = RoleTable::new(Role::Editor).with_role("b1", &viewer.to_string(), Role::Viewer);
    let state = test_helpers::test_app_state_with_policy(Arc::new(policy));

    let (tx, _v_rx) = mpsc::channel(64);
    let mut v = Connection::new(viewer, "vera".into(), tx);
    let (mut peer, mut peer_rx) = connection("pat");
    process_inbound_text(&state, &mut peer, &join("b1")).await;
    process_inbound_text(&state, &mut v, &join("b1")).await;
    assert!(matches!(recv_relayed(&mut peer_rx).await, ServerEvent::PeerJoined { .. }));

    let replies = process_inbound_text(&state, &mut v, &stroke("b1", "s1")).await;
    assert_eq!(error_code(&replies), Some("E_FORBIDDEN"));
    let preview = text(&ClientEvent::DrawingMove { board_id: "b1".into(), shape: rect("s1") });
    let replies = process_inbound_text(&state, &mut v, &preview).await;
    assert_eq!(error_code(&replies), Some("E_FORBIDDEN"));
    assert_no_relay(&mut peer_rx).await;

    let cursor = text(&ClientEvent::CursorMove {
        board_id: "b1".into(),
        user_id: viewer.to_string(),
        username: "vera".into(),
        x: 3.0,
        y: 4.0,
    });
    assert!(process_inbound_text(&state, &mut v, &cursor).await.is_empty());
    assert!(matches!(recv_relayed(&mut peer_rx).await, ServerEvent::CursorMoved { .. }));
}

#[tokio::test]
async fn cursor_identity_comes_from_the_connection() {
    let state = test_helpers::test_app_state();
    let ((mut a, _a_rx), (_b, mut b_rx)) = joined_pair(&state).await;

    let spoofed = text(&ClientEvent::CursorMove {
        board_id: "b1".into(),
        user_id: "someone-else".into(),
        username: "mallory".into(),
        x: 12.0,
        y: 34.0,
    });
    process_inbound_text(&state, &mut a, &spoofed).await;

    match recv_relayed(&mut b_rx).await {
        ServerEvent::CursorMoved { from, user_id, username, x, y } => {
            assert_eq!(from, a.client_id);
            assert_eq!(user_id, a.user_id.to_string());
            assert_eq!(username, "alice");
            assert!((x - 12.0).abs() < f64::EPSILON && (y - 34.0).abs() < f64::EPSILON);
        }
        other => panic!("expected cursor_moved, got {other:?}"),
    }
}

#[tokio::test]
async fn joining_another_board_parts_the_first() {
    let state = test_helpers::test_app_state();
    let ((mut a, _a_rx), (_b, mut b_rx)) = joined_pair(&state).await;

    let replies = process_inbound_text(&state, &mut a, &join("b2")).await;
    assert!(matches!(&replies[..], [ServerEvent::Joined { members: 1, .. }]));
    assert_eq!(a.board_id(), Some("b2"));

    match recv_relayed(&mut b_rx).await {
        ServerEvent::PeerLeft { client_id, .. } => assert_eq!(client_id, a.client_id),
        other => panic!("expected peer_left, got {other:?}"),
    }
    // Events for the old board are now rejected.
    let replies = process_inbound_text(&state, &mut a, &stroke("b1", "s1")).await;
    assert_eq!(error_code(&replies), Some("E_NOT_JOINED"));
}

#[tokio::test]
async fn leaving_announces_and_closes_empty_rooms() {
    let state = test_helpers::test_app_state();
    let ((mut a, _a_rx), (mut b, mut b_rx)) = joined_pair(&state).await;

    leave_room(&state, &mut a).await;
    assert!(matches!(recv_relayed(&mut b_rx).await, ServerEvent::PeerLeft { .. }));
    assert!(state.rooms.contains("b1").await);

    leave_room(&state, &mut b).await;
    assert!(!state.rooms.contains("b1").await);
    // Leaving twice is a no-op.
    leave_room(&state, &mut b).await;
}

#[test]
fn ws_errors_carry_codes() {
    assert_eq!(WsError::NotJoined("b1".into()).error_code(), "E_NOT_JOINED");
    assert_eq!(WsError::Forbidden("b1".into()).error_code(), "E_FORBIDDEN");
    let room = WsError::from(RoomError::Closed("b1".into()));
    assert_eq!(room.error_code(), "E_ROOM_CLOSED");
    assert!(room.retryable());
}

// =============================================================================
// End to end over real sockets
// =============================================================================

type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, crate::routes::app(state)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, user_id: Uuid, username: &str) -> (Client, Uuid) {
    let url = canvas::net::ws_url(&format!("http://{addr}"), user_id, username).unwrap();
    let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    match next_event(&mut client).await {
        ServerEvent::Connected { client_id, user_id: echoed } => {
            assert_eq!(echoed, user_id);
            (client, client_id)
        }
        other => panic!("expected connected, got {other:?}"),
    }
}

async fn send(client: &mut Client, event: &ClientEvent) {
    client
        .send(tungstenite::Message::Text(text(event).into()))
        .await
        .unwrap();
}

async fn next_event(client: &mut Client) -> ServerEvent {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("socket receive timed out")
            .expect("socket closed unexpectedly")
            .unwrap();
        if let tungstenite::Message::Text(body) = msg {
            return serde_json::from_str(&body).unwrap();
        }
    }
}

async fn assert_socket_quiet(client: &mut Client) {
    assert!(
        timeout(Duration::from_millis(100), client.next()).await.is_err(),
        "expected no event on socket"
    );
}

fn session(board_id: &str, user_id: Uuid, username: &str) -> BoardSession {
    let identity = Identity { board_id: board_id.into(), user_id: user_id.to_string(), username: username.into() };
    BoardSession::online(identity, Vec::new(), true)
}

async fn flush_effects(client: &mut Client, session: &mut BoardSession) {
    for effect in session.drain_effects() {
        if let Effect::Send(event) = effect {
            send(client, &event).await;
        }
    }
}

#[tokio::test]
async fn drawing_reaches_peer_through_the_relay() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let (alice_id, bob_id) = (Uuid::new_v4(), Uuid::new_v4());

    let (mut a, a_client) = connect(addr, alice_id, "alice").await;
    let mut alice = session("b1", alice_id, "alice");
    send(&mut a, &alice.join_event().unwrap()).await;
    assert!(matches!(next_event(&mut a).await, ServerEvent::Joined { members: 1, .. }));

    let (mut b, _) = connect(addr, bob_id, "bob").await;
    let mut bob = session("b1", bob_id, "bob");
    send(&mut b, &bob.join_event().unwrap()).await;
    assert!(matches!(next_event(&mut b).await, ServerEvent::Joined { members: 2, .. }));
    assert!(matches!(next_event(&mut a).await, ServerEvent::PeerJoined { .. }));

    let t0 = Instant::now();
    alice.pointer_down(Point::new(10.0, 10.0), t0);
    alice.pointer_move(Point::new(30.0, 25.0), t0 + Duration::from_millis(10));
    alice.pointer_move(Point::new(50.0, 40.0), t0 + Duration::from_millis(30));
    alice.poll(t0 + Duration::from_millis(60));
    alice.pointer_up(t0 + Duration::from_millis(70));
    flush_effects(&mut a, &mut alice).await;

    let mut shape_events = Vec::new();
    loop {
        let event = next_event(&mut b).await;
        let name = event.name();
        if let ServerEvent::ShapeInProgress { from, shape } = &event {
            assert_eq!(*from, a_client);
            assert_eq!(shape.geometry, Geometry::Rect { x: 10.0, y: 10.0, width: 40.0, height: 30.0 });
        }
        bob.apply_remote(event);
        if name != "cursor_moved" {
            shape_events.push(name);
        }
        if name == "shape_finalized" {
            break;
        }
    }
    assert_eq!(shape_events, vec!["shape_in_progress", "shape_finalized"]);
    assert_eq!(bob.committed().len(), 1);
    assert_eq!(bob.committed(), alice.committed());
    assert!(bob.live().remote_drafts().is_empty());

    // Nothing echoes back to the drawer.
    assert_socket_quiet(&mut a).await;

    // Alice leaves; Bob drops her cursor.
    a.close(None).await.unwrap();
    loop {
        let event = next_event(&mut b).await;
        let left = matches!(event, ServerEvent::PeerLeft { client_id, user_id } if client_id == a_client && user_id == alice_id);
        bob.apply_remote(event);
        if left {
            break;
        }
    }
    assert!(bob.view().cursors.is_empty());
    assert_eq!(bob.committed().len(), 1);
}

#[tokio::test]
async fn viewer_stroke_never_reaches_peers() {
    let viewer = Uuid::new_v4();
    let policy = RoleTable::new(Role::Editor).with_role("b1", &viewer.to_string(), Role::Viewer);
    let addr = spawn_server(test_helpers::test_app_state_with_policy(Arc::new(policy))).await;

    let (mut editor, _) = connect(addr, Uuid::new_v4(), "ed").await;
    send(&mut editor, &ClientEvent::Join { board_id: "b1".into() }).await;
    next_event(&mut editor).await;

    let (mut v, _) = connect(addr, viewer, "vera").await;
    send(&mut v, &ClientEvent::Join { board_id: "b1".into() }).await;
    next_event(&mut v).await;
    assert!(matches!(next_event(&mut editor).await, ServerEvent::PeerJoined { .. }));

    send(&mut v, &ClientEvent::DrawStroke { board_id: "b1".into(), shape: rect("s1") }).await;
    match next_event(&mut v).await {
        ServerEvent::Error { code, retryable, .. } => {
            assert_eq!(code, "E_FORBIDDEN");
            assert!(!retryable);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert_socket_quiet(&mut editor).await;
}

#[tokio::test]
async fn malformed_user_id_is_refused() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let url = format!("ws://{addr}/api/ws?user_id=not-a-uuid&username=x");
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
}

#[tokio::test]
async fn missing_identity_gets_defaults() {
    let addr = spawn_server(test_helpers::test_app_state()).await;
    let (mut a, _) = connect(addr, Uuid::new_v4(), "alice").await;
    send(&mut a, &ClientEvent::Join { board_id: "b1".into() }).await;
    next_event(&mut a).await;

    let (mut anon, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws")).await.unwrap();
    assert!(matches!(next_event(&mut anon).await, ServerEvent::Connected { .. }));
    send(&mut anon, &ClientEvent::Join { board_id: "b1".into() }).await;
    next_event(&mut anon).await;

    match next_event(&mut a).await {
        ServerEvent::PeerJoined { username, .. } => assert_eq!(username, ANONYMOUS),
        other => panic!("expected peer_joined, got {other:?}"),
    }
}
