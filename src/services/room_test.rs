use super::*;
use std::time::Duration;
use tokio::time::timeout;

fn event(n: u8) -> ServerEvent {
    ServerEvent::ShapeErased { from: Uuid::nil(), shape_id: format!("s{n}").into() }
}

async fn recv(rx: &mut mpsc::Receiver<ServerEvent>) -> Option<ServerEvent> {
    timeout(Duration::from_millis(500), rx.recv()).await.ok().flatten()
}

async fn assert_silent(rx: &mut mpsc::Receiver<ServerEvent>) {
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn relay_reaches_everyone_but_the_sender() {
    let rooms = RoomRegistry::new(16);
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (a_tx, mut a_rx) = mpsc::channel(8);
    let (b_tx, mut b_rx) = mpsc::channel(8);
    let (c_tx, mut c_rx) = mpsc::channel(8);

    let (handle, _) = rooms.join("b1", a, a_tx).await.unwrap();
    rooms.join("b1", b, b_tx).await.unwrap();
    rooms.join("b1", c, c_tx).await.unwrap();

    handle.relay(a, event(1)).await.unwrap();
    assert_eq!(recv(&mut b_rx).await, Some(event(1)));
    assert_eq!(recv(&mut c_rx).await, Some(event(1)));
    assert_silent(&mut a_rx).await;
}

#[tokio::test]
async fn rooms_are_isolated_by_board() {
    let rooms = RoomRegistry::new(16);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let (a_tx, _a_rx) = mpsc::channel(8);
    let (b_tx, mut b_rx) = mpsc::channel(8);

    let (handle, _) = rooms.join("b1", a, a_tx).await.unwrap();
    rooms.join("b2", b, b_tx).await.unwrap();
    assert_eq!(rooms.len().await, 2);

    handle.relay(a, event(1)).await.unwrap();
    assert_silent(&mut b_rx).await;
}

#[tokio::test]
async fn member_counts_track_join_and_part() {
    let rooms = RoomRegistry::new(16);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let (a_tx, _a_rx) = mpsc::channel(8);
    let (b_tx, _b_rx) = mpsc::channel(8);

    assert_eq!(rooms.join("b1", a, a_tx.clone()).await.unwrap().1, 1);
    assert_eq!(rooms.join("b1", b, b_tx).await.unwrap().1, 2);
    // Rejoining replaces the queue rather than adding a member.
    assert_eq!(rooms.join("b1", a, a_tx).await.unwrap().1, 2);

    assert_eq!(rooms.part("b1", b).await, 1);
    assert!(rooms.contains("b1").await);
    assert_eq!(rooms.part("b1", a).await, 0);
    assert!(!rooms.contains("b1").await);
    assert_eq!(rooms.part("b1", a).await, 0);
}

#[tokio::test]
async fn empty_room_is_respawned_on_next_join() {
    let rooms = RoomRegistry::new(16);
    let a = Uuid::new_v4();
    let (a_tx, _a_rx) = mpsc::channel(8);

    let (stale, _) = rooms.join("b1", a, a_tx.clone()).await.unwrap();
    rooms.part("b1", a).await;
    // The old task is gone; relays through its handle fail.
    let closed = timeout(Duration::from_millis(500), async {
        loop {
            if stale.relay(a, event(1)).await.is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(closed.is_ok());

    let (fresh, members) = rooms.join("b1", a, a_tx).await.unwrap();
    assert_eq!(members, 1);
    assert!(fresh.relay(a, event(2)).await.is_ok());
}

#[tokio::test]
async fn full_member_queue_does_not_block_others() {
    let rooms = RoomRegistry::new(16);
    let (a, slow, fast) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (a_tx, _a_rx) = mpsc::channel(8);
    let (slow_tx, mut slow_rx) = mpsc::channel(1);
    let (fast_tx, mut fast_rx) = mpsc::channel(8);

    let (handle, _) = rooms.join("b1", a, a_tx).await.unwrap();
    rooms.join("b1", slow, slow_tx).await.unwrap();
    rooms.join("b1", fast, fast_tx).await.unwrap();

    for n in 0..3 {
        handle.relay(a, event(n)).await.unwrap();
    }
    for n in 0..3 {
        assert_eq!(recv(&mut fast_rx).await, Some(event(n)));
    }
    // Slow member got the first event; the rest were dropped.
    assert_eq!(recv(&mut slow_rx).await, Some(event(0)));
    assert_silent(&mut slow_rx).await;
}

#[tokio::test]
async fn relay_preserves_sender_order() {
    let rooms = RoomRegistry::new(64);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let (a_tx, _a_rx) = mpsc::channel(8);
    let (b_tx, mut b_rx) = mpsc::channel(64);

    let (handle, _) = rooms.join("b1", a, a_tx).await.unwrap();
    rooms.join("b1", b, b_tx).await.unwrap();

    for n in 0..20 {
        handle.relay(a, event(n)).await.unwrap();
    }
    for n in 0..20 {
        assert_eq!(recv(&mut b_rx).await, Some(event(n)));
    }
}

#[test]
fn room_error_is_retryable() {
    let err = RoomError::Closed("b1".into());
    assert_eq!(err.error_code(), "E_ROOM_CLOSED");
    assert!(err.retryable());
}
