//! Room service: per-board relay tasks and the registry that owns them.
//!
//! DESIGN
//! ======
//! Each board with at least one connection has one room task. The task owns
//! the member map (client id -> outbound queue) and drains a typed command
//! channel, handling `Join`, `Part`, and `Relay` one at a time, so membership
//! never changes in the middle of a fan-out.
//!
//! Fan-out is best effort: each member gets the event through `try_send`. A
//! full or closed member queue is skipped, never awaited, so one slow client
//! cannot stall the room.
//!
//! LIFECYCLE
//! =========
//! `RoomRegistry::join` spawns the task on first join. Join and part go
//! through the registry lock; when a part leaves the room empty the registry
//! drops the handle and the task exits, so a later join always finds either
//! a live room or none at all.

use std::collections::HashMap;
use std::sync::Arc;

use frames::{BoardId, ErrorCode, ServerEvent};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room for board {0} is closed")]
    Closed(BoardId),
}

impl ErrorCode for RoomError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Closed(_) => "E_ROOM_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// Commands accepted by a room task.
#[derive(Debug)]
pub enum RoomCommand {
    /// Add or replace a member. Replies with the member count after joining.
    Join { client_id: Uuid, tx: mpsc::Sender<ServerEvent>, reply: oneshot::Sender<usize> },
    /// Remove a member. Replies with the number of members left.
    Part { client_id: Uuid, reply: oneshot::Sender<usize> },
    /// Deliver `event` to every member except `from`.
    Relay { from: Uuid, event: ServerEvent },
}

/// Cloneable sender side of a room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    board_id: BoardId,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    #[must_use]
    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// Queue `event` for every member except `from`.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Closed` if the room task has already exited.
    pub async fn relay(&self, from: Uuid, event: ServerEvent) -> Result<(), RoomError> {
        self.tx
            .send(RoomCommand::Relay { from, event })
            .await
            .map_err(|_| RoomError::Closed(self.board_id.clone()))
    }

    async fn request(&self, build: impl FnOnce(oneshot::Sender<usize>) -> RoomCommand) -> Result<usize, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| RoomError::Closed(self.board_id.clone()))?;
        rx.await.map_err(|_| RoomError::Closed(self.board_id.clone()))
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Board id -> live room. Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<BoardId, RoomHandle>>>,
    queue_capacity: usize,
}

impl RoomRegistry {
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self { rooms: Arc::new(Mutex::new(HashMap::new())), queue_capacity: queue_capacity.max(1) }
    }

    /// Join `client_id` to the board's room, spawning the room if needed.
    /// Joining twice replaces the member's queue. Returns the room handle and
    /// the member count.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Closed` if a freshly spawned room fails to answer.
    pub async fn join(
        &self,
        board_id: &str,
        client_id: Uuid,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Result<(RoomHandle, usize), RoomError> {
        let mut rooms = self.rooms.lock().await;

        if let Some(handle) = rooms.get(board_id).cloned() {
            let join_tx = tx.clone();
            match handle.request(|reply| RoomCommand::Join { client_id, tx: join_tx, reply }).await {
                Ok(members) => return Ok((handle, members)),
                Err(e) => {
                    warn!(%board_id, error = %e, "stale room handle; respawning");
                    rooms.remove(board_id);
                }
            }
        }

        let handle = spawn_room(board_id.to_owned(), self.queue_capacity);
        let members = handle
            .request(|reply| RoomCommand::Join { client_id, tx, reply })
            .await?;
        rooms.insert(board_id.to_owned(), handle.clone());
        Ok((handle, members))
    }

    /// Remove `client_id` from the board's room. Returns the members left;
    /// an empty room is dropped from the registry and its task exits.
    pub async fn part(&self, board_id: &str, client_id: Uuid) -> usize {
        let mut rooms = self.rooms.lock().await;
        let Some(handle) = rooms.get(board_id).cloned() else {
            return 0;
        };

        let remaining = match handle.request(|reply| RoomCommand::Part { client_id, reply }).await {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!(%board_id, error = %e, "part on closed room");
                0
            }
        };
        if remaining == 0 {
            rooms.remove(board_id);
            info!(%board_id, "room closed");
        }
        remaining
    }

    /// Number of live rooms.
    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    #[cfg(test)]
    pub async fn contains(&self, board_id: &str) -> bool {
        self.rooms.lock().await.contains_key(board_id)
    }
}

// =============================================================================
// ROOM TASK
// =============================================================================

fn spawn_room(board_id: BoardId, capacity: usize) -> RoomHandle {
    let (tx, rx) = mpsc::channel(capacity);
    info!(%board_id, "room opened");
    tokio::spawn(run_room(board_id.clone(), rx));
    RoomHandle { board_id, tx }
}

async fn run_room(board_id: BoardId, mut rx: mpsc::Receiver<RoomCommand>) {
    let mut members: HashMap<Uuid, mpsc::Sender<ServerEvent>> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            RoomCommand::Join { client_id, tx, reply } => {
                members.insert(client_id, tx);
                info!(%board_id, %client_id, members = members.len(), "client joined room");
                if reply.send(members.len()).is_err() {
                    debug!(%board_id, %client_id, "join caller went away");
                }
            }
            RoomCommand::Part { client_id, reply } => {
                members.remove(&client_id);
                info!(%board_id, %client_id, remaining = members.len(), "client left room");
                if reply.send(members.len()).is_err() {
                    debug!(%board_id, %client_id, "part caller went away");
                }
                if members.is_empty() {
                    break;
                }
            }
            RoomCommand::Relay { from, event } => fan_out(&board_id, &members, from, &event),
        }
    }
    debug!(%board_id, "room task exited");
}

fn fan_out(board_id: &str, members: &HashMap<Uuid, mpsc::Sender<ServerEvent>>, from: Uuid, event: &ServerEvent) {
    for (client_id, tx) in members {
        if *client_id == from {
            continue;
        }
        match tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(%board_id, %client_id, event = event.name(), "client queue full; event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%board_id, %client_id, "client queue closed; event dropped");
            }
        }
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
