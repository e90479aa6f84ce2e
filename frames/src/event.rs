//! Websocket events exchanged between board clients and the relay.
//!
//! ARCHITECTURE
//! ============
//! Every websocket text message is one JSON event of the form
//! `{"event": "<name>", "data": {...}}`. Clients send [`ClientEvent`]s, the
//! relay answers and fans out [`ServerEvent`]s. The relay never inspects
//! shape geometry; it only routes by board and event name.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BoardId;
use crate::shape::{Shape, ShapeId};

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe this connection to a board's room.
    Join { board_id: BoardId },
    /// A finished shape.
    DrawStroke { board_id: BoardId, shape: Shape },
    /// An in-progress shape preview, throttled by the sender.
    DrawingMove { board_id: BoardId, shape: Shape },
    /// Pointer position, throttled by the sender.
    CursorMove { board_id: BoardId, user_id: String, username: String, x: f64, y: f64 },
    /// A committed shape was erased.
    EraseShape { board_id: BoardId, shape_id: ShapeId },
    /// A committed shape was replaced wholesale (text edit, move).
    ReplaceShape { board_id: BoardId, shape: Shape },
}

impl ClientEvent {
    /// Board the event is addressed to.
    #[must_use]
    pub fn board_id(&self) -> &str {
        match self {
            Self::Join { board_id }
            | Self::DrawStroke { board_id, .. }
            | Self::DrawingMove { board_id, .. }
            | Self::CursorMove { board_id, .. }
            | Self::EraseShape { board_id, .. }
            | Self::ReplaceShape { board_id, .. } => board_id,
        }
    }

    /// Wire name of the event, used for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::DrawStroke { .. } => "draw_stroke",
            Self::DrawingMove { .. } => "drawing_move",
            Self::CursorMove { .. } => "cursor_move",
            Self::EraseShape { .. } => "erase_shape",
            Self::ReplaceShape { .. } => "replace_shape",
        }
    }

    /// Whether the event changes board content and so needs edit rights.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::DrawStroke { .. } | Self::DrawingMove { .. } | Self::EraseShape { .. } | Self::ReplaceShape { .. }
        )
    }
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First event on every connection.
    Connected { client_id: Uuid, user_id: Uuid },
    /// Reply to `join`.
    Joined { board_id: BoardId, client_id: Uuid, members: usize },
    PeerJoined { client_id: Uuid, user_id: Uuid, username: String },
    ShapeFinalized { from: Uuid, shape: Shape },
    ShapeInProgress { from: Uuid, shape: Shape },
    CursorMoved { from: Uuid, user_id: String, username: String, x: f64, y: f64 },
    ShapeErased { from: Uuid, shape_id: ShapeId },
    ShapeReplaced { from: Uuid, shape: Shape },
    /// The peer's connection closed; drop its drafts and cursor.
    PeerLeft { client_id: Uuid, user_id: Uuid },
    Error { code: String, message: String, retryable: bool },
}

impl ServerEvent {
    /// Structured error event from a typed error.
    #[must_use]
    pub fn error_from(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::Error { code: err.error_code().to_owned(), message: err.to_string(), retryable: err.retryable() }
    }

    /// Wire name of the event, used for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Joined { .. } => "joined",
            Self::PeerJoined { .. } => "peer_joined",
            Self::ShapeFinalized { .. } => "shape_finalized",
            Self::ShapeInProgress { .. } => "shape_in_progress",
            Self::CursorMoved { .. } => "cursor_moved",
            Self::ShapeErased { .. } => "shape_erased",
            Self::ShapeReplaced { .. } => "shape_replaced",
            Self::PeerLeft { .. } => "peer_left",
            Self::Error { .. } => "error",
        }
    }

    /// High-frequency events that are not logged one by one.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::ShapeInProgress { .. } | Self::CursorMoved { .. })
    }
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// The sender may not edit the board it addressed. Clients drop edit mode on it.
pub const E_FORBIDDEN: &str = "E_FORBIDDEN";

/// Grepable error code and retryable flag for structured error events.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
