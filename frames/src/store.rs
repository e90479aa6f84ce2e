//! Persistence boundary: load and save a board's committed shapes.
//!
//! DESIGN
//! ======
//! The store is an external collaborator. Both sides talk to it through the
//! same two calls: the server backs it with Postgres, the client with HTTP
//! or local storage. Saves are last-writer-wins; there is no version token,
//! so two concurrent saves silently overwrite each other.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::event::ErrorCode;
use crate::shape::Shape;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not allowed to edit board {0}")]
    Forbidden(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("invalid stored shapes: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => "E_FORBIDDEN",
            Self::Unavailable(_) => "E_STORE_UNAVAILABLE",
            Self::Backend(_) => "E_STORE",
            Self::Codec(_) => "E_STORE_CODEC",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Request/response access to a board's committed shape list.
#[async_trait::async_trait]
pub trait ShapeStore: Send + Sync {
    /// Load the ordered shape list. Unknown boards load as empty.
    async fn load(&self, board_id: &str) -> Result<Vec<Shape>, StoreError>;

    /// Replace the stored shape list with `shapes`.
    async fn save(&self, board_id: &str, shapes: &[Shape]) -> Result<(), StoreError>;
}

/// Process-local store keyed by board id.
#[derive(Default)]
pub struct MemoryStore {
    boards: Mutex<HashMap<String, Vec<Shape>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ShapeStore for MemoryStore {
    async fn load(&self, board_id: &str) -> Result<Vec<Shape>, StoreError> {
        let boards = self
            .boards
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(boards.get(board_id).cloned().unwrap_or_default())
    }

    async fn save(&self, board_id: &str, shapes: &[Shape]) -> Result<(), StoreError> {
        let mut boards = self
            .boards
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        boards.insert(board_id.to_owned(), shapes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
