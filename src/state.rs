//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the room registry, the shape store, and the edit policy. The store
//! and policy are trait objects so the relay runs the same way on Postgres
//! or in memory, open or role-restricted.

use std::sync::Arc;

use frames::ShapeStore;

use crate::config::Config;
use crate::services::access::EditPolicy;
use crate::services::room::RoomRegistry;

/// Clone is required by Axum; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomRegistry,
    pub store: Arc<dyn ShapeStore>,
    pub policy: Arc<dyn EditPolicy>,
    pub config: Config,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn ShapeStore>, policy: Arc<dyn EditPolicy>) -> Self {
        Self { rooms: RoomRegistry::new(config.room_queue_capacity), store, policy, config }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
