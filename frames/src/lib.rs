//! Shared shape model and wire protocol for realtime board sessions.
//!
//! This crate owns the types both the relay server and the client engine
//! agree on: what a drawn shape looks like, which events travel over the
//! websocket, and the persistence boundary used to load and save a board.
//!
//! | Module | Role |
//! |--------|------|
//! | [`shape`] | Shapes, tool kinds, and their geometry |
//! | [`event`] | Client and server websocket events, error codes |
//! | [`store`] | The `ShapeStore` persistence trait and an in-memory store |

pub mod event;
pub mod shape;
pub mod store;

pub use event::{ClientEvent, E_FORBIDDEN, ErrorCode, ServerEvent};
pub use shape::{Geometry, Point, Shape, ShapeId, ShapeKind};
pub use store::{MemoryStore, ShapeStore, StoreError};

/// Board identifiers are opaque strings issued by the board service.
pub type BoardId = String;

/// Display name for users who connect without one.
pub const ANONYMOUS: &str = "anonymous";
