//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own room membership, edit checks, and persistence so
//! route handlers can stay focused on protocol translation.

pub mod access;
pub mod persistence;
pub mod room;
