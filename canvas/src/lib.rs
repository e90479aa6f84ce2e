//! Client engine for the collaborative whiteboard.
//!
//! This crate runs on the drawing client. It turns pointer gestures into draft
//! shapes, throttles the live previews and cursor positions it sends to the
//! relay, folds relayed peer events into a render-ready view, and keeps the
//! local undo ledger. Guest boards skip the relay and persist to local storage.
//! Rendering itself is left to the host; it reads [`engine::View`] snapshots.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | [`engine::BoardSession`] state machine and its [`engine::Effect`]s |
//! | [`net`] | Websocket and guest drivers with reconnect |
//! | [`live`] | Live-state reconciler: committed list, peer drafts, cursors |
//! | [`history`] | Bounded linear undo/redo ledger |
//! | [`throttle`] | Single-slot throttle gate for outbound streams |
//! | [`input`] | Tools, stroke style, and the gesture draft |
//! | [`strategy`] | Per-kind geometry updates for a drag |
//! | [`storage`] | Local file and HTTP shape stores |
//! | [`color`] | Stable cursor colours |
//! | [`consts`] | Shared constants (throttle interval, history capacity, defaults) |

pub mod color;
pub mod consts;
pub mod engine;
pub mod history;
pub mod input;
pub mod live;
pub mod net;
pub mod storage;
pub mod strategy;
pub mod throttle;
