//! Shared constants for the canvas crate.

use std::time::Duration;

// ── Outbound streams ────────────────────────────────────────────

/// Minimum spacing between two live-shape or cursor sends on one connection.
pub const THROTTLE_INTERVAL: Duration = Duration::from_millis(50);

// ── History ─────────────────────────────────────────────────────

/// Snapshots kept by the undo stack before the oldest is evicted.
pub const HISTORY_CAPACITY: usize = 100;

// ── Drawing defaults ────────────────────────────────────────────

pub const DEFAULT_STROKE: &str = "#000000";
pub const DEFAULT_STROKE_WIDTH: f64 = 3.0;

/// Content of a freshly placed text shape.
pub const TEXT_PLACEHOLDER: &str = "Double click to edit";
pub const TEXT_FONT_SIZE: f64 = 20.0;

// ── Guest mode ──────────────────────────────────────────────────

/// Local storage key for the single guest board.
pub const GUEST_STORAGE_KEY: &str = "guest_whiteboard";

/// Board id that opens the local-only guest board.
pub const GUEST_BOARD_ALIAS: &str = "demo";

// ── Reconnect ───────────────────────────────────────────────────

pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(250);
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(5);
