//! Live-state reconciler: committed shapes, peer overlays, and cursors.
//!
//! `LiveState` merges the sources a client renders from:
//!
//! - the committed list, in commit order,
//! - remote drafts, at most one per peer connection, replaced by each newer preview,
//! - the local draft, if a gesture is in progress,
//! - peer cursors, keyed by user id.
//!
//! Remote events are folded in by shape id, never by position, so events from
//! different peers may interleave arbitrarily. A remote commit for id X drops
//! the overlay entry for X; the renderer checks committed membership before
//! falling back to an overlay so no shape is drawn twice.

#[cfg(test)]
#[path = "live_test.rs"]
mod live_test;

use std::collections::HashMap;

use frames::{ANONYMOUS, ServerEvent, Shape, ShapeId};
use uuid::Uuid;

use crate::color::cursor_color;

/// A peer's in-progress shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDraft {
    /// Connection that is drawing it.
    pub owner: Uuid,
    pub shape: Shape,
}

/// A peer's last known pointer position.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub owner: Uuid,
    pub user_id: String,
    pub username: String,
    pub x: f64,
    pub y: f64,
    pub color: String,
}

/// What a remote event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Nothing visible changed.
    Unchanged,
    /// Only overlays or cursors changed.
    Overlay,
    /// The committed list changed.
    Committed,
}

#[derive(Debug, Clone, Default)]
pub struct LiveState {
    committed: Vec<Shape>,
    remote: Vec<RemoteDraft>,
    cursors: HashMap<String, Cursor>,
    draft: Option<Shape>,
}

impl LiveState {
    #[must_use]
    pub fn new(committed: Vec<Shape>) -> Self {
        Self { committed, ..Self::default() }
    }

    // =========================================================================
    // COMMITTED LIST
    // =========================================================================

    #[must_use]
    pub fn committed(&self) -> &[Shape] {
        &self.committed
    }

    /// Replace the committed list wholesale (load, undo, redo).
    pub fn set_committed(&mut self, shapes: Vec<Shape>) {
        self.committed = shapes;
    }

    #[must_use]
    pub fn find(&self, id: &ShapeId) -> Option<&Shape> {
        self.committed.iter().find(|shape| &shape.id == id)
    }

    /// Append a shape, or replace it in place when its id is already committed.
    pub fn commit(&mut self, shape: Shape) {
        self.remote.retain(|draft| draft.shape.id != shape.id);
        match self.committed.iter_mut().find(|existing| existing.id == shape.id) {
            Some(existing) => *existing = shape,
            None => self.committed.push(shape),
        }
    }

    /// Remove a committed shape. Returns false if it was not present.
    pub fn erase(&mut self, id: &ShapeId) -> bool {
        let before = self.committed.len();
        self.committed.retain(|shape| &shape.id != id);
        self.committed.len() != before
    }

    /// Swap in a new version of a committed shape. Unknown ids are ignored.
    pub fn replace(&mut self, shape: Shape) -> bool {
        let Some(existing) = self.committed.iter_mut().find(|existing| existing.id == shape.id) else {
            return false;
        };
        *existing = shape;
        true
    }

    // =========================================================================
    // LOCAL DRAFT
    // =========================================================================

    #[must_use]
    pub fn draft(&self) -> Option<&Shape> {
        self.draft.as_ref()
    }

    pub fn set_draft(&mut self, draft: Option<Shape>) {
        self.draft = draft;
    }

    // =========================================================================
    // REMOTE OVERLAYS
    // =========================================================================

    /// Set a peer's in-progress shape. Each peer has at most one draft, so a
    /// preview for a new id replaces whatever that peer was drawing before.
    pub fn upsert_remote(&mut self, owner: Uuid, shape: Shape) -> bool {
        // A stale preview arriving after the commit must not resurrect a ghost.
        if self.find(&shape.id).is_some() {
            return false;
        }
        self.remote.retain(|draft| draft.owner == owner || draft.shape.id != shape.id);
        match self.remote.iter_mut().find(|draft| draft.owner == owner) {
            Some(existing) => existing.shape = shape,
            None => self.remote.push(RemoteDraft { owner, shape }),
        }
        true
    }

    #[must_use]
    pub fn remote_drafts(&self) -> &[RemoteDraft] {
        &self.remote
    }

    pub fn set_cursor(&mut self, owner: Uuid, user_id: String, username: String, x: f64, y: f64) {
        let username = if username.is_empty() { ANONYMOUS.to_owned() } else { username };
        let color = cursor_color(&username);
        self.cursors.insert(user_id.clone(), Cursor { owner, user_id, username, x, y, color });
    }

    /// Peer cursors ordered by username, then user id.
    #[must_use]
    pub fn cursors(&self) -> Vec<&Cursor> {
        let mut cursors: Vec<&Cursor> = self.cursors.values().collect();
        cursors.sort_by(|a, b| a.username.cmp(&b.username).then_with(|| a.user_id.cmp(&b.user_id)));
        cursors
    }

    /// Drop every overlay and cursor belonging to a departed peer.
    pub fn purge_peer(&mut self, client_id: Uuid, user_id: Uuid) {
        let user_id = user_id.to_string();
        self.remote.retain(|draft| draft.owner != client_id);
        self.cursors.retain(|key, cursor| cursor.owner != client_id && *key != user_id);
    }

    /// Drop all peer state, e.g. after losing the connection.
    pub fn clear_remote(&mut self) {
        self.remote.clear();
        self.cursors.clear();
    }

    // =========================================================================
    // RECONCILE
    // =========================================================================

    /// Fold one relayed event into the state.
    pub fn apply_remote(&mut self, event: ServerEvent) -> Reconciled {
        match event {
            ServerEvent::ShapeFinalized { shape, .. } => {
                self.commit(shape);
                Reconciled::Committed
            }
            ServerEvent::ShapeInProgress { from, shape } => changed(self.upsert_remote(from, shape), Reconciled::Overlay),
            ServerEvent::CursorMoved { from, user_id, username, x, y } => {
                self.set_cursor(from, user_id, username, x, y);
                Reconciled::Overlay
            }
            ServerEvent::ShapeErased { shape_id, .. } => changed(self.erase(&shape_id), Reconciled::Committed),
            ServerEvent::ShapeReplaced { shape, .. } => changed(self.replace(shape), Reconciled::Committed),
            ServerEvent::PeerLeft { client_id, user_id } => {
                self.purge_peer(client_id, user_id);
                Reconciled::Overlay
            }
            ServerEvent::Connected { .. }
            | ServerEvent::Joined { .. }
            | ServerEvent::PeerJoined { .. }
            | ServerEvent::Error { .. } => Reconciled::Unchanged,
        }
    }

    /// Render order: committed, then remote drafts not yet committed, then the local draft.
    #[must_use]
    pub fn render(&self) -> Vec<&Shape> {
        let mut out: Vec<&Shape> = self.committed.iter().collect();
        out.extend(
            self.remote
                .iter()
                .map(|draft| &draft.shape)
                .filter(|shape| self.find(&shape.id).is_none()),
        );
        if let Some(draft) = &self.draft
            && self.find(&draft.id).is_none()
        {
            out.push(draft);
        }
        out
    }
}

fn changed(did_change: bool, kind: Reconciled) -> Reconciled {
    if did_change { kind } else { Reconciled::Unchanged }
}
