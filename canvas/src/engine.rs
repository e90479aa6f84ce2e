//! Board session: one connection's drawing state machine.
//!
//! ARCHITECTURE
//! ============
//! `BoardSession` owns everything a single client mutates: the active tool and
//! style, the live-state reconciler, the undo ledger, and one throttle gate per
//! outbound stream (live shape, cursor). It performs no I/O. Every operation
//! takes the current instant where timing matters and queues `Effect`s that
//! the driver in `net` drains and executes after each step.
//!
//! A session is either online (bound to a board's room) or guest. Guest
//! sessions never produce socket traffic; each committed change is persisted
//! to local storage instead.
//!
//! GESTURE LIFECYCLE
//! =================
//! pointer down starts a `Draft`; pointer moves update it and offer the new
//! shape to the live gate; pointer up flushes whatever preview is still held,
//! then commits. Switching tools mid-gesture drops the draft and its pending
//! preview without sending anything.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::time::Instant;

use frames::{BoardId, ClientEvent, E_FORBIDDEN, Point, ServerEvent, Shape, ShapeId};
use tracing::{debug, warn};

use crate::consts::THROTTLE_INTERVAL;
use crate::history::HistoryStack;
use crate::input::{Draft, Style, Tool};
use crate::live::{Cursor, LiveState, Reconciled};
use crate::throttle::ThrottleGate;

// =============================================================================
// TYPES
// =============================================================================

/// Work for the driver to carry out after a session step.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write one event to the board's socket.
    Send(ClientEvent),
    /// Store the committed list on this device (guest mode).
    PersistLocal(Vec<Shape>),
}

/// Who this session speaks for on an online board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub board_id: BoardId,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Online(Identity),
    Guest,
}

/// Render-ready snapshot of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View {
    pub shapes: Vec<Shape>,
    pub cursors: Vec<Cursor>,
    pub tool: Tool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub may_edit: bool,
}

// =============================================================================
// SESSION
// =============================================================================

pub struct BoardSession {
    mode: Mode,
    may_edit: bool,
    tool: Tool,
    style: Style,
    live: LiveState,
    history: HistoryStack<Vec<Shape>>,
    draft: Option<Draft>,
    live_gate: ThrottleGate<Shape>,
    cursor_gate: ThrottleGate<Point>,
    effects: Vec<Effect>,
}

impl BoardSession {
    /// Session on a shared board, seeded with the shapes loaded from the store.
    #[must_use]
    pub fn online(identity: Identity, shapes: Vec<Shape>, may_edit: bool) -> Self {
        Self::build(Mode::Online(identity), shapes, may_edit)
    }

    /// Local-only session. Guests may always edit.
    #[must_use]
    pub fn guest(shapes: Vec<Shape>) -> Self {
        Self::build(Mode::Guest, shapes, true)
    }

    fn build(mode: Mode, shapes: Vec<Shape>, may_edit: bool) -> Self {
        let mut history = HistoryStack::default();
        history.record(shapes.clone());
        Self {
            mode,
            may_edit,
            tool: Tool::default(),
            style: Style::default(),
            live: LiveState::new(shapes),
            history,
            draft: None,
            live_gate: ThrottleGate::new(THROTTLE_INTERVAL),
            cursor_gate: ThrottleGate::new(THROTTLE_INTERVAL),
            effects: Vec::new(),
        }
    }

    // --- Queries ---

    #[must_use]
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.mode == Mode::Guest
    }

    #[must_use]
    pub fn board_id(&self) -> Option<&str> {
        match &self.mode {
            Mode::Online(identity) => Some(&identity.board_id),
            Mode::Guest => None,
        }
    }

    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    #[must_use]
    pub fn committed(&self) -> &[Shape] {
        self.live.committed()
    }

    #[must_use]
    pub fn live(&self) -> &LiveState {
        &self.live
    }

    #[must_use]
    pub fn history(&self) -> &HistoryStack<Vec<Shape>> {
        &self.history
    }

    #[must_use]
    pub fn view(&self) -> View {
        View {
            shapes: self.live.render().into_iter().cloned().collect(),
            cursors: self.live.cursors().into_iter().cloned().collect(),
            tool: self.tool,
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            may_edit: self.may_edit,
        }
    }

    /// The `join` to send after (re)connecting. `None` for guests.
    #[must_use]
    pub fn join_event(&self) -> Option<ClientEvent> {
        match &self.mode {
            Mode::Online(identity) => Some(ClientEvent::Join { board_id: identity.board_id.clone() }),
            Mode::Guest => None,
        }
    }

    /// Earliest instant at which `poll` has something to release.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.live_gate.deadline(), self.cursor_gate.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Take the effects queued since the last drain.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // --- Tool / style ---

    /// Switch tools. An unfinished draft is dropped along with its pending preview.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.draft.take().is_some() {
            debug!(?tool, "tool switched mid-gesture; draft discarded");
            self.live_gate.discard();
            self.live.set_draft(None);
        }
        self.tool = tool;
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    // --- Pointer ---

    pub fn pointer_down(&mut self, point: Point, now: Instant) {
        self.track_cursor(point, now);
        if self.may_edit
            && let Some(kind) = self.tool.shape_kind()
        {
            let draft = Draft::start(kind, point, &self.style);
            self.live_gate.discard();
            self.live.set_draft(Some(draft.shape.clone()));
            self.draft = Some(draft);
        }
        self.poll(now);
    }

    pub fn pointer_move(&mut self, point: Point, now: Instant) {
        self.track_cursor(point, now);
        if let Some(draft) = self.draft.as_mut()
            && draft.drag(point)
        {
            let shape = draft.shape.clone();
            self.live.set_draft(Some(shape.clone()));
            if !self.is_guest() {
                self.live_gate.offer(shape, now);
            }
        }
        self.poll(now);
    }

    /// Finish the gesture: flush the held preview, then commit the draft.
    pub fn pointer_up(&mut self, now: Instant) {
        if let Some(draft) = self.draft.take() {
            if let Some(preview) = self.live_gate.flush() {
                self.send_live(preview);
            }
            self.live.set_draft(None);
            let shape = draft.shape;
            debug!(shape_id = %shape.id, kind = ?shape.kind(), "shape committed");
            self.live.commit(shape.clone());
            self.after_local_change(|board_id| ClientEvent::DrawStroke { board_id, shape });
        }
        self.poll(now);
    }

    // --- Edits on committed shapes ---

    /// Remove a committed shape. Returns false when nothing was erased.
    pub fn erase(&mut self, id: &ShapeId) -> bool {
        if !self.may_edit || !self.live.erase(id) {
            return false;
        }
        let shape_id = id.clone();
        self.after_local_change(|board_id| ClientEvent::EraseShape { board_id, shape_id });
        true
    }

    /// Replace the content of a committed text shape.
    pub fn edit_text(&mut self, id: &ShapeId, content: &str) -> bool {
        let Some(shape) = self.live.find(id).and_then(|shape| shape.with_text(content)) else {
            return false;
        };
        self.replace_committed(shape)
    }

    /// Move a committed shape by `(dx, dy)`.
    pub fn move_shape(&mut self, id: &ShapeId, dx: f64, dy: f64) -> bool {
        let Some(shape) = self.live.find(id).map(|shape| shape.translated(dx, dy)) else {
            return false;
        };
        self.replace_committed(shape)
    }

    fn replace_committed(&mut self, shape: Shape) -> bool {
        if !self.may_edit || !self.live.replace(shape.clone()) {
            return false;
        }
        self.after_local_change(|board_id| ClientEvent::ReplaceShape { board_id, shape });
        true
    }

    // --- History ---

    /// Step back one snapshot. Local only; peers are not told.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.undo() else {
            return false;
        };
        self.restore(snapshot);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snapshot) = self.history.redo() else {
            return false;
        };
        self.restore(snapshot);
        true
    }

    fn restore(&mut self, snapshot: Vec<Shape>) {
        self.live.set_committed(snapshot);
        if self.is_guest() {
            self.effects.push(Effect::PersistLocal(self.live.committed().to_vec()));
        }
    }

    // --- Remote ---

    /// Fold a relayed event into the session. Committed changes are recorded in history.
    pub fn apply_remote(&mut self, event: ServerEvent) -> Reconciled {
        if let ServerEvent::Error { code, message, retryable } = &event {
            warn!(%code, %message, retryable, "server rejected event");
            if code == E_FORBIDDEN {
                self.revoke_edit();
            }
        }
        let reconciled = self.live.apply_remote(event);
        if reconciled == Reconciled::Committed {
            self.history.record(self.live.committed().to_vec());
        }
        reconciled
    }

    /// The server refused an edit: stop drawing and hold back further mutations.
    /// Local commits the server already rejected stay visible until the next load.
    fn revoke_edit(&mut self) {
        if !self.may_edit {
            return;
        }
        self.may_edit = false;
        if self.draft.take().is_some() {
            self.live_gate.discard();
            self.live.set_draft(None);
        }
    }

    /// The connection dropped: peer overlays and held payloads are stale.
    pub fn on_disconnected(&mut self) {
        self.live.clear_remote();
        self.live_gate.discard();
        self.cursor_gate.discard();
    }

    // --- Timers ---

    /// Release any throttled payload whose window has closed.
    pub fn poll(&mut self, now: Instant) {
        if let Some(shape) = self.live_gate.poll(now) {
            self.send_live(shape);
        }
        if let Some(point) = self.cursor_gate.poll(now)
            && let Mode::Online(identity) = &self.mode
        {
            self.effects.push(Effect::Send(ClientEvent::CursorMove {
                board_id: identity.board_id.clone(),
                user_id: identity.user_id.clone(),
                username: identity.username.clone(),
                x: point.x,
                y: point.y,
            }));
        }
    }

    // --- Internals ---

    fn track_cursor(&mut self, point: Point, now: Instant) {
        if !self.is_guest() {
            self.cursor_gate.offer(point, now);
        }
    }

    fn send_live(&mut self, shape: Shape) {
        if let Mode::Online(identity) = &self.mode {
            self.effects.push(Effect::Send(ClientEvent::DrawingMove { board_id: identity.board_id.clone(), shape }));
        }
    }

    /// Record the new committed list, then broadcast (online) or persist (guest).
    fn after_local_change(&mut self, event: impl FnOnce(BoardId) -> ClientEvent) {
        let snapshot = self.live.committed().to_vec();
        self.history.record(snapshot.clone());
        match &self.mode {
            Mode::Online(identity) => self.effects.push(Effect::Send(event(identity.board_id.clone()))),
            Mode::Guest => self.effects.push(Effect::PersistLocal(snapshot)),
        }
    }
}
