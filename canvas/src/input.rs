//! Input model: tools, stroke style, and the draft shape of a gesture.
//!
//! `Tool` captures the user's intent at pointer-down. A drawing tool starts a
//! `Draft`, which carries the fixed anchor and the in-progress shape until
//! pointer-up turns it into a committed shape or a tool switch discards it.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use frames::{Point, Shape, ShapeId, ShapeKind};

use crate::consts::{DEFAULT_STROKE, DEFAULT_STROKE_WIDTH};
use crate::strategy;

/// Which tool is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    /// Pointer tool; shapes can be moved.
    Select,
    /// Clicking a shape removes it.
    Eraser,
    #[default]
    Rect,
    Ellipse,
    Freehand,
    StraightLine,
    Arrow,
    Text,
}

impl Tool {
    /// The shape kind this tool draws, `None` for select and eraser.
    #[must_use]
    pub fn shape_kind(self) -> Option<ShapeKind> {
        match self {
            Self::Select | Self::Eraser => None,
            Self::Rect => Some(ShapeKind::Rect),
            Self::Ellipse => Some(ShapeKind::Ellipse),
            Self::Freehand => Some(ShapeKind::Freehand),
            Self::StraightLine => Some(ShapeKind::StraightLine),
            Self::Arrow => Some(ShapeKind::Arrow),
            Self::Text => Some(ShapeKind::Text),
        }
    }
}

/// Stroke settings applied to newly drawn shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub stroke: String,
    pub stroke_width: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self { stroke: DEFAULT_STROKE.to_owned(), stroke_width: DEFAULT_STROKE_WIDTH }
    }
}

/// The one in-progress shape of a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub shape: Shape,
    /// Where the gesture started. Never moves during the gesture.
    pub anchor: Point,
}

impl Draft {
    /// Start a draft for `kind` at `anchor`.
    #[must_use]
    pub fn start(kind: ShapeKind, anchor: Point, style: &Style) -> Self {
        // Text and line-like shapes fill with the stroke colour.
        let fill = match kind {
            ShapeKind::Text | ShapeKind::StraightLine | ShapeKind::Arrow => Some(style.stroke.clone()),
            ShapeKind::Rect | ShapeKind::Ellipse | ShapeKind::Freehand => None,
        };
        let shape = Shape {
            id: ShapeId::generate(),
            stroke: style.stroke.clone(),
            stroke_width: style.stroke_width,
            fill,
            geometry: strategy::initial_geometry(kind, anchor),
        };
        Self { shape, anchor }
    }

    /// Apply one drag frame. Returns false when the geometry did not change.
    pub fn drag(&mut self, current: Point) -> bool {
        let Some(geometry) = strategy::drag_update(&self.shape.geometry, self.anchor, current) else {
            return false;
        };
        self.shape.geometry = geometry;
        true
    }
}
