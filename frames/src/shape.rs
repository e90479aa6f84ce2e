//! Shape model: drawn elements and their per-kind geometry.
//!
//! DESIGN
//! ======
//! A shape's kind is not stored next to its geometry; it is the geometry's
//! variant. Geometry is only ever replaced as a whole value, so merging a
//! remote update is a plain assignment and never a field-by-field patch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Opaque, board-unique shape identifier. Assigned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShapeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ShapeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point in board coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// =============================================================================
// KIND + GEOMETRY
// =============================================================================

/// The six drawable tool kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rect,
    Ellipse,
    Freehand,
    StraightLine,
    Arrow,
    Text,
}

/// Per-kind geometry. Serialized with a `tool` tag alongside the shape's
/// common attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum Geometry {
    /// Anchored at `(x, y)`. Width and height are signed: a drag up and to the
    /// left yields negative values.
    Rect { x: f64, y: f64, width: f64, height: f64 },
    /// Centred at `(x, y)`.
    Ellipse { x: f64, y: f64, radius_x: f64, radius_y: f64 },
    /// Flat `[x0, y0, x1, y1, ...]`, grows on every drag frame.
    Freehand { points: Vec<f64> },
    /// Flat `[x0, y0, x1, y1]`.
    StraightLine { points: Vec<f64> },
    /// Flat `[x0, y0, x1, y1]`; the head is drawn at the second point.
    Arrow { points: Vec<f64> },
    Text { x: f64, y: f64, text: String, font_size: f64 },
}

impl Geometry {
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Rect { .. } => ShapeKind::Rect,
            Self::Ellipse { .. } => ShapeKind::Ellipse,
            Self::Freehand { .. } => ShapeKind::Freehand,
            Self::StraightLine { .. } => ShapeKind::StraightLine,
            Self::Arrow { .. } => ShapeKind::Arrow,
            Self::Text { .. } => ShapeKind::Text,
        }
    }

    /// The flat point list of a line-like geometry, `None` for other kinds.
    #[must_use]
    pub fn points(&self) -> Option<&[f64]> {
        match self {
            Self::Freehand { points } | Self::StraightLine { points } | Self::Arrow { points } => Some(points),
            Self::Rect { .. } | Self::Ellipse { .. } | Self::Text { .. } => None,
        }
    }

    /// Coordinate pairs of a line-like geometry. A trailing odd value is ignored.
    #[must_use]
    pub fn point_pairs(&self) -> Vec<Point> {
        self.points()
            .map(|flat| {
                flat.chunks_exact(2)
                    .map(|pair| Point::new(pair[0], pair[1]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Return this geometry shifted by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let shift = |flat: &[f64]| -> Vec<f64> {
            flat.iter()
                .enumerate()
                .map(|(i, v)| if i % 2 == 0 { v + dx } else { v + dy })
                .collect()
        };
        match self {
            Self::Rect { x, y, width, height } => Self::Rect { x: x + dx, y: y + dy, width: *width, height: *height },
            Self::Ellipse { x, y, radius_x, radius_y } => {
                Self::Ellipse { x: x + dx, y: y + dy, radius_x: *radius_x, radius_y: *radius_y }
            }
            Self::Freehand { points } => Self::Freehand { points: shift(points) },
            Self::StraightLine { points } => Self::StraightLine { points: shift(points) },
            Self::Arrow { points } => Self::Arrow { points: shift(points) },
            Self::Text { x, y, text, font_size } => {
                Self::Text { x: x + dx, y: y + dy, text: text.clone(), font_size: *font_size }
            }
        }
    }
}

// =============================================================================
// SHAPE
// =============================================================================

/// A drawn element, draft or committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: ShapeId,
    /// Stroke colour as a CSS colour string.
    pub stroke: String,
    pub stroke_width: f64,
    /// Fill colour. Text and line-like shapes use the stroke colour here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(flatten)]
    pub geometry: Geometry,
}

impl Shape {
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        self.geometry.kind()
    }

    /// Same shape with its geometry replaced.
    #[must_use]
    pub fn with_geometry(&self, geometry: Geometry) -> Self {
        Self { geometry, ..self.clone() }
    }

    /// Same text shape with new content. `None` if this is not a text shape.
    #[must_use]
    pub fn with_text(&self, content: impl Into<String>) -> Option<Self> {
        let Geometry::Text { x, y, font_size, .. } = &self.geometry else {
            return None;
        };
        Some(self.with_geometry(Geometry::Text { x: *x, y: *y, text: content.into(), font_size: *font_size }))
    }

    /// Same shape moved by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        self.with_geometry(self.geometry.translated(dx, dy))
    }
}

#[cfg(test)]
#[path = "shape_test.rs"]
mod tests;
