//! Update strategies: per-kind geometry for one frame of a drawing drag.
//!
//! Given the fixed anchor where the gesture started and the current pointer
//! position, each kind computes the full replacement geometry for the draft.
//! All functions are pure.

#[cfg(test)]
#[path = "strategy_test.rs"]
mod strategy_test;

use frames::{Geometry, Point, ShapeKind};

use crate::consts::{TEXT_FONT_SIZE, TEXT_PLACEHOLDER};

/// Geometry of a draft at the moment the pointer goes down.
#[must_use]
pub fn initial_geometry(kind: ShapeKind, anchor: Point) -> Geometry {
    match kind {
        ShapeKind::Rect => Geometry::Rect { x: anchor.x, y: anchor.y, width: 0.0, height: 0.0 },
        ShapeKind::Ellipse => Geometry::Ellipse { x: anchor.x, y: anchor.y, radius_x: 0.0, radius_y: 0.0 },
        ShapeKind::Freehand => Geometry::Freehand { points: vec![anchor.x, anchor.y] },
        ShapeKind::StraightLine => Geometry::StraightLine { points: vec![anchor.x, anchor.y, anchor.x, anchor.y] },
        ShapeKind::Arrow => Geometry::Arrow { points: vec![anchor.x, anchor.y, anchor.x, anchor.y] },
        ShapeKind::Text => Geometry::Text {
            x: anchor.x,
            y: anchor.y,
            text: TEXT_PLACEHOLDER.to_owned(),
            font_size: TEXT_FONT_SIZE,
        },
    }
}

/// Geometry for the current drag frame, or `None` when the kind does not
/// change while dragging (text).
#[must_use]
pub fn drag_update(geometry: &Geometry, anchor: Point, current: Point) -> Option<Geometry> {
    match geometry {
        Geometry::Rect { .. } => Some(Geometry::Rect {
            x: anchor.x,
            y: anchor.y,
            width: current.x - anchor.x,
            height: current.y - anchor.y,
        }),
        Geometry::Ellipse { .. } => Some(Geometry::Ellipse {
            x: (anchor.x + current.x) / 2.0,
            y: (anchor.y + current.y) / 2.0,
            radius_x: (current.x - anchor.x).abs() / 2.0,
            radius_y: (current.y - anchor.y).abs() / 2.0,
        }),
        Geometry::Freehand { points } => {
            let mut points = points.clone();
            points.extend([current.x, current.y]);
            Some(Geometry::Freehand { points })
        }
        Geometry::StraightLine { points } => Some(Geometry::StraightLine { points: segment(points, anchor, current) }),
        Geometry::Arrow { points } => Some(Geometry::Arrow { points: segment(points, anchor, current) }),
        Geometry::Text { .. } => None,
    }
}

/// Overwrite the end point of a two-point segment. A malformed list is
/// rebuilt from the anchor.
fn segment(points: &[f64], anchor: Point, current: Point) -> Vec<f64> {
    let (start_x, start_y) = match points {
        [x, y, _, _] => (*x, *y),
        _ => (anchor.x, anchor.y),
    };
    vec![start_x, start_y, current.x, current.y]
}
