//! Prebuilt shape geometry.
//!
//! The engine never constructs geometry itself; displayables and clip shapes
//! are handed a finished `Path` and the engine only ever measures it, clips
//! to it, or asks a surface to fill/stroke it.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Shape geometry a displayable or clip shape carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Path {
    Rect(Rect),
    Ellipse {
        center: [f64; 2],
        radii: [f64; 2],
    },
    /// Point list, closed back to the start when `closed` is set.
    Polygon {
        points: Vec<[f64; 2]>,
        closed: bool,
    },
}

impl Path {
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::Rect(Rect::new(x, y, width, height))
    }

    pub fn circle(cx: f64, cy: f64, radius: f64) -> Self {
        Self::Ellipse {
            center: [cx, cy],
            radii: [radius, radius],
        }
    }

    pub fn polygon(points: Vec<[f64; 2]>) -> Self {
        Self::Polygon {
            points,
            closed: true,
        }
    }

    /// Untransformed bounding rectangle.
    pub fn bounding_rect(&self) -> Rect {
        match self {
            Self::Rect(r) => *r,
            Self::Ellipse { center, radii } => Rect::new(
                center[0] - radii[0],
                center[1] - radii[1],
                radii[0] * 2.0,
                radii[1] * 2.0,
            ),
            Self::Polygon { points, .. } => {
                if points.is_empty() {
                    return Rect::default();
                }
                let mut min = points[0];
                let mut max = points[0];
                for p in &points[1..] {
                    min[0] = min[0].min(p[0]);
                    min[1] = min[1].min(p[1]);
                    max[0] = max[0].max(p[0]);
                    max[1] = max[1].max(p[1]);
                }
                Rect::new(min[0], min[1], max[0] - min[0], max[1] - min[1])
            }
        }
    }
}
