//! 2D affine transforms and axis-aligned rectangles.
//!
//! `Transform2D` is stored as a 3x2 matrix (the bottom row `[0, 0, 1]` is
//! implicit):
//!
//! ```text
//! | a  c  tx |
//! | b  d  ty |
//! | 0  0  1  |
//! ```

use serde::{Deserialize, Serialize};

/// A 2D affine transformation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform2D {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// A pure translation.
    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            tx,
            ty,
        }
    }

    /// A non-uniform scale around the origin.
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// A rotation around the origin, in radians.
    pub fn rotate(angle_rad: f64) -> Self {
        let cos = angle_rad.cos();
        let sin = angle_rad.sin();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Build a local transform from decomposed parts.
    ///
    /// Applied in the usual retained-graphics order: the shape is moved so
    /// `origin` sits at the pivot, scaled, rotated, moved back, then
    /// translated by `position`.
    pub fn from_parts(
        position: [f64; 2],
        scale: [f64; 2],
        rotation: f64,
        origin: [f64; 2],
    ) -> Self {
        let mut m = Self::translate(-origin[0], -origin[1]);
        m = Self::scale(scale[0], scale[1]).then(&m);
        if rotation != 0.0 {
            m = Self::rotate(rotation).then(&m);
        }
        m = Self::translate(origin[0], origin[1]).then(&m);
        Self::translate(position[0], position[1]).then(&m)
    }

    /// Compose this transform with another (`self * other`).
    ///
    /// The result applies `other` first, then `self`.
    pub fn then(&self, other: &Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            tx: self.a * other.tx + self.c * other.ty + self.tx,
            ty: self.b * other.tx + self.d * other.ty + self.ty,
        }
    }

    /// Apply this transform to a point.
    pub fn apply_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// Invert the transform. `None` when the determinant is zero.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() <= f64::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Self {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            tx: (self.c * self.ty - self.d * self.tx) * inv,
            ty: (self.b * self.tx - self.a * self.ty) * inv,
        })
    }

    /// True when both axes collapse to zero scale.
    ///
    /// Some raster backends corrupt their transform state when asked to set a
    /// doubly-degenerate matrix, so callers skip such elements entirely.
    pub fn is_zero_scale(&self) -> bool {
        self.a == 0.0 && self.d == 0.0
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Smallest rectangle covering both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect {
            x,
            y,
            width: (self.x + self.width).max(other.x + other.width) - x,
            height: (self.y + self.height).max(other.y + other.height) - y,
        }
    }

    /// Whether the two rectangles overlap (touching edges count).
    pub fn intersects(&self, other: &Rect) -> bool {
        other.x <= self.x + self.width
            && other.x + other.width >= self.x
            && other.y <= self.y + self.height
            && other.y + other.height >= self.y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    /// The bounding box of this rectangle under an affine transform.
    ///
    /// Transforms all four corners and takes the axis-aligned extent, so
    /// rotated rectangles come back conservatively larger.
    pub fn transformed(&self, m: &Transform2D) -> Rect {
        let corners = [
            m.apply_point(self.x, self.y),
            m.apply_point(self.x + self.width, self.y),
            m.apply_point(self.x, self.y + self.height),
            m.apply_point(self.x + self.width, self.y + self.height),
        ];
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for (x, y) in corners {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}
