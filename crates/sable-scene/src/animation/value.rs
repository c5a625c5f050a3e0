//! Tagged animatable values and the pure interpolation routines over them.
//!
//! The kind of a track's values is classified exactly once when the track is
//! compiled ([`classify`]); from then on every frame dispatches on a
//! [`ValueKind`] tag instead of re-inspecting values.

use sable_surface::Rgba;
use serde::{Deserialize, Serialize};

/// One animatable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    /// Flat array, e.g. a position or scale pair.
    Vec1(Vec<f64>),
    /// Array of points, e.g. polygon vertices for morphing.
    Vec2(Vec<[f64; 2]>),
    /// Color channels `[r, g, b, a]` with RGB in 0–255 and alpha in 0–1.
    Color([f64; 4]),
    /// Opaque string; never numerically interpolated.
    Text(String),
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Vec1(v)
    }
}

impl From<Vec<[f64; 2]>> for Value {
    fn from(v: Vec<[f64; 2]>) -> Self {
        Self::Vec2(v)
    }
}

impl From<Rgba> for Value {
    fn from(c: Rgba) -> Self {
        Self::Color(c.channels())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Interpolation strategy for a compiled track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    /// Array values of the given dimension (1 = flat, 2 = point list).
    Vector(u8),
    Color,
    /// No numeric interpolation; output steps between endpoints.
    Discrete,
}

/// Classify a keyframe value set, converting color-like strings to
/// [`Value::Color`] in place so the per-frame path never parses.
///
/// Any string that does not parse as a color makes the whole track discrete.
pub fn classify(values: &mut [Value]) -> ValueKind {
    let mut has_color = false;
    for value in values.iter_mut() {
        match value {
            Value::Text(s) => match Rgba::parse(s) {
                Some(c) => {
                    *value = Value::Color(c.channels());
                    has_color = true;
                }
                None => return ValueKind::Discrete,
            },
            Value::Color(_) => has_color = true,
            _ => {}
        }
    }
    if has_color {
        return ValueKind::Color;
    }
    // Array dimension follows the final keyframe, which earlier frames are
    // normalized against.
    match values.last() {
        Some(Value::Vec2(_)) => ValueKind::Vector(2),
        Some(Value::Vec1(_)) => ValueKind::Vector(1),
        _ => ValueKind::Scalar,
    }
}

/// Pad or truncate an array value to the shape of `template`, and replace
/// non-finite "hole" entries with the template's entry.
pub fn fill_like(value: &mut Value, template: &Value) {
    match (value, template) {
        (Value::Vec1(v), Value::Vec1(t)) => {
            if v.len() < t.len() {
                v.extend_from_slice(&t[v.len()..]);
            } else {
                v.truncate(t.len());
            }
            for (x, tx) in v.iter_mut().zip(t) {
                if !x.is_finite() {
                    *x = *tx;
                }
            }
        }
        (Value::Vec2(v), Value::Vec2(t)) => {
            if v.len() < t.len() {
                v.extend_from_slice(&t[v.len()..]);
            } else {
                v.truncate(t.len());
            }
            for (p, tp) in v.iter_mut().zip(t) {
                for axis in 0..2 {
                    if !p[axis].is_finite() {
                        p[axis] = tp[axis];
                    }
                }
            }
        }
        _ => {}
    }
}

#[inline]
fn lerp(p0: f64, p1: f64, w: f64) -> f64 {
    (p1 - p0) * w + p0
}

/// Catmull-Rom basis through `p1..p2` with neighbors `p0`, `p3`.
fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64, t2: f64, t3: f64) -> f64 {
    let v0 = (p2 - p0) * 0.5;
    let v1 = (p3 - p1) * 0.5;
    (2.0 * (p1 - p2) + v0 + v1) * t3 + (-3.0 * (p1 - p2) - 2.0 * v0 - v1) * t2 + v0 * t + p1
}

fn floor_rgb(mut c: [f64; 4]) -> [f64; 4] {
    c[0] = c[0].floor();
    c[1] = c[1].floor();
    c[2] = c[2].floor();
    c
}

/// Linear interpolation between two keyframe values at in-segment weight `w`.
///
/// Discrete values step to the far endpoint at the segment midpoint. Returns
/// `None` when the value shapes do not match the kind.
pub fn interpolate(kind: ValueKind, from: &Value, to: &Value, w: f64) -> Option<Value> {
    match (kind, from, to) {
        (ValueKind::Scalar, Value::Number(a), Value::Number(b)) => {
            Some(Value::Number(lerp(*a, *b, w)))
        }
        (ValueKind::Vector(1), Value::Vec1(a), Value::Vec1(b)) => Some(Value::Vec1(
            a.iter().zip(b).map(|(x, y)| lerp(*x, *y, w)).collect(),
        )),
        (ValueKind::Vector(2), Value::Vec2(a), Value::Vec2(b)) => Some(Value::Vec2(
            a.iter()
                .zip(b)
                .map(|(p, q)| [lerp(p[0], q[0], w), lerp(p[1], q[1], w)])
                .collect(),
        )),
        (ValueKind::Color, Value::Color(a), Value::Color(b)) => {
            let mut out = [0.0; 4];
            for i in 0..4 {
                out[i] = lerp(a[i], b[i], w);
            }
            Some(Value::Color(floor_rgb(out)))
        }
        (ValueKind::Discrete, _, _) => Some(if w > 0.5 { to.clone() } else { from.clone() }),
        _ => None,
    }
}

/// Catmull-Rom interpolation across the segment `p1..p2` with neighbor
/// keyframes `p0` and `p3` as control points.
pub fn spline_interpolate(
    kind: ValueKind,
    p0: &Value,
    p1: &Value,
    p2: &Value,
    p3: &Value,
    w: f64,
) -> Option<Value> {
    let (t, t2, t3) = (w, w * w, w * w * w);
    match (kind, p0, p1, p2, p3) {
        (ValueKind::Scalar, Value::Number(a), Value::Number(b), Value::Number(c), Value::Number(d)) => {
            Some(Value::Number(catmull_rom(*a, *b, *c, *d, t, t2, t3)))
        }
        (ValueKind::Vector(1), Value::Vec1(a), Value::Vec1(b), Value::Vec1(c), Value::Vec1(d)) => {
            Some(Value::Vec1(
                b.iter()
                    .enumerate()
                    .map(|(i, bv)| {
                        let get = |v: &Vec<f64>| v.get(i).copied().unwrap_or(*bv);
                        catmull_rom(get(a), *bv, get(c), get(d), t, t2, t3)
                    })
                    .collect(),
            ))
        }
        (ValueKind::Vector(2), Value::Vec2(a), Value::Vec2(b), Value::Vec2(c), Value::Vec2(d)) => {
            Some(Value::Vec2(
                b.iter()
                    .enumerate()
                    .map(|(i, bp)| {
                        let get = |v: &Vec<[f64; 2]>, axis: usize| {
                            v.get(i).map_or(bp[axis], |p| p[axis])
                        };
                        [
                            catmull_rom(get(a, 0), bp[0], get(c, 0), get(d, 0), t, t2, t3),
                            catmull_rom(get(a, 1), bp[1], get(c, 1), get(d, 1), t, t2, t3),
                        ]
                    })
                    .collect(),
            ))
        }
        (ValueKind::Color, Value::Color(a), Value::Color(b), Value::Color(c), Value::Color(d)) => {
            let mut out = [0.0; 4];
            for i in 0..4 {
                out[i] = catmull_rom(a[i], b[i], c[i], d[i], t, t2, t3);
            }
            Some(Value::Color(floor_rgb(out)))
        }
        (ValueKind::Discrete, _, _, _, _) => {
            Some(if w > 0.5 { p2.clone() } else { p1.clone() })
        }
        _ => None,
    }
}
