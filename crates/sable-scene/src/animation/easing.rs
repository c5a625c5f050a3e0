//! Easing functions for animation timing.
//!
//! The CSS timing-function family plus [`Easing::Spline`], which selects
//! Catmull-Rom interpolation across a whole track instead of shaping the
//! progress of each segment.

use serde::{Deserialize, Serialize};

/// Where the jump happens in a stepped easing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPosition {
    /// Jump at the start of each interval (CSS `jump-start`).
    Start,
    /// Jump at the end of each interval (CSS `jump-end`).
    End,
}

impl Default for StepPosition {
    fn default() -> Self {
        Self::End
    }
}

/// Maps linear progress in `[0, 1]` to eased progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Easing {
    Linear,

    /// CSS `ease`: `cubic-bezier(0.25, 0.1, 0.25, 1.0)`.
    Ease,

    /// CSS `ease-in`: `cubic-bezier(0.42, 0, 1, 1)`.
    EaseIn,

    /// CSS `ease-out`: `cubic-bezier(0, 0, 0.58, 1)`.
    EaseOut,

    /// CSS `ease-in-out`: `cubic-bezier(0.42, 0, 0.58, 1)`.
    EaseInOut,

    /// Custom cubic bezier. The x control values must stay in `[0, 1]`; y
    /// values may overshoot.
    CubicBezier { x1: f64, y1: f64, x2: f64, y2: f64 },

    /// Discrete jumps; `count` must be at least 1.
    Steps { count: u32, position: StepPosition },

    /// Linear timing, but the track interpolates through its keyframes with
    /// a Catmull-Rom spline instead of straight segments.
    Spline,
}

impl Default for Easing {
    fn default() -> Self {
        Self::Linear
    }
}

impl Easing {
    /// Evaluate at progress `t`. Input is clamped to `[0, 1]`; output may
    /// leave that range for overshooting bezier curves.
    pub fn evaluate(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear | Self::Spline => t,
            Self::Ease => cubic_bezier(0.25, 0.1, 0.25, 1.0, t),
            Self::EaseIn => cubic_bezier(0.42, 0.0, 1.0, 1.0, t),
            Self::EaseOut => cubic_bezier(0.0, 0.0, 0.58, 1.0, t),
            Self::EaseInOut => cubic_bezier(0.42, 0.0, 0.58, 1.0, t),
            Self::CubicBezier { x1, y1, x2, y2 } => cubic_bezier(*x1, *y1, *x2, *y2, t),
            Self::Steps { count, position } => stepped(*count, *position, t),
        }
    }
}

/// Evaluate a cubic bezier timing curve at `progress`, solving for the curve
/// parameter with Newton-Raphson iteration.
fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64, progress: f64) -> f64 {
    if progress <= 0.0 {
        return 0.0;
    }
    if progress >= 1.0 {
        return 1.0;
    }
    let t = solve_bezier_x(x1, x2, progress);
    bezier_axis(y1, y2, t)
}

fn solve_bezier_x(x1: f64, x2: f64, target_x: f64) -> f64 {
    let mut t = target_x;
    for _ in 0..8 {
        let x = bezier_axis(x1, x2, t) - target_x;
        if x.abs() < 1e-7 {
            break;
        }
        let dx = bezier_derivative(x1, x2, t);
        if dx.abs() < 1e-7 {
            break;
        }
        t = (t - x / dx).clamp(0.0, 1.0);
    }
    t
}

/// One axis of the curve: `3(1-t)²t·c1 + 3(1-t)t²·c2 + t³`.
#[inline]
fn bezier_axis(c1: f64, c2: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * t * c1 + 3.0 * mt * t * t * c2 + t * t * t
}

#[inline]
fn bezier_derivative(c1: f64, c2: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * c1 + 6.0 * mt * t * (c2 - c1) + 3.0 * t * t * (1.0 - c2)
}

fn stepped(count: u32, position: StepPosition, t: f64) -> f64 {
    if count == 0 {
        return t;
    }
    let steps = f64::from(count);
    match position {
        StepPosition::Start => (t * steps).ceil() / steps,
        StepPosition::End => ((t * steps).floor() / steps).min(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 0.001;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_linear_is_identity() {
        for t in [0.0, 0.25, 0.5, 0.75, 1.0] {
            assert!(approx_eq(Easing::Linear.evaluate(t), t));
        }
    }

    #[test]
    fn test_spline_times_linearly() {
        assert!(approx_eq(Easing::Spline.evaluate(0.4), 0.4));
    }

    #[test]
    fn test_ease_endpoints_and_monotonicity() {
        let ease = Easing::Ease;
        assert!(approx_eq(ease.evaluate(0.0), 0.0));
        assert!(approx_eq(ease.evaluate(1.0), 1.0));
        let (early, mid, late) = (ease.evaluate(0.25), ease.evaluate(0.5), ease.evaluate(0.75));
        assert!(early < mid && mid < late);
        // CSS ease crosses ~0.8 at the halfway point.
        assert!(mid > 0.7 && mid < 0.9);
    }

    #[test]
    fn test_ease_in_starts_slow() {
        assert!(Easing::EaseIn.evaluate(0.25) < 0.25);
        assert!(Easing::EaseIn.evaluate(0.5) < 0.5);
    }

    #[test]
    fn test_ease_out_starts_fast() {
        assert!(Easing::EaseOut.evaluate(0.25) > 0.25);
        assert!(Easing::EaseOut.evaluate(0.5) > 0.5);
    }

    #[test]
    fn test_steps_end_position() {
        let steps = Easing::Steps {
            count: 4,
            position: StepPosition::End,
        };
        assert!(approx_eq(steps.evaluate(0.1), 0.0));
        assert!(approx_eq(steps.evaluate(0.26), 0.25));
        assert!(approx_eq(steps.evaluate(1.0), 1.0));
    }

    #[test]
    fn test_steps_start_position() {
        let steps = Easing::Steps {
            count: 4,
            position: StepPosition::Start,
        };
        assert!(approx_eq(steps.evaluate(0.1), 0.25));
        assert!(approx_eq(steps.evaluate(0.0), 0.0));
    }

    #[test]
    fn test_input_is_clamped() {
        assert!(approx_eq(Easing::Linear.evaluate(1.5), 1.0));
        assert!(approx_eq(Easing::Linear.evaluate(-0.5), 0.0));
    }
}
