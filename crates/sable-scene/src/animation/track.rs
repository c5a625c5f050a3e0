//! Keyframe tracks and their compiled samplers.
//!
//! A [`Track`] is the raw, append-order keyframe list one property collected
//! from `when()` calls. [`TrackSampler::compile`] turns it into the form the
//! per-frame path wants: sorted keyframe percents, values normalized against
//! the final keyframe, and the value kind classified once.

use crate::animation::value::{self, Value, ValueKind};
use crate::node::{NodeId, PropertyKey};
use crate::storage::Storage;

#[derive(Debug, Clone)]
pub(crate) struct Keyframe {
    pub time: f64,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub(crate) struct Track {
    pub property: PropertyKey,
    pub keyframes: Vec<Keyframe>,
}

impl Track {
    pub fn new(property: PropertyKey) -> Self {
        Self {
            property,
            keyframes: Vec::new(),
        }
    }

    pub fn push(&mut self, time: f64, value: Value) {
        self.keyframes.push(Keyframe { time, value });
    }
}

/// One property's compiled keyframes, sampled by progress in `[0, 1]`.
#[derive(Debug)]
pub struct TrackSampler {
    property: PropertyKey,
    kind: ValueKind,
    /// Keyframe times as fractions of the track's life, ascending.
    percents: Vec<f64>,
    values: Vec<Value>,
    spline: bool,
    // Sequential playback nearly always lands in the same or the next
    // segment, so the search scans outward from the last hit.
    last_frame: usize,
    last_percent: f64,
}

impl TrackSampler {
    /// Compile a track. Returns the sampler and the track's life in
    /// milliseconds, or `None` for an empty track or one whose keyframes all
    /// hold the same value (unless `force_animate` asks for it anyway).
    pub(crate) fn compile(
        track: Track,
        spline: bool,
        force_animate: bool,
    ) -> Option<(TrackSampler, f64)> {
        let mut keyframes = track.keyframes;
        if keyframes.is_empty() {
            return None;
        }
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        let life = keyframes[keyframes.len() - 1].time;

        // Animating a constant is wasted work.
        let all_equal = keyframes.windows(2).all(|w| w[0].value == w[1].value);
        if all_equal && !force_animate {
            return None;
        }

        let percents = keyframes
            .iter()
            .map(|k| if life > 0.0 { k.time / life } else { 0.0 })
            .collect();
        let mut values: Vec<Value> = keyframes.into_iter().map(|k| k.value).collect();
        let kind = value::classify(&mut values);

        if let ValueKind::Vector(_) = kind {
            if let Some((last, rest)) = values.split_last_mut() {
                for v in rest {
                    value::fill_like(v, last);
                }
            }
        }

        Some((
            TrackSampler {
                property: track.property,
                kind,
                percents,
                values,
                spline,
                last_frame: 0,
                last_percent: 0.0,
            },
            life,
        ))
    }

    pub fn property(&self) -> PropertyKey {
        self.property
    }

    /// Interpolated value at `percent`. `None` when the active segment has
    /// zero length (nothing should be written rather than dividing by zero).
    pub fn sample(&mut self, percent: f64) -> Option<Value> {
        let len = self.percents.len();
        if len < 2 {
            return None;
        }

        // Locate the segment containing `percent`: forward from the cached
        // frame for sequential playback, backward for a seek or a loop
        // wraparound.
        let frame = if percent < 0.0 {
            0
        } else if percent < self.last_percent {
            let mut f = (self.last_frame + 1).min(len - 1);
            while f > 0 && self.percents[f] > percent {
                f -= 1;
            }
            f.min(len - 2)
        } else {
            let mut f = self.last_frame;
            while f < len && self.percents[f] <= percent {
                f += 1;
            }
            f.saturating_sub(1).min(len - 2)
        };
        self.last_frame = frame;
        self.last_percent = percent;

        let range = self.percents[frame + 1] - self.percents[frame];
        if range == 0.0 {
            return None;
        }
        let w = (percent - self.percents[frame]) / range;

        if self.spline {
            let p0 = frame.saturating_sub(1);
            let p2 = (frame + 1).min(len - 1);
            let p3 = (frame + 2).min(len - 1);
            value::spline_interpolate(
                self.kind,
                &self.values[p0],
                &self.values[frame],
                &self.values[p2],
                &self.values[p3],
                w,
            )
        } else {
            value::interpolate(self.kind, &self.values[frame], &self.values[frame + 1], w)
        }
    }

    /// Sample and write the result into the target node.
    pub(crate) fn apply(&mut self, store: &mut Storage, target: NodeId, percent: f64) {
        if let Some(value) = self.sample(percent) {
            if let Some(node) = store.get_mut(target) {
                node.set_property(self.property, &value);
            }
        }
    }
}
