//! The time driver for one compiled track.
//!
//! A clip maps the timeline's logical clock onto a progress value for its
//! sampler: nothing before its delay has elapsed, `[0, 1]` while running,
//! and on reaching 1 either a phase-accurate restart (looping) or a
//! deferred destroy. Pausing accumulates stepped time instead of advancing
//! the clip, so progress freezes without the start offset drifting.

use crate::animation::animator::AnimatorId;
use crate::animation::easing::Easing;
use crate::animation::track::TrackSampler;
use crate::node::NodeId;
use crate::storage::Storage;

/// Lifecycle signal returned from a step, acted on only after the whole
/// batch of clips has stepped for the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClipEvent {
    Restart,
    Destroy,
}

#[derive(Debug, Default)]
pub(crate) struct StepOutcome {
    /// Eased progress, present when the clip emitted a frame this step.
    pub progress: Option<f64>,
    pub event: Option<ClipEvent>,
}

/// One live animation track bound to a time window.
#[derive(Debug)]
pub struct Clip {
    pub(crate) animator: AnimatorId,
    pub(crate) target: NodeId,
    pub(crate) sampler: TrackSampler,
    pub(crate) life: f64,
    pub(crate) delay: f64,
    pub(crate) looping: bool,
    /// Idle time inserted between loop iterations.
    pub(crate) gap: f64,
    pub(crate) easing: Easing,
    /// The animator's `during` callbacks ride on one clip per animator.
    pub(crate) hosts_during: bool,

    pub(crate) start_time: f64,
    pub(crate) initialized: bool,
    pub(crate) paused: bool,
    pub(crate) paused_time: f64,
    pub(crate) needs_remove: bool,
}

impl Clip {
    pub fn animator(&self) -> AnimatorId {
        self.animator
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub(crate) fn needs_remove(&self) -> bool {
        self.needs_remove
    }

    /// Advance to `global_time` (timeline-logical milliseconds) and write the
    /// interpolated value for this step, if any.
    pub(crate) fn step(
        &mut self,
        store: &mut Storage,
        global_time: f64,
        delta: f64,
    ) -> StepOutcome {
        // The start offset is captured on the first step rather than at
        // construction, so clips compiled together share one phase.
        if !self.initialized {
            self.start_time = global_time + self.delay;
            self.initialized = true;
        }

        if self.paused {
            self.paused_time += delta;
            return StepOutcome::default();
        }

        let mut percent = if self.life > 0.0 {
            (global_time - self.start_time - self.paused_time) / self.life
        } else {
            1.0
        };
        // Still inside the delay window.
        if percent < 0.0 {
            return StepOutcome::default();
        }
        percent = percent.min(1.0);

        let eased = self.easing.evaluate(percent);
        self.sampler.apply(store, self.target, eased);

        let event = if percent == 1.0 {
            if self.looping {
                self.restart(global_time);
                Some(ClipEvent::Restart)
            } else {
                self.needs_remove = true;
                Some(ClipEvent::Destroy)
            }
        } else {
            None
        };
        StepOutcome {
            progress: Some(eased),
            event,
        }
    }

    /// Begin the next loop iteration, preserving any tick overshoot so loop
    /// boundaries stay phase-accurate even when a tick lands late.
    fn restart(&mut self, global_time: f64) {
        let remainder = if self.life > 0.0 {
            (global_time - self.start_time - self.paused_time) % self.life
        } else {
            0.0
        };
        self.start_time = global_time - remainder + self.gap;
        self.paused_time = 0.0;
        self.needs_remove = false;
    }

    /// Jump the sampler to its final value, used when an animator is stopped
    /// with `forward_to_last`.
    pub(crate) fn seek_to_end(&mut self, store: &mut Storage) {
        self.sampler.apply(store, self.target, 1.0);
    }
}
