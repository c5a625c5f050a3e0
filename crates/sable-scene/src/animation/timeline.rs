//! The timeline: logical clock plus the registry of live clips.
//!
//! One `update` call is one tick. All clips step first (writing interpolated
//! values into the store), removals are compacted out, and only then do
//! lifecycle callbacks fire, followed by the host's per-tick hook and the
//! generic frame listeners. Nothing observes a half-stepped batch.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use crate::animation::animator::{Animator, AnimatorId, DoneFn, DuringFn};
use crate::animation::clip::{Clip, ClipEvent};
use crate::node::NodeId;
use crate::storage::Storage;

/// Monotonic time source in milliseconds.
///
/// Injected so hosts can substitute a deterministic clock; the timeline
/// never samples wall time directly.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Default clock backed by [`Instant`].
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock. Clones share the same time cell.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: f64) {
        self.time.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.time.set(self.time.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.time.get()
    }
}

struct AnimatorEntry {
    target: NodeId,
    live: usize,
    during: Vec<DuringFn>,
    done: Vec<DoneFn>,
}

/// Global scheduler for every active clip.
pub struct Timeline {
    clips: Vec<Clip>,
    entries: HashMap<AnimatorId, AnimatorEntry>,
    clock: Box<dyn Clock>,
    running: bool,
    paused: bool,
    /// Logical time of the previous tick.
    time: f64,
    /// Total time spent paused; logical time is wall time minus this.
    paused_time: f64,
    pause_start: f64,
    tick_hook: Option<Box<dyn FnMut(&mut Storage)>>,
    frame_listeners: Vec<Box<dyn FnMut(f64)>>,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("clips", &self.clips.len())
            .field("animators", &self.entries.len())
            .field("running", &self.running)
            .field("paused", &self.paused)
            .finish()
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            clips: Vec::new(),
            entries: HashMap::new(),
            clock,
            running: false,
            paused: false,
            time: 0.0,
            paused_time: 0.0,
            pause_start: 0.0,
            tick_hook: None,
            frame_listeners: Vec::new(),
        }
    }

    /// Begin advancing time. Resets the paused-time accumulator.
    pub fn start(&mut self) {
        self.time = self.clock.now_ms();
        self.paused_time = 0.0;
        self.paused = false;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Freeze logical time. Ticks while paused do nothing.
    pub fn pause(&mut self) {
        if !self.paused {
            self.pause_start = self.clock.now_ms();
            self.paused = true;
        }
    }

    /// Unfreeze; the pause duration is folded into the accumulator so
    /// logical time continues exactly where it stopped.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused_time += self.clock.now_ms() - self.pause_start;
            self.paused = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Host hook run once per tick, after every clip has stepped and
    /// lifecycle callbacks have fired. Typically triggers the repaint.
    pub fn set_tick_hook(&mut self, hook: impl FnMut(&mut Storage) + 'static) {
        self.tick_hook = Some(Box::new(hook));
    }

    /// Listener for the generic end-of-tick frame event; receives the tick
    /// delta in milliseconds.
    pub fn on_frame(&mut self, listener: impl FnMut(f64) + 'static) {
        self.frame_listeners.push(Box::new(listener));
    }

    /// Move a started animator's clips into the registry. Returns the id
    /// used for later removal or stop.
    pub fn add_animator(&mut self, animator: Animator) -> AnimatorId {
        let (id, target, clips, during, done) = animator.into_parts();
        if clips.is_empty() {
            log::debug!("animator {id:?} has no live clips; nothing registered");
            return id;
        }
        self.entries.insert(
            id,
            AnimatorEntry {
                target,
                live: clips.len(),
                during,
                done,
            },
        );
        self.clips.extend(clips);
        id
    }

    /// Drop an animator's clips without firing its callbacks. Unknown ids
    /// are a no-op. Takes effect immediately; a tick already under way is
    /// unaffected because removal never runs mid-step.
    pub fn remove_animator(&mut self, id: AnimatorId) {
        self.clips.retain(|c| c.animator() != id);
        self.entries.remove(&id);
    }

    /// Stop an animator, optionally seeking every clip to its final value
    /// first.
    pub fn stop_animator(&mut self, id: AnimatorId, forward_to_last: bool, store: &mut Storage) {
        if forward_to_last {
            for clip in self.clips.iter_mut().filter(|c| c.animator() == id) {
                clip.seek_to_end(store);
            }
        }
        self.remove_animator(id);
    }

    pub fn pause_animator(&mut self, id: AnimatorId) {
        for clip in self.clips.iter_mut().filter(|c| c.animator() == id) {
            clip.pause();
        }
    }

    pub fn resume_animator(&mut self, id: AnimatorId) {
        for clip in self.clips.iter_mut().filter(|c| c.animator() == id) {
            clip.resume();
        }
    }

    /// Remove every clip and entry.
    pub fn clear(&mut self) {
        self.clips.clear();
        self.entries.clear();
    }

    /// One tick: step every clip against logical time, compact removals,
    /// fire deferred lifecycle events, then the tick hook and frame
    /// listeners.
    pub fn update(&mut self, store: &mut Storage) {
        if !self.running || self.paused {
            return;
        }
        let time = self.clock.now_ms() - self.paused_time;
        let delta = time - self.time;

        let mut deferred: Vec<(AnimatorId, ClipEvent)> = Vec::new();
        for i in 0..self.clips.len() {
            let outcome = self.clips[i].step(store, time, delta);
            if let Some(progress) = outcome.progress {
                if self.clips[i].hosts_during {
                    if let Some(entry) = self.entries.get_mut(&self.clips[i].animator()) {
                        let target = entry.target;
                        for f in &mut entry.during {
                            f(target, progress);
                        }
                    }
                }
            }
            if let Some(event) = outcome.event {
                deferred.push((self.clips[i].animator(), event));
            }
        }

        // Swap-with-last compaction keeps removal O(1) per finished clip.
        let mut i = 0;
        while i < self.clips.len() {
            if self.clips[i].needs_remove() {
                self.clips.swap_remove(i);
            } else {
                i += 1;
            }
        }

        for (animator, event) in deferred {
            if event == ClipEvent::Destroy {
                if let Some(entry) = self.entries.get_mut(&animator) {
                    entry.live -= 1;
                    if entry.live == 0 {
                        if let Some(entry) = self.entries.remove(&animator) {
                            for f in entry.done {
                                f();
                            }
                        }
                    }
                }
            }
        }

        self.time = time;

        if let Some(hook) = &mut self.tick_hook {
            hook(store);
        }
        for listener in &mut self.frame_listeners {
            listener(delta);
        }
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}
