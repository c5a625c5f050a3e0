//! The animator: keyframe declaration and clip compilation for one target.
//!
//! Typical use:
//!
//! ```ignore
//! let mut animator = Animator::new(node);
//! animator
//!     .when(&storage, 0.0, [(PropertyKey::X, 100.0.into())])
//!     .when(&storage, 1000.0, [(PropertyKey::X, 500.0.into())])
//!     .done(|| println!("finished"))
//!     .start(Easing::Linear, false);
//! let id = timeline.add_animator(animator);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::animation::clip::Clip;
use crate::animation::easing::Easing;
use crate::animation::track::{Track, TrackSampler};
use crate::animation::value::Value;
use crate::node::{NodeId, PropertyKey};
use crate::storage::Storage;

/// Unique identifier for an animator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnimatorId(pub u64);

impl AnimatorId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for AnimatorId {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) type DuringFn = Box<dyn FnMut(NodeId, f64)>;
pub(crate) type DoneFn = Box<dyn FnOnce()>;

/// Declares keyframe tracks for one target node and compiles them into
/// clips. Hand the finished animator to [`crate::animation::Timeline::add_animator`].
pub struct Animator {
    id: AnimatorId,
    target: NodeId,
    looping: bool,
    delay: f64,
    gap: f64,
    tracks: Vec<Track>,
    clips: Vec<Clip>,
    during: Vec<DuringFn>,
    done: Vec<DoneFn>,
    started: bool,
}

impl std::fmt::Debug for Animator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animator")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("tracks", &self.tracks.len())
            .field("clips", &self.clips.len())
            .finish()
    }
}

impl Animator {
    pub fn new(target: NodeId) -> Self {
        Self {
            id: AnimatorId::new(),
            target,
            looping: false,
            delay: 0.0,
            gap: 0.0,
            tracks: Vec::new(),
            clips: Vec::new(),
            during: Vec::new(),
            done: Vec::new(),
            started: false,
        }
    }

    pub fn id(&self) -> AnimatorId {
        self.id
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn with_loop(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Delay every compiled clip by `ms`.
    pub fn delay(&mut self, ms: f64) -> &mut Self {
        self.delay = ms;
        self
    }

    /// Idle time between loop iterations.
    pub fn gap(&mut self, ms: f64) -> &mut Self {
        self.gap = ms;
        self
    }

    /// Add a keyframe at `time` for each given property.
    ///
    /// The first keyframe of a new track with `time != 0` also records an
    /// implicit keyframe at time 0 holding a snapshot of the live value, so
    /// the animation starts from wherever the node currently is. Properties
    /// the target cannot provide are skipped with a diagnostic.
    pub fn when(
        &mut self,
        store: &Storage,
        time: f64,
        props: impl IntoIterator<Item = (PropertyKey, Value)>,
    ) -> &mut Self {
        for (key, value) in props {
            let existing = self.tracks.iter().position(|t| t.property == key);
            let index = match existing {
                Some(i) => i,
                None => {
                    let live = store.get(self.target).and_then(|n| n.property(key));
                    let Some(live) = live else {
                        log::warn!("property {key:?} is not readable on the target; skipped");
                        continue;
                    };
                    self.tracks.push(Track::new(key));
                    let i = self.tracks.len() - 1;
                    if time != 0.0 {
                        // `Value` owns its arrays, so the clone is a deep
                        // snapshot of the live state.
                        self.tracks[i].push(0.0, live);
                    }
                    i
                }
            };
            self.tracks[index].push(time, value);
        }
        self
    }

    /// Called with the eased progress on every emitted frame.
    pub fn during(&mut self, f: impl FnMut(NodeId, f64) + 'static) -> &mut Self {
        self.during.push(Box::new(f));
        self
    }

    /// Called exactly once when every compiled clip has finished. A
    /// callback registered after a start that compiled nothing fires on the
    /// spot.
    pub fn done(&mut self, f: impl FnOnce() + 'static) -> &mut Self {
        if self.started && self.clips.is_empty() {
            f();
        } else {
            self.done.push(Box::new(f));
        }
        self
    }

    /// Compile one clip per track. Tracks whose keyframes are all equal are
    /// dropped unless `force_animate` is set; if nothing at all compiles,
    /// the done callbacks fire immediately.
    pub fn start(&mut self, easing: Easing, force_animate: bool) -> &mut Self {
        if self.started {
            log::warn!("animator started twice; ignored");
            return self;
        }
        self.started = true;

        let spline = easing == Easing::Spline;
        for track in self.tracks.drain(..) {
            if let Some((sampler, life)) = TrackSampler::compile(track, spline, force_animate) {
                self.clips.push(Clip {
                    animator: self.id,
                    target: self.target,
                    sampler,
                    life,
                    delay: self.delay,
                    looping: self.looping,
                    gap: self.gap,
                    easing: if spline { Easing::Linear } else { easing },
                    hosts_during: false,
                    start_time: 0.0,
                    initialized: false,
                    paused: false,
                    paused_time: 0.0,
                    needs_remove: false,
                });
            }
        }
        if let Some(last) = self.clips.last_mut() {
            last.hosts_during = true;
        }

        // Upper layers often re-issue animations where nothing changed;
        // finishing instantly keeps their done-chaining working.
        if self.clips.is_empty() {
            for f in self.done.drain(..) {
                f();
            }
        }
        self
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub(crate) fn into_parts(self) -> (AnimatorId, NodeId, Vec<Clip>, Vec<DuringFn>, Vec<DoneFn>) {
        (self.id, self.target, self.clips, self.during, self.done)
    }
}
