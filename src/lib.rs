//! sable: a retained-mode 2D rendering engine.
//!
//! Clients build a persistent tree of drawable nodes, mutate their
//! properties over time (directly or through keyframe animators), and the
//! engine decides what must be redrawn, composites onto a bounded set of
//! layered raster surfaces, and advances time-based property interpolation
//! each frame.
//!
//! [`Engine`] wires the three subsystems together:
//! - the scene-graph store ([`Storage`]) turns the tree into an ordered,
//!   dirty-aware draw list
//! - the display engine ([`Painter`]) maps that list onto layers with
//!   incremental and progressive redraw
//! - the animation timeline ([`Timeline`]) steps every live clip once per
//!   host tick and writes interpolated values back into the scene graph
//!
//! Per host frame, call [`Engine::update`]: clip steps land their values in
//! the scene graph and mark nodes dirty, then the painter repaints exactly
//! the layers that need it. When the host honors a frame the painter
//! requested (progressive backlogs), call [`Engine::on_scheduled_frame`].

use anyhow::{Result, ensure};

pub use sable_config::{AnimationConfig, CanvasConfig, ConfigError, SableConfig};
pub use sable_render::{
    HOVER_ZLEVEL, HoverMirror, Layer, LayerConfig, MAX_PROGRESSIVE_LAYERS, Painter,
    SingleSurfaceOptions,
};
pub use sable_scene::animation::{
    Animator, AnimatorId, Clock, Easing, ManualClock, StepPosition, SystemClock, Timeline, Value,
    ValueKind,
};
pub use sable_scene::{Node, NodeId, PropertyKey, Storage, Style};
pub use sable_surface::{
    FrameScheduler, ManualScheduler, Path, PremulRgba, Rect, RecordingFactory, RecordingSurface,
    Rgba, Surface, SurfaceError, SurfaceFactory, SurfaceId, SurfaceOp, Transform2D,
};

/// The assembled engine: store, painter and timeline behind one handle.
pub struct Engine {
    storage: Storage,
    painter: Painter,
    timeline: Timeline,
}

impl Engine {
    /// Build an engine from a configuration, a surface factory and the
    /// host's frame scheduler.
    pub fn new(
        factory: Box<dyn SurfaceFactory>,
        scheduler: Box<dyn FrameScheduler>,
        config: &SableConfig,
    ) -> Result<Self> {
        Self::with_clock(factory, scheduler, config, Box::new(SystemClock::new()))
    }

    /// Same as [`Engine::new`] with an injected clock, so hosts and tests
    /// can drive logical time themselves.
    pub fn with_clock(
        factory: Box<dyn SurfaceFactory>,
        scheduler: Box<dyn FrameScheduler>,
        config: &SableConfig,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let canvas = &config.canvas;
        ensure!(
            canvas.width > 0 && canvas.height > 0,
            "canvas size {}x{} is not drawable",
            canvas.width,
            canvas.height
        );
        ensure!(
            canvas.device_pixel_ratio > 0.0,
            "device pixel ratio must be positive"
        );

        let mut painter = Painter::new(
            factory,
            scheduler,
            canvas.width,
            canvas.height,
            canvas.device_pixel_ratio,
        );
        if let Some(color) = canvas.clear_color {
            painter.configure_layer(
                0,
                LayerConfig {
                    clear_color: Some(color.to_premul()),
                },
            );
        }

        let mut timeline = Timeline::with_clock(clock);
        if config.animation.autostart {
            timeline.start();
        }

        Ok(Self {
            storage: Storage::new(),
            painter,
            timeline,
        })
    }

    pub fn storage(&mut self) -> &mut Storage {
        &mut self.storage
    }

    pub fn painter(&mut self) -> &mut Painter {
        &mut self.painter
    }

    pub fn timeline(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    /// Add a node to the scene's root set.
    pub fn add(&mut self, id: NodeId) {
        self.storage.add_root(id);
    }

    /// Remove a root and destroy its subtree.
    pub fn remove(&mut self, id: NodeId) {
        self.storage.remove_root(id);
    }

    /// Start declaring a keyframe animation against a node. Register the
    /// finished animator with [`Engine::add_animator`].
    pub fn animate(&self, target: NodeId) -> Animator {
        Animator::new(target)
    }

    /// Register a started animator's clips with the timeline.
    pub fn add_animator(&mut self, animator: Animator) -> AnimatorId {
        self.timeline.add_animator(animator)
    }

    pub fn remove_animator(&mut self, id: AnimatorId) {
        self.timeline.remove_animator(id);
    }

    /// One host frame: advance every live clip, then repaint what changed.
    pub fn update(&mut self) {
        self.timeline.update(&mut self.storage);
        self.painter.refresh(&mut self.storage, false);
    }

    /// Repaint without advancing animation.
    pub fn refresh(&mut self, paint_all: bool) {
        self.painter.refresh(&mut self.storage, paint_all);
    }

    /// Deliver a frame the painter requested through the scheduler
    /// (progressive backlog continuation).
    pub fn on_scheduled_frame(&mut self) {
        self.painter.on_frame(&mut self.storage);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.painter.resize(&mut self.storage, width, height);
    }

    /// Composite the whole scene onto one fresh surface.
    pub fn render_to_single_surface(
        &mut self,
        options: SingleSurfaceOptions,
    ) -> Option<Box<dyn Surface>> {
        self.painter.render_to_single_surface(&mut self.storage, options)
    }

    /// Tear the engine down. Terminal; the painter rejects further work.
    pub fn dispose(&mut self) {
        self.timeline.stop();
        self.timeline.clear();
        self.painter.dispose();
        self.storage.clear();
    }
}
