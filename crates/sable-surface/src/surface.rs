//! The raster-surface contract and a software implementation.
//!
//! A `Surface` is one raster target: a canvas, a texture, or (here) a command
//! log. The painter drives surfaces exclusively through this trait, so the
//! whole engine can run headless. `RecordingSurface` keeps the commands it
//! was issued since the last clear, which doubles as the software backend's
//! frame content and as the observation point for tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::color::PremulRgba;
use crate::geometry::Transform2D;
use crate::path::Path;

/// Unique identifier for a surface instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    /// Generate a new unique surface ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from surface creation.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("backend error: {0}")]
    Backend(String),
}

/// One recorded drawing or state command.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Clear(Option<PremulRgba>),
    Save,
    Restore,
    SetTransform(Transform2D),
    SetGlobalAlpha(f32),
    ClipPath(Path),
    FillPath { path: Path, color: PremulRgba },
    StrokePath { path: Path, color: PremulRgba, width: f64 },
    /// Blit another surface's content onto this one.
    DrawSurface { source: SurfaceId, scale: f64 },
    Present,
}

/// Contract a raster target must satisfy to serve as a layer.
pub trait Surface {
    fn id(&self) -> SurfaceId;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn resize(&mut self, width: u32, height: u32);
    /// Erase all content, optionally filling with a color.
    fn clear(&mut self, color: Option<PremulRgba>);
    /// Flush content to the host (a present/swap on real backends).
    fn present(&mut self);

    fn save(&mut self);
    fn restore(&mut self);
    fn set_transform(&mut self, transform: &Transform2D);
    fn set_global_alpha(&mut self, alpha: f32);
    /// Intersect the current clip region with a path.
    fn clip_path(&mut self, path: &Path);
    fn fill_path(&mut self, path: &Path, color: PremulRgba);
    fn stroke_path(&mut self, path: &Path, color: PremulRgba, width: f64);
    /// Draw another surface's content, scaled by `scale`.
    fn draw_surface(&mut self, source: SurfaceId, scale: f64);
}

/// Creates surfaces for built-in layers.
pub trait SurfaceFactory {
    fn create_surface(&mut self, width: u32, height: u32)
    -> Result<Box<dyn Surface>, SurfaceError>;
}

/// Host vsync collaborator: asks the host to deliver one more frame callback.
pub trait FrameScheduler {
    fn request_frame(&mut self);
}

/// A `FrameScheduler` that just counts requests, for headless hosts that pump
/// frames themselves.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    pending: Rc<RefCell<usize>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frame requests not yet taken.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Consume one pending request; returns false when none are queued.
    pub fn take(&mut self) -> bool {
        let mut pending = self.pending.borrow_mut();
        if *pending > 0 {
            *pending -= 1;
            true
        } else {
            false
        }
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) {
        *self.pending.borrow_mut() += 1;
    }
}

#[derive(Debug)]
struct RecordInner {
    width: u32,
    height: u32,
    ops: Vec<SurfaceOp>,
    save_depth: usize,
}

/// Software surface recording every command it is issued.
///
/// Cloning yields another handle to the same surface, so a factory can keep
/// one for inspection while the painter owns the other.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    id: SurfaceId,
    inner: Rc<RefCell<RecordInner>>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: SurfaceId::new(),
            inner: Rc::new(RefCell::new(RecordInner {
                width,
                height,
                ops: Vec::new(),
                save_depth: 0,
            })),
        }
    }

    /// Snapshot of the commands recorded since the last clear.
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.inner.borrow().ops.clone()
    }

    /// Count of recorded commands matching a predicate.
    pub fn count_ops(&self, pred: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.inner.borrow().ops.iter().filter(|op| pred(op)).count()
    }
}

impl Surface for RecordingSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn width(&self) -> u32 {
        self.inner.borrow().width
    }

    fn height(&self) -> u32 {
        self.inner.borrow().height
    }

    fn resize(&mut self, width: u32, height: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.width = width;
        inner.height = height;
        inner.ops.clear();
    }

    fn clear(&mut self, color: Option<PremulRgba>) {
        let mut inner = self.inner.borrow_mut();
        inner.ops.clear();
        inner.save_depth = 0;
        inner.ops.push(SurfaceOp::Clear(color));
    }

    fn present(&mut self) {
        self.inner.borrow_mut().ops.push(SurfaceOp::Present);
    }

    fn save(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.save_depth += 1;
        inner.ops.push(SurfaceOp::Save);
    }

    fn restore(&mut self) {
        let mut inner = self.inner.borrow_mut();
        if inner.save_depth == 0 {
            log::warn!("surface restore without matching save");
            return;
        }
        inner.save_depth -= 1;
        inner.ops.push(SurfaceOp::Restore);
    }

    fn set_transform(&mut self, transform: &Transform2D) {
        self.inner
            .borrow_mut()
            .ops
            .push(SurfaceOp::SetTransform(*transform));
    }

    fn set_global_alpha(&mut self, alpha: f32) {
        self.inner
            .borrow_mut()
            .ops
            .push(SurfaceOp::SetGlobalAlpha(alpha));
    }

    fn clip_path(&mut self, path: &Path) {
        self.inner
            .borrow_mut()
            .ops
            .push(SurfaceOp::ClipPath(path.clone()));
    }

    fn fill_path(&mut self, path: &Path, color: PremulRgba) {
        self.inner.borrow_mut().ops.push(SurfaceOp::FillPath {
            path: path.clone(),
            color,
        });
    }

    fn stroke_path(&mut self, path: &Path, color: PremulRgba, width: f64) {
        self.inner.borrow_mut().ops.push(SurfaceOp::StrokePath {
            path: path.clone(),
            color,
            width,
        });
    }

    fn draw_surface(&mut self, source: SurfaceId, scale: f64) {
        self.inner
            .borrow_mut()
            .ops
            .push(SurfaceOp::DrawSurface { source, scale });
    }
}

/// Factory producing `RecordingSurface`s. Clones share the creation log, so
/// a caller can keep one handle while the painter owns the other and still
/// inspect every layer's content afterwards.
#[derive(Debug, Clone, Default)]
pub struct RecordingFactory {
    created: Rc<RefCell<Vec<RecordingSurface>>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles to every surface created so far, in creation order.
    pub fn surfaces(&self) -> Vec<RecordingSurface> {
        self.created.borrow().clone()
    }

    /// Look up a created surface by id.
    pub fn surface(&self, id: SurfaceId) -> Option<RecordingSurface> {
        self.created.borrow().iter().find(|s| s.id() == id).cloned()
    }
}

impl SurfaceFactory for RecordingFactory {
    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn Surface>, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::InvalidSize { width, height });
        }
        let surface = RecordingSurface::new(width, height);
        self.created.borrow_mut().push(surface.clone());
        Ok(Box::new(surface))
    }
}
