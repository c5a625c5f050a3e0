//! sable-surface: geometry, color and the raster-surface contract.
//!
//! This crate is the base layer of the engine. It defines:
//! - `Transform2D` / `Rect`: the affine math the scene graph and painter share
//! - `Rgba` / `PremulRgba`: CSS-style colors and their linear premultiplied
//!   form used at the surface boundary
//! - `Path`: prebuilt shape geometry (rect, ellipse, polygon)
//! - `Surface`: the contract a raster backend must satisfy, plus
//!   `RecordingSurface`, a software implementation that records draw commands
//! - `FrameScheduler`: the host vsync collaborator

mod color;
mod geometry;
mod path;
mod surface;

pub use color::{PremulRgba, Rgba};
pub use geometry::{Rect, Transform2D};
pub use path::Path;
pub use surface::{
    FrameScheduler, ManualScheduler, RecordingFactory, RecordingSurface, Surface, SurfaceError,
    SurfaceFactory, SurfaceId, SurfaceOp,
};
