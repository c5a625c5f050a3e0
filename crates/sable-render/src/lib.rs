//! sable-render: the display engine.
//!
//! Maps the store's sorted draw list onto a stack of raster layers keyed by
//! zlevel, repainting only the layers whose contents changed. Large element
//! sets tagged for progressive rendering are spread across extra host frames
//! on a small pool of offscreen layers; highlight state is mirrored onto a
//! dedicated overlay layer above everything else.

mod hover;
mod layer;
mod painter;

pub use hover::HoverMirror;
pub use layer::{Layer, LayerConfig};
pub use painter::{Painter, SingleSurfaceOptions, HOVER_ZLEVEL, MAX_PROGRESSIVE_LAYERS};
