//! One raster layer: a surface plus the bookkeeping the painter keeps on it.

use serde::{Deserialize, Serialize};

use sable_surface::{PremulRgba, Surface};

/// Per-zlevel drawing options, merged onto the layer when configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Color the layer is cleared to before repainting; `None` clears to
    /// transparent.
    pub clear_color: Option<PremulRgba>,
}

/// A raster surface with dirty/occupancy tracking.
pub struct Layer {
    pub(crate) surface: Box<dyn Surface>,
    /// Created by the painter itself, as opposed to externally supplied.
    pub(crate) builtin: bool,
    pub(crate) dirty: bool,
    /// Elements that landed on this layer in the current status pass. A
    /// difference against the previous pass forces a full repaint, since
    /// removed geometry cannot be subtracted from a raster surface.
    pub(crate) element_count: usize,
    /// Consecutive passes this layer went without elements; it is cleared
    /// on the first such pass.
    pub(crate) unused_count: u32,
    pub(crate) clear_color: Option<PremulRgba>,

    // Progressive bookkeeping, used only on pool layers.
    /// Highest frame index observed in the current status pass.
    pub(crate) max_progress: Option<usize>,
    /// Number of frame indices already painted onto this layer.
    pub(crate) progress: usize,
    /// Draw-list index just past this layer's progressive run.
    pub(crate) next_non_progressive: usize,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("surface", &self.surface.id())
            .field("builtin", &self.builtin)
            .field("dirty", &self.dirty)
            .field("element_count", &self.element_count)
            .finish()
    }
}

impl Layer {
    pub(crate) fn new(surface: Box<dyn Surface>, builtin: bool) -> Self {
        Self {
            surface,
            builtin,
            dirty: true,
            element_count: 0,
            unused_count: 0,
            clear_color: None,
            max_progress: None,
            progress: 0,
            next_non_progressive: 0,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn element_count(&self) -> usize {
        self.element_count
    }

    pub fn surface(&self) -> &dyn Surface {
        self.surface.as_ref()
    }

    pub(crate) fn apply_config(&mut self, config: &LayerConfig) {
        self.clear_color = config.clear_color;
    }

    pub(crate) fn clear(&mut self) {
        self.surface.clear(self.clear_color);
    }
}
