//! Highlight mirrors.
//!
//! A mirror is a lightweight stand-in for a node under highlight: it
//! references the source node for geometry, transform and clip state at
//! paint time and only owns the replacement style. Mirrors live in the
//! painter's overlay list and are painted onto a dedicated layer above
//! every ordering level.

use sable_scene::{NodeId, Style};

/// One highlighted node's overlay record.
#[derive(Debug, Clone)]
pub struct HoverMirror {
    /// The highlighted node. When it leaves the store the mirror is pruned
    /// on the next hover refresh.
    pub(crate) source: NodeId,
    /// Style painted in place of the source's own.
    pub(crate) style: Style,
}

impl HoverMirror {
    pub(crate) fn new(source: NodeId, style: Style) -> Self {
        Self { source, style }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn style(&self) -> &Style {
        &self.style
    }
}
