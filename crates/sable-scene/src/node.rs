//! Scene nodes: groups and displayables.
//!
//! A [`Node`] carries the data every scene element shares (identity, local
//! transform parts, ordering keys, flags) plus a kind-specific payload:
//! groups own an ordered child list and draw nothing, displayables carry a
//! path and a style. Nodes live inside a [`crate::Storage`] and reference
//! each other exclusively by [`NodeId`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use sable_surface::{Path, Rect, Rgba, Surface, Transform2D};

use crate::animation::value::Value;

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Paint style of a displayable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub fill: Option<Rgba>,
    pub stroke: Option<Rgba>,
    pub line_width: f64,
    /// Multiplied into fill and stroke alpha. An element at opacity 0 is
    /// skipped entirely by the paint pass.
    pub opacity: f64,
    pub text: Option<String>,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: Some(Rgba::BLACK),
            stroke: None,
            line_width: 1.0,
            opacity: 1.0,
            text: None,
        }
    }
}

impl Style {
    pub fn filled(color: Rgba) -> Self {
        Self {
            fill: Some(color),
            ..Self::default()
        }
    }
}

/// A property an animation track can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKey {
    X,
    Y,
    /// `[x, y]` as a one-dimensional array value.
    Position,
    ScaleX,
    ScaleY,
    /// `[sx, sy]` as a one-dimensional array value.
    Scale,
    Rotation,
    Opacity,
    Fill,
    Stroke,
    LineWidth,
    /// Polygon vertices, a two-dimensional array value.
    Points,
    Text,
}

#[derive(Debug)]
struct DisplayableData {
    path: Path,
    style: Style,
    /// Lazily computed, invalidated when the path changes.
    bounding: Option<Rect>,
    /// Inherited clip shapes, nearest first. Rebuilt by the store on every
    /// display-list update.
    clip_chain: Vec<NodeId>,
}

#[derive(Debug)]
enum NodeKind {
    Group { children: Vec<NodeId> },
    Displayable(DisplayableData),
}

/// One element of the scene tree.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    pub name: String,

    // Ordering key: zlevel selects the raster layer, z and z2 order within
    // it. Ties fall back to tree-walk visitation order via the stable sort.
    zlevel: i32,
    z: i32,
    z2: i32,

    position: [f64; 2],
    scale: [f64; 2],
    rotation: f64,
    origin: [f64; 2],
    transform: Transform2D,

    /// Excluded from the display list (and from drawing) when set.
    ignore: bool,
    /// Stays in the display list but is never painted.
    invisible: bool,
    dirty: bool,
    /// Progressive-group tag. Elements sharing a tag value are painted
    /// incrementally over several frames instead of all at once.
    progressive: Option<i32>,
    /// Frame index assigned by the painter's status pass; `None` outside a
    /// progressive group.
    frame_index: Option<usize>,

    pub(crate) parent: Option<NodeId>,
    pub(crate) clip_path: Option<NodeId>,
    /// Back-reference set on a clip shape: the node it clips.
    pub(crate) clipped_by: Option<NodeId>,

    kind: NodeKind,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            name: String::new(),
            zlevel: 0,
            z: 0,
            z2: 0,
            position: [0.0, 0.0],
            scale: [1.0, 1.0],
            rotation: 0.0,
            origin: [0.0, 0.0],
            transform: Transform2D::identity(),
            ignore: false,
            invisible: false,
            dirty: true,
            progressive: None,
            frame_index: None,
            parent: None,
            clip_path: None,
            clipped_by: None,
            kind,
        }
    }

    /// A structural node with an ordered child list and no drawable content.
    pub fn group() -> Self {
        Self::new(NodeKind::Group {
            children: Vec::new(),
        })
    }

    /// A drawable node carrying prebuilt geometry and a style.
    pub fn displayable(path: Path, style: Style) -> Self {
        Self::new(NodeKind::Displayable(DisplayableData {
            path,
            style,
            bounding: None,
            clip_chain: Vec::new(),
        }))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }

    /// Ordered children; empty for displayables.
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Group { children } => children,
            NodeKind::Displayable(_) => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.kind {
            NodeKind::Group { children } => Some(children),
            NodeKind::Displayable(_) => None,
        }
    }

    // --- ordering -----------------------------------------------------------

    pub fn zlevel(&self) -> i32 {
        self.zlevel
    }

    pub fn set_zlevel(&mut self, zlevel: i32) {
        self.zlevel = zlevel;
        self.dirty = true;
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn set_z(&mut self, z: i32) {
        self.z = z;
        self.dirty = true;
    }

    pub fn z2(&self) -> i32 {
        self.z2
    }

    pub fn set_z2(&mut self, z2: i32) {
        self.z2 = z2;
        self.dirty = true;
    }

    pub(crate) fn sort_key(&self) -> (i32, i32, i32) {
        (self.zlevel, self.z, self.z2)
    }

    // --- flags --------------------------------------------------------------

    pub fn ignored(&self) -> bool {
        self.ignore
    }

    pub fn set_ignore(&mut self, ignore: bool) {
        self.ignore = ignore;
        self.dirty = true;
    }

    pub fn invisible(&self) -> bool {
        self.invisible
    }

    pub fn set_invisible(&mut self, invisible: bool) {
        self.invisible = invisible;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Cleared by the painter once the element has been considered for a
    /// paint pass, and by the store after a group's dirt has been pushed to
    /// its children.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn progressive(&self) -> Option<i32> {
        self.progressive
    }

    pub fn set_progressive(&mut self, tag: Option<i32>) {
        self.progressive = tag;
        self.dirty = true;
    }

    /// Progressive frame index, maintained by the painter's status pass.
    pub fn frame_index(&self) -> Option<usize> {
        self.frame_index
    }

    pub fn set_frame_index(&mut self, frame: Option<usize>) {
        self.frame_index = frame;
    }

    // --- transform ----------------------------------------------------------

    pub fn position(&self) -> [f64; 2] {
        self.position
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.position = [x, y];
        self.dirty = true;
    }

    pub fn scale(&self) -> [f64; 2] {
        self.scale
    }

    pub fn set_scale(&mut self, sx: f64, sy: f64) {
        self.scale = [sx, sy];
        self.dirty = true;
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: f64) {
        self.rotation = rotation;
        self.dirty = true;
    }

    pub fn origin(&self) -> [f64; 2] {
        self.origin
    }

    pub fn set_origin(&mut self, x: f64, y: f64) {
        self.origin = [x, y];
        self.dirty = true;
    }

    /// World transform as of the last display-list update.
    pub fn transform(&self) -> &Transform2D {
        &self.transform
    }

    /// Recompute the world transform from the local parts and the parent's
    /// world transform.
    pub(crate) fn update_transform(&mut self, parent: Option<&Transform2D>) {
        let local = Transform2D::from_parts(self.position, self.scale, self.rotation, self.origin);
        self.transform = match parent {
            Some(p) => p.then(&local),
            None => local,
        };
    }

    // --- clip relation ------------------------------------------------------

    /// The clip shape assigned to this node, if any.
    pub fn clip_path(&self) -> Option<NodeId> {
        self.clip_path
    }

    /// The node this clip shape clips, if this node is a clip shape.
    pub fn clipped_by(&self) -> Option<NodeId> {
        self.clipped_by
    }

    // --- displayable payload ------------------------------------------------

    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::Displayable(d) => Some(&d.path),
            NodeKind::Group { .. } => None,
        }
    }

    pub fn set_path(&mut self, path: Path) {
        if let NodeKind::Displayable(d) = &mut self.kind {
            d.path = path;
            d.bounding = None;
            self.dirty = true;
        }
    }

    pub fn style(&self) -> Option<&Style> {
        match &self.kind {
            NodeKind::Displayable(d) => Some(&d.style),
            NodeKind::Group { .. } => None,
        }
    }

    /// Mutable style access; marks the node dirty.
    pub fn style_mut(&mut self) -> Option<&mut Style> {
        match &mut self.kind {
            NodeKind::Displayable(d) => {
                self.dirty = true;
                Some(&mut d.style)
            }
            NodeKind::Group { .. } => None,
        }
    }

    /// Inherited clip chain computed by the last display-list update,
    /// nearest clip first. Always empty for groups.
    pub fn clip_chain(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Displayable(d) => &d.clip_chain,
            NodeKind::Group { .. } => &[],
        }
    }

    pub(crate) fn set_clip_chain(&mut self, chain: Vec<NodeId>) {
        if let NodeKind::Displayable(d) = &mut self.kind {
            d.clip_chain = chain;
        }
    }

    /// Untransformed bounding rectangle, cached until the path changes.
    /// Groups report an empty rectangle.
    pub fn bounding_rect(&mut self) -> Rect {
        match &mut self.kind {
            NodeKind::Displayable(d) => *d.bounding.get_or_insert_with(|| d.path.bounding_rect()),
            NodeKind::Group { .. } => Rect::default(),
        }
    }

    /// Issue this displayable's fill and stroke against a surface. The
    /// caller is responsible for transform and clip state.
    pub fn draw(&self, surface: &mut dyn Surface) {
        if let NodeKind::Displayable(d) = &self.kind {
            Self::brush(&d.path, &d.style, surface);
        }
    }

    /// Draw this displayable's geometry with a replacement style. Used by
    /// highlight mirrors, which borrow the source's shape but carry their
    /// own style.
    pub fn draw_with(&self, style: &Style, surface: &mut dyn Surface) {
        if let NodeKind::Displayable(d) = &self.kind {
            Self::brush(&d.path, style, surface);
        }
    }

    fn brush(path: &Path, style: &Style, surface: &mut dyn Surface) {
        if let Some(fill) = style.fill {
            let color = Rgba {
                a: fill.a * style.opacity,
                ..fill
            };
            surface.fill_path(path, color.to_premul());
        }
        if let Some(stroke) = style.stroke {
            let color = Rgba {
                a: stroke.a * style.opacity,
                ..stroke
            };
            surface.stroke_path(path, color.to_premul(), style.line_width);
        }
    }

    // --- animated property access -------------------------------------------

    /// Read a property as an animatable value. `None` when the property does
    /// not apply to this node kind.
    pub fn property(&self, key: PropertyKey) -> Option<Value> {
        match key {
            PropertyKey::X => Some(Value::Number(self.position[0])),
            PropertyKey::Y => Some(Value::Number(self.position[1])),
            PropertyKey::Position => Some(Value::Vec1(self.position.to_vec())),
            PropertyKey::ScaleX => Some(Value::Number(self.scale[0])),
            PropertyKey::ScaleY => Some(Value::Number(self.scale[1])),
            PropertyKey::Scale => Some(Value::Vec1(self.scale.to_vec())),
            PropertyKey::Rotation => Some(Value::Number(self.rotation)),
            PropertyKey::Opacity => self.style().map(|s| Value::Number(s.opacity)),
            PropertyKey::Fill => self
                .style()
                .and_then(|s| s.fill)
                .map(|c| Value::Color(c.channels())),
            PropertyKey::Stroke => self
                .style()
                .and_then(|s| s.stroke)
                .map(|c| Value::Color(c.channels())),
            PropertyKey::LineWidth => self.style().map(|s| Value::Number(s.line_width)),
            PropertyKey::Points => match self.path() {
                Some(Path::Polygon { points, .. }) => Some(Value::Vec2(points.clone())),
                _ => None,
            },
            PropertyKey::Text => self
                .style()
                .and_then(|s| s.text.clone())
                .map(Value::Text),
        }
    }

    /// Write an interpolated value back into the node; marks it dirty.
    /// A value whose shape does not match the property is ignored.
    pub fn set_property(&mut self, key: PropertyKey, value: &Value) {
        match (key, value) {
            (PropertyKey::X, Value::Number(x)) => self.position[0] = *x,
            (PropertyKey::Y, Value::Number(y)) => self.position[1] = *y,
            (PropertyKey::Position, Value::Vec1(v)) if v.len() >= 2 => {
                self.position = [v[0], v[1]];
            }
            (PropertyKey::ScaleX, Value::Number(s)) => self.scale[0] = *s,
            (PropertyKey::ScaleY, Value::Number(s)) => self.scale[1] = *s,
            (PropertyKey::Scale, Value::Vec1(v)) if v.len() >= 2 => {
                self.scale = [v[0], v[1]];
            }
            (PropertyKey::Rotation, Value::Number(r)) => self.rotation = *r,
            (PropertyKey::Opacity, Value::Number(o)) => {
                if let NodeKind::Displayable(d) = &mut self.kind {
                    d.style.opacity = *o;
                }
            }
            (PropertyKey::Fill, Value::Color(c)) => {
                if let NodeKind::Displayable(d) = &mut self.kind {
                    d.style.fill = Some(Rgba::from_channels(*c));
                }
            }
            (PropertyKey::Stroke, Value::Color(c)) => {
                if let NodeKind::Displayable(d) = &mut self.kind {
                    d.style.stroke = Some(Rgba::from_channels(*c));
                }
            }
            (PropertyKey::LineWidth, Value::Number(w)) => {
                if let NodeKind::Displayable(d) = &mut self.kind {
                    d.style.line_width = *w;
                }
            }
            (PropertyKey::Points, Value::Vec2(points)) => {
                if let NodeKind::Displayable(d) = &mut self.kind {
                    if let Path::Polygon { points: p, .. } = &mut d.path {
                        *p = points.clone();
                        d.bounding = None;
                    } else {
                        log::debug!("points written to a non-polygon path; ignored");
                        return;
                    }
                }
            }
            (PropertyKey::Text, Value::Text(t)) => {
                if let NodeKind::Displayable(d) = &mut self.kind {
                    d.style.text = Some(t.clone());
                }
            }
            _ => {
                log::debug!("value shape does not match property {key:?}; ignored");
                return;
            }
        }
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_surface::{RecordingSurface, SurfaceOp};

    #[test]
    fn test_new_nodes_start_dirty() {
        assert!(Node::group().is_dirty());
        assert!(Node::displayable(Path::rect(0.0, 0.0, 1.0, 1.0), Style::default()).is_dirty());
    }

    #[test]
    fn test_property_round_trip() {
        let mut node = Node::displayable(Path::rect(0.0, 0.0, 10.0, 10.0), Style::default());
        node.mark_clean();
        node.set_property(PropertyKey::X, &Value::Number(42.0));
        assert_eq!(node.property(PropertyKey::X), Some(Value::Number(42.0)));
        assert!(node.is_dirty());
    }

    #[test]
    fn test_mismatched_value_is_ignored() {
        let mut node = Node::displayable(Path::rect(0.0, 0.0, 10.0, 10.0), Style::default());
        node.mark_clean();
        node.set_property(PropertyKey::X, &Value::Text("oops".into()));
        assert_eq!(node.property(PropertyKey::X), Some(Value::Number(0.0)));
        assert!(!node.is_dirty());
    }

    #[test]
    fn test_points_property_targets_polygon() {
        let mut node = Node::displayable(
            Path::polygon(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]),
            Style::default(),
        );
        let next = vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0]];
        node.set_property(PropertyKey::Points, &Value::Vec2(next.clone()));
        assert_eq!(node.property(PropertyKey::Points), Some(Value::Vec2(next)));
        // Bounding cache was invalidated by the vertex write.
        assert_eq!(node.bounding_rect(), Rect::new(0.0, 0.0, 2.0, 2.0));
    }

    #[test]
    fn test_groups_have_no_style_properties() {
        let group = Node::group();
        assert_eq!(group.property(PropertyKey::Opacity), None);
        assert_eq!(group.property(PropertyKey::Rotation), Some(Value::Number(0.0)));
    }

    #[test]
    fn test_draw_emits_fill_then_stroke() {
        let mut style = Style::filled(Rgba::opaque(255.0, 0.0, 0.0));
        style.stroke = Some(Rgba::BLACK);
        let node = Node::displayable(Path::rect(0.0, 0.0, 4.0, 4.0), style);

        let mut surface = RecordingSurface::new(8, 8);
        node.draw(&mut surface);
        let ops = surface.ops();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[0], SurfaceOp::FillPath { .. }));
        assert!(matches!(ops[1], SurfaceOp::StrokePath { .. }));
    }

    #[test]
    fn test_update_transform_inherits_parent() {
        let mut node = Node::group();
        node.set_position(10.0, 0.0);
        let parent = Transform2D::translate(0.0, 5.0);
        node.update_transform(Some(&parent));
        assert_eq!(node.transform().apply_point(0.0, 0.0), (10.0, 5.0));
    }
}
