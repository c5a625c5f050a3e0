//! The scene-graph store.
//!
//! `Storage` owns every node of the scene in an id-keyed arena: the tree
//! structure (root set, group children, clip relations) is expressed purely
//! through [`NodeId`] links, so the draw list and every cross-node reference
//! stays non-owning. Each frame, [`Storage::update_display_list`] walks the
//! roots depth-first, refreshes transforms of dirty nodes, accumulates
//! inherited clip chains and produces the flattened, stably sorted draw
//! list the painter consumes.

use std::collections::HashMap;

use sable_surface::{Path, Transform2D};

use crate::node::{Node, NodeId, Style};

#[derive(Debug, Default)]
pub struct Storage {
    nodes: HashMap<NodeId, Node>,
    roots: Vec<NodeId>,
    display_list: Vec<NodeId>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    // --- registration -------------------------------------------------------

    /// Register a client-built node with this store.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Create and register an empty group.
    pub fn group(&mut self) -> NodeId {
        self.insert(Node::group())
    }

    /// Create and register a displayable.
    pub fn displayable(&mut self, path: Path, style: Style) -> NodeId {
        self.insert(Node::displayable(path, style))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // --- tree structure -----------------------------------------------------

    /// Append `child` to `parent`'s child list, detaching it from any
    /// previous parent or the root set first. Insertion order is the
    /// tie-break for equal ordering keys, so append position matters.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.nodes.contains_key(&parent) || !self.nodes.contains_key(&child) {
            log::warn!("add_child with unregistered node; ignored");
            return;
        }
        if parent == child || self.is_ancestor(child, parent) {
            log::warn!("add_child would create a cycle; ignored");
            return;
        }
        if !self.nodes[&parent].is_group() {
            log::warn!("add_child on a displayable; ignored");
            return;
        }
        self.detach(child);
        if let Some(children) = self.nodes.get_mut(&parent).and_then(Node::children_mut) {
            children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.mark_dirty();
        }
    }

    /// Remove `child` from `parent` and destroy its subtree. A child not
    /// owned by `parent` is left untouched.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        let owned = self
            .nodes
            .get(&child)
            .is_some_and(|c| c.parent == Some(parent));
        if !owned {
            return;
        }
        self.detach(child);
        self.drop_subtree(child);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.mark_dirty();
        }
    }

    /// True if `ancestor` appears on `node`'s parent chain.
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes.get(&node).and_then(|n| n.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Unlink a node from its parent's child list or the root set, without
    /// destroying it.
    fn detach(&mut self, id: NodeId) {
        let parent = self.nodes.get(&id).and_then(|n| n.parent);
        if let Some(pid) = parent {
            if let Some(children) = self.nodes.get_mut(&pid).and_then(Node::children_mut) {
                children.retain(|c| *c != id);
            }
            if let Some(n) = self.nodes.get_mut(&id) {
                n.parent = None;
            }
        } else {
            self.roots.retain(|r| *r != id);
        }
    }

    // --- roots --------------------------------------------------------------

    /// Add a node to the root set. Idempotent; a node that is currently a
    /// child of some group is rejected with a diagnostic.
    pub fn add_root(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            log::warn!("add_root with unregistered node; ignored");
            return;
        };
        if node.parent.is_some() {
            log::warn!("add_root on a parented node; ignored");
            return;
        }
        if self.roots.contains(&id) {
            return;
        }
        self.roots.push(id);
        if let Some(n) = self.nodes.get_mut(&id) {
            n.mark_dirty();
        }
    }

    /// Remove one root and destroy its subtree (children and clip shapes
    /// included). Removing a node that is not a root is a no-op.
    pub fn remove_root(&mut self, id: NodeId) {
        let Some(idx) = self.roots.iter().position(|r| *r == id) else {
            return;
        };
        self.roots.remove(idx);
        self.drop_subtree(id);
    }

    pub fn remove_roots(&mut self, ids: &[NodeId]) {
        for id in ids {
            self.remove_root(*id);
        }
    }

    /// Remove every root and destroy all owned nodes, registered orphans
    /// included.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.display_list.clear();
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for child in node.children() {
            self.drop_subtree(*child);
        }
        // Clip shapes have no other home; they go with their target.
        if let Some(clip) = node.clip_path {
            self.drop_subtree(clip);
        }
        if let Some(target) = node.clipped_by {
            if let Some(t) = self.nodes.get_mut(&target) {
                t.clip_path = None;
            }
        }
    }

    // --- clip relation ------------------------------------------------------

    /// Assign `clip` as the clip shape of `target`. The relation is
    /// exclusive on both sides: a previous clip shape of `target` is
    /// destroyed, and a `clip` currently clipping another node is detached
    /// from it first.
    pub fn set_clip_path(&mut self, target: NodeId, clip: NodeId) {
        if target == clip {
            log::warn!("node cannot clip itself; ignored");
            return;
        }
        let valid_clip = self
            .nodes
            .get(&clip)
            .is_some_and(|c| !c.is_group() && c.parent.is_none() && !self.roots.contains(&clip));
        if !self.nodes.contains_key(&target) || !valid_clip {
            log::warn!("set_clip_path needs a registered, unparented shape; ignored");
            return;
        }

        // Detach the shape from whatever it clipped before.
        if let Some(prev_target) = self.nodes.get(&clip).and_then(|c| c.clipped_by) {
            if prev_target != target {
                if let Some(p) = self.nodes.get_mut(&prev_target) {
                    p.clip_path = None;
                    p.mark_dirty();
                }
            }
        }
        // Replace (and destroy) the target's previous clip shape.
        if let Some(prev_clip) = self.nodes.get(&target).and_then(|t| t.clip_path) {
            if prev_clip != clip {
                if let Some(c) = self.nodes.get_mut(&prev_clip) {
                    c.clipped_by = None;
                }
                self.drop_subtree(prev_clip);
            }
        }

        if let Some(t) = self.nodes.get_mut(&target) {
            t.clip_path = Some(clip);
            t.mark_dirty();
        }
        if let Some(c) = self.nodes.get_mut(&clip) {
            c.clipped_by = Some(target);
        }
    }

    /// Clear and destroy `target`'s clip shape, if any.
    pub fn remove_clip_path(&mut self, target: NodeId) {
        let Some(clip) = self.nodes.get(&target).and_then(|t| t.clip_path) else {
            return;
        };
        if let Some(t) = self.nodes.get_mut(&target) {
            t.clip_path = None;
            t.mark_dirty();
        }
        if let Some(c) = self.nodes.get_mut(&clip) {
            c.clipped_by = None;
        }
        self.drop_subtree(clip);
    }

    // --- display list -------------------------------------------------------

    /// Depth-first visit of every node reachable from the roots.
    pub fn traverse(&self, f: &mut impl FnMut(&Node)) {
        fn visit(storage: &Storage, id: NodeId, f: &mut impl FnMut(&Node)) {
            let Some(node) = storage.nodes.get(&id) else {
                return;
            };
            f(node);
            for child in node.children() {
                visit(storage, *child, f);
            }
        }
        for root in &self.roots {
            visit(self, *root, f);
        }
    }

    /// The cached draw list, recomputed first when `update` is set.
    pub fn display_list(&mut self, update: bool, include_ignored: bool) -> &[NodeId] {
        if update {
            self.update_display_list(include_ignored);
        }
        &self.display_list
    }

    /// Rebuild the draw list: update transforms and clip chains along a
    /// depth-first walk, then stable-sort by `(zlevel, z, z2)` so that equal
    /// keys keep their visitation order.
    pub fn update_display_list(&mut self, include_ignored: bool) {
        let mut out = Vec::with_capacity(self.display_list.len());
        let roots = self.roots.clone();
        for root in roots {
            self.update_and_collect(root, None, &[], include_ignored, &mut out);
        }
        out.sort_by_key(|id| {
            self.nodes
                .get(id)
                .map(Node::sort_key)
                .unwrap_or_default()
        });
        self.display_list = out;
    }

    fn update_and_collect(
        &mut self,
        id: NodeId,
        parent_transform: Option<Transform2D>,
        inherited_clips: &[NodeId],
        include_ignored: bool,
        out: &mut Vec<NodeId>,
    ) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if node.ignored() && !include_ignored {
            return;
        }

        let dirty = node.is_dirty();
        if dirty {
            if let Some(n) = self.nodes.get_mut(&id) {
                n.update_transform(parent_transform.as_ref());
            }
        }
        let world = *self.nodes[&id].transform();

        // Extend the inherited chain with this node's own clip shape (and
        // that shape's own clip, recursively). The node's own clips come
        // first so the finished chain reads nearest-to-farthest; each clip
        // shape's transform is relative to the element it clips, not to the
        // scene root.
        let first_clip = self.nodes[&id].clip_path();
        let extended: Option<Vec<NodeId>> = first_clip.map(|first| {
            let mut own = Vec::new();
            let mut current = Some(first);
            let mut relative_to = world;
            while let Some(cid) = current {
                match self.nodes.get_mut(&cid) {
                    Some(clip) => {
                        clip.update_transform(Some(&relative_to));
                        relative_to = *clip.transform();
                        current = clip.clip_path();
                        own.push(cid);
                    }
                    None => {
                        log::warn!("clip shape {cid:?} is not registered with this store");
                        current = None;
                    }
                }
            }
            own.extend_from_slice(inherited_clips);
            own
        });
        let clips: &[NodeId] = extended.as_deref().unwrap_or(inherited_clips);

        if self.nodes[&id].is_group() {
            let children = self.nodes[&id].children().to_vec();
            for child in children {
                // A dirty group forces its whole subtree through a transform
                // refresh this pass.
                if dirty {
                    if let Some(c) = self.nodes.get_mut(&child) {
                        c.mark_dirty();
                    }
                }
                self.update_and_collect(child, Some(world), clips, include_ignored, out);
            }
            // Groups are structural only; their dirt has been pushed down.
            if let Some(n) = self.nodes.get_mut(&id) {
                n.mark_clean();
            }
        } else {
            if let Some(n) = self.nodes.get_mut(&id) {
                n.set_clip_chain(clips.to_vec());
            }
            out.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_surface::Rect;

    fn rect_node(storage: &mut Storage) -> NodeId {
        storage.displayable(Path::rect(0.0, 0.0, 10.0, 10.0), Style::default())
    }

    #[test]
    fn test_display_list_contains_exactly_reachable_displayables() {
        let mut storage = Storage::new();
        let root = storage.group();
        let inner = storage.group();
        let a = rect_node(&mut storage);
        let b = rect_node(&mut storage);
        let orphan = rect_node(&mut storage);
        storage.add_child(root, a);
        storage.add_child(root, inner);
        storage.add_child(inner, b);
        storage.add_root(root);

        let list = storage.display_list(true, false).to_vec();
        assert_eq!(list, vec![a, b]);
        assert!(!list.contains(&orphan));
        assert!(!list.contains(&root));
    }

    #[test]
    fn test_stable_sort_keeps_visitation_order_for_equal_keys() {
        let mut storage = Storage::new();
        let root = storage.group();
        let ids: Vec<NodeId> = (0..6).map(|_| rect_node(&mut storage)).collect();
        for id in &ids {
            storage.add_child(root, *id);
        }
        storage.add_root(root);
        // Give the middle two a higher z; the rest tie at (0, 0, 0).
        storage.get_mut(ids[2]).unwrap().set_z(1);
        storage.get_mut(ids[3]).unwrap().set_z(1);

        let list = storage.display_list(true, false).to_vec();
        assert_eq!(list, vec![ids[0], ids[1], ids[4], ids[5], ids[2], ids[3]]);
    }

    #[test]
    fn test_sort_orders_by_zlevel_then_z_then_z2() {
        let mut storage = Storage::new();
        let root = storage.group();
        let a = rect_node(&mut storage);
        let b = rect_node(&mut storage);
        let c = rect_node(&mut storage);
        for id in [a, b, c] {
            storage.add_child(root, id);
        }
        storage.add_root(root);
        storage.get_mut(a).unwrap().set_zlevel(1);
        storage.get_mut(b).unwrap().set_z2(5);
        // c stays at (0, 0, 0): c < b < a.
        assert_eq!(storage.display_list(true, false), &[c, b, a]);
    }

    #[test]
    fn test_display_list_without_update_is_idempotent() {
        let mut storage = Storage::new();
        let root = storage.group();
        let a = rect_node(&mut storage);
        storage.add_child(root, a);
        storage.add_root(root);
        storage.update_display_list(false);

        let first = storage.display_list(false, false).to_vec();
        let second = storage.display_list(false, false).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ignored_nodes_skipped_unless_requested() {
        let mut storage = Storage::new();
        let root = storage.group();
        let a = rect_node(&mut storage);
        let b = rect_node(&mut storage);
        storage.add_child(root, a);
        storage.add_child(root, b);
        storage.add_root(root);
        storage.get_mut(a).unwrap().set_ignore(true);

        assert_eq!(storage.display_list(true, false), &[b]);
        assert_eq!(storage.display_list(true, true), &[a, b]);
    }

    #[test]
    fn test_clip_chain_is_self_then_ancestor() {
        let mut storage = Storage::new();
        let a = storage.group();
        let b = storage.group();
        let leaf = rect_node(&mut storage);
        let x = rect_node(&mut storage);
        let y = rect_node(&mut storage);
        storage.add_child(a, b);
        storage.add_child(b, leaf);
        storage.add_root(a);
        storage.set_clip_path(a, x);
        storage.set_clip_path(b, y);

        storage.update_display_list(false);
        assert_eq!(storage.get(leaf).unwrap().clip_chain(), &[y, x]);
    }

    #[test]
    fn test_chained_clip_shapes_are_walked() {
        let mut storage = Storage::new();
        let root = storage.group();
        let leaf = rect_node(&mut storage);
        let outer_clip = rect_node(&mut storage);
        let inner_clip = rect_node(&mut storage);
        storage.add_child(root, leaf);
        storage.add_root(root);
        storage.set_clip_path(root, outer_clip);
        // The clip shape is itself clipped.
        storage.set_clip_path(outer_clip, inner_clip);

        storage.update_display_list(false);
        assert_eq!(
            storage.get(leaf).unwrap().clip_chain(),
            &[outer_clip, inner_clip]
        );
    }

    #[test]
    fn test_clip_transform_is_relative_to_clipped_element() {
        let mut storage = Storage::new();
        let root = storage.group();
        let leaf = rect_node(&mut storage);
        let clip = rect_node(&mut storage);
        storage.add_child(root, leaf);
        storage.add_root(root);
        storage.get_mut(root).unwrap().set_position(100.0, 0.0);
        storage.get_mut(clip).unwrap().set_position(5.0, 5.0);
        storage.set_clip_path(root, clip);

        storage.update_display_list(false);
        let clip_tf = *storage.get(clip).unwrap().transform();
        assert_eq!(clip_tf.apply_point(0.0, 0.0), (105.0, 5.0));
    }

    #[test]
    fn test_clip_assignment_is_exclusive() {
        let mut storage = Storage::new();
        let target = storage.group();
        let first = rect_node(&mut storage);
        let second = rect_node(&mut storage);
        storage.add_root(target);
        storage.set_clip_path(target, first);
        storage.set_clip_path(target, second);

        assert_eq!(storage.get(target).unwrap().clip_path(), Some(second));
        // The replaced shape was destroyed with the relation.
        assert!(!storage.contains(first));
        assert_eq!(storage.get(second).unwrap().clipped_by(), Some(target));
    }

    #[test]
    fn test_dirty_group_forces_children_dirty_then_cleans_itself() {
        let mut storage = Storage::new();
        let root = storage.group();
        let a = rect_node(&mut storage);
        storage.add_child(root, a);
        storage.add_root(root);
        storage.update_display_list(false);
        storage.get_mut(a).unwrap().mark_clean();

        storage.get_mut(root).unwrap().set_position(50.0, 0.0);
        storage.update_display_list(false);
        assert!(!storage.get(root).unwrap().is_dirty());
        assert!(storage.get(a).unwrap().is_dirty());
        let (x, _) = storage.get(a).unwrap().transform().apply_point(0.0, 0.0);
        assert_eq!(x, 50.0);
    }

    #[test]
    fn test_remove_root_destroys_subtree_and_clip_shapes() {
        let mut storage = Storage::new();
        let root = storage.group();
        let child = rect_node(&mut storage);
        let clip = rect_node(&mut storage);
        storage.add_child(root, child);
        storage.add_root(root);
        storage.set_clip_path(child, clip);

        storage.remove_root(root);
        assert!(!storage.contains(root));
        assert!(!storage.contains(child));
        assert!(!storage.contains(clip));
        assert!(storage.display_list(true, false).is_empty());
    }

    #[test]
    fn test_remove_unknown_root_is_noop() {
        let mut storage = Storage::new();
        let root = storage.group();
        let stray = rect_node(&mut storage);
        storage.add_root(root);
        storage.remove_root(stray);
        assert!(storage.contains(stray));
        assert_eq!(storage.display_list(true, true).len(), 0);
    }

    #[test]
    fn test_add_root_is_idempotent() {
        let mut storage = Storage::new();
        let a = rect_node(&mut storage);
        storage.add_root(a);
        storage.add_root(a);
        assert_eq!(storage.display_list(true, false).len(), 1);
    }

    #[test]
    fn test_add_child_reparents() {
        let mut storage = Storage::new();
        let g1 = storage.group();
        let g2 = storage.group();
        let a = rect_node(&mut storage);
        storage.add_root(g1);
        storage.add_root(g2);
        storage.add_child(g1, a);
        storage.add_child(g2, a);
        assert_eq!(storage.get(g1).unwrap().children(), &[] as &[NodeId]);
        assert_eq!(storage.get(g2).unwrap().children(), &[a]);
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let mut storage = Storage::new();
        let g1 = storage.group();
        let g2 = storage.group();
        storage.add_child(g1, g2);
        storage.add_child(g2, g1);
        assert_eq!(storage.get(g2).unwrap().children(), &[] as &[NodeId]);
    }

    #[test]
    fn test_bounding_rect_follows_vertex_writes() {
        let mut storage = Storage::new();
        let poly = storage.displayable(
            Path::polygon(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]),
            Style::default(),
        );
        storage.add_root(poly);
        assert_eq!(
            storage.get_mut(poly).unwrap().bounding_rect(),
            Rect::new(0.0, 0.0, 1.0, 1.0)
        );
    }
}
