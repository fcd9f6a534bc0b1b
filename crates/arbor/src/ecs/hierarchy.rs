//! # Entity Hierarchies: Parent/Child Relationships
//!
//! [`Hierarchy`] is a short-lived view over the manager for everything that
//! touches more than one [`Transform`]: linking and unlinking, world-space
//! getters and setters, traversal, and matrix propagation.
//!
//! ## Usage
//!
//! ```ignore
//! let parent = manager.create_entity_with(|e| { e.add_component(Transform::from_xy(100.0, 50.0)); });
//! let child = manager.create_entity_with(|e| { e.add_component(Transform::from_xy(10.0, 0.0)); });
//!
//! let mut tree = manager.hierarchy();
//! tree.set_parent(child, parent, false);
//! assert_eq!(tree.world_pos(child), Vec3::new(110.0, 50.0, 0.0));
//! ```
//!
//! ## Propagation
//!
//! Matrices are rebuilt breadth-first from the top-most stale ancestor, so
//! every node is computed after its parent:
//!
//! ```text
//!        root*           * = dirty
//!       /     \
//!      a       b         update order: root, a, b, c
//!      |
//!      c
//! ```
//!
//! ## Keeping the world pose
//!
//! Reparenting with `keep_world = true` reads the world position, scale, and
//! rotation first, relinks, then converts them back into local fields under
//! the new parent. Non-uniform scale under rotation cannot always be
//! preserved exactly (the product would need shear).

use std::collections::{HashSet, VecDeque};

use crate::ecs::entity::EntityId;
use crate::ecs::manager::Manager;
use crate::math::{EulerRot, Mat4, Quat, Vec3};
use crate::transform::Transform;

/// World-space pose captured before relinking.
#[derive(Debug, Clone, Copy)]
struct WorldPose {
    pos: Vec3,
    scale: Vec3,
    rotation: Quat,
}

/// Operations on the transform tree. Obtain via [`Manager::hierarchy`].
pub struct Hierarchy<'m> {
    manager: &'m mut Manager,
}

impl<'m> Hierarchy<'m> {
    pub(crate) fn new(manager: &'m mut Manager) -> Self {
        Self { manager }
    }

    fn transform(&self, e: EntityId) -> &Transform {
        self.manager
            .try_component::<Transform>(e)
            .unwrap_or_else(|| panic!("{e:?} has no Transform"))
    }

    fn transform_mut(&mut self, e: EntityId) -> &mut Transform {
        self.manager
            .try_component_mut::<Transform>(e)
            .unwrap_or_else(|| panic!("{e:?} has no Transform"))
    }

    fn parent_of(&self, e: EntityId) -> Option<EntityId> {
        self.manager.try_component::<Transform>(e)?.parent()
    }

    /// Upper bound on any legal walk through the tree.
    fn hop_limit(&self) -> usize {
        self.manager.entity_count() + 1
    }

    /// `e` followed by its ancestors, nearest first.
    fn lineage(&self, e: EntityId) -> Vec<EntityId> {
        let limit = self.hop_limit();
        let mut chain = vec![e];
        let mut current = e;
        while let Some(parent) = self.parent_of(current) {
            assert!(chain.len() <= limit, "Transform cycle detected above {e:?}");
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Highest node in `e`'s lineage that needs an update.
    fn topmost_stale(&self, e: EntityId) -> Option<EntityId> {
        self.lineage(e).into_iter().rev().find(|&node| {
            self.manager
                .try_component::<Transform>(node)
                .is_some_and(Transform::needs_update)
        })
    }

    // ── Matrices ─────────────────────────────────────────────────────

    /// Recompute `e` and all of its descendants, breadth-first. If an
    /// ancestor of `e` is stale, propagation starts there instead.
    /// Listeners fire when `emit` is set.
    pub fn update_matrices(&mut self, e: EntityId, emit: bool) {
        let mut seen = HashSet::new();
        self.update_tracked(e, emit, &mut seen);
    }

    /// [`update_matrices`](Self::update_matrices) that records every node it
    /// recomputed into `seen`.
    pub(crate) fn update_tracked(&mut self, e: EntityId, emit: bool, seen: &mut HashSet<EntityId>) {
        let start = self.topmost_stale(e).unwrap_or(e);
        let parent_world = self
            .parent_of(start)
            .and_then(|p| self.manager.try_component::<Transform>(p))
            .map(Transform::cached_world_matrix);

        let limit = self.hop_limit();
        let mut visited = 0;
        let mut queue = VecDeque::from([(start, parent_world)]);
        while let Some((node, parent_world)) = queue.pop_front() {
            visited += 1;
            assert!(visited <= limit, "Transform cycle detected below {start:?}");
            let Some(t) = self.manager.try_component_mut::<Transform>(node) else {
                log::warn!("{node:?} is linked into the tree but has no Transform");
                continue;
            };
            let world = t.recompute(parent_world);
            if emit {
                t.emit(node);
            }
            queue.extend(t.children().iter().map(|&child| (child, Some(world))));
            seen.insert(node);
        }
    }

    fn ensure_current(&mut self, e: EntityId) {
        if let Some(top) = self.topmost_stale(e) {
            self.update_matrices(top, false);
        }
    }

    /// Up-to-date world matrix of `e`.
    pub fn world_matrix(&mut self, e: EntityId) -> Mat4 {
        self.ensure_current(e);
        self.transform(e).cached_world_matrix()
    }

    /// Where `e`'s anchor point lands in world space.
    pub fn world_pos(&mut self, e: EntityId) -> Vec3 {
        let anchor = self.transform(e).anchor_point();
        self.world_matrix(e).transform_point3(anchor)
    }

    /// Product of the local scales along the lineage.
    pub fn world_scale(&self, e: EntityId) -> Vec3 {
        self.lineage(e)
            .into_iter()
            .filter_map(|node| self.manager.try_component::<Transform>(node))
            .fold(Vec3::ONE, |scale, t| scale * t.scale())
    }

    /// Accumulated rotation along the lineage (`parent * local`).
    pub fn world_rotation(&self, e: EntityId) -> Quat {
        self.lineage(e)
            .into_iter()
            .filter_map(|node| self.manager.try_component::<Transform>(node))
            .fold(Quat::IDENTITY, |rotation, t| t.rotation() * rotation)
            .normalize()
    }

    /// World angle about +Z, for 2D trees.
    pub fn world_rotation_radians(&self, e: EntityId) -> f32 {
        self.world_rotation(e).to_euler(EulerRot::ZYX).0
    }

    fn world_pose(&mut self, e: EntityId) -> WorldPose {
        WorldPose {
            pos: self.world_pos(e),
            scale: self.world_scale(e),
            rotation: self.world_rotation(e),
        }
    }

    fn apply_world_pose(&mut self, e: EntityId, pose: WorldPose) {
        self.set_world_pos(e, pose.pos);
        self.set_world_scale(e, pose.scale);
        self.set_world_rotation(e, pose.rotation);
    }

    /// Move `e` so its anchor lands on `pos` in world space.
    pub fn set_world_pos(&mut self, e: EntityId, pos: Vec3) {
        let local = match self.parent_of(e) {
            Some(parent) => self.world_matrix(parent).inverse().transform_point3(pos),
            None => pos,
        };
        let t = self.transform_mut(e);
        let anchor = t.anchor_point();
        t.set_pos(local - anchor);
    }

    pub fn set_world_scale(&mut self, e: EntityId, scale: Vec3) {
        let parent_scale = self
            .parent_of(e)
            .map_or(Vec3::ONE, |parent| self.world_scale(parent));
        self.transform_mut(e).set_scale(scale / parent_scale);
    }

    pub fn set_world_rotation(&mut self, e: EntityId, rotation: Quat) {
        let parent_rotation = self
            .parent_of(e)
            .map_or(Quat::IDENTITY, |parent| self.world_rotation(parent));
        self.transform_mut(e)
            .set_rotation((parent_rotation.inverse() * rotation).normalize());
    }

    /// World rotation about +Z.
    pub fn set_world_rotation_radians(&mut self, e: EntityId, radians: f32) {
        self.set_world_rotation(e, Quat::from_rotation_z(radians));
    }

    // ── Linking ──────────────────────────────────────────────────────

    /// Make `parent` the parent of `child`, detaching it from any previous
    /// parent. With `keep_world` the child keeps its world pose; otherwise
    /// its local fields are kept and it moves with the new parent.
    ///
    /// Returns false, changing nothing, when the link would make a node its
    /// own ancestor.
    ///
    /// # Panics
    ///
    /// Panics if either entity has no [`Transform`].
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId, keep_world: bool) -> bool {
        self.transform(parent);
        if child == parent {
            log::warn!("{child:?} cannot be its own parent");
            return false;
        }
        if self.has_child(child, parent, true) {
            log::warn!("{child:?} is an ancestor of {parent:?}; refusing to create a cycle");
            return false;
        }
        let previous = self.transform(child).parent();
        if previous == Some(parent) {
            // The parent's Transform may have been replaced since the link
            // was made.
            self.transform_mut(parent).add_child_to_list(child);
            return true;
        }

        let pose = keep_world.then(|| self.world_pose(child));
        if let Some(previous) = previous {
            if let Some(t) = self.manager.try_component_mut::<Transform>(previous) {
                t.remove_child_from_list(child);
            }
        }
        self.transform_mut(child).set_parent_link(Some(parent));
        self.transform_mut(parent).add_child_to_list(child);
        if let Some(pose) = pose {
            self.apply_world_pose(child, pose);
        }
        true
    }

    /// Detach `e` from its parent. With `keep_world` its world pose is folded
    /// into its local fields. With `remove_from_list` the parent's child list
    /// is updated too.
    pub fn remove_parent(&mut self, e: EntityId, keep_world: bool, remove_from_list: bool) {
        let Some(parent) = self.transform(e).parent() else {
            return;
        };
        let pose = keep_world.then(|| self.world_pose(e));
        if remove_from_list {
            if let Some(t) = self.manager.try_component_mut::<Transform>(parent) {
                t.remove_child_from_list(e);
            }
        }
        self.transform_mut(e).set_parent_link(None);
        if let Some(pose) = pose {
            self.apply_world_pose(e, pose);
        }
    }

    /// Attach `child` under `parent`, keeping its world pose. Rejected when
    /// the two are the same node or already in each other's subtree.
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        if parent == child || self.has_child(parent, child, true) || self.has_child(child, parent, true)
        {
            return false;
        }
        self.set_parent(child, parent, true)
    }

    /// Detach a direct child, keeping its world pose.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        if self.parent_of(child) != Some(parent) {
            return false;
        }
        self.remove_parent(child, true, true);
        true
    }

    /// Whether `child` is a direct child of `parent`, or any descendant when
    /// `recursive`.
    pub fn has_child(&self, parent: EntityId, child: EntityId, recursive: bool) -> bool {
        if !recursive {
            return self
                .manager
                .try_component::<Transform>(parent)
                .is_some_and(|t| t.find_child(child).is_some());
        }
        self.lineage(child).into_iter().skip(1).any(|node| node == parent)
    }

    // ── Child list only ──────────────────────────────────────────────

    pub fn find_child(&self, parent: EntityId, child: EntityId) -> Option<usize> {
        self.transform(parent).find_child(child)
    }

    /// Append to `parent`'s child list without touching `child`'s link.
    pub fn add_child_to_list(&mut self, parent: EntityId, child: EntityId) -> bool {
        self.transform_mut(parent).add_child_to_list(child)
    }

    /// Remove from `parent`'s child list without touching `child`'s link.
    pub fn remove_child_from_list(&mut self, parent: EntityId, child: EntityId) -> bool {
        self.transform_mut(parent).remove_child_from_list(child)
    }

    // ── Traversal ────────────────────────────────────────────────────

    /// Top of `e`'s tree.
    pub fn root(&self, e: EntityId) -> EntityId {
        self.lineage(e).last().copied().unwrap_or(e)
    }

    /// Visit every edge below `e`, depth-first, pre-order, children in list
    /// order. `visit` receives `(parent, child)`.
    pub fn descend_tree(&self, e: EntityId, mut visit: impl FnMut(EntityId, EntityId)) {
        let limit = self.hop_limit();
        let mut visited = 0;
        let mut stack: Vec<(EntityId, EntityId)> = self.edges_from(e);
        while let Some((parent, child)) = stack.pop() {
            visited += 1;
            assert!(visited <= limit, "Transform cycle detected below {e:?}");
            visit(parent, child);
            stack.extend(self.edges_from(child));
        }
    }

    /// `(e, child)` pairs in reverse list order, ready for a stack.
    fn edges_from(&self, e: EntityId) -> Vec<(EntityId, EntityId)> {
        self.manager
            .try_component::<Transform>(e)
            .map(|t| t.children().iter().rev().map(|&c| (e, c)).collect())
            .unwrap_or_default()
    }

    /// Every node below `e`, in [`descend_tree`](Self::descend_tree) order.
    pub fn descendants(&self, e: EntityId) -> Vec<EntityId> {
        let mut nodes = Vec::new();
        self.descend_tree(e, |_, child| nodes.push(child));
        nodes
    }
}
