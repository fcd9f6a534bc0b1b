//! # Transform: Hierarchical Spatial Component
//!
//! A [`Transform`] stores a local pose (position, anchor point, scale,
//! rotation) plus two cached matrices:
//!
//! ```text
//! local = T(pos + anchor) · R(rotation) · S(scale) · T(-anchor)
//! world = parent.world · local          (or just local for a root)
//! ```
//!
//! The anchor is the pivot for rotation and scale. A sprite whose anchor sits
//! at its centre spins about its centre; its world position
//! ([`Hierarchy::world_pos`](crate::ecs::hierarchy::Hierarchy::world_pos)) is
//! where the anchor lands in world space.
//!
//! Setters only mark the transform dirty. Matrices are rebuilt by
//! [`TransformSystem`] once per update, or on demand by the world-space
//! accessors on [`Hierarchy`](crate::ecs::hierarchy::Hierarchy).
//!
//! Tree links are entity ids, never pointers. Edit them through the
//! hierarchy so both ends stay consistent.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ecs::component::{Component, ComponentTypeId, component_type_id, downcast_mut, downcast_ref};
use crate::ecs::entity::EntityId;
use crate::ecs::factory::ComponentFactory;
use crate::ecs::manager::Manager;
use crate::ecs::system::System;
use crate::math::{EulerRot, Mat4, Quat, Vec3};
use crate::scene::SceneError;

static NEXT_TRANSFORM_ID: AtomicU64 = AtomicU64::new(1);

/// Called with the owning entity and the new world matrix after a
/// recompute.
pub type TransformListener = Rc<dyn Fn(EntityId, &Mat4)>;

/// Local pose, cached matrices, and tree links.
pub struct Transform {
    pos: Vec3,
    anchor: Vec3,
    scale: Vec3,
    rotation: Quat,
    local: Mat4,
    world: Mat4,
    dirty: bool,
    always_update: bool,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    listeners: Vec<TransformListener>,
    id: u64,
}

impl Transform {
    pub fn new() -> Self {
        Self {
            pos: Vec3::ZERO,
            anchor: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            dirty: true,
            always_update: false,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
            id: NEXT_TRANSFORM_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Create a transform at the given position.
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        let mut t = Self::new();
        t.pos = Vec3::new(x, y, z);
        t
    }

    /// Create a transform at the given 2D position (z = 0).
    pub fn from_xy(x: f32, y: f32) -> Self {
        Self::from_xyz(x, y, 0.0)
    }

    /// Return a copy with uniform scale applied.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_anchor(mut self, anchor: Vec3) -> Self {
        self.anchor = anchor;
        self
    }

    // ── Local pose ───────────────────────────────────────────────────

    pub fn pos(&self) -> Vec3 {
        self.pos
    }

    pub fn set_pos(&mut self, pos: Vec3) {
        self.pos = pos;
        self.dirty = true;
    }

    pub fn anchor_point(&self) -> Vec3 {
        self.anchor
    }

    pub fn set_anchor_point(&mut self, anchor: Vec3) {
        self.anchor = anchor;
        self.dirty = true;
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.dirty = true;
    }

    pub fn set_uniform_scale(&mut self, scale: f32) {
        self.set_scale(Vec3::splat(scale));
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.dirty = true;
    }

    /// Rotation about +Z, for 2D use.
    pub fn set_rotation_radians(&mut self, radians: f32) {
        self.set_rotation(Quat::from_rotation_z(radians));
    }

    /// Angle about +Z. Meaningful when the rotation is a pure Z rotation.
    pub fn rotation_radians(&self) -> f32 {
        self.rotation.to_euler(EulerRot::ZYX).0
    }

    /// Replace the local pose with the one encoded in `matrix`, keeping the
    /// current anchor point.
    pub fn set_local_matrix(&mut self, matrix: Mat4) {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        self.scale = scale;
        self.rotation = rotation;
        self.pos = translation - self.anchor + rotation * (scale * self.anchor);
        self.dirty = true;
    }

    /// `T(pos + anchor) · R · S · T(-anchor)` from the current fields.
    pub fn compute_local_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.pos + self.anchor)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_scale(self.scale)
            * Mat4::from_translation(-self.anchor)
    }

    /// Local matrix as of the last recompute.
    pub fn local_matrix(&self) -> Mat4 {
        self.local
    }

    /// World matrix as of the last recompute. May be stale; use
    /// [`Hierarchy::world_matrix`](crate::ecs::hierarchy::Hierarchy::world_matrix)
    /// for an up-to-date value.
    pub fn cached_world_matrix(&self) -> Mat4 {
        self.world
    }

    // ── Update policy ────────────────────────────────────────────────

    pub fn needs_update(&self) -> bool {
        self.dirty || self.always_update
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Recompute this transform every update even when nothing changed.
    pub fn set_always_update(&mut self, always: bool) {
        self.always_update = always;
    }

    pub fn always_update(&self) -> bool {
        self.always_update
    }

    /// Rebuild both matrices against `parent_world`. Returns the new world
    /// matrix.
    pub(crate) fn recompute(&mut self, parent_world: Option<Mat4>) -> Mat4 {
        self.local = self.compute_local_matrix();
        self.world = match parent_world {
            Some(parent_world) => parent_world * self.local,
            None => self.local,
        };
        self.dirty = false;
        self.world
    }

    // ── Tree links ───────────────────────────────────────────────────

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub(crate) fn set_parent_link(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
        self.dirty = true;
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Position of `child` in the child list.
    pub fn find_child(&self, child: EntityId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Append `child` to the child list only. Returns false if already listed.
    pub fn add_child_to_list(&mut self, child: EntityId) -> bool {
        if self.find_child(child).is_some() {
            return false;
        }
        self.children.push(child);
        true
    }

    /// Remove `child` from the child list only, keeping sibling order.
    pub fn remove_child_from_list(&mut self, child: EntityId) -> bool {
        match self.find_child(child) {
            Some(index) => {
                self.children.remove(index);
                true
            }
            None => false,
        }
    }

    // ── Identity / listeners ─────────────────────────────────────────

    /// Process-unique id of this transform instance. Copies get a new one.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register a callback fired after each notifying recompute.
    pub fn on_update(&mut self, listener: impl Fn(EntityId, &Mat4) + 'static) {
        self.listeners.push(Rc::new(listener));
    }

    pub(crate) fn emit(&self, owner: EntityId) {
        for listener in &self.listeners {
            listener(owner, &self.world);
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies the pose and the parent link. The copy has a fresh id, no
/// children, and no listeners.
impl Clone for Transform {
    fn clone(&self) -> Self {
        Self {
            pos: self.pos,
            anchor: self.anchor,
            scale: self.scale,
            rotation: self.rotation,
            local: self.local,
            world: self.world,
            dirty: true,
            always_update: self.always_update,
            parent: self.parent,
            children: Vec::new(),
            listeners: Vec::new(),
            id: NEXT_TRANSFORM_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("id", &self.id)
            .field("pos", &self.pos)
            .field("anchor", &self.anchor)
            .field("scale", &self.scale)
            .field("rotation", &self.rotation)
            .field("dirty", &self.dirty)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl Component for Transform {
    fn setup(&mut self, manager: &mut Manager, owner: EntityId) {
        let Some(parent) = self.parent else {
            return;
        };
        match manager.try_component_mut::<Transform>(parent) {
            Some(parent_transform) => {
                parent_transform.add_child_to_list(owner);
            }
            None => {
                log::warn!("{owner:?}: parent {parent:?} has no Transform, detaching");
                self.parent = None;
            }
        }
        self.dirty = true;
    }

    fn on_destroy(&mut self, manager: &mut Manager, owner: EntityId) {
        // A replacement Transform on the same entity may have taken over
        // this node's links before the refresh.
        let (successor_parent, successor_children) =
            match manager.try_component::<Transform>(owner) {
                Some(successor) => (successor.parent, successor.children.clone()),
                None => (None, Vec::new()),
            };

        for child in std::mem::take(&mut self.children) {
            if successor_children.contains(&child) {
                continue;
            }
            if let Some(child_transform) = manager.try_component_mut::<Transform>(child) {
                if child_transform.parent == Some(owner) {
                    child_transform.set_parent_link(None);
                }
            }
        }
        if let Some(parent) = self.parent.take() {
            if successor_parent == Some(parent) {
                return;
            }
            if let Some(parent_transform) = manager.try_component_mut::<Transform>(parent) {
                parent_transform.remove_child_from_list(owner);
            }
        }
    }
}

// ── Archive ──────────────────────────────────────────────────────────────

/// Persisted fields of a [`Transform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub pos: Vec3,
    #[serde(default)]
    pub anchor: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub rotation: Quat,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub always_update: bool,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl From<&Transform> for TransformRecord {
    fn from(t: &Transform) -> Self {
        Self {
            pos: t.pos,
            anchor: t.anchor,
            scale: t.scale,
            rotation: t.rotation,
            always_update: t.always_update,
        }
    }
}

/// Factory for [`Transform`], registered by every [`Manager`] under the
/// name `"Transform"`. Tree links are not part of the record; archives store
/// them separately.
pub struct TransformFactory {
    component_type: ComponentTypeId,
}

impl TransformFactory {
    pub fn new() -> Self {
        Self {
            component_type: component_type_id::<Transform>(),
        }
    }
}

impl Default for TransformFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentFactory for TransformFactory {
    fn name(&self) -> &str {
        "Transform"
    }

    fn component_type(&self) -> ComponentTypeId {
        self.component_type
    }

    fn create(&self) -> Box<dyn Component> {
        Box::new(Transform::new())
    }

    fn copy(&self, source: &dyn Component) -> Box<dyn Component> {
        let source = downcast_ref::<Transform>(source)
            .unwrap_or_else(|| panic!("Factory `Transform` asked to copy a foreign type"));
        Box::new(source.clone())
    }

    fn save(&self, component: &dyn Component) -> Result<Value, SceneError> {
        let transform = downcast_ref::<Transform>(component).ok_or_else(|| {
            SceneError::Serialize("component is not a `Transform`".to_string())
        })?;
        serde_json::to_value(TransformRecord::from(transform))
            .map_err(|e| SceneError::Serialize(e.to_string()))
    }

    fn load(&self, component: &mut dyn Component, value: &Value) -> Result<(), SceneError> {
        let malformed = |message: String| SceneError::Deserialize {
            component: "Transform".to_string(),
            message,
        };
        let transform = downcast_mut::<Transform>(component)
            .ok_or_else(|| malformed("component is not a `Transform`".to_string()))?;
        let record = TransformRecord::deserialize(value).map_err(|e| malformed(e.to_string()))?;
        transform.pos = record.pos;
        transform.anchor = record.anchor;
        transform.scale = record.scale;
        transform.rotation = record.rotation;
        transform.always_update = record.always_update;
        transform.dirty = true;
        Ok(())
    }
}

// ── TransformSystem ──────────────────────────────────────────────────────

/// Recomputes every transform that needs it, notifying listeners.
///
/// Stale subtrees are rebuilt from their top-most stale ancestor, so a
/// parent is always current before its children.
#[derive(Debug, Default)]
pub struct TransformSystem {
    updated_last_frame: usize,
}

impl TransformSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many transforms the last update recomputed.
    pub fn updated_last_frame(&self) -> usize {
        self.updated_last_frame
    }
}

impl System for TransformSystem {
    fn update(&mut self, manager: &mut Manager) {
        let stale: Vec<EntityId> = manager
            .components::<Transform>()
            .filter(|(_, t)| t.needs_update())
            .map(|(e, _)| e)
            .collect();

        let mut seen = HashSet::new();
        for e in stale {
            if seen.contains(&e) {
                continue;
            }
            let still_stale = manager
                .try_component::<Transform>(e)
                .is_some_and(|t| t.needs_update());
            if still_stale {
                manager.hierarchy().update_tracked(e, true, &mut seen);
            }
        }
        self.updated_last_frame = seen.len();
    }
}
