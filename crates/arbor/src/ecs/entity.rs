//! # Entity: Identity, Flags, and the Slot Table
//!
//! An entity is an id plus bookkeeping. It owns no component values; those
//! live in the manager's columns. What the entity keeps is:
//!
//! - a **bitset** with one bit per component type (O(1) `has_*` and the
//!   superset test behind `entities_with_components`),
//! - a **slot table** mapping each type id to a row in that type's column
//!   (O(1) `get_*`).
//!
//! ```text
//! EntityRecord {
//!     id: Entity(7),
//!     alive: true,
//!     bitset: 0b0101,
//!     slots:  [Some(3), None, Some(0), None, ...],
//! }
//! ```
//!
//! `destroy()` only clears `alive`. The record and its components stay
//! reachable until the next [`Manager::refresh`].
//!
//! All mutation goes through [`EntityMut`], a short-lived view borrowing the
//! manager. Read-only access goes through [`EntityRef`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::component::{
    Component, ComponentBitset, ComponentTypeId, MAX_COMPONENTS, Wrapper, component_type_id,
    registered_type_count, value_type_id,
};
use super::manager::Manager;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique entity handle. Ids are never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild a handle from its raw value. The id is not checked.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Manager-side bookkeeping for one entity.
#[derive(Clone)]
pub(crate) struct EntityRecord {
    pub id: EntityId,
    pub alive: bool,
    pub active: bool,
    pub bitset: ComponentBitset,
    pub slots: [Option<u32>; MAX_COMPONENTS],
}

impl EntityRecord {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            alive: true,
            active: true,
            bitset: ComponentBitset::ZERO,
            slots: [None; MAX_COMPONENTS],
        }
    }

    pub fn has(&self, tid: ComponentTypeId) -> bool {
        self.bitset[tid]
    }

    pub fn slot(&self, tid: ComponentTypeId) -> Option<usize> {
        self.slots[tid].map(|row| row as usize)
    }

    /// True when every type in `types` is present.
    pub fn has_all(&self, types: &[ComponentTypeId]) -> bool {
        types.iter().all(|&tid| self.bitset[tid])
    }
}

// ── EntityMut ────────────────────────────────────────────────────────────

/// Mutable view of one entity.
///
/// ```ignore
/// let e = manager.create_entity();
/// manager.entity_mut(e).add_component(Transform::from_xyz(1.0, 0.0, 0.0));
/// manager.entity_mut(e).add_value(String::from("player"));
/// ```
pub struct EntityMut<'m> {
    manager: &'m mut Manager,
    id: EntityId,
}

impl<'m> EntityMut<'m> {
    pub(crate) fn new(manager: &'m mut Manager, id: EntityId) -> Self {
        Self { manager, id }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    fn record(&self) -> &EntityRecord {
        self.manager.record(self.id)
    }

    pub fn is_alive(&self) -> bool {
        self.record().alive
    }

    pub fn is_active(&self) -> bool {
        self.record().active
    }

    pub fn set_active(&mut self, active: bool) {
        self.manager.record_mut(self.id).active = active;
    }

    pub fn bitset(&self) -> &ComponentBitset {
        &self.record().bitset
    }

    /// Attach `component`, run its `setup` hook, and return the stored value.
    ///
    /// An existing component of the same type is replaced; the old one is
    /// reclaimed at the next refresh.
    ///
    /// # Panics
    ///
    /// Panics if the entity is dead or the component type limit is exceeded.
    pub fn add_component<C: Component>(&mut self, component: C) -> &mut C {
        let tid = component_type_id::<C>();
        let row = self.manager.attach(self.id, tid, Box::new(component));
        self.manager.column_mut(tid).get_mut::<C>(row)
    }

    /// Attach a plain value inside a [`Wrapper`] and return the inner value.
    pub fn add_value<T: 'static>(&mut self, value: T) -> &mut T {
        &mut self.add_component(Wrapper::new(value)).object
    }

    /// Attach a type-erased component, typically one built by a factory.
    pub fn add_boxed(&mut self, component: Box<dyn Component>) -> &mut dyn Component {
        let tid = self.manager.type_of_boxed(&*component);
        let row = self.manager.attach(self.id, tid, component);
        self.manager
            .column_mut(tid)
            .get_dyn_mut(row)
            .unwrap_or_else(|| panic!("Component vanished from {:?} during setup", self.id))
    }

    pub fn has_component<C: Component>(&self) -> bool {
        self.record().has(component_type_id::<C>())
    }

    pub fn has_value<T: 'static>(&self) -> bool {
        self.record().has(value_type_id::<T>())
    }

    pub fn has_type(&self, tid: ComponentTypeId) -> bool {
        self.record().has(tid)
    }

    /// # Panics
    ///
    /// Panics if the entity has no `C`.
    pub fn get_component<C: Component>(&self) -> &C {
        self.manager.component::<C>(self.id)
    }

    pub fn get_component_mut<C: Component>(&mut self) -> &mut C {
        self.manager.component_mut::<C>(self.id)
    }

    pub fn try_get_component<C: Component>(&self) -> Option<&C> {
        self.manager.try_component::<C>(self.id)
    }

    pub fn try_get_component_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.manager.try_component_mut::<C>(self.id)
    }

    /// # Panics
    ///
    /// Panics if the entity has no value of type `T`.
    pub fn get_value<T: 'static>(&self) -> &T {
        self.manager.value::<T>(self.id)
    }

    pub fn get_value_mut<T: 'static>(&mut self) -> &mut T {
        self.manager.value_mut::<T>(self.id)
    }

    pub fn try_get_value<T: 'static>(&self) -> Option<&T> {
        self.manager.try_value::<T>(self.id)
    }

    /// Detach `C`. Storage is reclaimed at the next refresh. Returns false if
    /// the entity had no `C`.
    pub fn remove_component<C: Component>(&mut self) -> bool {
        self.manager.detach(self.id, component_type_id::<C>())
    }

    pub fn remove_value<T: 'static>(&mut self) -> bool {
        self.manager.detach(self.id, value_type_id::<T>())
    }

    /// Mark the entity dead. It disappears at the next refresh.
    pub fn destroy(&mut self) {
        self.manager.destroy_entity(self.id);
    }

    /// The slot table, indexed by type id, up to the highest assigned id.
    pub fn components(&self) -> Vec<Option<&dyn Component>> {
        self.manager.entity(self.id).components()
    }

    /// Reborrow the manager, e.g. to reach the hierarchy.
    pub fn manager(&mut self) -> &mut Manager {
        &mut *self.manager
    }
}

// ── EntityRef ────────────────────────────────────────────────────────────

/// Shared view of one entity.
#[derive(Clone, Copy)]
pub struct EntityRef<'m> {
    manager: &'m Manager,
    id: EntityId,
}

impl<'m> EntityRef<'m> {
    pub(crate) fn new(manager: &'m Manager, id: EntityId) -> Self {
        Self { manager, id }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    fn record(&self) -> &'m EntityRecord {
        self.manager.record(self.id)
    }

    pub fn is_alive(&self) -> bool {
        self.record().alive
    }

    pub fn is_active(&self) -> bool {
        self.record().active
    }

    pub fn bitset(&self) -> &'m ComponentBitset {
        &self.record().bitset
    }

    pub fn has_component<C: Component>(&self) -> bool {
        self.record().has(component_type_id::<C>())
    }

    pub fn has_value<T: 'static>(&self) -> bool {
        self.record().has(value_type_id::<T>())
    }

    pub fn has_type(&self, tid: ComponentTypeId) -> bool {
        self.record().has(tid)
    }

    pub fn get_component<C: Component>(&self) -> &'m C {
        self.manager.component::<C>(self.id)
    }

    pub fn try_get_component<C: Component>(&self) -> Option<&'m C> {
        self.manager.try_component::<C>(self.id)
    }

    pub fn get_value<T: 'static>(&self) -> &'m T {
        self.manager.value::<T>(self.id)
    }

    pub fn try_get_value<T: 'static>(&self) -> Option<&'m T> {
        self.manager.try_value::<T>(self.id)
    }

    pub fn components(&self) -> Vec<Option<&'m dyn Component>> {
        let record = self.record();
        (0..registered_type_count().min(MAX_COMPONENTS))
            .map(|tid| {
                let row = record.slot(tid)?;
                self.manager.column(tid)?.get_dyn(row)
            })
            .collect()
    }
}
