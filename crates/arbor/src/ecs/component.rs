//! # Component: Type Identity and Type-Erased Storage
//!
//! Every component type gets a small integer id the first time it is used.
//! That id indexes everything else: the bit in an entity's
//! [`ComponentBitset`], the slot in its direct-indexed table, and the
//! [`ComponentColumn`] in the [`Manager`](super::manager::Manager).
//!
//! ```text
//! component_type_id::<Transform>()      → 0
//! component_type_id::<Wrapper<Vec2>>()  → 1
//!
//! Manager.columns[0]: [t0, t1, t2]  ← insertion order = creation order
//! Manager.columns[1]: [v0]
//!
//! Entity { bitset: 0b11, slots: [Some(2), Some(0), None, ...] }
//! ```
//!
//! ## Why `Box<dyn Component>`?
//!
//! Columns hold boxed trait objects and downcast on typed access. This keeps
//! lifecycle hooks (`setup`, `on_destroy`) callable without knowing the
//! concrete type and needs no unsafe code. Typed reads are one `TypeId`
//! comparison per access.
//!
//! ## Foreign Types
//!
//! Plain values (`Vec2`, `String`, a color tuple) are stored inside a
//! [`Wrapper<T>`]. The holder's type id is derived from `T`, so the
//! `*_value` accessors find it by the wrapped type and hand out `&T`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::LazyLock;

use bitvec::BitArr;
use parking_lot::RwLock;

use super::entity::EntityId;
use super::manager::Manager;

/// Upper bound on distinct component types per process.
pub const MAX_COMPONENTS: usize = 128;

/// Dense index assigned to a component type on first use.
pub type ComponentTypeId = usize;

/// One bit per [`ComponentTypeId`].
pub type ComponentBitset = BitArr!(for MAX_COMPONENTS, in u64);

// ── Type Registry ────────────────────────────────────────────────────────

/// Assigns monotonically increasing ids to Rust types.
///
/// The process-wide instance backs [`component_type_id`]. Standalone
/// instances are only useful for exercising the capacity check.
pub struct TypeRegistry {
    ids: HashMap<TypeId, ComponentTypeId>,
    names: Vec<&'static str>,
    capacity: usize,
}

impl TypeRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: HashMap::new(),
            names: Vec::new(),
            capacity,
        }
    }

    /// Return the id of `T`, assigning the next free one if needed.
    ///
    /// # Panics
    ///
    /// Panics if `T` is new and every id up to the capacity is taken.
    pub fn id_of<T: 'static>(&mut self) -> ComponentTypeId {
        let type_id = TypeId::of::<T>();
        if let Some(&id) = self.ids.get(&type_id) {
            return id;
        }
        let id = self.names.len();
        assert!(
            id < self.capacity,
            "Component type `{}` exceeds the limit of {} component types",
            std::any::type_name::<T>(),
            self.capacity
        );
        self.ids.insert(type_id, id);
        self.names.push(std::any::type_name::<T>());
        id
    }

    /// Look up an already assigned id.
    pub fn get(&self, type_id: TypeId) -> Option<ComponentTypeId> {
        self.ids.get(&type_id).copied()
    }

    /// Full type name for an assigned id.
    pub fn name(&self, id: ComponentTypeId) -> Option<&'static str> {
        self.names.get(id).copied()
    }

    /// Number of ids handed out so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

static REGISTRY: LazyLock<RwLock<TypeRegistry>> =
    LazyLock::new(|| RwLock::new(TypeRegistry::new(MAX_COMPONENTS)));

/// The stable id of component type `T`.
///
/// # Panics
///
/// Panics if more than [`MAX_COMPONENTS`] distinct types are registered.
pub fn component_type_id<T: 'static>() -> ComponentTypeId {
    if let Some(id) = REGISTRY.read().get(TypeId::of::<T>()) {
        return id;
    }
    REGISTRY.write().id_of::<T>()
}

/// The id under which a foreign value type `T` is stored (its holder's id).
pub fn value_type_id<T: 'static>() -> ComponentTypeId {
    component_type_id::<Wrapper<T>>()
}

/// Resolve a runtime [`TypeId`] to its component id, if one was assigned.
pub(crate) fn lookup_type_id(type_id: TypeId) -> Option<ComponentTypeId> {
    REGISTRY.read().get(type_id)
}

/// Number of component types seen by this process so far.
pub fn registered_type_count() -> usize {
    REGISTRY.read().len()
}

/// Human-readable name for a component id.
pub fn component_type_name(id: ComponentTypeId) -> &'static str {
    REGISTRY.read().name(id).unwrap_or("<unregistered>")
}

// ── Component Trait ──────────────────────────────────────────────────────

/// Upcast helper so trait objects can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Per-entity state for one concern.
///
/// Both hooks receive the manager and the owning entity. The component is
/// temporarily moved out of its column while a hook runs, so the hook may
/// freely touch other components (including other instances of its own type).
pub trait Component: AsAny {
    /// Called once, right after the component is attached to its owner.
    fn setup(&mut self, manager: &mut Manager, owner: EntityId) {
        let _ = (manager, owner);
    }

    /// Called during [`Manager::refresh`] just before the component is dropped.
    fn on_destroy(&mut self, manager: &mut Manager, owner: EntityId) {
        let _ = (manager, owner);
    }
}

/// Holder that lets any plain value live in a column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wrapper<T> {
    pub object: T,
}

impl<T> Wrapper<T> {
    pub fn new(object: T) -> Self {
        Self { object }
    }
}

impl<T: 'static> Component for Wrapper<T> {}

/// Downcast a component trait object to `C`.
pub fn downcast_ref<C: Component>(component: &dyn Component) -> Option<&C> {
    component.as_any().downcast_ref::<C>()
}

/// Mutable variant of [`downcast_ref`].
pub fn downcast_mut<C: Component>(component: &mut dyn Component) -> Option<&mut C> {
    component.as_any_mut().downcast_mut::<C>()
}

// ── Column Storage ───────────────────────────────────────────────────────

/// One stored component.
pub(crate) struct ComponentCell {
    /// Current owner. `None` once the component was removed from its entity
    /// or its entity died; the cell is dropped at the next refresh.
    pub owner: Option<EntityId>,
    /// The entity this component was created for. Kept after severing so
    /// `on_destroy` can still name it.
    pub origin: EntityId,
    /// `None` only while a lifecycle hook has the value checked out.
    pub value: Option<Box<dyn Component>>,
}

/// All components of one type, in creation order.
///
/// This is both the owning store and the dense by-type view handed out by
/// [`Manager::components`](super::manager::Manager::components).
#[derive(Default)]
pub struct ComponentColumn {
    cells: Vec<ComponentCell>,
}

impl ComponentColumn {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Append a component owned by `owner` and return its row.
    pub(crate) fn push(&mut self, owner: EntityId, value: Box<dyn Component>) -> usize {
        self.cells.push(ComponentCell {
            owner: Some(owner),
            origin: owner,
            value: Some(value),
        });
        self.cells.len() - 1
    }

    /// Typed shared access.
    ///
    /// # Panics
    ///
    /// Panics on a type mismatch or if a hook currently holds the value.
    pub fn get<C: Component>(&self, row: usize) -> &C {
        self.try_get(row).unwrap_or_else(|| {
            panic!(
                "Component `{}` unavailable at row {row}",
                std::any::type_name::<C>()
            )
        })
    }

    /// Typed mutable access.
    ///
    /// # Panics
    ///
    /// Panics on a type mismatch or if a hook currently holds the value.
    pub fn get_mut<C: Component>(&mut self, row: usize) -> &mut C {
        self.try_get_mut(row).unwrap_or_else(|| {
            panic!(
                "Component `{}` unavailable at row {row}",
                std::any::type_name::<C>()
            )
        })
    }

    pub fn try_get<C: Component>(&self, row: usize) -> Option<&C> {
        let value = self.cells.get(row)?.value.as_deref()?;
        downcast_ref::<C>(value)
    }

    pub fn try_get_mut<C: Component>(&mut self, row: usize) -> Option<&mut C> {
        let value = self.cells.get_mut(row)?.value.as_deref_mut()?;
        downcast_mut::<C>(value)
    }

    /// Untyped access, used by factories and `Entity::components`.
    pub fn get_dyn(&self, row: usize) -> Option<&dyn Component> {
        self.cells.get(row)?.value.as_deref()
    }

    pub fn get_dyn_mut(&mut self, row: usize) -> Option<&mut dyn Component> {
        self.cells.get_mut(row)?.value.as_deref_mut()
    }

    pub fn owner(&self, row: usize) -> Option<EntityId> {
        self.cells.get(row).and_then(|cell| cell.owner)
    }

    /// Detach the component at `row` from its owner.
    pub(crate) fn sever(&mut self, row: usize) {
        if let Some(cell) = self.cells.get_mut(row) {
            cell.owner = None;
        }
    }

    /// Check the value out for a hook call.
    pub(crate) fn take(&mut self, row: usize) -> Option<Box<dyn Component>> {
        self.cells.get_mut(row)?.value.take()
    }

    /// Return a value checked out with [`take`](Self::take).
    pub(crate) fn restore(&mut self, row: usize, value: Box<dyn Component>) {
        if let Some(cell) = self.cells.get_mut(row) {
            cell.value = Some(value);
        }
    }

    pub(crate) fn cells(&self) -> &[ComponentCell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [ComponentCell] {
        &mut self.cells
    }

    /// Drop every severed cell. Returns `(owner, new_row)` for survivors so
    /// the caller can rewire entity slots.
    pub(crate) fn compact(&mut self) -> Vec<(EntityId, usize)> {
        self.cells.retain(|cell| cell.owner.is_some());
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(row, cell)| cell.owner.map(|owner| (owner, row)))
            .collect()
    }

    /// Iterate attached components of type `C` in creation order.
    pub fn iter<C: Component>(&self) -> impl Iterator<Item = (EntityId, &C)> + '_ {
        self.cells.iter().filter_map(|cell| {
            let owner = cell.owner?;
            let value = downcast_ref::<C>(cell.value.as_deref()?)?;
            Some((owner, value))
        })
    }

    /// Mutable variant of [`iter`](Self::iter).
    pub fn iter_mut<C: Component>(&mut self) -> impl Iterator<Item = (EntityId, &mut C)> + '_ {
        self.cells.iter_mut().filter_map(|cell| {
            let owner = cell.owner?;
            let value = downcast_mut::<C>(cell.value.as_deref_mut()?)?;
            Some((owner, value))
        })
    }

    /// Number of stored cells, including severed ones awaiting refresh.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    struct Armor;
    impl Component for Armor {}

    fn owner(n: u64) -> EntityId {
        EntityId::from_raw(n)
    }

    #[test]
    fn type_ids_are_stable_and_distinct() {
        let a = component_type_id::<Health>();
        let b = component_type_id::<Armor>();
        assert_ne!(a, b);
        assert_eq!(a, component_type_id::<Health>());
        assert_eq!(component_type_name(a), std::any::type_name::<Health>());
    }

    #[test]
    fn value_ids_resolve_to_the_holder() {
        assert_eq!(value_type_id::<f32>(), component_type_id::<Wrapper<f32>>());
        assert_ne!(value_type_id::<f32>(), value_type_id::<f64>());
    }

    #[test]
    fn local_registry_assigns_sequentially() {
        let mut registry = TypeRegistry::new(4);
        assert_eq!(registry.id_of::<u8>(), 0);
        assert_eq!(registry.id_of::<u16>(), 1);
        assert_eq!(registry.id_of::<u8>(), 0);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.name(1), Some("u16"));
    }

    #[test]
    #[should_panic(expected = "exceeds the limit")]
    fn registry_capacity_is_fatal() {
        let mut registry = TypeRegistry::new(2);
        registry.id_of::<u8>();
        registry.id_of::<u16>();
        registry.id_of::<u32>();
    }

    #[test]
    fn push_and_get() {
        let mut col = ComponentColumn::new();
        let r0 = col.push(owner(1), Box::new(Health(10)));
        let r1 = col.push(owner(2), Box::new(Health(20)));
        assert_eq!(col.get::<Health>(r0), &Health(10));
        assert_eq!(col.get::<Health>(r1), &Health(20));
        assert_eq!(col.owner(r1), Some(owner(2)));
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn wrong_type_is_none() {
        let mut col = ComponentColumn::new();
        col.push(owner(1), Box::new(Health(1)));
        assert!(col.try_get::<Armor>(0).is_none());
    }

    #[test]
    fn take_and_restore() {
        let mut col = ComponentColumn::new();
        col.push(owner(1), Box::new(Health(5)));

        let taken = col.take(0).unwrap();
        assert!(col.try_get::<Health>(0).is_none());
        assert_eq!(col.iter::<Health>().count(), 0);

        col.restore(0, taken);
        assert_eq!(col.get::<Health>(0), &Health(5));
    }

    #[test]
    fn compact_drops_severed_and_reports_rows() {
        let mut col = ComponentColumn::new();
        col.push(owner(1), Box::new(Health(1)));
        col.push(owner(2), Box::new(Health(2)));
        col.push(owner(3), Box::new(Health(3)));
        col.sever(0);

        let moved = col.compact();
        assert_eq!(moved, vec![(owner(2), 0), (owner(3), 1)]);
        let values: Vec<u32> = col.iter::<Health>().map(|(_, h)| h.0).collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn iter_skips_severed() {
        let mut col = ComponentColumn::new();
        col.push(owner(1), Box::new(Health(1)));
        col.push(owner(2), Box::new(Health(2)));
        col.sever(1);
        let owners: Vec<EntityId> = col.iter::<Health>().map(|(e, _)| e).collect();
        assert_eq!(owners, vec![owner(1)]);
    }

    #[test]
    fn iter_mut_edits_in_place() {
        let mut col = ComponentColumn::new();
        col.push(owner(1), Box::new(Health(1)));
        for (_, h) in col.iter_mut::<Health>() {
            h.0 += 9;
        }
        assert_eq!(col.get::<Health>(0), &Health(10));
    }
}
