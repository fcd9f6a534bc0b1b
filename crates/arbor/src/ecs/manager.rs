//! # Manager: The Central Container
//!
//! The [`Manager`] owns every entity, every component value, every system,
//! the factory registry, and the draw targets. It is the single source of
//! truth for the runtime state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Manager                                              │
//! │                                                      │
//! │  entities: IndexMap<EntityId, EntityRecord>          │
//! │    insertion order = creation order                  │
//! │                                                      │
//! │  columns: Vec<ComponentColumn>                       │
//! │    index = ComponentTypeId                           │
//! │    value = [(owner, Box<dyn Component>), ...]        │
//! │                                                      │
//! │  systems: Vec<SystemEntry>   (run in order)          │
//! │  factories: FactoryRegistry  (copy / archive)        │
//! │  draw_targets: DrawTargets                           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deferred Destruction
//!
//! `destroy()` and `remove_component()` never free anything. They flip a
//! flag and set `needs_refresh`. The next [`refresh`](Manager::refresh)
//! (run automatically at the start of `update()`) fires `on_destroy` hooks,
//! drops the values, compacts the columns, and forgets dead entities. Until
//! then a destroyed entity is still listed and its components still readable,
//! which keeps iteration stable while systems run.
//!
//! ## Hooks and Borrowing
//!
//! Component hooks and system hooks take `&mut Manager`. The value whose hook
//! is running is checked out of its column (or system list) for the duration,
//! so the hook can borrow anything else. Refresh is held back while a
//! component hook runs because compaction would move rows under it.

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

#[cfg(feature = "diagnostics")]
use crate::diag::{FrameStats, SystemTiming};
use crate::draw::{DrawTargetId, DrawTargets, Drawable};
use crate::scene::SceneError;
use crate::transform::TransformFactory;

use super::component::{
    Component, ComponentColumn, ComponentTypeId, Wrapper, component_type_id, component_type_name,
    lookup_type_id, value_type_id,
};
use super::entity::{EntityId, EntityMut, EntityRecord, EntityRef};
use super::factory::{ComponentFactory, FactoryRegistry, TypedFactory, ValueFactory};
use super::hierarchy::Hierarchy;
use super::system::{System, SystemEntry, SystemId};

#[derive(Clone, Copy)]
enum Phase {
    Setup,
    Update,
    Draw,
}

/// The central container for all runtime state.
pub struct Manager {
    entities: IndexMap<EntityId, EntityRecord>,
    columns: Vec<ComponentColumn>,
    systems: Vec<SystemEntry>,
    next_system_id: u64,
    /// Nesting depth of system phase runs.
    system_depth: u32,
    factories: FactoryRegistry,
    draw_targets: DrawTargets,
    needs_refresh: bool,
    /// Nesting depth of component hooks (`setup` / `on_destroy`).
    hook_depth: u32,
    #[cfg(feature = "diagnostics")]
    stats: FrameStats,
}

impl Manager {
    pub fn new() -> Self {
        let mut manager = Self {
            entities: IndexMap::new(),
            columns: Vec::new(),
            systems: Vec::new(),
            next_system_id: 0,
            system_depth: 0,
            factories: FactoryRegistry::new(),
            draw_targets: DrawTargets::new(),
            needs_refresh: false,
            hook_depth: 0,
            #[cfg(feature = "diagnostics")]
            stats: FrameStats::default(),
        };
        manager.register_factory(Box::new(TransformFactory::new()));
        manager
    }

    // ── Entities ─────────────────────────────────────────────────────

    /// Allocate a new, empty entity.
    pub fn create_entity(&mut self) -> EntityId {
        let id = EntityId::next();
        self.entities.insert(id, EntityRecord::new(id));
        #[cfg(feature = "diagnostics")]
        {
            self.stats.entities_created += 1;
        }
        log::trace!("created {id:?}");
        id
    }

    /// Allocate a new entity and immediately run `setup` on it.
    pub fn create_entity_with(&mut self, setup: impl FnOnce(&mut EntityMut<'_>)) -> EntityId {
        let id = self.create_entity();
        setup(&mut EntityMut::new(self, id));
        id
    }

    /// Mutable view of an entity.
    ///
    /// # Panics
    ///
    /// Panics if the id is unknown (never created, or already refreshed away).
    pub fn entity_mut(&mut self, id: EntityId) -> EntityMut<'_> {
        self.record(id);
        EntityMut::new(self, id)
    }

    /// Shared view of an entity.
    ///
    /// # Panics
    ///
    /// Panics if the id is unknown.
    pub fn entity(&self, id: EntityId) -> EntityRef<'_> {
        self.record(id);
        EntityRef::new(self, id)
    }

    pub fn try_entity(&self, id: EntityId) -> Option<EntityRef<'_>> {
        self.entities.contains_key(&id).then(|| EntityRef::new(self, id))
    }

    /// Every entity in creation order, including destroyed ones awaiting
    /// refresh.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// True if the entity exists and has not been destroyed.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(|record| record.alive)
    }

    /// True if the manager still tracks the entity, dead or alive.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Mark an entity dead. It is removed at the next refresh.
    pub fn destroy_entity(&mut self, id: EntityId) {
        let record = self.record_mut(id);
        if record.alive {
            record.alive = false;
            self.needs_refresh = true;
        }
    }

    /// Create a new entity with copies of every component of `source`.
    ///
    /// Components are copied through their registered factory. Types without
    /// a factory are skipped with a warning.
    pub fn copy_entity(&mut self, source: EntityId) -> EntityId {
        let record = self.record(source).clone();
        let copy = self.create_entity();
        self.record_mut(copy).active = record.active;

        for tid in record.bitset.iter_ones() {
            let Some(row) = record.slot(tid) else {
                continue;
            };
            let Some(factory) = self.factories.for_type(tid) else {
                log::warn!(
                    "copy_entity: no factory registered for `{}`, skipping",
                    component_type_name(tid)
                );
                continue;
            };
            let Some(original) = self.columns[tid].get_dyn(row) else {
                continue;
            };
            let component = factory.copy(original);
            self.attach(copy, tid, component);
        }

        if !record.alive {
            self.destroy_entity(copy);
        }
        copy
    }

    pub(crate) fn record(&self, id: EntityId) -> &EntityRecord {
        self.entities
            .get(&id)
            .unwrap_or_else(|| panic!("{id:?} not found in manager"))
    }

    pub(crate) fn record_mut(&mut self, id: EntityId) -> &mut EntityRecord {
        self.entities
            .get_mut(&id)
            .unwrap_or_else(|| panic!("{id:?} not found in manager"))
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    // ── Component storage ────────────────────────────────────────────

    pub(crate) fn column(&self, tid: ComponentTypeId) -> Option<&ComponentColumn> {
        self.columns.get(tid)
    }

    pub(crate) fn column_mut(&mut self, tid: ComponentTypeId) -> &mut ComponentColumn {
        if self.columns.len() <= tid {
            self.columns.resize_with(tid + 1, ComponentColumn::new);
        }
        &mut self.columns[tid]
    }

    pub(crate) fn type_of_boxed(&self, component: &dyn Component) -> ComponentTypeId {
        let type_id = component.as_any().type_id();
        lookup_type_id(type_id).unwrap_or_else(|| {
            panic!("Boxed component has no type id; construct it through a factory")
        })
    }

    /// Store `component` for `owner`, wire the slot, and run `setup`.
    /// Returns the row of the new value.
    pub(crate) fn attach(
        &mut self,
        owner: EntityId,
        tid: ComponentTypeId,
        component: Box<dyn Component>,
    ) -> usize {
        let record = self.record(owner);
        assert!(
            record.alive,
            "Cannot add `{}` to destroyed {owner:?}",
            component_type_name(tid)
        );
        let replaced = record.slot(tid);

        let column = self.column_mut(tid);
        if let Some(old_row) = replaced {
            column.sever(old_row);
        }
        let row = column.push(owner, component);

        let record = self.record_mut(owner);
        record.bitset.set(tid, true);
        record.slots[tid] = Some(row as u32);
        if replaced.is_some() {
            self.needs_refresh = true;
        }
        #[cfg(feature = "diagnostics")]
        {
            self.stats.components_added += 1;
        }

        if let Some(mut value) = self.columns[tid].take(row) {
            self.hook_depth += 1;
            value.setup(self, owner);
            self.hook_depth -= 1;
            self.columns[tid].restore(row, value);
        }
        row
    }

    /// Clear `tid` from `owner` and sever the stored value.
    pub(crate) fn detach(&mut self, owner: EntityId, tid: ComponentTypeId) -> bool {
        let record = self.record_mut(owner);
        let Some(row) = record.slot(tid) else {
            return false;
        };
        record.bitset.set(tid, false);
        record.slots[tid] = None;
        self.columns[tid].sever(row);
        self.needs_refresh = true;
        true
    }

    fn row_of(&self, owner: EntityId, tid: ComponentTypeId) -> Option<usize> {
        self.entities.get(&owner)?.slot(tid)
    }

    /// # Panics
    ///
    /// Panics if `owner` has no `C`.
    pub fn component<C: Component>(&self, owner: EntityId) -> &C {
        self.try_component::<C>(owner).unwrap_or_else(|| {
            panic!(
                "Component `{}` not found on {owner:?}",
                std::any::type_name::<C>()
            )
        })
    }

    /// # Panics
    ///
    /// Panics if `owner` has no `C`.
    pub fn component_mut<C: Component>(&mut self, owner: EntityId) -> &mut C {
        self.try_component_mut::<C>(owner).unwrap_or_else(|| {
            panic!(
                "Component `{}` not found on {owner:?}",
                std::any::type_name::<C>()
            )
        })
    }

    pub fn try_component<C: Component>(&self, owner: EntityId) -> Option<&C> {
        let tid = component_type_id::<C>();
        let row = self.row_of(owner, tid)?;
        self.columns.get(tid)?.try_get::<C>(row)
    }

    pub fn try_component_mut<C: Component>(&mut self, owner: EntityId) -> Option<&mut C> {
        let tid = component_type_id::<C>();
        let row = self.row_of(owner, tid)?;
        self.columns.get_mut(tid)?.try_get_mut::<C>(row)
    }

    pub fn has_component<C: Component>(&self, owner: EntityId) -> bool {
        self.entities
            .get(&owner)
            .is_some_and(|record| record.has(component_type_id::<C>()))
    }

    /// # Panics
    ///
    /// Panics if `owner` has no value of type `T`.
    pub fn value<T: 'static>(&self, owner: EntityId) -> &T {
        &self.component::<Wrapper<T>>(owner).object
    }

    pub fn value_mut<T: 'static>(&mut self, owner: EntityId) -> &mut T {
        &mut self.component_mut::<Wrapper<T>>(owner).object
    }

    pub fn try_value<T: 'static>(&self, owner: EntityId) -> Option<&T> {
        self.try_component::<Wrapper<T>>(owner).map(|holder| &holder.object)
    }

    pub fn try_value_mut<T: 'static>(&mut self, owner: EntityId) -> Option<&mut T> {
        self.try_component_mut::<Wrapper<T>>(owner)
            .map(|holder| &mut holder.object)
    }

    pub fn has_value<T: 'static>(&self, owner: EntityId) -> bool {
        self.entities
            .get(&owner)
            .is_some_and(|record| record.has(value_type_id::<T>()))
    }

    /// Every attached `C` with its owner, in creation order.
    ///
    /// Components of destroyed entities stay listed until the next refresh.
    pub fn components<C: Component>(&self) -> impl Iterator<Item = (EntityId, &C)> + '_ {
        self.columns
            .get(component_type_id::<C>())
            .into_iter()
            .flat_map(|column| column.iter::<C>())
    }

    pub fn components_mut<C: Component>(
        &mut self,
    ) -> impl Iterator<Item = (EntityId, &mut C)> + '_ {
        self.columns
            .get_mut(component_type_id::<C>())
            .into_iter()
            .flat_map(|column| column.iter_mut::<C>())
    }

    /// Every attached value of type `T` with its owner.
    pub fn values<T: 'static>(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.components::<Wrapper<T>>()
            .map(|(owner, holder)| (owner, &holder.object))
    }

    pub fn values_mut<T: 'static>(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.components_mut::<Wrapper<T>>()
            .map(|(owner, holder)| (owner, &mut holder.object))
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// True once something was destroyed or removed since the last refresh.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Reclaim destroyed entities and detached components.
    ///
    /// Fires `on_destroy` on every component whose owner is dead or which was
    /// removed, drops them, compacts storage, and forgets dead entities. Does
    /// nothing when no destruction is pending. Hooks may destroy more
    /// entities; those are reclaimed in the same pass.
    pub fn refresh(&mut self) {
        if !self.needs_refresh {
            return;
        }
        if self.hook_depth > 0 {
            log::debug!("refresh postponed: a component hook is running");
            return;
        }

        self.hook_depth += 1;
        let mut reclaimed: u32 = 0;
        loop {
            self.sever_dead_owners();
            let doomed = self.severed_cells();
            if doomed.is_empty() {
                break;
            }
            for (tid, row, origin) in doomed {
                if let Some(mut value) = self.columns[tid].take(row) {
                    value.on_destroy(self, origin);
                    reclaimed += 1;
                }
            }
        }
        self.hook_depth -= 1;

        for (tid, column) in self.columns.iter_mut().enumerate() {
            for (owner, row) in column.compact() {
                if let Some(record) = self.entities.get_mut(&owner) {
                    record.slots[tid] = Some(row as u32);
                }
            }
        }

        let before = self.entities.len();
        self.entities.retain(|_, record| record.alive);
        let removed = before - self.entities.len();

        let entities = &self.entities;
        self.draw_targets
            .retain(|entity, tid| entities.get(&entity).is_some_and(|r| r.has(tid)));

        self.needs_refresh = false;
        #[cfg(feature = "diagnostics")]
        {
            self.stats.entities_removed += removed as u32;
            self.stats.components_reclaimed += reclaimed;
        }
        log::debug!("refresh: removed {removed} entities, reclaimed {reclaimed} components");
    }

    /// Sever every cell whose owner is dead or gone.
    fn sever_dead_owners(&mut self) {
        let entities = &self.entities;
        for column in &mut self.columns {
            for cell in column.cells_mut() {
                if let Some(owner) = cell.owner {
                    if !entities.get(&owner).is_some_and(|record| record.alive) {
                        cell.owner = None;
                    }
                }
            }
        }
    }

    /// Severed cells whose value has not been through `on_destroy` yet.
    fn severed_cells(&self) -> Vec<(ComponentTypeId, usize, EntityId)> {
        self.columns
            .iter()
            .enumerate()
            .flat_map(|(tid, column)| {
                column
                    .cells()
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cell.owner.is_none() && cell.value.is_some())
                    .map(move |(row, cell)| (tid, row, cell.origin))
            })
            .collect()
    }

    // ── Systems ──────────────────────────────────────────────────────

    /// Append a system. It runs after every system created before it.
    /// Its `setup` hook is not called here; see [`setup`](Self::setup).
    pub fn create_system<S: System>(&mut self, system: S) -> SystemId {
        let id = SystemId(self.next_system_id);
        self.next_system_id += 1;
        let entry = SystemEntry::new(id, system);
        log::debug!("created system `{}` as {id:?}", entry.name);
        self.systems.push(entry);
        id
    }

    /// Remove a system. Takes effect after the current phase if called from
    /// inside a system hook.
    pub fn remove_system(&mut self, id: SystemId) -> bool {
        let Some(entry) = self.system_entry_mut(id) else {
            return false;
        };
        entry.removed = true;
        if self.system_depth == 0 {
            self.systems.retain(|entry| !entry.removed);
        }
        true
    }

    fn system_entry(&self, id: SystemId) -> Option<&SystemEntry> {
        self.systems
            .iter()
            .find(|entry| entry.id == id && !entry.removed)
    }

    fn system_entry_mut(&mut self, id: SystemId) -> Option<&mut SystemEntry> {
        self.systems
            .iter_mut()
            .find(|entry| entry.id == id && !entry.removed)
    }

    /// Typed access to a system. `None` if the id is unknown, the type does
    /// not match, or the system's own hook is running.
    pub fn system<S: System>(&self, id: SystemId) -> Option<&S> {
        self.system_entry(id)?.downcast_ref::<S>()
    }

    pub fn system_mut<S: System>(&mut self, id: SystemId) -> Option<&mut S> {
        self.system_entry_mut(id)?.downcast_mut::<S>()
    }

    pub fn set_updatable(&mut self, id: SystemId, updatable: bool) {
        if let Some(entry) = self.system_entry_mut(id) {
            entry.updatable = updatable;
        }
    }

    pub fn set_drawable(&mut self, id: SystemId, drawable: bool) {
        if let Some(entry) = self.system_entry_mut(id) {
            entry.drawable = drawable;
        }
    }

    pub fn is_updatable(&self, id: SystemId) -> bool {
        self.system_entry(id).is_some_and(|entry| entry.updatable)
    }

    pub fn is_drawable(&self, id: SystemId) -> bool {
        self.system_entry(id).is_some_and(|entry| entry.drawable)
    }

    pub fn system_count(&self) -> usize {
        self.systems.iter().filter(|entry| !entry.removed).count()
    }

    /// Short names of all systems in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems
            .iter()
            .filter(|entry| !entry.removed)
            .map(|entry| entry.name.as_str())
            .collect()
    }

    fn run_systems(&mut self, phase: Phase) {
        self.system_depth += 1;
        // Systems created during this pass start next pass.
        let count = self.systems.len();
        for index in 0..count {
            let entry = &mut self.systems[index];
            let enabled = match phase {
                Phase::Setup => true,
                Phase::Update => entry.updatable,
                Phase::Draw => entry.drawable,
            };
            if entry.removed || !enabled {
                continue;
            }
            let Some(mut system) = entry.system.take() else {
                continue;
            };

            #[cfg(feature = "diagnostics")]
            let start = std::time::Instant::now();

            match phase {
                Phase::Setup => system.setup(self),
                Phase::Update => system.update(self),
                Phase::Draw => system.draw(self),
            }

            #[cfg(feature = "diagnostics")]
            {
                if matches!(phase, Phase::Update) {
                    self.stats.system_timings.push(SystemTiming {
                        name: self.systems[index].name.clone(),
                        duration_us: start.elapsed().as_secs_f64() * 1_000_000.0,
                    });
                }
            }

            self.systems[index].system = Some(system);
        }
        self.system_depth -= 1;
        if self.system_depth == 0 {
            self.systems.retain(|entry| !entry.removed);
        }
    }

    // ── Frame ────────────────────────────────────────────────────────

    /// Refresh, run every system's `setup`, then run one `update`.
    pub fn setup(&mut self) {
        self.refresh();
        self.run_systems(Phase::Setup);
        self.update();
    }

    /// Refresh, then run every updatable system in order.
    pub fn update(&mut self) {
        #[cfg(feature = "diagnostics")]
        {
            self.stats.begin_frame();
        }
        self.refresh();
        self.run_systems(Phase::Update);
    }

    /// Run every drawable system in order, then every draw target.
    ///
    /// Does not refresh: entities destroyed since the last update are still
    /// drawn this frame.
    pub fn draw(&mut self) {
        self.run_systems(Phase::Draw);
        let manager: &Manager = self;
        manager.draw_targets.draw(manager);
    }

    // ── Factories ────────────────────────────────────────────────────

    /// Register a serializable component under its short type name.
    pub fn register<C>(&mut self)
    where
        C: Component + Clone + Default + Serialize + DeserializeOwned,
    {
        self.register_factory(Box::new(TypedFactory::<C>::new()));
    }

    /// Register a serializable component under an explicit archive name.
    pub fn register_named<C>(&mut self, name: &str)
    where
        C: Component + Clone + Default + Serialize + DeserializeOwned,
    {
        self.register_factory(Box::new(TypedFactory::<C>::named(name)));
    }

    /// Register a plain value type stored through [`Wrapper`].
    pub fn register_value<T>(&mut self)
    where
        T: Clone + Default + Serialize + DeserializeOwned + 'static,
    {
        self.register_factory(Box::new(ValueFactory::<T>::new()));
    }

    pub fn register_factory(&mut self, factory: Box<dyn ComponentFactory>) {
        log::trace!("registered factory `{}`", factory.name());
        self.factories.insert(factory);
    }

    pub fn factory(&self, name: &str) -> Option<&dyn ComponentFactory> {
        self.factories.get(name)
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    /// Build the component registered as `name`, attach it to `owner`, then
    /// load `value` into it.
    ///
    /// The component is attached (and its `setup` has run) before the payload
    /// is applied. On a load error it stays attached with default values.
    pub fn add_archived(
        &mut self,
        owner: EntityId,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<ComponentTypeId, SceneError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SceneError::UnknownComponent(name.to_string()))?;
        let tid = factory.component_type();
        let component = factory.create();
        let row = self.attach(owner, tid, component);

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SceneError::UnknownComponent(name.to_string()))?;
        let component = self.columns[tid].get_dyn_mut(row).ok_or_else(|| {
            SceneError::Deserialize {
                component: name.to_string(),
                message: format!("component detached from {owner:?} during setup"),
            }
        })?;
        factory.load(component, value)?;
        Ok(tid)
    }

    /// Serialize `owner`'s component of type `tid` through its factory.
    /// `None` when the entity lacks the type or no factory is registered.
    pub fn save_component(
        &self,
        owner: EntityId,
        tid: ComponentTypeId,
    ) -> Option<Result<(&str, serde_json::Value), SceneError>> {
        let factory = self.factories.for_type(tid)?;
        let row = self.row_of(owner, tid)?;
        let component = self.columns.get(tid)?.get_dyn(row)?;
        Some(factory.save(component).map(|value| (factory.name(), value)))
    }

    // ── Draw targets ─────────────────────────────────────────────────

    pub fn add_draw_target(&mut self, name: impl Into<String>) -> DrawTargetId {
        self.draw_targets.add_target(name)
    }

    /// Register `entity`'s `D` with `target`, moving it out of any other
    /// target. `None` unregisters it.
    ///
    /// # Panics
    ///
    /// Panics if the entity has no `D` or the target does not exist.
    pub fn set_draw_target<D: Drawable>(&mut self, entity: EntityId, target: Option<DrawTargetId>) {
        assert!(
            target.is_none() || self.has_component::<D>(entity),
            "{entity:?} has no `{}` to draw",
            std::any::type_name::<D>()
        );
        self.draw_targets.assign::<D>(entity, target);
    }

    pub fn draw_targets(&self) -> &DrawTargets {
        &self.draw_targets
    }

    // ── Hierarchy / diagnostics ──────────────────────────────────────

    /// Operations on the transform tree.
    pub fn hierarchy(&mut self) -> Hierarchy<'_> {
        Hierarchy::new(self)
    }

    /// Counters for the current frame.
    #[cfg(feature = "diagnostics")]
    pub fn diagnostics(&self) -> &FrameStats {
        &self.stats
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
    struct Position(f32, f32);
    impl Component for Position {}

    #[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
    struct Velocity(f32, f32);
    impl Component for Velocity {}

    /// Records hook calls into a shared log.
    struct Probe {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Component for Probe {
        fn setup(&mut self, manager: &mut Manager, owner: EntityId) {
            assert!(manager.has_component::<Probe>(owner));
            self.log.borrow_mut().push(format!("setup {}", self.name));
        }

        fn on_destroy(&mut self, _manager: &mut Manager, _owner: EntityId) {
            self.log.borrow_mut().push(format!("destroy {}", self.name));
        }
    }

    fn probe(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Probe {
        Probe {
            name,
            log: Rc::clone(log),
        }
    }

    #[test]
    fn create_and_query() {
        let mut manager = Manager::new();
        let a = manager.create_entity_with(|e| {
            e.add_component(Position(1.0, 2.0));
            e.add_component(Velocity(0.5, 0.0));
        });
        let b = manager.create_entity_with(|e| {
            e.add_component(Position(3.0, 4.0));
        });

        assert_eq!(manager.entity_count(), 2);
        assert_eq!(manager.component::<Position>(a), &Position(1.0, 2.0));
        assert_eq!(manager.try_component::<Velocity>(b), None);

        let positions: Vec<EntityId> = manager.components::<Position>().map(|(e, _)| e).collect();
        assert_eq!(positions, vec![a, b]);
    }

    #[test]
    fn components_mut_edits_in_place() {
        let mut manager = Manager::new();
        let e = manager.create_entity_with(|e| {
            e.add_component(Position(0.0, 0.0));
        });
        for (_, pos) in manager.components_mut::<Position>() {
            pos.0 += 5.0;
        }
        assert_eq!(manager.component::<Position>(e).0, 5.0);
    }

    #[test]
    fn values_view() {
        let mut manager = Manager::new();
        let a = manager.create_entity_with(|e| {
            e.add_value(3_u8);
        });
        manager.create_entity_with(|e| {
            e.add_value(4_u8);
        });
        *manager.value_mut::<u8>(a) += 10;
        let values: Vec<u8> = manager.values::<u8>().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![13, 4]);
        assert!(manager.has_value::<u8>(a));
    }

    #[test]
    fn destroy_is_deferred_until_refresh() {
        let mut manager = Manager::new();
        let e = manager.create_entity_with(|e| {
            e.add_component(Position(1.0, 1.0));
        });
        manager.entity_mut(e).destroy();

        assert!(!manager.is_alive(e));
        assert!(manager.contains(e));
        assert_eq!(manager.entities().collect::<Vec<_>>(), vec![e]);
        assert_eq!(manager.components::<Position>().count(), 1);
        assert!(manager.needs_refresh());

        manager.refresh();
        assert!(!manager.contains(e));
        assert_eq!(manager.entity_count(), 0);
        assert_eq!(manager.components::<Position>().count(), 0);
        assert!(!manager.needs_refresh());
    }

    #[test]
    fn refresh_rewires_surviving_slots() {
        let mut manager = Manager::new();
        let ids: Vec<EntityId> = (0..5)
            .map(|i| {
                manager.create_entity_with(|e| {
                    e.add_component(Position(i as f32, 0.0));
                })
            })
            .collect();
        manager.entity_mut(ids[0]).destroy();
        manager.entity_mut(ids[2]).destroy();
        manager.refresh();

        assert_eq!(manager.component::<Position>(ids[1]).0, 1.0);
        assert_eq!(manager.component::<Position>(ids[3]).0, 3.0);
        assert_eq!(manager.component::<Position>(ids[4]).0, 4.0);
        assert_eq!(manager.column(component_type_id::<Position>()).unwrap().len(), 3);
    }

    #[test]
    fn refresh_without_pending_work_is_a_noop() {
        let mut manager = Manager::new();
        let e = manager.create_entity();
        manager.refresh();
        assert!(manager.contains(e));
    }

    #[test]
    fn hooks_fire_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = Manager::new();
        let a = manager.create_entity_with(|e| {
            e.add_component(probe("a", &log));
        });
        let b = manager.create_entity_with(|e| {
            e.add_component(probe("b", &log));
        });
        manager.entity_mut(a).destroy();
        manager.entity_mut(b).remove_component::<Probe>();
        manager.refresh();

        assert_eq!(
            *log.borrow(),
            vec!["setup a", "setup b", "destroy a", "destroy b"]
        );
        assert!(manager.contains(b));
    }

    #[test]
    fn replacing_a_component_reclaims_the_old_one() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = Manager::new();
        let e = manager.create_entity_with(|e| {
            e.add_component(probe("old", &log));
            e.add_component(probe("new", &log));
        });
        assert_eq!(manager.component::<Probe>(e).name, "new");
        manager.refresh();
        assert_eq!(*log.borrow(), vec!["setup old", "setup new", "destroy old"]);
        assert_eq!(manager.components::<Probe>().count(), 1);
    }

    #[test]
    fn on_destroy_can_destroy_more_entities() {
        struct Link(EntityId);
        impl Component for Link {
            fn on_destroy(&mut self, manager: &mut Manager, _owner: EntityId) {
                manager.destroy_entity(self.0);
            }
        }

        let mut manager = Manager::new();
        let tail = manager.create_entity_with(|e| {
            e.add_component(Position(0.0, 0.0));
        });
        let head = manager.create_entity_with(|e| {
            e.add_component(Link(tail));
        });
        manager.entity_mut(head).destroy();
        manager.refresh();

        assert_eq!(manager.entity_count(), 0);
        assert_eq!(manager.components::<Position>().count(), 0);
    }

    #[test]
    #[should_panic(expected = "destroyed")]
    fn adding_to_a_destroyed_entity_panics() {
        let mut manager = Manager::new();
        let e = manager.create_entity();
        manager.entity_mut(e).destroy();
        manager.entity_mut(e).add_component(Position(0.0, 0.0));
    }

    #[test]
    #[should_panic(expected = "not found in manager")]
    fn unknown_entity_panics() {
        let manager = Manager::new();
        manager.entity(EntityId::from_raw(u64::MAX));
    }

    #[test]
    fn copy_entity_uses_factories() {
        let mut manager = Manager::new();
        manager.register::<Position>();
        let source = manager.create_entity_with(|e| {
            e.add_component(Position(2.0, 3.0));
            e.add_component(Velocity(1.0, 1.0));
            e.set_active(false);
        });

        let copy = manager.copy_entity(source);
        assert_ne!(copy, source);
        assert_eq!(manager.component::<Position>(copy), &Position(2.0, 3.0));
        // No factory for Velocity.
        assert!(!manager.has_component::<Velocity>(copy));
        assert!(!manager.entity(copy).is_active());

        manager.component_mut::<Position>(copy).0 = 9.0;
        assert_eq!(manager.component::<Position>(source).0, 2.0);
    }

    #[test]
    fn systems_run_in_creation_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut manager = Manager::new();
        for name in ["first", "second", "third"] {
            let log = Rc::clone(&log);
            manager.create_system(move |_m: &mut Manager| log.borrow_mut().push(name));
        }
        manager.update();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    struct Ticker {
        setups: u32,
        updates: u32,
        draws: u32,
    }

    impl System for Ticker {
        fn setup(&mut self, _manager: &mut Manager) {
            self.setups += 1;
        }
        fn update(&mut self, _manager: &mut Manager) {
            self.updates += 1;
        }
        fn draw(&mut self, _manager: &mut Manager) {
            self.draws += 1;
        }
    }

    fn ticker() -> Ticker {
        Ticker {
            setups: 0,
            updates: 0,
            draws: 0,
        }
    }

    #[test]
    fn setup_runs_setup_then_one_update() {
        let mut manager = Manager::new();
        let id = manager.create_system(ticker());
        manager.setup();
        manager.draw();

        let t = manager.system::<Ticker>(id).unwrap();
        assert_eq!((t.setups, t.updates, t.draws), (1, 1, 1));
    }

    #[test]
    fn updatable_and_drawable_flags() {
        let mut manager = Manager::new();
        let id = manager.create_system(ticker());
        manager.set_updatable(id, false);
        manager.update();
        manager.draw();
        manager.set_drawable(id, false);
        manager.set_updatable(id, true);
        manager.update();
        manager.draw();

        assert!(manager.is_updatable(id));
        assert!(!manager.is_drawable(id));
        let t = manager.system::<Ticker>(id).unwrap();
        assert_eq!((t.updates, t.draws), (1, 1));
    }

    #[test]
    fn remove_system_from_inside_a_system() {
        let mut manager = Manager::new();
        let victim = manager.create_system(ticker());
        manager.create_system(move |m: &mut Manager| {
            m.remove_system(victim);
        });
        manager.update();
        assert_eq!(manager.system_count(), 1);
        assert!(manager.system::<Ticker>(victim).is_none());
        assert_eq!(manager.system_names(), vec!["<closure>"]);
    }

    #[test]
    fn update_refreshes_before_systems() {
        let mut manager = Manager::new();
        let e = manager.create_entity();
        manager.entity_mut(e).destroy();
        let seen = Rc::new(RefCell::new(usize::MAX));
        let sink = Rc::clone(&seen);
        manager.create_system(move |m: &mut Manager| *sink.borrow_mut() = m.entity_count());
        manager.update();
        assert_eq!(*seen.borrow(), 0);
    }

    #[test]
    fn draw_does_not_refresh() {
        let mut manager = Manager::new();
        let e = manager.create_entity();
        manager.entity_mut(e).destroy();
        manager.draw();
        assert!(manager.contains(e));
    }

    #[cfg(feature = "diagnostics")]
    #[test]
    fn diagnostics_count_frame_activity() {
        let mut manager = Manager::new();
        manager.create_system(|_m: &mut Manager| {});
        let e = manager.create_entity_with(|e| {
            e.add_component(Position(0.0, 0.0));
        });
        manager.entity_mut(e).destroy();
        manager.update();

        let stats = manager.diagnostics();
        assert_eq!(stats.frame, 1);
        assert_eq!(stats.entities_removed, 1);
        assert_eq!(stats.components_reclaimed, 1);
        assert_eq!(stats.system_timings.len(), 1);
        assert_eq!(stats.system_timings[0].name, "<closure>");
    }
}
