//! # Draw Targets
//!
//! A draw target is a named, ordered list of drawable components. After the
//! drawable systems run, [`Manager::draw`] walks every target in creation
//! order and calls [`Drawable::draw`] on each registered component.
//!
//! ```text
//! DrawTargets
//!   [0] "default": [(Entity(3), Sprite), (Entity(9), Sprite)]
//!   [1] "overlay": [(Entity(4), Label)]
//! ```
//!
//! A drawable sits in exactly one target at a time. Registering it again
//! moves it. The default target always exists. Refresh unregisters drawables
//! whose entity or component is gone.
//!
//! The crate draws nothing itself. `Drawable::draw` is where an application
//! talks to its renderer.

use std::collections::HashMap;

use crate::ecs::component::{Component, ComponentTypeId, component_type_id};
use crate::ecs::entity::EntityId;
use crate::ecs::manager::Manager;

/// A component that can be placed in a draw target.
pub trait Drawable: Component {
    fn draw(&self, manager: &Manager, owner: EntityId);
}

/// Index of a draw target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawTargetId(usize);

impl DrawTargetId {
    /// The target that always exists.
    pub const DEFAULT: DrawTargetId = DrawTargetId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Type-erased pointer to one drawable component.
#[derive(Clone, Copy)]
struct DrawHandle {
    entity: EntityId,
    component_type: ComponentTypeId,
    draw: fn(&Manager, EntityId),
}

fn draw_erased<D: Drawable>(manager: &Manager, owner: EntityId) {
    if let Some(drawable) = manager.try_component::<D>(owner) {
        drawable.draw(manager, owner);
    }
}

/// An ordered list of drawables.
pub struct DrawTarget {
    name: String,
    drawables: Vec<DrawHandle>,
}

impl DrawTarget {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered drawables in draw order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.drawables.iter().map(|handle| handle.entity)
    }

    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }
}

/// All draw targets plus the drawable → target membership map.
pub struct DrawTargets {
    targets: Vec<DrawTarget>,
    membership: HashMap<(EntityId, ComponentTypeId), DrawTargetId>,
}

impl DrawTargets {
    pub fn new() -> Self {
        Self {
            targets: vec![DrawTarget {
                name: "default".to_string(),
                drawables: Vec::new(),
            }],
            membership: HashMap::new(),
        }
    }

    /// Append a new, empty target.
    pub fn add_target(&mut self, name: impl Into<String>) -> DrawTargetId {
        self.targets.push(DrawTarget {
            name: name.into(),
            drawables: Vec::new(),
        });
        DrawTargetId(self.targets.len() - 1)
    }

    pub fn target(&self, id: DrawTargetId) -> Option<&DrawTarget> {
        self.targets.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<DrawTargetId> {
        self.targets
            .iter()
            .position(|target| target.name == name)
            .map(DrawTargetId)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Which target `entity`'s `D` is registered with.
    pub fn target_of<D: Drawable>(&self, entity: EntityId) -> Option<DrawTargetId> {
        self.membership
            .get(&(entity, component_type_id::<D>()))
            .copied()
    }

    /// Register `entity`'s `D` with `target`, or unregister it with `None`.
    ///
    /// # Panics
    ///
    /// Panics if `target` does not exist.
    pub(crate) fn assign<D: Drawable>(&mut self, entity: EntityId, target: Option<DrawTargetId>) {
        let key = (entity, component_type_id::<D>());
        if let Some(previous) = self.membership.remove(&key) {
            self.targets[previous.0]
                .drawables
                .retain(|h| (h.entity, h.component_type) != key);
        }
        let Some(target) = target else {
            return;
        };
        assert!(
            target.0 < self.targets.len(),
            "Draw target {target:?} does not exist"
        );
        self.targets[target.0].drawables.push(DrawHandle {
            entity,
            component_type: key.1,
            draw: draw_erased::<D>,
        });
        self.membership.insert(key, target);
    }

    /// Keep only the drawables for which `keep(entity, type)` holds.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(EntityId, ComponentTypeId) -> bool) {
        let before = self.membership.len();
        self.membership
            .retain(|&(entity, component_type), _| keep(entity, component_type));
        if self.membership.len() == before {
            return;
        }
        let membership = &self.membership;
        for target in &mut self.targets {
            target
                .drawables
                .retain(|h| membership.contains_key(&(h.entity, h.component_type)));
        }
    }

    /// Draw every target in order.
    pub(crate) fn draw(&self, manager: &Manager) {
        for target in &self.targets {
            for handle in &target.drawables {
                (handle.draw)(manager, handle.entity);
            }
        }
    }
}

impl Default for DrawTargets {
    fn default() -> Self {
        Self::new()
    }
}
