//! # Query: Finding Entities by Component Set
//!
//! Queries are a bitset superset test over every tracked entity:
//!
//! ```text
//! wanted:  0b0101
//! entity:  0b1101  → match
//! entity:  0b1001  → no match
//! ```
//!
//! Results are plain `Vec<EntityId>` in creation order, so the caller is free
//! to mutate the manager while walking them. Queries never refresh: entities
//! destroyed since the last refresh still match.
//!
//! ```ignore
//! for e in manager.entities_with2::<Transform, Velocity>() {
//!     let v = manager.component::<Velocity>(e).0;
//!     let t = manager.component_mut::<Transform>(e);
//!     t.set_pos(t.pos() + v);
//! }
//!
//! let ids = type_ids![Transform, Wrapper<String>];
//! let named = manager.entities_with_components(&ids);
//! ```

use super::component::{Component, ComponentTypeId, component_type_id};
use super::entity::EntityId;
use super::manager::Manager;

/// Build an array of component type ids from a list of types.
#[macro_export]
macro_rules! type_ids {
    ($($ty:ty),* $(,)?) => {
        [$($crate::ecs::component_type_id::<$ty>()),*]
    };
}

impl Manager {
    /// Every entity whose component set includes all of `types`.
    pub fn entities_with_components(&self, types: &[ComponentTypeId]) -> Vec<EntityId> {
        self.records()
            .filter(|record| record.has_all(types))
            .map(|record| record.id)
            .collect()
    }

    /// Entities that have a `C`.
    pub fn entities_with<C: Component>(&self) -> Vec<EntityId> {
        self.entities_with_components(&[component_type_id::<C>()])
    }

    /// Entities that have both an `A` and a `B`.
    pub fn entities_with2<A: Component, B: Component>(&self) -> Vec<EntityId> {
        self.entities_with_components(&[component_type_id::<A>(), component_type_id::<B>()])
    }

    /// Entities that have an `A`, a `B` and a `C`.
    pub fn entities_with3<A: Component, B: Component, C: Component>(&self) -> Vec<EntityId> {
        self.entities_with_components(&[
            component_type_id::<A>(),
            component_type_id::<B>(),
            component_type_id::<C>(),
        ])
    }

    /// Like [`entities_with_components`](Self::entities_with_components) but
    /// skips destroyed and inactive entities.
    pub fn active_entities_with_components(&self, types: &[ComponentTypeId]) -> Vec<EntityId> {
        self.records()
            .filter(|record| record.alive && record.active && record.has_all(types))
            .map(|record| record.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::ecs::{Component, Manager, Wrapper};

    struct A;
    impl Component for A {}
    struct B;
    impl Component for B {}
    struct C;
    impl Component for C {}

    #[test]
    fn superset_match() {
        let mut manager = Manager::new();
        let ab = manager.create_entity_with(|e| {
            e.add_component(A);
            e.add_component(B);
        });
        let a = manager.create_entity_with(|e| {
            e.add_component(A);
        });
        let abc = manager.create_entity_with(|e| {
            e.add_component(A);
            e.add_component(B);
            e.add_component(C);
        });

        assert_eq!(manager.entities_with::<A>(), vec![ab, a, abc]);
        assert_eq!(manager.entities_with2::<A, B>(), vec![ab, abc]);
        assert_eq!(manager.entities_with3::<A, B, C>(), vec![abc]);
        assert_eq!(manager.entities_with_components(&type_ids![C, B]), vec![abc]);
    }

    #[test]
    fn empty_type_list_matches_everything() {
        let mut manager = Manager::new();
        let e = manager.create_entity();
        assert_eq!(manager.entities_with_components(&[]), vec![e]);
    }

    #[test]
    fn values_are_queried_through_their_holder() {
        let mut manager = Manager::new();
        let named = manager.create_entity_with(|e| {
            e.add_value(String::from("lamp"));
            e.add_component(A);
        });
        manager.create_entity_with(|e| {
            e.add_component(A);
        });
        assert_eq!(
            manager.entities_with_components(&type_ids![Wrapper<String>, A]),
            vec![named]
        );
    }

    #[test]
    fn destroyed_entities_match_until_refresh() {
        let mut manager = Manager::new();
        let e = manager.create_entity_with(|e| {
            e.add_component(A);
        });
        manager.entity_mut(e).destroy();
        assert_eq!(manager.entities_with::<A>(), vec![e]);
        assert!(manager.active_entities_with_components(&type_ids![A]).is_empty());

        manager.refresh();
        assert!(manager.entities_with::<A>().is_empty());
    }

    #[test]
    fn removal_unmatches_immediately() {
        let mut manager = Manager::new();
        let e = manager.create_entity_with(|e| {
            e.add_component(A);
            e.add_component(B);
        });
        manager.entity_mut(e).remove_component::<B>();
        assert!(manager.entities_with2::<A, B>().is_empty());
    }
}
