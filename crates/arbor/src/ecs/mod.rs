//! # Entity Component System
//!
//! A small ECS where each component type gets a numeric id, each entity a
//! bitset and slot table, and the [`Manager`] owns all values in one column
//! per type. Destruction is deferred to an explicit refresh.
//!
//! ## Module Overview
//!
//! - [`component`]: Type ids, the `Component` trait, `Wrapper`, columns
//! - [`entity`]: Entity ids and the `EntityMut` / `EntityRef` views
//! - [`factory`]: Create / copy / save / load by name
//! - [`manager`]: Central container, frame loop, refresh
//! - [`query`]: Bitset queries and the `type_ids!` macro
//! - [`system`]: System trait with setup / update / draw hooks
//! - [`hierarchy`]: Transform tree operations

pub mod component;
pub mod entity;
pub mod factory;
pub mod hierarchy;
pub mod manager;
pub(crate) mod query;
pub mod system;

pub use component::{
    Component, ComponentColumn, ComponentTypeId, MAX_COMPONENTS, Wrapper, component_type_id,
    value_type_id,
};
pub use entity::{EntityId, EntityMut, EntityRef};
pub use factory::{ComponentFactory, TypedFactory, ValueFactory};
pub use hierarchy::Hierarchy;
pub use manager::Manager;
pub use system::{System, SystemId};
