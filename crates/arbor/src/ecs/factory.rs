//! # Component Factories
//!
//! A factory knows how to build, copy, and (de)serialize one component type
//! without the caller naming that type. The manager keeps one registry of
//! them, keyed both by a short name (used in archives) and by type id (used
//! by `copy_entity` and `save_tree`).
//!
//! ```ignore
//! manager.register::<Health>();            // name "Health"
//! manager.register_value::<String>();      // name "String"
//! manager.register_named::<Health>("hp");  // explicit archive key
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::component::{
    Component, ComponentTypeId, Wrapper, component_type_id, downcast_mut, downcast_ref,
    value_type_id,
};
use crate::scene::SceneError;

/// Type-erased constructor, copier, and codec for one component type.
pub trait ComponentFactory {
    /// Archive key for this type.
    fn name(&self) -> &str;

    fn component_type(&self) -> ComponentTypeId;

    /// A fresh component holding default values.
    fn create(&self) -> Box<dyn Component>;

    /// A value copy of `source`.
    ///
    /// # Panics
    ///
    /// Panics if `source` is not this factory's type.
    fn copy(&self, source: &dyn Component) -> Box<dyn Component>;

    fn save(&self, component: &dyn Component) -> Result<Value, SceneError>;

    /// Overwrite `component`'s persisted fields from `value`.
    fn load(&self, component: &mut dyn Component, value: &Value) -> Result<(), SceneError>;
}

fn mismatch<T>(factory: &str) -> SceneError {
    SceneError::Deserialize {
        component: factory.to_string(),
        message: format!(
            "component is not a `{}`",
            short_type_name(std::any::type_name::<T>())
        ),
    }
}

// ── TypedFactory ─────────────────────────────────────────────────────────

/// Factory for a native component that is cloneable and serde-serializable.
pub struct TypedFactory<C> {
    name: String,
    component_type: ComponentTypeId,
    _marker: PhantomData<fn() -> C>,
}

impl<C> TypedFactory<C>
where
    C: Component + Clone + Default + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::named(short_type_name(std::any::type_name::<C>()))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type: component_type_id::<C>(),
            _marker: PhantomData,
        }
    }
}

impl<C> Default for TypedFactory<C>
where
    C: Component + Clone + Default + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ComponentFactory for TypedFactory<C>
where
    C: Component + Clone + Default + Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> ComponentTypeId {
        self.component_type
    }

    fn create(&self) -> Box<dyn Component> {
        Box::new(C::default())
    }

    fn copy(&self, source: &dyn Component) -> Box<dyn Component> {
        let source = downcast_ref::<C>(source)
            .unwrap_or_else(|| panic!("Factory `{}` asked to copy a foreign type", self.name));
        Box::new(source.clone())
    }

    fn save(&self, component: &dyn Component) -> Result<Value, SceneError> {
        let component = downcast_ref::<C>(component).ok_or_else(|| mismatch::<C>(&self.name))?;
        serde_json::to_value(component).map_err(|e| SceneError::Serialize(e.to_string()))
    }

    fn load(&self, component: &mut dyn Component, value: &Value) -> Result<(), SceneError> {
        let target = downcast_mut::<C>(component).ok_or_else(|| mismatch::<C>(&self.name))?;
        *target = C::deserialize(value).map_err(|e| SceneError::Deserialize {
            component: self.name.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

// ── ValueFactory ─────────────────────────────────────────────────────────

/// Factory for a plain value stored in a [`Wrapper`]. The archive holds the
/// bare value, not the holder.
pub struct ValueFactory<T> {
    name: String,
    component_type: ComponentTypeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ValueFactory<T>
where
    T: Clone + Default + Serialize + DeserializeOwned + 'static,
{
    pub fn new() -> Self {
        Self::named(short_type_name(std::any::type_name::<T>()))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type: value_type_id::<T>(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ValueFactory<T>
where
    T: Clone + Default + Serialize + DeserializeOwned + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ComponentFactory for ValueFactory<T>
where
    T: Clone + Default + Serialize + DeserializeOwned + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn component_type(&self) -> ComponentTypeId {
        self.component_type
    }

    fn create(&self) -> Box<dyn Component> {
        Box::new(Wrapper::new(T::default()))
    }

    fn copy(&self, source: &dyn Component) -> Box<dyn Component> {
        let source = downcast_ref::<Wrapper<T>>(source)
            .unwrap_or_else(|| panic!("Factory `{}` asked to copy a foreign type", self.name));
        Box::new(source.clone())
    }

    fn save(&self, component: &dyn Component) -> Result<Value, SceneError> {
        let holder =
            downcast_ref::<Wrapper<T>>(component).ok_or_else(|| mismatch::<T>(&self.name))?;
        serde_json::to_value(&holder.object).map_err(|e| SceneError::Serialize(e.to_string()))
    }

    fn load(&self, component: &mut dyn Component, value: &Value) -> Result<(), SceneError> {
        let holder =
            downcast_mut::<Wrapper<T>>(component).ok_or_else(|| mismatch::<T>(&self.name))?;
        holder.object = T::deserialize(value).map_err(|e| SceneError::Deserialize {
            component: self.name.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Factories by archive name (registration order kept) and by type id.
#[derive(Default)]
pub struct FactoryRegistry {
    by_name: IndexMap<String, Box<dyn ComponentFactory>>,
    by_type: HashMap<ComponentTypeId, String>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory. A factory already registered under the same name or
    /// for the same type is replaced.
    pub fn insert(&mut self, factory: Box<dyn ComponentFactory>) {
        let name = factory.name().to_string();
        let tid = factory.component_type();
        if let Some(old_name) = self.by_type.insert(tid, name.clone()) {
            if old_name != name {
                log::warn!("Factory `{old_name}` replaced by `{name}` for the same component type");
                self.by_name.shift_remove(&old_name);
            }
        }
        if let Some(previous) = self.by_name.insert(name, factory) {
            let previous_tid = previous.component_type();
            if previous_tid != tid {
                self.by_type.remove(&previous_tid);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn ComponentFactory> {
        self.by_name.get(name).map(|f| f.as_ref())
    }

    pub fn for_type(&self, tid: ComponentTypeId) -> Option<&dyn ComponentFactory> {
        let name = self.by_type.get(&tid)?;
        self.get(name)
    }

    /// Registered archive names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Strip module paths from a type name, including inside generics
/// (`alloc::vec::Vec<my_game::Item>` → `Vec<Item>`).
pub(crate) fn short_type_name(full: &str) -> String {
    if let Some(angle) = full.find('<') {
        let prefix = &full[..angle];
        let short_prefix = prefix.rsplit("::").next().unwrap_or(prefix);
        let inner = full[angle + 1..].strip_suffix('>').unwrap_or(&full[angle + 1..]);
        let short_inner: Vec<String> = inner.split(", ").map(short_type_name).collect();
        format!("{}<{}>", short_prefix, short_inner.join(", "))
    } else {
        full.rsplit("::").next().unwrap_or(full).to_string()
    }
}
