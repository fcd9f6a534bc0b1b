//! # Scene Archive: Save and Load Entity Trees
//!
//! Entities are written through their component factories into a JSON
//! document. Each record carries the entity's id at save time, its component
//! payloads keyed by factory name, and the id of its transform parent.
//!
//! ```json
//! {
//!   "entities": [
//!     { "id": 4, "components": { "Transform": { "pos": [0, 0, 0], ... } } },
//!     { "id": 7, "components": { "Transform": { ... }, "String": "lamp" }, "parent": 4 }
//!   ]
//! }
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! manager.register::<Health>();
//!
//! let data = save_tree(&manager, root)?;
//! save_to_file(&data, "level.json")?;
//!
//! let data = load_from_file("level.json")?;
//! let new_root = load_tree(&mut manager, &data)?;
//! ```
//!
//! Components without a registered factory are left out when saving. Unknown
//! names and parent ids that are not part of the document are skipped with a
//! warning when loading. A payload that fails to deserialize aborts the load
//! and destroys everything the load had created.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ecs::entity::EntityId;
use crate::ecs::manager::Manager;
use crate::transform::Transform;

/// Failure while saving or loading an archive.
#[derive(Debug)]
pub enum SceneError {
    /// A component could not be turned into JSON.
    Serialize(String),
    /// A component payload did not match its factory's format.
    Deserialize { component: String, message: String },
    /// No factory is registered under this name.
    UnknownComponent(String),
    /// The document itself is not a valid archive.
    Format(String),
    /// Reading or writing the archive file failed.
    Io(String),
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::Serialize(e) => write!(f, "component serialization failed: {e}"),
            SceneError::Deserialize { component, message } => {
                write!(f, "malformed `{component}` record: {message}")
            }
            SceneError::UnknownComponent(name) => write!(f, "no factory named `{name}`"),
            SceneError::Format(e) => write!(f, "malformed scene document: {e}"),
            SceneError::Io(e) => write!(f, "scene file I/O failed: {e}"),
        }
    }
}

impl std::error::Error for SceneError {}

// ── Scene Data (JSON wire format) ────────────────────────────────────────

/// A serialized set of entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    pub entities: Vec<SceneEntity>,
}

/// One entity in a serialized scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntity {
    /// Entity id at save time. Only meaningful inside the document.
    pub id: u64,
    pub components: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
}

impl SceneData {
    pub fn to_json_string(&self) -> Result<String, SceneError> {
        serde_json::to_string_pretty(self).map_err(|e| SceneError::Serialize(e.to_string()))
    }

    pub fn from_json_str(json: &str) -> Result<Self, SceneError> {
        serde_json::from_str(json).map_err(|e| SceneError::Format(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ── Save ─────────────────────────────────────────────────────────────────

fn save_entity(
    manager: &Manager,
    entity: EntityId,
    parent: Option<EntityId>,
) -> Result<SceneEntity, SceneError> {
    let mut components = BTreeMap::new();
    for tid in manager.entity(entity).bitset().iter_ones() {
        match manager.save_component(entity, tid) {
            Some(saved) => {
                let (name, value) = saved?;
                components.insert(name.to_string(), value);
            }
            None => log::debug!("{entity:?}: component type {tid} has no factory, not saved"),
        }
    }
    Ok(SceneEntity {
        id: entity.raw(),
        components,
        parent: parent.map(EntityId::raw),
    })
}

/// `root` followed by its transform descendants, parents before children.
fn tree_order(manager: &Manager, root: EntityId) -> Vec<EntityId> {
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(e) = stack.pop() {
        if order.contains(&e) {
            log::warn!("{e:?} reached twice while saving; transform tree is malformed");
            continue;
        }
        order.push(e);
        if let Some(t) = manager.try_component::<Transform>(e) {
            stack.extend(t.children().iter().rev().copied());
        }
    }
    order
}

/// Save `root` and its whole transform subtree. The root is saved without a
/// parent even if it has one.
pub fn save_tree(manager: &Manager, root: EntityId) -> Result<SceneData, SceneError> {
    let mut entities = Vec::new();
    for e in tree_order(manager, root) {
        let parent = if e == root {
            None
        } else {
            manager.try_component::<Transform>(e).and_then(Transform::parent)
        };
        entities.push(save_entity(manager, e, parent)?);
    }
    Ok(SceneData { entities })
}

/// Save every live entity, in creation order.
pub fn save_scene(manager: &Manager) -> Result<SceneData, SceneError> {
    let mut entities = Vec::new();
    for e in manager.entities().filter(|&e| manager.is_alive(e)) {
        let parent = manager
            .try_component::<Transform>(e)
            .and_then(Transform::parent)
            .filter(|&p| manager.is_alive(p));
        entities.push(save_entity(manager, e, parent)?);
    }
    Ok(SceneData { entities })
}

// ── Load ─────────────────────────────────────────────────────────────────

/// Create one entity per record and link parents. Returns the new entities
/// in record order.
pub fn load_scene(manager: &mut Manager, data: &SceneData) -> Result<Vec<EntityId>, SceneError> {
    let mut created = Vec::with_capacity(data.entities.len());
    let mut id_map: HashMap<u64, EntityId> = HashMap::new();

    for record in &data.entities {
        let entity = manager.create_entity();
        created.push(entity);
        match id_map.entry(record.id) {
            Entry::Occupied(_) => log::warn!(
                "scene record {}: duplicate id, parent links resolve to the first record",
                record.id
            ),
            Entry::Vacant(slot) => {
                slot.insert(entity);
            }
        }

        for (name, value) in &record.components {
            match manager.add_archived(entity, name, value) {
                Ok(_) => {}
                Err(SceneError::UnknownComponent(name)) => {
                    log::warn!("scene record {}: no factory named `{name}`, skipping", record.id);
                }
                Err(err) => {
                    for &e in &created {
                        manager.destroy_entity(e);
                    }
                    return Err(err);
                }
            }
        }
    }

    for (record, &child) in data.entities.iter().zip(&created) {
        let Some(parent_id) = record.parent else {
            continue;
        };
        let Some(&parent) = id_map.get(&parent_id) else {
            log::warn!("scene record {}: parent {parent_id} is not in the document", record.id);
            continue;
        };
        if !manager.has_component::<Transform>(child) || !manager.has_component::<Transform>(parent)
        {
            log::warn!("scene record {}: parent link needs a Transform on both ends", record.id);
            continue;
        }
        if !manager.hierarchy().set_parent(child, parent, false) {
            log::warn!("scene record {}: parent {parent_id} would form a cycle", record.id);
        }
    }

    log::debug!("loaded {} entities", created.len());
    Ok(created)
}

/// Load a tree saved with [`save_tree`]. Returns the new root (the first
/// record), or `None` for an empty document.
pub fn load_tree(manager: &mut Manager, data: &SceneData) -> Result<Option<EntityId>, SceneError> {
    Ok(load_scene(manager, data)?.first().copied())
}

// ── Files ────────────────────────────────────────────────────────────────

pub fn save_to_file(data: &SceneData, path: impl AsRef<Path>) -> Result<(), SceneError> {
    let json = data.to_json_string()?;
    std::fs::write(path, json).map_err(|e| SceneError::Io(e.to_string()))
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<SceneData, SceneError> {
    let json = std::fs::read_to_string(path).map_err(|e| SceneError::Io(e.to_string()))?;
    SceneData::from_json_str(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Component;
    use crate::math::Vec3;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Health(u32);
    impl Component for Health {}

    #[derive(Debug, Clone, Default)]
    struct Scratch;
    impl Component for Scratch {}

    fn sample(manager: &mut Manager) -> (EntityId, EntityId, EntityId) {
        manager.register::<Health>();
        manager.register_value::<String>();
        let root = manager.create_entity_with(|e| {
            e.add_component(Transform::from_xy(1.0, 2.0));
            e.add_component(Health(10));
        });
        let child = manager.create_entity_with(|e| {
            e.add_component(Transform::from_xy(3.0, 0.0).with_scale(2.0));
            e.add_value(String::from("lamp"));
            e.add_component(Scratch);
        });
        let grandchild = manager.create_entity_with(|e| {
            e.add_component(Transform::from_xy(0.0, 1.0));
        });
        let mut tree = manager.hierarchy();
        tree.set_parent(child, root, false);
        tree.set_parent(grandchild, child, false);
        (root, child, grandchild)
    }

    #[test]
    fn save_tree_records_parents() {
        let mut manager = Manager::new();
        let (root, child, grandchild) = sample(&mut manager);
        let data = save_tree(&manager, root).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(data.entities[0].id, root.raw());
        assert_eq!(data.entities[0].parent, None);
        assert_eq!(data.entities[1].parent, Some(root.raw()));
        assert_eq!(data.entities[2].id, grandchild.raw());
        assert_eq!(data.entities[2].parent, Some(child.raw()));

        let names: Vec<&str> = data.entities[1].components.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["String", "Transform"]);
        assert_eq!(data.entities[0].components["Health"], serde_json::json!(10));
    }

    #[test]
    fn round_trip_rebuilds_the_tree() {
        let mut manager = Manager::new();
        let (root, _, _) = sample(&mut manager);
        let data = save_tree(&manager, root).unwrap();

        let new_root = load_tree(&mut manager, &data).unwrap().unwrap();
        assert_ne!(new_root, root);
        assert_eq!(manager.component::<Health>(new_root), &Health(10));

        let mut tree = manager.hierarchy();
        let nodes = tree.descendants(new_root);
        assert_eq!(nodes.len(), 2);
        assert!(tree.world_pos(nodes[1]).abs_diff_eq(Vec3::new(4.0, 4.0, 0.0), 1e-5));
        assert_eq!(manager.value::<String>(nodes[0]), "lamp");
        assert!(!manager.has_component::<Scratch>(nodes[0]));

        // Saving the copy yields the same payloads.
        let again = save_tree(&manager, new_root).unwrap();
        for (a, b) in data.entities.iter().zip(&again.entities) {
            assert_eq!(a.components, b.components);
        }
    }

    #[test]
    fn unknown_components_and_parents_are_skipped() {
        let mut manager = Manager::new();
        let data = SceneData::from_json_str(
            r#"{ "entities": [
                { "id": 1, "components": { "Transform": { "pos": [1, 0, 0] }, "Ghost": {} } },
                { "id": 2, "components": { "Transform": { "pos": [0, 0, 0] } }, "parent": 99 }
            ] }"#,
        )
        .unwrap();

        let loaded = load_scene(&mut manager, &data).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(manager.has_component::<Transform>(loaded[0]));
        assert_eq!(manager.component::<Transform>(loaded[1]).parent(), None);
    }

    #[test]
    fn duplicate_ids_link_to_the_first_record() {
        let mut manager = Manager::new();
        let data = SceneData::from_json_str(
            r#"{ "entities": [
                { "id": 1, "components": { "Transform": { "pos": [1, 0, 0] } } },
                { "id": 1, "components": { "Transform": { "pos": [2, 0, 0] } } },
                { "id": 3, "components": { "Transform": { "pos": [0, 1, 0] } }, "parent": 1 }
            ] }"#,
        )
        .unwrap();

        let loaded = load_scene(&mut manager, &data).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(manager.component::<Transform>(loaded[2]).parent(), Some(loaded[0]));
        assert_eq!(manager.component::<Transform>(loaded[0]).children(), &[loaded[2]]);
        assert!(manager.component::<Transform>(loaded[1]).is_leaf());
    }

    #[test]
    fn malformed_payload_aborts_and_cleans_up() {
        let mut manager = Manager::new();
        manager.register::<Health>();
        let data = SceneData::from_json_str(
            r#"{ "entities": [
                { "id": 1, "components": { "Health": 5 } },
                { "id": 2, "components": { "Health": "full" } }
            ] }"#,
        )
        .unwrap();

        let err = load_scene(&mut manager, &data).unwrap_err();
        assert!(matches!(err, SceneError::Deserialize { .. }));
        manager.refresh();
        assert_eq!(manager.entity_count(), 0);
    }

    #[test]
    fn save_scene_lists_live_entities() {
        let mut manager = Manager::new();
        let (root, child, _) = sample(&mut manager);
        manager.entity_mut(child).destroy();

        let data = save_scene(&manager).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.entities[0].id, root.raw());
        // The grandchild's parent is dead, so it is saved as a root.
        assert_eq!(data.entities[1].parent, None);
    }

    #[test]
    fn bad_documents_are_format_errors() {
        assert!(matches!(
            SceneData::from_json_str("{ not json"),
            Err(SceneError::Format(_))
        ));
    }

    #[test]
    fn file_round_trip() {
        let mut manager = Manager::new();
        let (root, _, _) = sample(&mut manager);
        let data = save_tree(&manager, root).unwrap();

        let path = std::env::temp_dir().join(format!("arbor-scene-{}.json", root.raw()));
        save_to_file(&data, &path).unwrap();
        let loaded = load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, data);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SceneError::Io(_)));
    }
}
