//! Scene Save/Load: archive a transform tree to JSON and load it back.
//!
//! Builds a small tree, saves it to a temp file, loads a second copy next to
//! the first, and prints both world positions.
//!
//! Run with: `cargo run -p arbor --example scene_save_load`

use arbor::prelude::*;
use arbor::scene;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct Health {
    current: u32,
    max: u32,
}
impl Component for Health {}

fn main() -> Result<(), SceneError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut manager = Manager::new();
    manager.register::<Health>();
    manager.register_value::<String>();

    let base = manager.create_entity_with(|e| {
        e.add_component(Transform::from_xy(50.0, 0.0));
        e.add_value(String::from("tower"));
    });
    let turret = manager.create_entity_with(|e| {
        e.add_component(Transform::from_xy(0.0, 12.0).with_anchor(Vec3::new(0.0, 2.0, 0.0)));
        e.add_component(Health { current: 40, max: 50 });
    });
    manager.hierarchy().set_parent(turret, base, false);

    let path = std::env::temp_dir().join("arbor-tower.json");
    let data = scene::save_tree(&manager, base)?;
    scene::save_to_file(&data, &path)?;
    log::info!("saved {} entities to {}", data.len(), path.display());

    let loaded = scene::load_from_file(&path)?;
    let copy = load_tree(&mut manager, &loaded)?.ok_or_else(|| {
        SceneError::Format("archive had no entities".to_string())
    })?;
    manager.component_mut::<Transform>(copy).set_pos(Vec3::new(-50.0, 0.0, 0.0));

    for root in [base, copy] {
        let mut tree = manager.hierarchy();
        let child = tree.descendants(root)[0];
        let pos = tree.world_pos(child);
        log::info!(
            "{} turret at ({:.1}, {:.1}) with {:?}",
            manager.value::<String>(root),
            pos.x,
            pos.y,
            manager.component::<Health>(child)
        );
    }

    std::fs::remove_file(&path).ok();
    Ok(())
}
