//! Entity Hierarchies: solar system demo.
//!
//! Planets orbit the sun and moons orbit their planet, purely through parent
//! links. Every few frames a planet is destroyed; its moons are released and
//! keep drifting on their own.
//!
//! Run with: `RUST_LOG=debug cargo run -p arbor --example scene_hierarchy`

use arbor::prelude::*;

// ── Components ───────────────────────────────────────────────────────────

/// Spins the owning transform about +Z.
struct Orbit {
    speed: f32,
}
impl Component for Orbit {}

/// Prints the world position of its entity when drawn.
struct Label(&'static str);
impl Component for Label {}
impl Drawable for Label {
    fn draw(&self, manager: &Manager, owner: EntityId) {
        let world = manager
            .component::<Transform>(owner)
            .cached_world_matrix()
            .transform_point3(Vec3::ZERO);
        log::info!("{:>8} at ({:7.2}, {:7.2})", self.0, world.x, world.y);
    }
}

// ── Systems ──────────────────────────────────────────────────────────────

fn orbit_system(manager: &mut Manager) {
    for e in manager.entities_with2::<Transform, Orbit>() {
        let speed = manager.component::<Orbit>(e).speed;
        let t = manager.component_mut::<Transform>(e);
        t.set_rotation_radians(t.rotation_radians() + speed);
    }
}

struct Culler {
    frame: u32,
}

impl System for Culler {
    fn update(&mut self, manager: &mut Manager) {
        self.frame += 1;
        if self.frame % 3 != 0 {
            return;
        }
        let planets: Vec<EntityId> = manager
            .components::<Label>()
            .filter(|(_, label)| label.0.starts_with("planet"))
            .map(|(e, _)| e)
            .collect();
        if let Some(&victim) = planets.first() {
            log::info!("destroying {victim:?}");
            manager.destroy_entity(victim);
        }
    }
}

fn spawn(manager: &mut Manager, name: &'static str, x: f32, speed: f32) -> EntityId {
    let e = manager.create_entity_with(|e| {
        e.add_component(Transform::from_xy(x, 0.0));
        e.add_component(Orbit { speed });
        e.add_component(Label(name));
    });
    manager.set_draw_target::<Label>(e, Some(DrawTargetId::DEFAULT));
    e
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut manager = Manager::new();
    manager.create_system(orbit_system);
    manager.create_system(Culler { frame: 0 });
    manager.create_system(TransformSystem::new());

    let sun = spawn(&mut manager, "sun", 0.0, 0.05);
    for (i, (planet_name, moon_name)) in [("planet-a", "moon-a"), ("planet-b", "moon-b")]
        .into_iter()
        .enumerate()
    {
        let planet = spawn(&mut manager, planet_name, 100.0 * (i + 1) as f32, 0.2);
        let moon = spawn(&mut manager, moon_name, 20.0, 0.0);
        let mut tree = manager.hierarchy();
        tree.set_parent(planet, sun, false);
        tree.set_parent(moon, planet, false);
    }

    manager.setup();
    for frame in 0..8 {
        log::info!("── frame {frame} ──");
        manager.update();
        manager.draw();
    }

    #[cfg(feature = "diagnostics")]
    log::info!("last frame: {}", manager.diagnostics().to_json());
}
