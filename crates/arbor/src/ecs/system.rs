//! # System: Per-Frame Behaviour
//!
//! A system has three hooks, each handed the whole [`Manager`]:
//!
//! - `setup` runs once from [`Manager::setup`],
//! - `update` runs every [`Manager::update`] while the system is updatable,
//! - `draw` runs every [`Manager::draw`] while the system is drawable.
//!
//! Systems run in the order they were created. Any `FnMut(&mut Manager)`
//! is a system whose `update` calls the closure, so small per-frame logic
//! needs no struct:
//!
//! ```ignore
//! manager.create_system(|m: &mut Manager| {
//!     for (_, t) in m.components_mut::<Transform>() {
//!         t.set_pos(t.pos() + Vec3::X);
//!     }
//! });
//! ```
//!
//! Systems never hold a pointer back to the manager. Whatever they need is
//! reached through the `&mut Manager` argument.

use std::fmt;

use super::component::AsAny;
use super::manager::Manager;

/// Behaviour run by the manager each frame.
pub trait System: AsAny {
    fn setup(&mut self, manager: &mut Manager) {
        let _ = manager;
    }

    fn update(&mut self, manager: &mut Manager) {
        let _ = manager;
    }

    fn draw(&mut self, manager: &mut Manager) {
        let _ = manager;
    }
}

/// Any `FnMut(&mut Manager)` is an update-only system.
impl<F: FnMut(&mut Manager) + 'static> System for F {
    fn update(&mut self, manager: &mut Manager) {
        (self)(manager);
    }
}

/// Handle returned by [`Manager::create_system`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub(crate) u64);

impl fmt::Debug for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System({})", self.0)
    }
}

/// A boxed system with its scheduling flags.
pub(crate) struct SystemEntry {
    pub id: SystemId,
    pub name: String,
    /// `None` while one of the system's own hooks is running.
    pub system: Option<Box<dyn System>>,
    pub updatable: bool,
    pub drawable: bool,
    /// Set by `remove_system`; the entry is dropped once no hook is running.
    pub removed: bool,
}

impl SystemEntry {
    pub fn new<S: System>(id: SystemId, system: S) -> Self {
        Self {
            id,
            name: short_system_name(std::any::type_name::<S>()),
            system: Some(Box::new(system)),
            updatable: true,
            drawable: true,
            removed: false,
        }
    }

    pub fn downcast_ref<S: System>(&self) -> Option<&S> {
        let system: &dyn System = self.system.as_deref()?;
        system.as_any().downcast_ref::<S>()
    }

    pub fn downcast_mut<S: System>(&mut self) -> Option<&mut S> {
        let system: &mut dyn System = self.system.as_deref_mut()?;
        system.as_any_mut().downcast_mut::<S>()
    }
}

/// Display name for a system type: `arbor::transform::TransformSystem`
/// becomes `TransformSystem`. Generic arguments are dropped and closures
/// all read as `<closure>`.
pub(crate) fn short_system_name(full: &str) -> String {
    if full.contains("{{closure}}") {
        return "<closure>".to_owned();
    }
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spin_everything(_manager: &mut Manager) {}

    struct Counter(u32);
    impl System for Counter {
        fn update(&mut self, _manager: &mut Manager) {
            self.0 += 1;
        }
    }

    #[test]
    fn fn_systems_are_named_after_the_function() {
        let entry = SystemEntry::new(SystemId(0), spin_everything);
        assert_eq!(entry.name, "spin_everything");
    }

    #[test]
    fn struct_names_drop_path_and_generics() {
        assert_eq!(
            short_system_name("arbor::transform::TransformSystem"),
            "TransformSystem"
        );
        assert_eq!(short_system_name("game::Spawner<game::Enemy>"), "Spawner");
    }

    #[test]
    fn closures_share_one_name() {
        let entry = SystemEntry::new(SystemId(0), |_m: &mut Manager| {});
        assert_eq!(entry.name, "<closure>");
    }

    #[test]
    fn entries_start_updatable_and_drawable() {
        let entry = SystemEntry::new(SystemId(1), Counter(0));
        assert!(entry.updatable);
        assert!(entry.drawable);
        assert!(!entry.removed);
        assert_eq!(entry.name, "Counter");
    }

    #[test]
    fn downcast_to_concrete_system() {
        let mut entry = SystemEntry::new(SystemId(2), Counter(5));
        entry.downcast_mut::<Counter>().unwrap().0 += 1;
        assert_eq!(entry.downcast_ref::<Counter>().map(|c| c.0), Some(6));
        assert!(entry.downcast_ref::<fn(&mut Manager)>().is_none());
    }
}
