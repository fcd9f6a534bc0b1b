//! Common imports: `use arbor::prelude::*`.

pub use crate::draw::{DrawTargetId, Drawable};
pub use crate::ecs::{
    Component, EntityId, EntityMut, EntityRef, Hierarchy, Manager, System, SystemId, Wrapper,
};
pub use crate::math::{Mat4, Quat, Vec2, Vec3};
pub use crate::scene::{SceneData, SceneError, load_tree, save_tree};
pub use crate::transform::{Transform, TransformSystem};
pub use crate::type_ids;
