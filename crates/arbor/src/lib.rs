//! # Arbor: Entity-Component Runtime with a Transform Tree
//!
//! Entities are assembled from components, per-frame systems run over them,
//! and a hierarchy of [`Transform`](transform::Transform)s propagates local
//! edits into world-space matrices.
//!
//! Start with `use arbor::prelude::*`, create a [`Manager`](ecs::Manager),
//! and call `update()` then `draw()` once per frame.

pub mod draw;
pub mod ecs;
pub mod math;
pub mod prelude;
pub mod scene;
pub mod transform;

#[cfg(feature = "diagnostics")]
pub mod diag;
