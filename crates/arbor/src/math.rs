//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly. Transforms use `Vec3` for position, anchor, and
//! scale, `Quat` for rotation, and `Mat4` for the cached matrices. 2D users
//! keep z at 0 and rotate about +Z.

pub use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, Vec4};

/// Lift a 2D point onto the z = 0 plane.
pub fn vec2_to_3(v: Vec2) -> Vec3 {
    v.extend(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lift_to_plane() {
        assert_eq!(vec2_to_3(Vec2::new(1.0, 2.0)), Vec3::new(1.0, 2.0, 0.0));
    }
}
