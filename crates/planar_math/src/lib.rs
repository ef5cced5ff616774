//! # planar_math - 2D Math Kernel
//!
//! Value types for planar rigid-body simulation: vectors, rotations stored as a
//! cosine/sine pair, rigid transforms, 2x2 matrices, axis-aligned boxes and
//! ray-cast records. Everything is `Copy` and passed by value.

pub mod vector;
pub mod rotation;
pub mod transform;
pub mod matrix;
pub mod bounds;
pub mod ray;

pub use vector::*;
pub use rotation::*;
pub use transform::*;
pub use matrix::*;
pub use bounds::*;
pub use ray::*;

/// Common math constants
pub mod consts {
    pub const PI: f32 = core::f32::consts::PI;
    pub const TAU: f32 = PI * 2.0;
    pub const DEG_TO_RAD: f32 = PI / 180.0;
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
    pub const EPSILON: f32 = f32::EPSILON;
}

/// Convert degrees to radians
#[inline]
pub fn radians(degrees: f32) -> f32 {
    degrees * consts::DEG_TO_RAD
}

/// Convert radians to degrees
#[inline]
pub fn degrees(radians: f32) -> f32 {
    radians * consts::RAD_TO_DEG
}

/// Linear interpolation
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Clamp value between min and max
#[inline]
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value < min { min }
    else if value > max { max }
    else { value }
}

/// True when the value is neither NaN nor infinite
#[inline]
pub fn is_valid(value: f32) -> bool {
    value.is_finite()
}

pub mod prelude {
    pub use crate::vector::Vec2;
    pub use crate::rotation::Rot;
    pub use crate::transform::Transform;
    pub use crate::matrix::Mat22;
    pub use crate::bounds::AABB;
    pub use crate::ray::{RayCastInput, RayCastOutput};
    pub use crate::{radians, degrees, lerp, clamp};
}
