//! Rigid transform: translation followed by rotation

use crate::rotation::Rot;
use crate::vector::Vec2;

/// Rigid 2D transform
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    /// Translation
    pub p: Vec2,
    /// Rotation
    pub q: Rot,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self { p: Vec2::ZERO, q: Rot::IDENTITY };

    #[inline]
    pub const fn new(p: Vec2, q: Rot) -> Self {
        Self { p, q }
    }

    #[inline]
    pub fn from_position_angle(p: Vec2, angle: f32) -> Self {
        Self { p, q: Rot::from_angle(angle) }
    }

    /// Map a local point into the parent frame
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.rotate(v) + self.p
    }

    /// Map a parent-frame point into the local frame
    #[inline]
    pub fn inv_apply(&self, v: Vec2) -> Vec2 {
        self.q.inv_rotate(v - self.p)
    }

    /// `self * b`
    #[inline]
    pub fn mul(&self, b: &Transform) -> Self {
        Self {
            q: self.q.mul(b.q),
            p: self.q.rotate(b.p) + self.p,
        }
    }

    /// `inverse(self) * b`, i.e. `b` expressed in the frame of `self`
    #[inline]
    pub fn inv_mul(&self, b: &Transform) -> Self {
        Self {
            q: self.q.inv_mul(b.q),
            p: self.q.inv_rotate(b.p - self.p),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.p.is_valid() && self.q.is_valid()
    }
}
