//! Planar rotation stored as a cosine/sine pair
//!
//! Keeping the pair instead of an angle avoids repeated trigonometry and lets
//! integration re-normalize cheaply each step.

use crate::vector::Vec2;

/// Rotation as (cosine, sine)
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rot {
    pub c: f32,
    pub s: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Self = Self { c: 1.0, s: 0.0 };

    /// Rotation from an angle in radians
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { c, s }
    }

    /// Angle in radians within [-pi, pi]
    #[inline]
    pub fn angle(self) -> f32 {
        self.s.atan2(self.c)
    }

    /// Re-normalize the pair to unit length
    #[inline]
    pub fn normalize(self) -> Self {
        let mag = (self.s * self.s + self.c * self.c).sqrt();
        let inv = if mag > 0.0 { 1.0 / mag } else { 0.0 };
        Self { c: self.c * inv, s: self.s * inv }
    }

    #[inline]
    pub fn is_normalized(self) -> bool {
        let qq = self.s * self.s + self.c * self.c;
        1.0 - 0.0006 < qq && qq < 1.0 + 0.0006
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.s.is_finite() && self.c.is_finite() && self.is_normalized()
    }

    /// Advance by a small angle using the first-order update, then re-normalize.
    ///
    /// This is what the integrator uses; it never calls into trigonometry.
    #[inline]
    pub fn integrate(self, delta_angle: f32) -> Self {
        let q2 = Self {
            c: self.c - delta_angle * self.s,
            s: self.s + delta_angle * self.c,
        };
        q2.normalize()
    }

    /// Unit x-axis of the rotated frame
    #[inline]
    pub fn x_axis(self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// Unit y-axis of the rotated frame
    #[inline]
    pub fn y_axis(self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    #[inline]
    pub fn rotate(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    #[inline]
    pub fn inv_rotate(self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// `self * r`
    #[inline]
    pub fn mul(self, r: Self) -> Self {
        Self {
            s: self.s * r.c + self.c * r.s,
            c: self.c * r.c - self.s * r.s,
        }
    }

    /// `transpose(self) * r`
    #[inline]
    pub fn inv_mul(self, r: Self) -> Self {
        Self {
            s: self.c * r.s - self.s * r.c,
            c: self.c * r.c + self.s * r.s,
        }
    }

    /// Angle of `b` relative to `self`, in radians
    #[inline]
    pub fn relative_angle(self, b: Self) -> f32 {
        let s = self.c * b.s - self.s * b.c;
        let c = self.c * b.c + self.s * b.s;
        s.atan2(c)
    }
}
