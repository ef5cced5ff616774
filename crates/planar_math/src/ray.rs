//! Ray-cast input and output records
//!
//! A ray is the segment `p1 -> p2` optionally swept by a radius. Fractions are
//! measured along that segment, so `max_fraction` clips the query length.

use crate::vector::Vec2;

/// Ray-cast query
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RayCastInput {
    /// Start point
    pub p1: Vec2,
    /// End point
    pub p2: Vec2,
    /// Radius of the swept circle, zero for a thin ray
    pub radius: f32,
    /// Maximum fraction of `p1 -> p2` to consider
    pub max_fraction: f32,
}

impl RayCastInput {
    #[inline]
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self { p1, p2, radius: 0.0, max_fraction: 1.0 }
    }

    #[inline]
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    #[inline]
    pub fn with_max_fraction(mut self, max_fraction: f32) -> Self {
        self.max_fraction = max_fraction;
        self
    }

    #[inline]
    pub fn translation(&self) -> Vec2 {
        self.p2 - self.p1
    }

    /// Point at a fraction of the segment
    #[inline]
    pub fn point_at(&self, fraction: f32) -> Vec2 {
        self.p1.lerp(self.p2, fraction)
    }

    /// Finite endpoints, non-negative finite radius and a fraction in [0, huge)
    pub fn is_valid(&self) -> bool {
        self.p1.is_valid()
            && self.p2.is_valid()
            && self.radius.is_finite()
            && self.radius >= 0.0
            && self.max_fraction.is_finite()
            && self.max_fraction >= 0.0
            && self.max_fraction < 1e6
    }
}

/// Ray-cast result. `hit == false` means the other fields are meaningless.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub point: Vec2,
    pub fraction: f32,
    /// Diagnostic iteration count of the underlying algorithm
    pub iterations: u32,
    pub hit: bool,
}

impl RayCastOutput {
    #[inline]
    pub fn hit(point: Vec2, normal: Vec2, fraction: f32) -> Self {
        Self { normal, point, fraction, iterations: 0, hit: true }
    }

    #[inline]
    pub fn miss() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_input_validity() {
        let ray = RayCastInput::new(Vec2::ZERO, Vec2::new(1.0, 0.0));
        assert!(ray.is_valid());
        assert!(!ray.with_radius(-1.0).is_valid());
        assert!(!RayCastInput::new(Vec2::new(f32::NAN, 0.0), Vec2::ZERO).is_valid());
        assert_eq!(ray.point_at(0.5), Vec2::new(0.5, 0.0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_ray_input_serde() {
        let ray = RayCastInput::new(Vec2::ZERO, Vec2::new(2.0, 1.0)).with_radius(0.5);
        let json = serde_json::to_string(&ray).unwrap();
        let back: RayCastInput = serde_json::from_str(&json).unwrap();
        assert_eq!(ray, back);
    }
}
