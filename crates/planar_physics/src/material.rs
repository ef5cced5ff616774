//! Surface materials and coefficient mixing

use serde::{Deserialize, Serialize};

/// Surface properties copied into a shape definition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Friction coefficient (0 = frictionless)
    pub friction: f32,
    /// Restitution/bounciness (0 = no bounce, 1 = perfect bounce)
    pub restitution: f32,
    /// Density for mass calculation, in kg/m²
    pub density: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.6,
            restitution: 0.0,
            density: 1.0,
        }
    }
}

impl Material {
    pub fn new(friction: f32, restitution: f32, density: f32) -> Self {
        Self { friction, restitution, density }
    }

    /// Slippery ice-like material
    pub fn ice() -> Self {
        Self { friction: 0.05, restitution: 0.0, density: 0.9 }
    }

    /// Bouncy rubber-like material
    pub fn rubber() -> Self {
        Self { friction: 0.8, restitution: 0.8, density: 1.1 }
    }

    pub fn metal() -> Self {
        Self { friction: 0.3, restitution: 0.2, density: 7.8 }
    }

    pub fn wood() -> Self {
        Self { friction: 0.5, restitution: 0.3, density: 0.6 }
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution.max(0.0);
        self
    }
}

/// Friction of a contact: geometric mean, so one frictionless surface makes the pair frictionless
#[inline]
pub fn mix_friction(friction1: f32, friction2: f32) -> f32 {
    (friction1 * friction2).sqrt()
}

/// Restitution of a contact: the bouncier surface wins
#[inline]
pub fn mix_restitution(restitution1: f32, restitution2: f32) -> f32 {
    restitution1.max(restitution2)
}
