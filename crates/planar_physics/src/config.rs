//! Physics configuration

use planar_math::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Engine tuning constants, in meters and seconds
pub mod constants {
    /// Collision and constraint tolerance. Small enough to be invisible, large
    /// enough to keep resting contacts from chattering.
    pub const LINEAR_SLOP: f32 = 0.005;

    /// Manifold points are kept while the shapes are at most this far apart
    pub const SPECULATIVE_DISTANCE: f32 = 4.0 * LINEAR_SLOP;

    /// Fattening applied to broad-phase proxies so small motions do not touch the tree
    pub const AABB_MARGIN: f32 = 0.1;

    /// Fraction of the overlap removed per position-correction pass
    pub const BAUMGARTE: f32 = 0.2;

    /// Largest positional push applied by one position-correction pass
    pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

    /// Bodies never translate faster than this many meters per step
    pub const MAX_TRANSLATION: f32 = 4.0;

    /// Bodies never rotate faster than this many radians per step
    pub const MAX_ROTATION: f32 = 0.25 * core::f32::consts::PI;

    /// Largest polygon the engine accepts
    pub const MAX_POLYGON_VERTICES: usize = 8;

    /// A very large value used for unbounded extents
    pub const HUGE: f32 = 100_000.0;
}

/// Physics world configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Gravity vector (default: -10 in Y)
    pub gravity: Vec2,

    /// Relative normal speed below which collisions do not bounce, in m/s
    pub restitution_threshold: f32,

    /// Enable sleeping for resting islands
    pub sleeping_enabled: bool,

    /// Reuse last step's impulses as the initial solver guess
    pub warm_starting: bool,

    /// Hard limit on bodies
    pub body_capacity: usize,

    /// Hard limit on shapes
    pub shape_capacity: usize,

    /// Hard limit on contacts
    pub contact_capacity: usize,

    /// Hard limit on joints
    pub joint_capacity: usize,

    /// Byte budget for per-step temporary data
    pub scratch_capacity: usize,

    /// Velocity solver passes per step
    pub velocity_iterations: usize,

    /// Position-correction passes per step
    pub position_iterations: usize,

    /// Fixed timestep used by `PhysicsWorld::update`
    pub timestep: f32,

    /// Maximum number of steps `update` runs per call
    pub max_substeps: u32,

    /// Linear speed threshold for sleeping, in m/s
    pub sleep_linear_threshold: f32,

    /// Angular speed threshold for sleeping, in rad/s
    pub sleep_angular_threshold: f32,

    /// Time an island must stay below the thresholds before it sleeps, in seconds
    pub time_to_sleep: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            restitution_threshold: 1.0,
            sleeping_enabled: true,
            warm_starting: true,
            body_capacity: 1024,
            shape_capacity: 1024,
            contact_capacity: 4096,
            joint_capacity: 256,
            scratch_capacity: 1024 * 1024,
            velocity_iterations: 8,
            position_iterations: 3,
            timestep: 1.0 / 60.0,
            max_substeps: 8,
            sleep_linear_threshold: 0.05,
            sleep_angular_threshold: 2.0 / 180.0 * core::f32::consts::PI,
            time_to_sleep: 0.5,
        }
    }
}

impl WorldConfig {
    /// Create a configuration for high-precision simulation
    pub fn high_precision() -> Self {
        Self {
            velocity_iterations: 16,
            position_iterations: 6,
            timestep: 1.0 / 120.0,
            max_substeps: 16,
            ..Default::default()
        }
    }

    /// Create a configuration for fast simulation (lower quality)
    pub fn fast() -> Self {
        Self {
            velocity_iterations: 4,
            position_iterations: 1,
            max_substeps: 2,
            ..Default::default()
        }
    }

    /// Set gravity
    pub fn with_gravity(mut self, x: f32, y: f32) -> Self {
        self.gravity = Vec2::new(x, y);
        self
    }

    /// Set timestep
    pub fn with_timestep(mut self, timestep: f32) -> Self {
        self.timestep = timestep;
        self
    }

    /// Set all four entity capacities
    pub fn with_capacities(mut self, bodies: usize, shapes: usize, contacts: usize, joints: usize) -> Self {
        self.body_capacity = bodies;
        self.shape_capacity = shapes;
        self.contact_capacity = contacts;
        self.joint_capacity = joints;
        self
    }

    /// Set the scratch budget in bytes
    pub fn with_scratch_capacity(mut self, bytes: usize) -> Self {
        self.scratch_capacity = bytes;
        self
    }

    /// Set solver iteration counts
    pub fn with_iterations(mut self, velocity: usize, position: usize) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    pub fn with_sleeping(mut self, enabled: bool) -> Self {
        self.sleeping_enabled = enabled;
        self
    }

    pub fn with_restitution_threshold(mut self, threshold: f32) -> Self {
        self.restitution_threshold = threshold;
        self
    }

    /// Check every field for a usable value
    pub fn validate(&self) -> Result<()> {
        if !self.gravity.is_valid() {
            return Err(PhysicsError::InvalidConfig("gravity must be finite".into()));
        }
        if !self.restitution_threshold.is_finite() || self.restitution_threshold < 0.0 {
            return Err(PhysicsError::InvalidConfig(
                "restitution_threshold must be finite and non-negative".into(),
            ));
        }
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(PhysicsError::InvalidConfig("timestep must be positive".into()));
        }
        if self.velocity_iterations == 0 {
            return Err(PhysicsError::InvalidConfig("velocity_iterations must be at least 1".into()));
        }
        if self.body_capacity == 0 || self.shape_capacity == 0 {
            return Err(PhysicsError::InvalidConfig("body and shape capacities must be non-zero".into()));
        }
        if self.body_capacity > u32::MAX as usize - 1
            || self.shape_capacity > u32::MAX as usize - 1
            || self.contact_capacity > u32::MAX as usize - 1
            || self.joint_capacity > u32::MAX as usize - 1
        {
            return Err(PhysicsError::InvalidConfig("capacities must fit in 32-bit indices".into()));
        }
        for (name, value) in [
            ("sleep_linear_threshold", self.sleep_linear_threshold),
            ("sleep_angular_threshold", self.sleep_angular_threshold),
            ("time_to_sleep", self.time_to_sleep),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PhysicsError::InvalidConfig(format!("{name} must be finite and non-negative")));
            }
        }
        Ok(())
    }
}
