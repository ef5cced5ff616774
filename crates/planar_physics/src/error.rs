//! Error types for the physics system
//!
//! Every variant is a configuration error: the call that returns it has not
//! changed the world. Numeric trouble inside a step never surfaces here.

use thiserror::Error;

use crate::body::BodyHandle;
use crate::joint::JointHandle;
use crate::shape::{ShapeHandle, ShapeType};

/// Which bounded table ran out of room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Body,
    Shape,
    Contact,
    Joint,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Body => "body",
            EntityKind::Shape => "shape",
            EntityKind::Contact => "contact",
            EntityKind::Joint => "joint",
        };
        f.write_str(name)
    }
}

/// Physics system errors
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Rigid body not found
    #[error("Rigid body not found: {0:?}")]
    BodyNotFound(BodyHandle),

    /// Shape not found
    #[error("Shape not found: {0:?}")]
    ShapeNotFound(ShapeHandle),

    /// Joint not found
    #[error("Joint not found: {0:?}")]
    JointNotFound(JointHandle),

    /// A fixed-capacity table is full
    #[error("{kind} capacity of {capacity} exceeded")]
    CapacityExceeded { kind: EntityKind, capacity: usize },

    /// The narrow phase has no routine for this pair of shape types
    #[error("Unsupported shape pair: {0:?} vs {1:?}")]
    UnsupportedShapePair(ShapeType, ShapeType),

    /// A body, shape, or joint definition is malformed
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Invalid configuration
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// The per-step scratch budget is too small for the scene
    #[error(transparent)]
    ScratchExhausted(#[from] planar_memory::ScratchError),
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
