//! Planar Physics - Real-time 2D Rigid Bodies
//!
//! Rigid-body simulation for games and interactive tools: a fixed-capacity world
//! stepped at a fixed timestep, with parallel phases handed to a host thread pool.
//!
//! # Features
//!
//! - Static, kinematic and dynamic bodies with shape-derived mass
//! - Circles, capsules, segments and convex polygons with rounding
//! - Incremental broad phase over a dynamic AABB tree
//! - Sequential-impulse solver with warm starting and restitution
//! - Distance, revolute and mouse joints
//! - Island sleeping
//! - Contact begin/end events, sensors and a pre-solve hook
//! - Ray casts, AABB overlap and point queries
//! - Deterministic results for any host task system
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  PhysicsWorld                    │
//! │  ┌────────┐  ┌────────┐  ┌──────────┐  ┌──────┐  │
//! │  │ Bodies │  │ Shapes │  │ Contacts │  │Joints│  │
//! │  └────────┘  └────────┘  └──────────┘  └──────┘  │
//! │  ┌────────────────────────────────────────────┐  │
//! │  │                   step                     │  │
//! │  │ pairs → collide → islands → solve → sync   │  │
//! │  └────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────┘
//!            │                 │               │
//!            ▼                 ▼               ▼
//!     ┌─────────────┐  ┌──────────────┐  ┌────────────┐
//!     │ BroadPhase  │  │ ScratchStack │  │ TaskSystem │
//!     │(DynamicTree)│  │(step memory) │  │   (host)   │
//!     └─────────────┘  └──────────────┘  └────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use planar_physics::prelude::*;
//!
//! let mut world = PhysicsWorld::new(WorldConfig::default())?;
//!
//! // Static ground
//! let ground = world.create_body(&BodyDef::fixed().with_position(0.0, -1.0))?;
//! world.create_shape(ground, Polygon::make_box(20.0, 1.0), &ShapeDef::default())?;
//!
//! // Falling box
//! let body = world.create_body(&BodyDef::dynamic().with_position(0.0, 4.0))?;
//! world.create_shape(body, Polygon::make_box(0.5, 0.5), &ShapeDef::default().with_density(1.0))?;
//!
//! for _ in 0..60 {
//!     world.step(1.0 / 60.0)?;
//! }
//! println!("box at {:?}", world.body_position(body)?);
//! ```

pub mod body;
pub(crate) mod broad_phase;
pub mod config;
pub(crate) mod contact;
pub mod dynamic_tree;
pub mod error;
pub mod events;
pub mod filter;
pub mod geometry;
pub mod hull;
pub(crate) mod island;
pub mod joint;
pub mod manifold;
pub mod material;
pub mod profile;
pub mod query;
pub mod ray_cast;
pub mod shape;
pub(crate) mod solver;
mod step;
pub mod task;
pub mod world;

pub mod prelude {
    //! Common imports for physics functionality
    pub use crate::body::{BodyDef, BodyHandle, BodyType};
    pub use crate::config::{constants, WorldConfig};
    pub use crate::error::{EntityKind, PhysicsError, Result};
    pub use crate::events::{CollisionEvent, CollisionEventType, ContactData, EventCollector, PreSolve};
    pub use crate::filter::{CollisionLayer, Filter, QueryFilter};
    pub use crate::geometry::{Capsule, Circle, MassData, Polygon, Segment};
    pub use crate::hull::{compute_hull, Hull};
    pub use crate::joint::{DistanceJointDef, JointDef, JointHandle, JointType, MouseJointDef, RevoluteJointDef};
    pub use crate::manifold::{Manifold, ManifoldPoint};
    pub use crate::material::Material;
    pub use crate::profile::{Profile, Statistics};
    pub use crate::query::{PhysicsQuery, RayCastHit};
    pub use crate::shape::{ShapeDef, ShapeGeometry, ShapeHandle, ShapeType};
    #[cfg(feature = "parallel")]
    pub use crate::task::RayonTaskSystem;
    pub use crate::task::{SerialTaskSystem, TaskCallback, TaskHandle, TaskSystem};
    pub use crate::world::PhysicsWorld;
    pub use planar_math::{RayCastInput, RayCastOutput, Rot, Transform, Vec2, AABB};
}

pub use prelude::*;
