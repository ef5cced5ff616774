//! Shapes attached to bodies

use planar_math::{RayCastInput, RayCastOutput, Transform, Vec2, AABB};
use planar_structures::ArenaKey;
use serde::{Deserialize, Serialize};

use crate::body::BodyKey;
use crate::dynamic_tree::ProxyId;
use crate::error::{PhysicsError, Result};
use crate::filter::Filter;
use crate::geometry::{Capsule, Circle, MassData, Polygon, Segment};
use crate::material::Material;
use crate::ray_cast::{ray_cast_capsule, ray_cast_circle, ray_cast_polygon, ray_cast_segment};

pub(crate) type ShapeKey = ArenaKey<Shape>;

/// Handle to a shape in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeHandle(pub(crate) ShapeKey);

impl ShapeHandle {
    /// Slot index, stable for the lifetime of the shape
    pub fn index(&self) -> u32 {
        self.0.index()
    }

    /// Generation of the slot, bumped whenever the slot is reused
    pub fn generation(&self) -> u32 {
        self.0.generation()
    }
}

/// Kind of shape. The order ranks shapes for the narrow-phase dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShapeType {
    Circle = 0,
    Capsule = 1,
    Segment = 2,
    Polygon = 3,
}

/// Local geometry of a shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ShapeGeometry {
    Circle(Circle),
    Capsule(Capsule),
    Segment(Segment),
    Polygon(Polygon),
}

impl From<Circle> for ShapeGeometry {
    fn from(c: Circle) -> Self {
        ShapeGeometry::Circle(c)
    }
}

impl From<Capsule> for ShapeGeometry {
    fn from(c: Capsule) -> Self {
        ShapeGeometry::Capsule(c)
    }
}

impl From<Segment> for ShapeGeometry {
    fn from(s: Segment) -> Self {
        ShapeGeometry::Segment(s)
    }
}

impl From<Polygon> for ShapeGeometry {
    fn from(p: Polygon) -> Self {
        ShapeGeometry::Polygon(p)
    }
}

impl ShapeGeometry {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeGeometry::Circle(_) => ShapeType::Circle,
            ShapeGeometry::Capsule(_) => ShapeType::Capsule,
            ShapeGeometry::Segment(_) => ShapeType::Segment,
            ShapeGeometry::Polygon(_) => ShapeType::Polygon,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            ShapeGeometry::Circle(c) => c.is_valid(),
            ShapeGeometry::Capsule(c) => c.is_valid(),
            ShapeGeometry::Segment(s) => s.is_valid(),
            ShapeGeometry::Polygon(p) => p.is_valid(),
        }
    }

    /// Segments have no area and therefore no mass
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            ShapeGeometry::Circle(c) => c.compute_mass(density),
            ShapeGeometry::Capsule(c) => c.compute_mass(density),
            ShapeGeometry::Segment(_) => MassData::default(),
            ShapeGeometry::Polygon(p) => p.compute_mass(density),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        match self {
            ShapeGeometry::Circle(c) => c.compute_aabb(xf),
            ShapeGeometry::Capsule(c) => c.compute_aabb(xf),
            ShapeGeometry::Segment(s) => s.compute_aabb(xf),
            ShapeGeometry::Polygon(p) => p.compute_aabb(xf),
        }
    }

    /// Point test in the shape's local frame. Segments contain nothing.
    pub fn contains_point(&self, local_point: Vec2) -> bool {
        match self {
            ShapeGeometry::Circle(c) => c.contains_point(local_point),
            ShapeGeometry::Capsule(c) => c.contains_point(local_point),
            ShapeGeometry::Segment(_) => false,
            ShapeGeometry::Polygon(p) => p.contains_point(local_point),
        }
    }

    /// Ray cast in the shape's local frame
    pub fn ray_cast(&self, input: &RayCastInput) -> RayCastOutput {
        match self {
            ShapeGeometry::Circle(c) => ray_cast_circle(input, c),
            ShapeGeometry::Capsule(c) => ray_cast_capsule(input, c),
            ShapeGeometry::Segment(s) => ray_cast_segment(input, s),
            ShapeGeometry::Polygon(p) => ray_cast_polygon(input, p),
        }
    }

    /// Ray cast with the shape placed at `xf`, input and output in world space
    pub fn ray_cast_world(&self, input: &RayCastInput, xf: &Transform) -> RayCastOutput {
        let local = RayCastInput {
            p1: xf.inv_apply(input.p1),
            p2: xf.inv_apply(input.p2),
            ..*input
        };
        let mut out = self.ray_cast(&local);
        if out.hit {
            out.point = xf.apply(out.point);
            out.normal = xf.q.rotate(out.normal);
        }
        out
    }
}

/// Description for creating a shape. Plain data, reusable across many creations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeDef {
    /// Coulomb friction coefficient, usually in [0, 1]
    pub friction: f32,
    /// Bounciness, usually in [0, 1]
    pub restitution: f32,
    /// Density in kg/m², zero means massless
    pub density: f32,
    pub filter: Filter,
    /// Sensors report overlaps but never push back
    pub is_sensor: bool,
    /// Opaque host value, returned unchanged
    pub user_data: u128,
}

impl Default for ShapeDef {
    fn default() -> Self {
        Self {
            friction: 0.6,
            restitution: 0.0,
            density: 0.0,
            filter: Filter::DEFAULT,
            is_sensor: false,
            user_data: 0,
        }
    }
}

impl ShapeDef {
    /// Copy friction, restitution and density from a material
    pub fn with_material(mut self, material: Material) -> Self {
        self.friction = material.friction;
        self.restitution = material.restitution;
        self.density = material.density;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Make this shape a sensor
    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn with_user_data(mut self, user_data: u128) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.friction.is_finite() || self.friction < 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!("friction must be non-negative, got {}", self.friction)));
        }
        if !self.restitution.is_finite() || self.restitution < 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!(
                "restitution must be non-negative, got {}",
                self.restitution
            )));
        }
        if !self.density.is_finite() || self.density < 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!("density must be non-negative, got {}", self.density)));
        }
        Ok(())
    }
}

/// A shape as stored in the world
#[derive(Debug, Clone)]
pub(crate) struct Shape {
    pub body: BodyKey,
    pub geometry: ShapeGeometry,
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
    pub filter: Filter,
    pub is_sensor: bool,
    pub user_data: u128,
    /// Tight world bounds from the last transform update
    pub aabb: AABB,
    /// Bounds stored in the broad-phase tree
    pub fat_aabb: AABB,
    pub proxy: Option<ProxyId>,
}

impl Shape {
    pub fn new(body: BodyKey, geometry: ShapeGeometry, def: &ShapeDef) -> Self {
        Self {
            body,
            geometry,
            friction: def.friction,
            restitution: def.restitution,
            density: def.density,
            filter: def.filter,
            is_sensor: def.is_sensor,
            user_data: def.user_data,
            aabb: AABB::EMPTY,
            fat_aabb: AABB::EMPTY,
            proxy: None,
        }
    }

    #[inline]
    pub fn shape_type(&self) -> ShapeType {
        self.geometry.shape_type()
    }

    pub fn compute_mass(&self) -> MassData {
        self.geometry.compute_mass(self.density)
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        self.geometry.compute_aabb(xf)
    }
}
