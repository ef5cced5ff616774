//! Rigid body types and definitions

use planar_math::{Rot, Transform, Vec2};
use planar_structures::{Arena, ArenaKey};
use serde::{Deserialize, Serialize};

use crate::config::constants::HUGE;
use crate::contact::ContactKey;
use crate::error::{PhysicsError, Result};
use crate::geometry::MassData;
use crate::joint::JointKey;
use crate::shape::{Shape, ShapeKey};

pub(crate) type BodyKey = ArenaKey<Body>;

/// Handle to a rigid body in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyHandle(pub(crate) BodyKey);

impl BodyHandle {
    /// Slot index, stable for the lifetime of the body
    pub fn index(&self) -> u32 {
        self.0.index()
    }

    /// Generation of the slot, bumped whenever the slot is reused
    pub fn generation(&self) -> u32 {
        self.0.generation()
    }
}

/// Type of rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Never moves, infinite mass
    #[default]
    Static,
    /// Moved by its user-set velocity, infinite mass
    Kinematic,
    /// Fully simulated
    Dynamic,
}

/// Description for creating a rigid body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// Initial world position of the body origin
    pub position: Vec2,
    /// Initial angle in radians
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    /// Exponential decay rate of linear velocity, 1/s
    pub linear_damping: f32,
    /// Exponential decay rate of angular velocity, 1/s
    pub angular_damping: f32,
    /// Gravity scale (0 = no gravity, 1 = normal, 2 = double)
    pub gravity_scale: f32,
    /// Can this body fall asleep
    pub enable_sleep: bool,
    /// Start awake
    pub awake: bool,
    /// Prevent rotation
    pub fixed_rotation: bool,
    /// Disabled bodies take no part in the simulation
    pub enabled: bool,
    /// Opaque host value, returned unchanged
    pub user_data: u128,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            enable_sleep: true,
            awake: true,
            fixed_rotation: false,
            enabled: true,
            user_data: 0,
        }
    }
}

impl BodyDef {
    /// Create a static body description
    pub fn fixed() -> Self {
        Self::default()
    }

    /// Create a kinematic body description
    pub fn kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            ..Default::default()
        }
    }

    /// Create a dynamic body description
    pub fn dynamic() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            ..Default::default()
        }
    }

    /// Set position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Vec2::new(x, y);
        self
    }

    /// Set angle in radians
    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    /// Set linear velocity
    pub fn with_linear_velocity(mut self, x: f32, y: f32) -> Self {
        self.linear_velocity = Vec2::new(x, y);
        self
    }

    pub fn with_angular_velocity(mut self, w: f32) -> Self {
        self.angular_velocity = w;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Set gravity scale
    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    /// Allow or forbid sleeping
    pub fn with_sleep(mut self, enabled: bool) -> Self {
        self.enable_sleep = enabled;
        self
    }

    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_user_data(mut self, user_data: u128) -> Self {
        self.user_data = user_data;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.position.is_valid() || !self.angle.is_finite() {
            return Err(PhysicsError::InvalidDefinition("body position and angle must be finite".into()));
        }
        if !self.linear_velocity.is_valid() || !self.angular_velocity.is_finite() {
            return Err(PhysicsError::InvalidDefinition("body velocity must be finite".into()));
        }
        if !(self.linear_damping >= 0.0 && self.angular_damping >= 0.0)
            || !self.linear_damping.is_finite()
            || !self.angular_damping.is_finite()
        {
            return Err(PhysicsError::InvalidDefinition("body damping must be finite and non-negative".into()));
        }
        if !self.gravity_scale.is_finite() {
            return Err(PhysicsError::InvalidDefinition("gravity scale must be finite".into()));
        }
        Ok(())
    }
}

/// A rigid body as stored in the world
#[derive(Debug, Clone)]
pub(crate) struct Body {
    pub body_type: BodyType,

    /// Transform of the body origin
    pub transform: Transform,
    /// World center of mass
    pub center: Vec2,
    /// Center of mass relative to the body origin
    pub local_center: Vec2,

    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    /// Force accumulated until the next step
    pub force: Vec2,
    pub torque: f32,

    pub mass: f32,
    pub inv_mass: f32,
    /// Rotational inertia about the center of mass
    pub inertia: f32,
    pub inv_inertia: f32,
    pub min_extent: f32,
    pub max_extent: f32,

    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,

    pub sleep_time: f32,
    pub enable_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    pub enabled: bool,
    pub user_data: u128,

    pub shapes: Vec<ShapeKey>,
    /// Every contact touching one of this body's shapes
    pub contacts: Vec<ContactKey>,
    pub joints: Vec<JointKey>,
}

impl Body {
    pub fn new(def: &BodyDef) -> Self {
        let transform = Transform::new(def.position, Rot::from_angle(def.angle));
        let is_static = def.body_type == BodyType::Static;
        Self {
            body_type: def.body_type,
            transform,
            center: transform.p,
            local_center: Vec2::ZERO,
            linear_velocity: if is_static { Vec2::ZERO } else { def.linear_velocity },
            angular_velocity: if is_static { 0.0 } else { def.angular_velocity },
            force: Vec2::ZERO,
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            min_extent: HUGE,
            max_extent: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            enable_sleep: def.enable_sleep,
            awake: def.awake && !is_static,
            fixed_rotation: def.fixed_rotation,
            enabled: def.enabled,
            user_data: def.user_data,
            shapes: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Awake, enabled and able to move
    #[inline]
    pub fn is_active(&self) -> bool {
        self.awake && self.enabled && !self.is_static()
    }

    pub fn wake(&mut self) {
        if !self.is_static() {
            self.awake = true;
            self.sleep_time = 0.0;
        }
    }

    pub fn sleep(&mut self) {
        self.awake = false;
        self.sleep_time = 0.0;
        self.linear_velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    pub fn set_transform(&mut self, position: Vec2, rotation: Rot) {
        self.transform = Transform::new(position, rotation);
        self.center = self.transform.apply(self.local_center);
    }

    /// Rebuild the origin from the center of mass after the solver moved it
    pub fn set_center(&mut self, center: Vec2, rotation: Rot) {
        self.center = center;
        self.transform.q = rotation;
        self.transform.p = center - rotation.rotate(self.local_center);
    }

    /// Mass properties for the getter, inertia about the center of mass
    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            center: self.local_center,
            rotational_inertia: self.inertia,
            min_extent: self.min_extent,
            max_extent: self.max_extent,
        }
    }

    /// Sum the shapes' mass properties. Non-dynamic bodies keep zero mass.
    pub fn update_mass(&mut self, shapes: &Arena<Shape>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.local_center = Vec2::ZERO;
        self.min_extent = HUGE;
        self.max_extent = 0.0;

        if !self.is_dynamic() {
            self.center = self.transform.p;
            for &key in &self.shapes {
                if let Some(shape) = shapes.get(key) {
                    let md = shape.compute_mass();
                    self.max_extent = self.max_extent.max(md.max_extent);
                }
            }
            return;
        }

        let mut rotational_inertia = 0.0;
        let mut local_center = Vec2::ZERO;
        for &key in &self.shapes {
            let Some(shape) = shapes.get(key) else { continue };
            if shape.density == 0.0 {
                continue;
            }
            let md = shape.compute_mass();
            self.mass += md.mass;
            local_center = local_center.mul_add(md.mass, md.center);
            rotational_inertia += md.rotational_inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            if !self.shapes.is_empty() {
                log::warn!("Dynamic body has zero mass, using unit mass");
            }
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if rotational_inertia > 0.0 && !self.fixed_rotation {
            // Shift the inertia from the body origin to the center of mass
            self.inertia = rotational_inertia - self.mass * local_center.dot(local_center);
            if self.inertia > 0.0 {
                self.inv_inertia = 1.0 / self.inertia;
            } else {
                self.inertia = 0.0;
            }
        }

        let old_center = self.center;
        self.local_center = local_center;
        self.center = self.transform.apply(local_center);

        // Keep the velocity of the body origin
        let delta = self.center - old_center;
        self.linear_velocity += Vec2::scalar_cross(self.angular_velocity, delta);

        for &key in &self.shapes {
            let Some(shape) = shapes.get(key) else { continue };
            let md = shape.compute_mass();
            self.min_extent = self.min_extent.min(md.min_extent);
            self.max_extent = self.max_extent.max(md.max_extent + local_center.length());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Circle, Polygon};
    use crate::shape::{ShapeDef, ShapeGeometry};
    use approx::assert_relative_eq;

    fn body_with_shapes(def: &BodyDef, geometries: &[(ShapeGeometry, f32)]) -> (Body, Arena<Shape>) {
        let mut bodies: Arena<Body> = Arena::with_capacity(1);
        let key = bodies.insert(Body::new(def)).unwrap();
        let mut shapes = Arena::with_capacity(8);
        let mut body = bodies.remove(key).unwrap();
        for (g, density) in geometries {
            let shape_key = shapes
                .insert(Shape::new(key, *g, &ShapeDef::default().with_density(*density)))
                .unwrap();
            body.shapes.push(shape_key);
        }
        body.update_mass(&shapes);
        (body, shapes)
    }

    #[test]
    fn test_body_def_defaults() {
        let def = BodyDef::default();
        assert_eq!(def.body_type, BodyType::Static);
        assert_eq!(def.gravity_scale, 1.0);
        assert!(def.enable_sleep && def.awake && def.enabled);
        assert!(!def.fixed_rotation);
        assert!(def.validate().is_ok());
        assert!(BodyDef::dynamic().with_damping(-1.0, 0.0).validate().is_err());
    }

    #[test]
    fn test_mass_aggregation_offsets_center() {
        let left = Polygon::make_offset_box(0.5, 0.5, Vec2::new(-1.0, 0.0), 0.0);
        let right = Polygon::make_offset_box(0.5, 0.5, Vec2::new(3.0, 0.0), 0.0);
        let (body, _) = body_with_shapes(&BodyDef::dynamic(), &[(left.into(), 1.0), (right.into(), 1.0)]);

        assert_relative_eq!(body.mass, 2.0, epsilon = 1e-5);
        assert_relative_eq!(body.local_center.x, 1.0, epsilon = 1e-5);
        // Two unit boxes each 2 m from the center
        let expected = 2.0 * (1.0 / 6.0) + 2.0 * 4.0;
        assert_relative_eq!(body.inertia, expected, epsilon = 1e-3);
        assert!(body.inv_inertia > 0.0);
    }

    #[test]
    fn test_zero_mass_dynamic_gets_unit_mass() {
        let (body, _) = body_with_shapes(&BodyDef::dynamic(), &[(Circle::new(Vec2::ZERO, 1.0).into(), 0.0)]);
        assert_eq!(body.mass, 1.0);
        assert_eq!(body.inv_mass, 1.0);
        assert_eq!(body.inv_inertia, 0.0);
    }

    #[test]
    fn test_static_and_fixed_rotation() {
        let (ground, _) = body_with_shapes(&BodyDef::fixed(), &[(Polygon::make_box(10.0, 1.0).into(), 1.0)]);
        assert_eq!(ground.inv_mass, 0.0);
        assert!(!ground.awake);

        let def = BodyDef::dynamic().with_fixed_rotation(true);
        let (body, _) = body_with_shapes(&def, &[(Polygon::make_square(1.0).into(), 1.0)]);
        assert!(body.inv_mass > 0.0);
        assert_eq!(body.inv_inertia, 0.0);
    }

    #[test]
    fn test_set_center_keeps_origin_consistent() {
        let mut body = Body::new(&BodyDef::dynamic().with_position(1.0, 2.0));
        body.local_center = Vec2::new(1.0, 0.0);
        body.set_center(Vec2::new(5.0, 5.0), Rot::from_angle(core::f32::consts::FRAC_PI_2));
        assert_relative_eq!(body.transform.p.x, 5.0, epsilon = 1e-5);
        assert_relative_eq!(body.transform.p.y, 4.0, epsilon = 1e-5);
        assert_relative_eq!(body.transform.apply(body.local_center).x, 5.0, epsilon = 1e-5);
    }
}
