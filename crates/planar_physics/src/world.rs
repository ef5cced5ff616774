//! Physics world - main simulation container

use std::collections::HashMap;
use std::sync::Arc;

use planar_math::{Rot, Transform, Vec2, AABB};
use planar_memory::ScratchStack;
use planar_structures::{Arena, CapacityError};

use crate::body::{Body, BodyDef, BodyHandle, BodyType};
use crate::broad_phase::BroadPhase;
use crate::config::WorldConfig;
use crate::contact::{pair_key, Contact, ContactKey};
use crate::error::{EntityKind, PhysicsError, Result};
use crate::events::{CollisionEvent, CollisionEventType, ContactData, EventCollector, PreSolve};
use crate::filter::Filter;
use crate::geometry::MassData;
use crate::island::IslandGraph;
use crate::joint::{Joint, JointDef, JointHandle, JointKey, JointKind, JointType};
use crate::profile::{Profile, Statistics};
use crate::query::PhysicsQuery;
use crate::shape::{Shape, ShapeDef, ShapeGeometry, ShapeHandle, ShapeKey, ShapeType};
use crate::task::{SerialTaskSystem, TaskBridge, TaskSystem};

/// The main physics world containing all simulation state
pub struct PhysicsWorld {
    /// Configuration
    pub(crate) config: WorldConfig,

    pub(crate) bodies: Arena<Body>,
    pub(crate) shapes: Arena<Shape>,
    pub(crate) contacts: Arena<Contact>,
    pub(crate) joints: Arena<Joint>,

    /// Broad phase over shape bounds
    pub(crate) broad_phase: BroadPhase,

    /// Contact lookup by shape pair
    pub(crate) pairs: HashMap<u64, ContactKey>,

    /// Islands of the current step
    pub(crate) islands: IslandGraph,

    /// Step-scoped temporary memory
    pub(crate) scratch: ScratchStack,

    /// Host task system and per-worker contexts
    pub(crate) tasks: TaskBridge,

    /// Event collector
    pub(crate) events: EventCollector,

    pub(crate) pre_solve: Option<Arc<dyn PreSolve>>,

    /// Accumulated time for fixed timestep
    accumulated_time: f32,

    pub(crate) profile: Profile,
    pub(crate) step_count: u64,
}

impl PhysicsWorld {
    /// Create a world that runs every phase on the calling thread
    pub fn new(config: WorldConfig) -> Result<Self> {
        Self::with_task_system(config, Arc::new(SerialTaskSystem))
    }

    /// Create a world that hands parallel phases to the host's task system
    pub fn with_task_system(config: WorldConfig, task_system: Arc<dyn TaskSystem>) -> Result<Self> {
        if let Err(err) = config.validate() {
            log::warn!("Rejected world configuration: {err}");
            return Err(err);
        }

        let tasks = TaskBridge::new(task_system);
        log::debug!(
            "Created physics world: {} bodies, {} shapes, {} contacts, {} joints, {} KiB scratch, {} workers",
            config.body_capacity,
            config.shape_capacity,
            config.contact_capacity,
            config.joint_capacity,
            config.scratch_capacity / 1024,
            tasks.worker_count()
        );

        Ok(Self {
            bodies: Arena::with_capacity(config.body_capacity),
            shapes: Arena::with_capacity(config.shape_capacity),
            contacts: Arena::with_capacity(config.contact_capacity),
            joints: Arena::with_capacity(config.joint_capacity),
            broad_phase: BroadPhase::new(),
            pairs: HashMap::new(),
            islands: IslandGraph::new(),
            scratch: ScratchStack::new(config.scratch_capacity),
            tasks,
            events: EventCollector::new(),
            pre_solve: None,
            accumulated_time: 0.0,
            profile: Profile::default(),
            step_count: 0,
            config,
        })
    }

    /// Get the physics configuration
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_restitution_threshold(&mut self, threshold: f32) {
        self.config.restitution_threshold = threshold.max(0.0);
    }

    pub fn restitution_threshold(&self) -> f32 {
        self.config.restitution_threshold
    }

    /// Turning sleep off wakes every body
    pub fn enable_sleeping(&mut self, enabled: bool) {
        if self.config.sleeping_enabled == enabled {
            return;
        }
        self.config.sleeping_enabled = enabled;
        if !enabled {
            for body in self.bodies.values_mut() {
                body.wake();
            }
        }
    }

    pub fn is_sleeping_enabled(&self) -> bool {
        self.config.sleeping_enabled
    }

    pub fn enable_warm_starting(&mut self, enabled: bool) {
        self.config.warm_starting = enabled;
    }

    pub fn is_warm_starting_enabled(&self) -> bool {
        self.config.warm_starting
    }

    /// Install a callback that may disable touching contacts before they are solved
    pub fn set_pre_solve<P: PreSolve + 'static>(&mut self, pre_solve: P) {
        self.pre_solve = Some(Arc::new(pre_solve));
    }

    pub fn clear_pre_solve(&mut self) {
        self.pre_solve = None;
    }

    // ==================== Bodies ====================

    /// Create a rigid body
    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyHandle> {
        def.validate()?;
        let key = self
            .bodies
            .insert(Body::new(def))
            .map_err(|err| capacity_error(EntityKind::Body, err))?;
        log::debug!("Created {:?} body {:?}", def.body_type, key);
        Ok(BodyHandle(key))
    }

    /// Remove a body with its shapes, contacts and joints
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<()> {
        let body = self.body(handle)?;
        let joints = body.joints.clone();
        let contacts = body.contacts.clone();
        let shapes = body.shapes.clone();

        for key in joints {
            self.remove_joint(key);
        }
        for key in contacts {
            self.destroy_contact(key, false);
        }
        for key in shapes {
            if let Some(shape) = self.shapes.remove(key) {
                if let Some(proxy) = shape.proxy {
                    self.broad_phase.destroy_proxy(proxy);
                }
            }
        }

        self.bodies.remove(handle.0);
        log::debug!("Destroyed body {:?}", handle.0);
        Ok(())
    }

    pub fn body_type(&self, handle: BodyHandle) -> Result<BodyType> {
        Ok(self.body(handle)?.body_type)
    }

    /// Origin of the body in world space
    pub fn body_position(&self, handle: BodyHandle) -> Result<Vec2> {
        Ok(self.body(handle)?.transform.p)
    }

    pub fn body_angle(&self, handle: BodyHandle) -> Result<f32> {
        Ok(self.body(handle)?.transform.q.angle())
    }

    pub fn body_rotation(&self, handle: BodyHandle) -> Result<Rot> {
        Ok(self.body(handle)?.transform.q)
    }

    pub fn body_transform(&self, handle: BodyHandle) -> Result<Transform> {
        Ok(self.body(handle)?.transform)
    }

    /// Center of mass in world space
    pub fn body_world_center(&self, handle: BodyHandle) -> Result<Vec2> {
        Ok(self.body(handle)?.center)
    }

    /// Convert a world point into the body's frame
    pub fn body_local_point(&self, handle: BodyHandle, world_point: Vec2) -> Result<Vec2> {
        Ok(self.body(handle)?.transform.inv_apply(world_point))
    }

    /// Convert a body-frame point into world space
    pub fn body_world_point(&self, handle: BodyHandle, local_point: Vec2) -> Result<Vec2> {
        Ok(self.body(handle)?.transform.apply(local_point))
    }

    /// Teleport a body. Contacts catch up on the next step.
    pub fn set_body_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f32) -> Result<()> {
        let body = self.body_mut(handle)?;
        body.set_transform(position, Rot::from_angle(angle));
        body.wake();
        let xf = body.transform;
        let enabled = body.enabled;
        let shapes = body.shapes.clone();

        if enabled {
            for key in shapes {
                self.sync_shape(key, &xf);
            }
        }
        Ok(())
    }

    pub fn body_linear_velocity(&self, handle: BodyHandle) -> Result<Vec2> {
        Ok(self.body(handle)?.linear_velocity)
    }

    pub fn body_angular_velocity(&self, handle: BodyHandle) -> Result<f32> {
        Ok(self.body(handle)?.angular_velocity)
    }

    /// Static bodies ignore velocity changes
    pub fn set_body_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        if body.is_static() {
            return Ok(());
        }
        if velocity.length_squared() > 0.0 {
            body.wake();
        }
        body.linear_velocity = velocity;
        Ok(())
    }

    pub fn set_body_angular_velocity(&mut self, handle: BodyHandle, velocity: f32) -> Result<()> {
        let body = self.body_mut(handle)?;
        if body.is_static() || body.fixed_rotation {
            return Ok(());
        }
        if velocity != 0.0 {
            body.wake();
        }
        body.angular_velocity = velocity;
        Ok(())
    }

    /// Apply a force at a world point. Only dynamic bodies respond.
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec2, point: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        if body.is_dynamic() {
            body.wake();
            body.force += force;
            body.torque += (point - body.center).cross(force);
        }
        Ok(())
    }

    pub fn apply_force_to_center(&mut self, handle: BodyHandle, force: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        if body.is_dynamic() {
            body.wake();
            body.force += force;
        }
        Ok(())
    }

    pub fn apply_torque(&mut self, handle: BodyHandle, torque: f32) -> Result<()> {
        let body = self.body_mut(handle)?;
        if body.is_dynamic() {
            body.wake();
            body.torque += torque;
        }
        Ok(())
    }

    /// Apply an impulse at a world point
    pub fn apply_linear_impulse(&mut self, handle: BodyHandle, impulse: Vec2, point: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        if body.is_dynamic() {
            body.wake();
            body.linear_velocity = body.linear_velocity.mul_add(body.inv_mass, impulse);
            body.angular_velocity += body.inv_inertia * (point - body.center).cross(impulse);
        }
        Ok(())
    }

    pub fn apply_linear_impulse_to_center(&mut self, handle: BodyHandle, impulse: Vec2) -> Result<()> {
        let body = self.body_mut(handle)?;
        if body.is_dynamic() {
            body.wake();
            body.linear_velocity = body.linear_velocity.mul_add(body.inv_mass, impulse);
        }
        Ok(())
    }

    pub fn apply_angular_impulse(&mut self, handle: BodyHandle, impulse: f32) -> Result<()> {
        let body = self.body_mut(handle)?;
        if body.is_dynamic() {
            body.wake();
            body.angular_velocity += body.inv_inertia * impulse;
        }
        Ok(())
    }

    /// Mass, local center and inertia about the center of mass
    pub fn body_mass_data(&self, handle: BodyHandle) -> Result<MassData> {
        Ok(self.body(handle)?.mass_data())
    }

    pub fn body_mass(&self, handle: BodyHandle) -> Result<f32> {
        Ok(self.body(handle)?.mass)
    }

    pub fn is_body_awake(&self, handle: BodyHandle) -> Result<bool> {
        Ok(self.body(handle)?.awake)
    }

    /// Wake a body or put it to sleep. An awake neighbour wakes it again.
    pub fn set_body_awake(&mut self, handle: BodyHandle, awake: bool) -> Result<()> {
        let body = self.body_mut(handle)?;
        if awake {
            body.wake();
        } else if !body.is_static() {
            body.sleep();
        }
        Ok(())
    }

    pub fn is_body_enabled(&self, handle: BodyHandle) -> Result<bool> {
        Ok(self.body(handle)?.enabled)
    }

    /// A disabled body keeps its shapes and joints but leaves the broad phase
    /// and loses its contacts.
    pub fn set_body_enabled(&mut self, handle: BodyHandle, enabled: bool) -> Result<()> {
        let body = self.body(handle)?;
        if body.enabled == enabled {
            return Ok(());
        }
        let shapes = body.shapes.clone();
        let contacts = body.contacts.clone();

        if enabled {
            let body = self.body_mut(handle)?;
            body.enabled = true;
            body.wake();
            let xf = body.transform;
            for key in shapes {
                self.create_shape_proxy(key, &xf);
            }
        } else {
            for key in contacts {
                self.destroy_contact(key, false);
            }
            for key in shapes {
                if let Some(shape) = self.shapes.get_mut(key) {
                    if let Some(proxy) = shape.proxy.take() {
                        self.broad_phase.destroy_proxy(proxy);
                    }
                }
            }
            self.body_mut(handle)?.enabled = false;
        }
        log::debug!("Body {:?} enabled = {}", handle.0, enabled);
        Ok(())
    }

    pub fn body_user_data(&self, handle: BodyHandle) -> Result<u128> {
        Ok(self.body(handle)?.user_data)
    }

    pub fn set_body_user_data(&mut self, handle: BodyHandle, user_data: u128) -> Result<()> {
        self.body_mut(handle)?.user_data = user_data;
        Ok(())
    }

    pub fn body_shapes(&self, handle: BodyHandle) -> Result<Vec<ShapeHandle>> {
        Ok(self.body(handle)?.shapes.iter().map(|&key| ShapeHandle(key)).collect())
    }

    pub fn body_joints(&self, handle: BodyHandle) -> Result<Vec<JointHandle>> {
        Ok(self.body(handle)?.joints.iter().map(|&key| JointHandle(key)).collect())
    }

    // ==================== Shapes ====================

    /// Attach a shape to a body and update the body's mass
    pub fn create_shape(
        &mut self,
        body: BodyHandle,
        geometry: impl Into<ShapeGeometry>,
        def: &ShapeDef,
    ) -> Result<ShapeHandle> {
        let geometry = geometry.into();
        if !geometry.is_valid() {
            log::warn!("Rejected malformed {:?} geometry", geometry.shape_type());
            return Err(PhysicsError::InvalidDefinition(format!(
                "malformed {:?} geometry",
                geometry.shape_type()
            )));
        }
        def.validate()?;

        let owner = self.body(body)?;
        if geometry.shape_type() == ShapeType::Segment && !owner.is_static() {
            // Segments collide with everything but segments, so they may only be static
            log::warn!("Rejected segment on non-static body {:?}", body.0);
            return Err(PhysicsError::UnsupportedShapePair(ShapeType::Segment, ShapeType::Segment));
        }
        let xf = owner.transform;
        let enabled = owner.enabled;

        let key = self
            .shapes
            .insert(Shape::new(body.0, geometry, def))
            .map_err(|err| capacity_error(EntityKind::Shape, err))?;

        if let Some(shape) = self.shapes.get_mut(key) {
            shape.aabb = shape.compute_aabb(&xf);
            shape.fat_aabb = shape.aabb;
        }
        if enabled {
            self.create_shape_proxy(key, &xf);
        }

        let shapes = &self.shapes;
        if let Some(owner) = self.bodies.get_mut(body.0) {
            owner.shapes.push(key);
            owner.update_mass(shapes);
        }
        Ok(ShapeHandle(key))
    }

    /// Remove a shape and its contacts, then update the body's mass
    pub fn destroy_shape(&mut self, handle: ShapeHandle) -> Result<()> {
        let shape = self.shape(handle)?;
        let body_key = shape.body;
        let proxy = shape.proxy;

        let contacts: Vec<ContactKey> = self
            .bodies
            .get(body_key)
            .map(|body| {
                body.contacts
                    .iter()
                    .copied()
                    .filter(|&key| self.contacts.get(key).is_some_and(|c| c.involves(handle.0)))
                    .collect()
            })
            .unwrap_or_default();
        for key in contacts {
            self.destroy_contact(key, false);
        }

        if let Some(proxy) = proxy {
            self.broad_phase.destroy_proxy(proxy);
        }
        self.shapes.remove(handle.0);

        let shapes = &self.shapes;
        if let Some(body) = self.bodies.get_mut(body_key) {
            body.shapes.retain(|&key| key != handle.0);
            body.update_mass(shapes);
        }
        Ok(())
    }

    pub fn shape_body(&self, handle: ShapeHandle) -> Result<BodyHandle> {
        Ok(BodyHandle(self.shape(handle)?.body))
    }

    pub fn shape_type(&self, handle: ShapeHandle) -> Result<ShapeType> {
        Ok(self.shape(handle)?.shape_type())
    }

    pub fn shape_geometry(&self, handle: ShapeHandle) -> Result<ShapeGeometry> {
        Ok(self.shape(handle)?.geometry)
    }

    /// World bounds from the last transform update
    pub fn shape_aabb(&self, handle: ShapeHandle) -> Result<AABB> {
        Ok(self.shape(handle)?.aabb)
    }

    pub fn shape_filter(&self, handle: ShapeHandle) -> Result<Filter> {
        Ok(self.shape(handle)?.filter)
    }

    /// Change the filter. Existing contacts are tested again on the next step and
    /// the shape looks for new partners.
    pub fn set_shape_filter(&mut self, handle: ShapeHandle, filter: Filter) -> Result<()> {
        let shape = self.shape_mut(handle)?;
        if shape.filter == filter {
            return Ok(());
        }
        shape.filter = filter;
        let body_key = shape.body;
        let proxy = shape.proxy;

        if let Some(body) = self.bodies.get(body_key) {
            for &key in &body.contacts {
                if let Some(contact) = self.contacts.get_mut(key) {
                    if contact.involves(handle.0) {
                        contact.refilter = true;
                    }
                }
            }
        }
        if let Some(proxy) = proxy {
            self.broad_phase.touch_proxy(proxy);
        }
        Ok(())
    }

    pub fn shape_friction(&self, handle: ShapeHandle) -> Result<f32> {
        Ok(self.shape(handle)?.friction)
    }

    pub fn set_shape_friction(&mut self, handle: ShapeHandle, friction: f32) -> Result<()> {
        if !friction.is_finite() || friction < 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!("friction must be non-negative, got {friction}")));
        }
        self.shape_mut(handle)?.friction = friction;
        Ok(())
    }

    pub fn shape_restitution(&self, handle: ShapeHandle) -> Result<f32> {
        Ok(self.shape(handle)?.restitution)
    }

    pub fn set_shape_restitution(&mut self, handle: ShapeHandle, restitution: f32) -> Result<()> {
        if !restitution.is_finite() || restitution < 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!(
                "restitution must be non-negative, got {restitution}"
            )));
        }
        self.shape_mut(handle)?.restitution = restitution;
        Ok(())
    }

    pub fn shape_density(&self, handle: ShapeHandle) -> Result<f32> {
        Ok(self.shape(handle)?.density)
    }

    /// Change the density and recompute the body's mass
    pub fn set_shape_density(&mut self, handle: ShapeHandle, density: f32) -> Result<()> {
        if !density.is_finite() || density < 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!("density must be non-negative, got {density}")));
        }
        let shape = self.shape_mut(handle)?;
        shape.density = density;
        let body_key = shape.body;

        let shapes = &self.shapes;
        if let Some(body) = self.bodies.get_mut(body_key) {
            body.update_mass(shapes);
        }
        Ok(())
    }

    pub fn is_shape_sensor(&self, handle: ShapeHandle) -> Result<bool> {
        Ok(self.shape(handle)?.is_sensor)
    }

    /// Takes effect when the shape's contacts next update
    pub fn set_shape_sensor(&mut self, handle: ShapeHandle, is_sensor: bool) -> Result<()> {
        self.shape_mut(handle)?.is_sensor = is_sensor;
        Ok(())
    }

    pub fn shape_user_data(&self, handle: ShapeHandle) -> Result<u128> {
        Ok(self.shape(handle)?.user_data)
    }

    pub fn set_shape_user_data(&mut self, handle: ShapeHandle, user_data: u128) -> Result<()> {
        self.shape_mut(handle)?.user_data = user_data;
        Ok(())
    }

    /// Whether a world point lies inside the shape
    pub fn shape_test_point(&self, handle: ShapeHandle, point: Vec2) -> Result<bool> {
        let shape = self.shape(handle)?;
        let body = self.bodies.get(shape.body).ok_or(PhysicsError::ShapeNotFound(handle))?;
        Ok(shape.geometry.contains_point(body.transform.inv_apply(point)))
    }

    // ==================== Joints ====================

    /// Create a joint between two bodies and wake them
    pub fn create_joint(&mut self, def: impl Into<JointDef>) -> Result<JointHandle> {
        let def = def.into();
        def.validate()?;

        let (handle_a, handle_b) = def.bodies();
        let body_a = self.body(handle_a)?;
        let body_b = self.body(handle_b)?;

        let mouse_anchor_b = match &def {
            JointDef::Mouse(mouse) => body_b.transform.inv_apply(mouse.target),
            _ => Vec2::ZERO,
        };
        if !body_a.is_dynamic() && !body_b.is_dynamic() {
            log::warn!("Joint between two non-dynamic bodies has no effect");
        }

        let joint = Joint::new(&def, handle_a.0, handle_b.0, mouse_anchor_b);
        let collide_connected = joint.collide_connected;
        let key = self
            .joints
            .insert(joint)
            .map_err(|err| capacity_error(EntityKind::Joint, err))?;

        for body_key in [handle_a.0, handle_b.0] {
            if let Some(body) = self.bodies.get_mut(body_key) {
                body.joints.push(key);
                body.wake();
            }
        }

        if !collide_connected {
            let doomed: Vec<ContactKey> = self
                .bodies
                .get(handle_a.0)
                .map(|body| {
                    body.contacts
                        .iter()
                        .copied()
                        .filter(|&ck| {
                            self.contacts
                                .get(ck)
                                .is_some_and(|c| c.other_body(handle_a.0) == handle_b.0)
                        })
                        .collect()
                })
                .unwrap_or_default();
            for ck in doomed {
                self.destroy_contact(ck, false);
            }
        }

        log::debug!("Created {:?} joint {:?}", def.joint_type(), key);
        Ok(JointHandle(key))
    }

    /// Remove a joint and wake the bodies it connected
    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<()> {
        if !self.joints.contains_key(handle.0) {
            return Err(PhysicsError::JointNotFound(handle));
        }
        self.remove_joint(handle.0);
        Ok(())
    }

    pub fn joint_type(&self, handle: JointHandle) -> Result<JointType> {
        Ok(self.joint(handle)?.joint_type())
    }

    pub fn joint_bodies(&self, handle: JointHandle) -> Result<(BodyHandle, BodyHandle)> {
        let joint = self.joint(handle)?;
        Ok((BodyHandle(joint.body_a), BodyHandle(joint.body_b)))
    }

    /// Move the target of a mouse joint and wake the dragged body
    pub fn set_mouse_target(&mut self, handle: JointHandle, target: Vec2) -> Result<()> {
        let joint = self.joints.get_mut(handle.0).ok_or(PhysicsError::JointNotFound(handle))?;
        let JointKind::Mouse { target: current, .. } = &mut joint.kind else {
            return Err(PhysicsError::InvalidDefinition("not a mouse joint".into()));
        };
        *current = target;
        let body_b = joint.body_b;
        if let Some(body) = self.bodies.get_mut(body_b) {
            body.wake();
        }
        Ok(())
    }

    // ==================== Simulation ====================

    /// Advance the world by exactly one step of `dt` seconds. `dt <= 0` does nothing.
    pub fn step(&mut self, dt: f32) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Ok(());
        }
        self.step_internal(dt)
    }

    /// Advance by a frame time using the fixed timestep.
    ///
    /// Runs at most `max_substeps` steps; time beyond that is dropped so a long
    /// stall does not snowball. Returns the number of steps taken.
    pub fn update(&mut self, frame_time: f32) -> Result<u32> {
        if !frame_time.is_finite() || frame_time <= 0.0 {
            return Ok(0);
        }
        self.accumulated_time += frame_time;

        let timestep = self.config.timestep;
        let mut steps = 0;
        while self.accumulated_time >= timestep && steps < self.config.max_substeps {
            self.step_internal(timestep)?;
            self.accumulated_time -= timestep;
            steps += 1;
        }

        if self.accumulated_time >= timestep {
            log::trace!("Dropping {:.3}s of simulation backlog", self.accumulated_time);
            self.accumulated_time %= timestep;
        }
        Ok(steps)
    }

    /// Fraction of a timestep left in the accumulator, for interpolation
    pub fn interpolation_alpha(&self) -> f32 {
        self.accumulated_time / self.config.timestep
    }

    /// Number of steps taken since creation
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    // ==================== Queries ====================

    /// Get a query interface for ray casts and overlap tests
    pub fn query(&self) -> PhysicsQuery<'_> {
        PhysicsQuery {
            broad_phase: &self.broad_phase,
            shapes: &self.shapes,
            bodies: &self.bodies,
        }
    }

    // ==================== Events ====================

    pub fn events(&self) -> &EventCollector {
        &self.events
    }

    /// Get collision events from the last step
    pub fn collision_events(&self) -> &[CollisionEvent] {
        &self.events.collision_events
    }

    pub fn collision_started(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.events.started_collisions()
    }

    pub fn collision_stopped(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.events.stopped_collisions()
    }

    pub fn sensor_enters(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.events.sensor_enters()
    }

    pub fn sensor_exits(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.events.sensor_exits()
    }

    // ==================== Debug ====================

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Awake, enabled, non-static bodies
    pub fn awake_body_count(&self) -> usize {
        self.bodies.values().filter(|b| b.is_active()).count()
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            body_count: self.bodies.len(),
            awake_body_count: self.awake_body_count(),
            shape_count: self.shapes.len(),
            contact_count: self.contacts.len(),
            touching_contact_count: self.contacts.values().filter(|c| c.touching).count(),
            joint_count: self.joints.len(),
            island_count: self.islands.island_count(),
            proxy_count: self.broad_phase.proxy_count(),
            tree_height: self.broad_phase.tree_height(),
            scratch_capacity: self.scratch.capacity(),
            scratch_used: self.scratch.used(),
            scratch_max_used: self.scratch.max_used(),
        }
    }

    /// Timings of the last step
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Number of parallel phases handed to the task system so far
    pub fn tasks_enqueued(&self) -> usize {
        self.tasks.tasks_enqueued()
    }

    // ==================== Internals ====================

    fn body(&self, handle: BodyHandle) -> Result<&Body> {
        self.bodies.get(handle.0).ok_or(PhysicsError::BodyNotFound(handle))
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Result<&mut Body> {
        self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))
    }

    fn shape(&self, handle: ShapeHandle) -> Result<&Shape> {
        self.shapes.get(handle.0).ok_or(PhysicsError::ShapeNotFound(handle))
    }

    fn shape_mut(&mut self, handle: ShapeHandle) -> Result<&mut Shape> {
        self.shapes.get_mut(handle.0).ok_or(PhysicsError::ShapeNotFound(handle))
    }

    fn joint(&self, handle: JointHandle) -> Result<&Joint> {
        self.joints.get(handle.0).ok_or(PhysicsError::JointNotFound(handle))
    }

    fn create_shape_proxy(&mut self, key: ShapeKey, xf: &Transform) {
        let Some(shape) = self.shapes.get_mut(key) else { return };
        shape.aabb = shape.compute_aabb(xf);
        let proxy = self.broad_phase.create_proxy(shape.aabb, key);
        shape.fat_aabb = self.broad_phase.fat_aabb(proxy).unwrap_or(shape.aabb);
        shape.proxy = Some(proxy);
    }

    /// Refresh a shape's bounds after its body moved
    pub(crate) fn sync_shape(&mut self, key: ShapeKey, xf: &Transform) {
        let Some(shape) = self.shapes.get_mut(key) else { return };
        shape.aabb = shape.compute_aabb(xf);
        let Some(proxy) = shape.proxy else { return };
        if self.broad_phase.move_proxy(proxy, shape.aabb) {
            shape.fat_aabb = self.broad_phase.fat_aabb(proxy).unwrap_or(shape.aabb);
        }
    }

    pub(crate) fn create_contact(&mut self, shape_a: ShapeKey, shape_b: ShapeKey) -> Result<ContactKey> {
        let (Some(a), Some(b)) = (self.shapes.get(shape_a), self.shapes.get(shape_b)) else {
            return Err(PhysicsError::ShapeNotFound(ShapeHandle(shape_a)));
        };
        let contact = Contact::new(shape_a, a, shape_b, b);
        let (body_a, body_b) = (contact.body_a, contact.body_b);
        let key = self
            .contacts
            .insert(contact)
            .map_err(|err| capacity_error(EntityKind::Contact, err))?;

        self.pairs.insert(pair_key(shape_a, shape_b), key);
        for body_key in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_key) {
                body.contacts.push(key);
            }
        }
        Ok(key)
    }

    /// Remove a contact, optionally reporting the end of a touch
    pub(crate) fn destroy_contact(&mut self, key: ContactKey, report: bool) {
        let Some(contact) = self.contacts.remove(key) else { return };
        self.pairs.remove(&pair_key(contact.shape_a, contact.shape_b));

        for body_key in [contact.body_a, contact.body_b] {
            if let Some(body) = self.bodies.get_mut(body_key) {
                body.contacts.retain(|&k| k != key);
                if contact.touching && !contact.sensor {
                    body.wake();
                }
            }
        }

        if report && contact.touching {
            let event = self.make_event(&contact, CollisionEventType::Stopped);
            self.events.push(event);
        }
    }

    pub(crate) fn make_event(&self, contact: &Contact, event_type: CollisionEventType) -> CollisionEvent {
        let user_data = |key: ShapeKey| self.shapes.get(key).map_or(0, |s| s.user_data);
        let contacts = if event_type == CollisionEventType::Started && !contact.sensor {
            contact
                .manifold
                .points()
                .iter()
                .map(|mp| ContactData {
                    point: mp.point,
                    normal: contact.manifold.normal,
                    depth: mp.penetration(),
                    impulse: mp.normal_impulse,
                })
                .collect()
        } else {
            Vec::new()
        };

        CollisionEvent {
            shape1: ShapeHandle(contact.shape_a),
            shape2: ShapeHandle(contact.shape_b),
            body1: BodyHandle(contact.body_a),
            body2: BodyHandle(contact.body_b),
            event_type,
            is_sensor: contact.sensor,
            contacts,
            user_data1: user_data(contact.shape_a),
            user_data2: user_data(contact.shape_b),
        }
    }

    fn remove_joint(&mut self, key: JointKey) {
        let Some(joint) = self.joints.remove(key) else { return };
        for body_key in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_key) {
                body.joints.retain(|&k| k != key);
                body.wake();
            }
        }
        // Bodies that were kept apart may collide again
        if !joint.collide_connected {
            let shapes = self.bodies.get(joint.body_a).map(|b| b.shapes.clone()).unwrap_or_default();
            for shape_key in shapes {
                if let Some(proxy) = self.shapes.get(shape_key).and_then(|s| s.proxy) {
                    self.broad_phase.touch_proxy(proxy);
                }
            }
        }
    }
}

impl Drop for PhysicsWorld {
    fn drop(&mut self) {
        log::debug!(
            "Destroyed physics world after {} steps ({} bodies, {} shapes, {} joints)",
            self.step_count,
            self.bodies.len(),
            self.shapes.len(),
            self.joints.len()
        );
    }
}

impl core::fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("bodies", &self.bodies.len())
            .field("shapes", &self.shapes.len())
            .field("contacts", &self.contacts.len())
            .field("joints", &self.joints.len())
            .field("steps", &self.step_count)
            .finish()
    }
}

fn capacity_error(kind: EntityKind, err: CapacityError) -> PhysicsError {
    log::warn!("{kind} capacity of {} exceeded", err.capacity);
    PhysicsError::CapacityExceeded {
        kind,
        capacity: err.capacity,
    }
}
