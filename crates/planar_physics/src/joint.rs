//! Joints: distance, revolute and mouse constraints between two bodies
//!
//! Joints keep their accumulated impulses between steps for warm starting, the
//! same way contacts do. The solver works on [`JointConstraint`] copies that
//! live in the island's scratch slice.

use core::f32::consts::TAU;

use planar_math::{Mat22, Vec2};
use planar_structures::ArenaKey;

use crate::body::{BodyHandle, BodyKey};
use crate::config::constants::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::error::{PhysicsError, Result};
use crate::solver::{SolverBody, StepContext};

pub(crate) type JointKey = ArenaKey<Joint>;

/// Handle to a joint in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JointHandle(pub(crate) JointKey);

impl JointHandle {
    pub fn index(&self) -> u32 {
        self.0.index()
    }

    pub fn generation(&self) -> u32 {
        self.0.generation()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointType {
    Distance,
    Revolute,
    Mouse,
}

/// Keeps two anchor points at a fixed distance, optionally as a spring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Anchor on body A, relative to its origin
    pub local_anchor_a: Vec2,
    /// Anchor on body B, relative to its origin
    pub local_anchor_b: Vec2,
    /// Rest length, at least the linear slop
    pub length: f32,
    /// Spring frequency in Hz, zero for a rigid rod
    pub hertz: f32,
    pub damping_ratio: f32,
    pub collide_connected: bool,
}

impl DistanceJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, length: f32) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length,
            hertz: 0.0,
            damping_ratio: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_anchors(mut self, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        self.local_anchor_a = local_anchor_a;
        self.local_anchor_b = local_anchor_b;
        self
    }

    pub fn with_spring(mut self, hertz: f32, damping_ratio: f32) -> Self {
        self.hertz = hertz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

/// Pins two bodies together at a shared point, with an optional motor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevoluteJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub enable_motor: bool,
    /// Target relative angular speed in rad/s
    pub motor_speed: f32,
    /// Largest torque the motor may apply, in N·m
    pub max_motor_torque: f32,
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

/// Drags a point on body B towards a world target through a soft spring.
/// Body A only anchors the joint and is usually a static ground body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Initial target in world space; the grabbed point on B starts here
    pub target: Vec2,
    pub max_force: f32,
    pub hertz: f32,
    pub damping_ratio: f32,
    pub collide_connected: bool,
}

impl MouseJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, target: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            target,
            max_force: 1000.0,
            hertz: 5.0,
            damping_ratio: 0.7,
            collide_connected: true,
        }
    }

    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = max_force;
        self
    }

    pub fn with_spring(mut self, hertz: f32, damping_ratio: f32) -> Self {
        self.hertz = hertz;
        self.damping_ratio = damping_ratio;
        self
    }
}

/// Any joint definition accepted by `PhysicsWorld::create_joint`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Mouse(MouseJointDef),
}

impl From<DistanceJointDef> for JointDef {
    fn from(def: DistanceJointDef) -> Self {
        JointDef::Distance(def)
    }
}

impl From<RevoluteJointDef> for JointDef {
    fn from(def: RevoluteJointDef) -> Self {
        JointDef::Revolute(def)
    }
}

impl From<MouseJointDef> for JointDef {
    fn from(def: MouseJointDef) -> Self {
        JointDef::Mouse(def)
    }
}

impl JointDef {
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        match self {
            JointDef::Distance(d) => (d.body_a, d.body_b),
            JointDef::Revolute(d) => (d.body_a, d.body_b),
            JointDef::Mouse(d) => (d.body_a, d.body_b),
        }
    }

    pub fn joint_type(&self) -> JointType {
        match self {
            JointDef::Distance(_) => JointType::Distance,
            JointDef::Revolute(_) => JointType::Revolute,
            JointDef::Mouse(_) => JointType::Mouse,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (a, b) = self.bodies();
        if a == b {
            return Err(PhysicsError::InvalidDefinition("joint connects a body to itself".into()));
        }
        let finite = |v: f32| v.is_finite() && v >= 0.0;
        match self {
            JointDef::Distance(d) => {
                if !d.length.is_finite() || d.length < LINEAR_SLOP {
                    return Err(PhysicsError::InvalidDefinition(format!(
                        "distance joint length must be at least {LINEAR_SLOP}, got {}",
                        d.length
                    )));
                }
                if !finite(d.hertz) || !finite(d.damping_ratio) {
                    return Err(PhysicsError::InvalidDefinition("distance joint spring must be non-negative".into()));
                }
            }
            JointDef::Revolute(d) => {
                if !finite(d.max_motor_torque) || !d.motor_speed.is_finite() {
                    return Err(PhysicsError::InvalidDefinition("revolute motor must be finite and non-negative".into()));
                }
            }
            JointDef::Mouse(d) => {
                if !finite(d.max_force) || !finite(d.hertz) || !finite(d.damping_ratio) || !d.target.is_valid() {
                    return Err(PhysicsError::InvalidDefinition("mouse joint parameters must be finite and non-negative".into()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum JointKind {
    Distance {
        length: f32,
        hertz: f32,
        damping_ratio: f32,
        impulse: f32,
    },
    Revolute {
        enable_motor: bool,
        motor_speed: f32,
        max_motor_torque: f32,
        linear_impulse: Vec2,
        motor_impulse: f32,
    },
    Mouse {
        target: Vec2,
        max_force: f32,
        hertz: f32,
        damping_ratio: f32,
        impulse: Vec2,
    },
}

/// A joint as stored in the world
#[derive(Debug, Clone)]
pub(crate) struct Joint {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    /// Anchors relative to each body origin
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub collide_connected: bool,
    pub kind: JointKind,
}

impl Joint {
    /// `local_anchor_b` must already be resolved for mouse joints
    pub fn new(def: &JointDef, body_a: BodyKey, body_b: BodyKey, mouse_anchor_b: Vec2) -> Self {
        match *def {
            JointDef::Distance(d) => Self {
                body_a,
                body_b,
                local_anchor_a: d.local_anchor_a,
                local_anchor_b: d.local_anchor_b,
                collide_connected: d.collide_connected,
                kind: JointKind::Distance {
                    length: d.length,
                    hertz: d.hertz,
                    damping_ratio: d.damping_ratio,
                    impulse: 0.0,
                },
            },
            JointDef::Revolute(d) => Self {
                body_a,
                body_b,
                local_anchor_a: d.local_anchor_a,
                local_anchor_b: d.local_anchor_b,
                collide_connected: d.collide_connected,
                kind: JointKind::Revolute {
                    enable_motor: d.enable_motor,
                    motor_speed: d.motor_speed,
                    max_motor_torque: d.max_motor_torque,
                    linear_impulse: Vec2::ZERO,
                    motor_impulse: 0.0,
                },
            },
            JointDef::Mouse(d) => Self {
                body_a,
                body_b,
                local_anchor_a: Vec2::ZERO,
                local_anchor_b: mouse_anchor_b,
                collide_connected: d.collide_connected,
                kind: JointKind::Mouse {
                    target: d.target,
                    max_force: d.max_force,
                    hertz: d.hertz,
                    damping_ratio: d.damping_ratio,
                    impulse: Vec2::ZERO,
                },
            },
        }
    }

    pub fn joint_type(&self) -> JointType {
        match self.kind {
            JointKind::Distance { .. } => JointType::Distance,
            JointKind::Revolute { .. } => JointType::Revolute,
            JointKind::Mouse { .. } => JointType::Mouse,
        }
    }

    pub fn other_body(&self, body: BodyKey) -> BodyKey {
        if self.body_a == body {
            self.body_b
        } else {
            self.body_a
        }
    }

    /// Whether this joint connects exactly these two bodies
    pub fn connects(&self, a: BodyKey, b: BodyKey) -> bool {
        (self.body_a == a && self.body_b == b) || (self.body_a == b && self.body_b == a)
    }

    /// Copy impulses back from a solved constraint
    pub fn store_impulses(&mut self, constraint: &JointConstraint) {
        match (&mut self.kind, &constraint.solver) {
            (JointKind::Distance { impulse, .. }, JointSolver::Distance { impulse: solved, .. }) => *impulse = *solved,
            (
                JointKind::Revolute {
                    linear_impulse,
                    motor_impulse,
                    ..
                },
                JointSolver::Revolute {
                    linear_impulse: solved_linear,
                    motor_impulse: solved_motor,
                    ..
                },
            ) => {
                *linear_impulse = *solved_linear;
                *motor_impulse = *solved_motor;
            }
            (JointKind::Mouse { impulse, .. }, JointSolver::Mouse { impulse: solved, .. }) => *impulse = *solved,
            _ => {}
        }
    }
}

/// Step-local solver state for a joint
#[derive(Debug, Clone, Copy)]
pub(crate) enum JointSolver {
    Distance {
        length: f32,
        hertz: f32,
        damping_ratio: f32,
        impulse: f32,
        axis: Vec2,
        mass: f32,
        soft_mass: f32,
        gamma: f32,
        bias: f32,
    },
    Revolute {
        enable_motor: bool,
        motor_speed: f32,
        max_motor_torque: f32,
        linear_impulse: Vec2,
        motor_impulse: f32,
        point_mass: Mat22,
        axial_mass: f32,
    },
    Mouse {
        target: Vec2,
        max_force: f32,
        hertz: f32,
        damping_ratio: f32,
        impulse: Vec2,
        mass: Mat22,
        bias: Vec2,
        gamma: f32,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct JointConstraint {
    pub joint: JointKey,
    pub index_a: usize,
    pub index_b: usize,
    /// Anchors relative to each body origin
    local_origin_a: Vec2,
    local_origin_b: Vec2,
    /// Anchors relative to the centers of mass, world orientation, at prepare time
    r_a: Vec2,
    r_b: Vec2,
    pub solver: JointSolver,
}

impl Default for JointConstraint {
    fn default() -> Self {
        Self {
            joint: JointKey::default(),
            index_a: 0,
            index_b: 0,
            local_origin_a: Vec2::ZERO,
            local_origin_b: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            solver: JointSolver::Distance {
                length: 0.0,
                hertz: 0.0,
                damping_ratio: 0.0,
                impulse: 0.0,
                axis: Vec2::ZERO,
                mass: 0.0,
                soft_mass: 0.0,
                gamma: 0.0,
                bias: 0.0,
            },
        }
    }
}

impl JointConstraint {
    pub fn new(key: JointKey, joint: &Joint, index_a: usize, index_b: usize, warm_starting: bool) -> Self {
        let keep = |x: f32| if warm_starting { x } else { 0.0 };
        let keep2 = |v: Vec2| if warm_starting { v } else { Vec2::ZERO };

        let solver = match joint.kind {
            JointKind::Distance {
                length,
                hertz,
                damping_ratio,
                impulse,
            } => JointSolver::Distance {
                length,
                hertz,
                damping_ratio,
                impulse: keep(impulse),
                axis: Vec2::ZERO,
                mass: 0.0,
                soft_mass: 0.0,
                gamma: 0.0,
                bias: 0.0,
            },
            JointKind::Revolute {
                enable_motor,
                motor_speed,
                max_motor_torque,
                linear_impulse,
                motor_impulse,
            } => JointSolver::Revolute {
                enable_motor,
                motor_speed,
                max_motor_torque,
                linear_impulse: keep2(linear_impulse),
                motor_impulse: if enable_motor { keep(motor_impulse) } else { 0.0 },
                point_mass: Mat22::ZERO,
                axial_mass: 0.0,
            },
            JointKind::Mouse {
                target,
                max_force,
                hertz,
                damping_ratio,
                impulse,
            } => JointSolver::Mouse {
                target,
                max_force,
                hertz,
                damping_ratio,
                impulse: keep2(impulse),
                mass: Mat22::ZERO,
                bias: Vec2::ZERO,
                gamma: 0.0,
            },
        };

        Self {
            joint: key,
            index_a,
            index_b,
            local_origin_a: joint.local_anchor_a,
            local_origin_b: joint.local_anchor_b,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            solver,
        }
    }
}

/// Spring coefficients (gamma, bias factor) for a soft constraint of the given mass
fn soft_coefficients(mass: f32, hertz: f32, damping_ratio: f32, h: f32) -> (f32, f32) {
    let omega = TAU * hertz;
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;
    let gamma = h * (d + h * k);
    let gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
    (gamma, h * k * gamma)
}

pub(crate) fn prepare_joints(joints: &mut [JointConstraint], bodies: &[SolverBody], ctx: &StepContext) {
    let h = ctx.dt;
    for jc in joints {
        let a = &bodies[jc.index_a];
        let b = &bodies[jc.index_b];
        let (m_a, i_a) = (a.inv_mass, a.inv_inertia);
        let (m_b, i_b) = (b.inv_mass, b.inv_inertia);

        jc.r_a = a.q.rotate(jc.local_origin_a - a.local_center);
        jc.r_b = b.q.rotate(jc.local_origin_b - b.local_center);
        let (r_a, r_b) = (jc.r_a, jc.r_b);

        match &mut jc.solver {
            JointSolver::Distance {
                length,
                hertz,
                damping_ratio,
                axis,
                mass,
                soft_mass,
                gamma,
                bias,
                ..
            } => {
                let d = (b.c + r_b) - (a.c + r_a);
                let (current, u) = d.length_and_normalize();
                *axis = if current > LINEAR_SLOP { u } else { Vec2::ZERO };

                let cr_a = r_a.cross(*axis);
                let cr_b = r_b.cross(*axis);
                let inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
                *mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

                if *hertz > 0.0 {
                    let (g, beta) = soft_coefficients(*mass, *hertz, *damping_ratio, h);
                    *gamma = g;
                    *bias = (current - *length) * beta;
                    let soft = inv_mass + g;
                    *soft_mass = if soft != 0.0 { 1.0 / soft } else { 0.0 };
                } else {
                    *gamma = 0.0;
                    *bias = 0.0;
                    *soft_mass = *mass;
                }
            }
            JointSolver::Revolute {
                point_mass, axial_mass, ..
            } => {
                *point_mass = Mat22::new(
                    Vec2::new(
                        m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
                        -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
                    ),
                    Vec2::new(
                        -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
                        m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b,
                    ),
                );
                let k = i_a + i_b;
                *axial_mass = if k > 0.0 { 1.0 / k } else { 0.0 };
            }
            JointSolver::Mouse {
                target,
                hertz,
                damping_ratio,
                mass,
                bias,
                gamma,
                ..
            } => {
                let (g, beta) = soft_coefficients(b.mass, *hertz, *damping_ratio, h);
                *gamma = g;

                let k = Mat22::new(
                    Vec2::new(m_b + i_b * r_b.y * r_b.y + g, -i_b * r_b.x * r_b.y),
                    Vec2::new(-i_b * r_b.x * r_b.y, m_b + i_b * r_b.x * r_b.x + g),
                );
                *mass = k.inverse();
                *bias = ((b.c + r_b) - *target) * beta;
            }
        }
    }
}

pub(crate) fn warm_start_joints(joints: &[JointConstraint], bodies: &mut [SolverBody]) {
    for jc in joints {
        let (r_a, r_b) = (jc.r_a, jc.r_b);
        let (p, angular) = match jc.solver {
            JointSolver::Distance { impulse, axis, .. } => (axis * impulse, 0.0),
            JointSolver::Revolute {
                linear_impulse,
                motor_impulse,
                ..
            } => (linear_impulse, motor_impulse),
            JointSolver::Mouse { impulse, .. } => {
                // Only the grabbed body reacts
                let sb = &mut bodies[jc.index_b];
                if sb.is_dynamic() {
                    sb.v = sb.v.mul_add(sb.inv_mass, impulse);
                    sb.w += sb.inv_inertia * r_b.cross(impulse);
                }
                continue;
            }
        };
        apply_pair(bodies, jc.index_a, jc.index_b, r_a, r_b, p, angular);
    }
}

pub(crate) fn solve_joint_velocities(joints: &mut [JointConstraint], bodies: &mut [SolverBody], ctx: &StepContext) {
    let h = ctx.dt;
    for jc in joints {
        let (r_a, r_b) = (jc.r_a, jc.r_b);
        let (index_a, index_b) = (jc.index_a, jc.index_b);

        match &mut jc.solver {
            JointSolver::Distance {
                impulse,
                axis,
                soft_mass,
                gamma,
                bias,
                ..
            } => {
                let a = &bodies[index_a];
                let b = &bodies[index_b];
                let vp_a = a.v + Vec2::scalar_cross(a.w, r_a);
                let vp_b = b.v + Vec2::scalar_cross(b.w, r_b);
                let cdot = axis.dot(vp_b - vp_a);

                let lambda = -*soft_mass * (cdot + *bias + *gamma * *impulse);
                *impulse += lambda;
                apply_pair(bodies, index_a, index_b, r_a, r_b, *axis * lambda, 0.0);
            }
            JointSolver::Revolute {
                enable_motor,
                motor_speed,
                max_motor_torque,
                linear_impulse,
                motor_impulse,
                point_mass,
                axial_mass,
            } => {
                let fixed_rotation = bodies[index_a].inv_inertia + bodies[index_b].inv_inertia == 0.0;
                if *enable_motor && !fixed_rotation {
                    let cdot = bodies[index_b].w - bodies[index_a].w - *motor_speed;
                    let lambda = -*axial_mass * cdot;
                    let old = *motor_impulse;
                    let max_impulse = h * *max_motor_torque;
                    *motor_impulse = (old + lambda).clamp(-max_impulse, max_impulse);
                    let lambda = *motor_impulse - old;
                    apply_pair(bodies, index_a, index_b, r_a, r_b, Vec2::ZERO, lambda);
                }

                let a = &bodies[index_a];
                let b = &bodies[index_b];
                let cdot = b.v + Vec2::scalar_cross(b.w, r_b) - a.v - Vec2::scalar_cross(a.w, r_a);
                let lambda = point_mass.solve(-cdot);
                *linear_impulse += lambda;
                apply_pair(bodies, index_a, index_b, r_a, r_b, lambda, 0.0);
            }
            JointSolver::Mouse {
                max_force,
                impulse,
                mass,
                bias,
                gamma,
                ..
            } => {
                let b = &bodies[index_b];
                let cdot = b.v + Vec2::scalar_cross(b.w, r_b);
                let lambda = mass.mul_vec(-(cdot + *bias + *impulse * *gamma));

                let old = *impulse;
                *impulse += lambda;
                let max_impulse = h * *max_force;
                if impulse.length_squared() > max_impulse * max_impulse {
                    *impulse *= max_impulse / impulse.length();
                }
                let lambda = *impulse - old;

                let sb = &mut bodies[index_b];
                if sb.is_dynamic() {
                    sb.v = sb.v.mul_add(sb.inv_mass, lambda);
                    sb.w += sb.inv_inertia * r_b.cross(lambda);
                }
            }
        }
    }
}

/// Position pass for the rigid joints. Soft joints correct through their bias
/// instead and always report success.
pub(crate) fn solve_joint_positions(joints: &[JointConstraint], bodies: &mut [SolverBody]) -> bool {
    let mut all_ok = true;
    for jc in joints {
        let a = bodies[jc.index_a];
        let b = bodies[jc.index_b];
        let (m_a, i_a) = (a.inv_mass, a.inv_inertia);
        let (m_b, i_b) = (b.inv_mass, b.inv_inertia);
        let r_a = a.q.rotate(jc.local_origin_a - a.local_center);
        let r_b = b.q.rotate(jc.local_origin_b - b.local_center);

        let p = match jc.solver {
            JointSolver::Distance { length, hertz, .. } => {
                if hertz > 0.0 {
                    continue;
                }
                let d = (b.c + r_b) - (a.c + r_a);
                let (current, u) = d.length_and_normalize();
                let error = (current - length).clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);
                all_ok &= error.abs() < LINEAR_SLOP;

                let cr_a = r_a.cross(u);
                let cr_b = r_b.cross(u);
                let k = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
                let impulse = if k > 0.0 { -error / k } else { 0.0 };
                u * impulse
            }
            JointSolver::Revolute { .. } => {
                let error = (b.c + r_b) - (a.c + r_a);
                all_ok &= error.length() <= LINEAR_SLOP;

                let k = Mat22::new(
                    Vec2::new(
                        m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                        -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                    ),
                    Vec2::new(
                        -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                        m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
                    ),
                );
                -k.solve(error)
            }
            JointSolver::Mouse { .. } => continue,
        };

        if a.is_dynamic() {
            bodies[jc.index_a].c = a.c.mul_sub(m_a, p);
            bodies[jc.index_a].q = a.q.integrate(-i_a * r_a.cross(p));
        }
        if b.is_dynamic() {
            bodies[jc.index_b].c = b.c.mul_add(m_b, p);
            bodies[jc.index_b].q = b.q.integrate(i_b * r_b.cross(p));
        }
    }
    all_ok
}

/// Apply `p` at the anchors (negative on A) plus an angular impulse
fn apply_pair(bodies: &mut [SolverBody], index_a: usize, index_b: usize, r_a: Vec2, r_b: Vec2, p: Vec2, angular: f32) {
    let a = &mut bodies[index_a];
    if a.is_dynamic() {
        a.v = a.v.mul_sub(a.inv_mass, p);
        a.w -= a.inv_inertia * (r_a.cross(p) + angular);
    }
    let b = &mut bodies[index_b];
    if b.is_dynamic() {
        b.v = b.v.mul_add(b.inv_mass, p);
        b.w += b.inv_inertia * (r_b.cross(p) + angular);
    }
}
