//! Sequential-impulse island solver
//!
//! One island is solved by one task against island-local copies of its bodies
//! and constraints, so islands never share mutable state. Per island:
//!
//! 1. prepare contact and joint constraints from the step-start positions
//! 2. integrate velocities (gravity, forces, exponential damping)
//! 3. warm start with last step's accumulated impulses
//! 4. velocity passes: joints, then contacts (friction before normal)
//! 5. restitution for points that hit harder than the threshold
//! 6. integrate positions with the solved velocities
//! 7. position passes that push overlap out without touching velocity
//! 8. sleep timers

use planar_math::{Rot, Vec2};

use crate::body::{Body, BodyKey, BodyType};
use crate::config::constants::{BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_ROTATION, MAX_TRANSLATION};
use crate::contact::ContactKey;
use crate::joint::{
    prepare_joints, solve_joint_positions, solve_joint_velocities, warm_start_joints, JointConstraint,
};
use crate::manifold::Manifold;

/// Per-step parameters shared read-only by every island task
#[derive(Debug, Clone, Copy)]
pub(crate) struct StepContext {
    pub dt: f32,
    pub inv_dt: f32,
    pub gravity: Vec2,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub restitution_threshold: f32,
    pub warm_starting: bool,
    pub sleep_linear_threshold: f32,
    pub sleep_angular_threshold: f32,
}

/// Island-local copy of a body's solver state
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SolverBody {
    pub body: BodyKey,
    pub body_type: BodyType,
    pub v: Vec2,
    pub w: f32,
    /// Center of mass
    pub c: Vec2,
    pub q: Rot,
    /// Center and rotation at the start of the step
    pub c0: Vec2,
    pub q0: Rot,
    pub local_center: Vec2,
    pub force: Vec2,
    pub torque: f32,
    pub mass: f32,
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub enable_sleep: bool,
    pub sleep_time: f32,
}

impl SolverBody {
    pub fn from_body(key: BodyKey, body: &Body) -> Self {
        let dynamic = body.is_dynamic();
        Self {
            body: key,
            body_type: body.body_type,
            v: body.linear_velocity,
            w: body.angular_velocity,
            c: body.center,
            q: body.transform.q,
            c0: body.center,
            q0: body.transform.q,
            local_center: body.local_center,
            force: body.force,
            torque: body.torque,
            mass: if dynamic { body.mass } else { 0.0 },
            inv_mass: if dynamic { body.inv_mass } else { 0.0 },
            inv_inertia: if dynamic { body.inv_inertia } else { 0.0 },
            linear_damping: body.linear_damping,
            angular_damping: body.angular_damping,
            gravity_scale: body.gravity_scale,
            enable_sleep: body.enable_sleep,
            sleep_time: body.sleep_time,
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Velocity of a point at offset `r` from the center
    #[inline]
    fn point_velocity(&self, r: Vec2) -> Vec2 {
        self.v + Vec2::scalar_cross(self.w, r)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ConstraintPoint {
    /// Offsets from the centers of mass at prepare time, world orientation
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    /// Separation with the anchor offsets factored out, for the position passes
    pub base_separation: f32,
    pub separation: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub max_normal_impulse: f32,
    pub normal_mass: f32,
    pub tangent_mass: f32,
    /// Normal velocity before solving, used by restitution
    pub relative_velocity: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ContactConstraint {
    pub contact: ContactKey,
    pub index_a: usize,
    pub index_b: usize,
    pub normal: Vec2,
    pub friction: f32,
    pub restitution: f32,
    pub points: [ConstraintPoint; 2],
    pub point_count: usize,
    /// World points copied from the manifold
    world_points: [Vec2; 2],
}

impl ContactConstraint {
    pub fn new(
        contact: ContactKey,
        index_a: usize,
        index_b: usize,
        manifold: &Manifold,
        friction: f32,
        restitution: f32,
        warm_starting: bool,
    ) -> Self {
        let mut constraint = Self {
            contact,
            index_a,
            index_b,
            normal: manifold.normal,
            friction,
            restitution,
            point_count: manifold.point_count,
            ..Default::default()
        };
        for (i, mp) in manifold.points().iter().enumerate() {
            constraint.world_points[i] = mp.point;
            constraint.points[i].separation = mp.separation;
            if warm_starting {
                constraint.points[i].normal_impulse = mp.normal_impulse;
                constraint.points[i].tangent_impulse = mp.tangent_impulse;
            }
        }
        constraint
    }

    pub fn points(&self) -> &[ConstraintPoint] {
        &self.points[..self.point_count]
    }

    #[inline]
    fn tangent(&self) -> Vec2 {
        self.normal.right_perp()
    }
}

/// Work for one island: disjoint slices of the step's scratch arrays
#[derive(Debug)]
pub(crate) struct IslandWork<'a> {
    pub bodies: &'a mut [SolverBody],
    pub contacts: &'a mut [ContactConstraint],
    pub joints: &'a mut [JointConstraint],
    /// Smallest sleep timer among the island's dynamic bodies after the solve
    pub min_sleep_time: f32,
}

pub(crate) fn solve_island(work: &mut IslandWork<'_>, ctx: &StepContext) {
    let bodies = &mut *work.bodies;

    prepare_contacts(work.contacts, bodies);
    prepare_joints(work.joints, bodies, ctx);

    integrate_velocities(bodies, ctx);

    if ctx.warm_starting {
        warm_start_joints(work.joints, bodies);
        warm_start_contacts(work.contacts, bodies);
    }

    for _ in 0..ctx.velocity_iterations {
        solve_joint_velocities(work.joints, bodies, ctx);
        solve_contact_velocities(work.contacts, bodies, ctx);
    }

    apply_restitution(work.contacts, bodies, ctx);

    integrate_positions(bodies, ctx);

    for _ in 0..ctx.position_iterations {
        let joints_ok = solve_joint_positions(work.joints, bodies);
        let contacts_ok = solve_contact_positions(work.contacts, bodies);
        if joints_ok && contacts_ok {
            break;
        }
    }

    work.min_sleep_time = update_sleep_timers(bodies, ctx);
}

pub(crate) fn prepare_contacts(constraints: &mut [ContactConstraint], bodies: &[SolverBody]) {
    for cc in constraints {
        let a = &bodies[cc.index_a];
        let b = &bodies[cc.index_b];
        let (m_a, i_a) = (a.inv_mass, a.inv_inertia);
        let (m_b, i_b) = (b.inv_mass, b.inv_inertia);
        let normal = cc.normal;
        let tangent = cc.tangent();

        for j in 0..cc.point_count {
            let point = cc.world_points[j];
            let cp = &mut cc.points[j];

            let r_a = point - a.c;
            let r_b = point - b.c;
            cp.anchor_a = r_a;
            cp.anchor_b = r_b;
            cp.base_separation = cp.separation - (r_b - r_a).dot(normal);
            cp.max_normal_impulse = 0.0;

            let rn_a = r_a.cross(normal);
            let rn_b = r_b.cross(normal);
            let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
            cp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

            let rt_a = r_a.cross(tangent);
            let rt_b = r_b.cross(tangent);
            let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
            cp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

            let dv = b.point_velocity(r_b) - a.point_velocity(r_a);
            cp.relative_velocity = normal.dot(dv);
        }
    }
}

pub(crate) fn warm_start_contacts(constraints: &[ContactConstraint], bodies: &mut [SolverBody]) {
    for cc in constraints {
        let (m_a, i_a) = (bodies[cc.index_a].inv_mass, bodies[cc.index_a].inv_inertia);
        let (m_b, i_b) = (bodies[cc.index_b].inv_mass, bodies[cc.index_b].inv_inertia);
        let (mut v_a, mut w_a) = (bodies[cc.index_a].v, bodies[cc.index_a].w);
        let (mut v_b, mut w_b) = (bodies[cc.index_b].v, bodies[cc.index_b].w);
        let tangent = cc.tangent();

        for cp in cc.points() {
            let p = cc.normal * cp.normal_impulse + tangent * cp.tangent_impulse;
            w_a -= i_a * cp.anchor_a.cross(p);
            v_a = v_a.mul_sub(m_a, p);
            w_b += i_b * cp.anchor_b.cross(p);
            v_b = v_b.mul_add(m_b, p);
        }

        store_velocity(bodies, cc.index_a, v_a, w_a);
        store_velocity(bodies, cc.index_b, v_b, w_b);
    }
}

pub(crate) fn solve_contact_velocities(constraints: &mut [ContactConstraint], bodies: &mut [SolverBody], ctx: &StepContext) {
    for cc in constraints {
        let (m_a, i_a) = (bodies[cc.index_a].inv_mass, bodies[cc.index_a].inv_inertia);
        let (m_b, i_b) = (bodies[cc.index_b].inv_mass, bodies[cc.index_b].inv_inertia);
        let (mut v_a, mut w_a) = (bodies[cc.index_a].v, bodies[cc.index_a].w);
        let (mut v_b, mut w_b) = (bodies[cc.index_b].v, bodies[cc.index_b].w);
        let normal = cc.normal;
        let tangent = cc.tangent();
        let friction = cc.friction;
        let count = cc.point_count;

        // Friction first so the normal impulse has the last word on penetration
        for cp in &mut cc.points[..count] {
            let dv = v_b + Vec2::scalar_cross(w_b, cp.anchor_b) - v_a - Vec2::scalar_cross(w_a, cp.anchor_a);
            let vt = dv.dot(tangent);
            let max_friction = friction * cp.normal_impulse;

            let lambda = -cp.tangent_mass * vt;
            let new_impulse = (cp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
            let lambda = new_impulse - cp.tangent_impulse;
            cp.tangent_impulse = new_impulse;

            let p = tangent * lambda;
            v_a = v_a.mul_sub(m_a, p);
            w_a -= i_a * cp.anchor_a.cross(p);
            v_b = v_b.mul_add(m_b, p);
            w_b += i_b * cp.anchor_b.cross(p);
        }

        for cp in &mut cc.points[..count] {
            let dv = v_b + Vec2::scalar_cross(w_b, cp.anchor_b) - v_a - Vec2::scalar_cross(w_a, cp.anchor_a);
            let vn = dv.dot(normal);

            // Speculative points may close their gap this step but no further
            let bias = if cp.separation > 0.0 { cp.separation * ctx.inv_dt } else { 0.0 };

            let impulse = -cp.normal_mass * (vn + bias);
            let new_impulse = (cp.normal_impulse + impulse).max(0.0);
            let impulse = new_impulse - cp.normal_impulse;
            cp.normal_impulse = new_impulse;
            cp.max_normal_impulse = cp.max_normal_impulse.max(impulse);

            let p = normal * impulse;
            v_a = v_a.mul_sub(m_a, p);
            w_a -= i_a * cp.anchor_a.cross(p);
            v_b = v_b.mul_add(m_b, p);
            w_b += i_b * cp.anchor_b.cross(p);
        }

        store_velocity(bodies, cc.index_a, v_a, w_a);
        store_velocity(bodies, cc.index_b, v_b, w_b);
    }
}

/// Bounce only where the pre-solve approach speed beats the threshold and the
/// point actually pushed during the velocity passes
pub(crate) fn apply_restitution(constraints: &mut [ContactConstraint], bodies: &mut [SolverBody], ctx: &StepContext) {
    let threshold = ctx.restitution_threshold;

    for cc in constraints {
        if cc.restitution == 0.0 {
            continue;
        }

        let (m_a, i_a) = (bodies[cc.index_a].inv_mass, bodies[cc.index_a].inv_inertia);
        let (m_b, i_b) = (bodies[cc.index_b].inv_mass, bodies[cc.index_b].inv_inertia);
        let (mut v_a, mut w_a) = (bodies[cc.index_a].v, bodies[cc.index_a].w);
        let (mut v_b, mut w_b) = (bodies[cc.index_b].v, bodies[cc.index_b].w);
        let normal = cc.normal;
        let restitution = cc.restitution;
        let count = cc.point_count;

        for cp in &mut cc.points[..count] {
            if cp.relative_velocity > -threshold || cp.max_normal_impulse == 0.0 {
                continue;
            }

            let dv = v_b + Vec2::scalar_cross(w_b, cp.anchor_b) - v_a - Vec2::scalar_cross(w_a, cp.anchor_a);
            let vn = dv.dot(normal);

            let impulse = -cp.normal_mass * (vn + restitution * cp.relative_velocity);
            let new_impulse = (cp.normal_impulse + impulse).max(0.0);
            let impulse = new_impulse - cp.normal_impulse;
            cp.normal_impulse = new_impulse;
            cp.max_normal_impulse = cp.max_normal_impulse.max(impulse);

            let p = normal * impulse;
            v_a = v_a.mul_sub(m_a, p);
            w_a -= i_a * cp.anchor_a.cross(p);
            v_b = v_b.mul_add(m_b, p);
            w_b += i_b * cp.anchor_b.cross(p);
        }

        store_velocity(bodies, cc.index_a, v_a, w_a);
        store_velocity(bodies, cc.index_b, v_b, w_b);
    }
}

/// One nonlinear Gauss-Seidel pass over the contact points. Moves positions
/// only. Returns true once the worst overlap is within tolerance.
pub(crate) fn solve_contact_positions(constraints: &[ContactConstraint], bodies: &mut [SolverBody]) -> bool {
    let mut min_separation = 0.0f32;

    for cc in constraints {
        let a = bodies[cc.index_a];
        let b = bodies[cc.index_b];
        let (m_a, i_a) = (a.inv_mass, a.inv_inertia);
        let (m_b, i_b) = (b.inv_mass, b.inv_inertia);
        let (mut c_a, mut q_a) = (a.c, a.q);
        let (mut c_b, mut q_b) = (b.c, b.q);
        let normal = cc.normal;

        for cp in cc.points() {
            // Anchors follow each body's rotation since the step started
            let pr_a = a.q0.inv_mul(q_a).rotate(cp.anchor_a);
            let pr_b = b.q0.inv_mul(q_b).rotate(cp.anchor_b);
            let d = (c_b - b.c0) - (c_a - a.c0) + (pr_b - pr_a);
            let separation = d.dot(normal) + cp.base_separation;
            min_separation = min_separation.min(separation);

            let correction = (BAUMGARTE * (separation + LINEAR_SLOP)).clamp(-MAX_LINEAR_CORRECTION, 0.0);

            let rn_a = pr_a.cross(normal);
            let rn_b = pr_b.cross(normal);
            let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
            let impulse = if k > 0.0 { -correction / k } else { 0.0 };
            let p = normal * impulse;

            c_a = c_a.mul_sub(m_a, p);
            q_a = q_a.integrate(-i_a * pr_a.cross(p));
            c_b = c_b.mul_add(m_b, p);
            q_b = q_b.integrate(i_b * pr_b.cross(p));
        }

        if a.is_dynamic() {
            bodies[cc.index_a].c = c_a;
            bodies[cc.index_a].q = q_a;
        }
        if b.is_dynamic() {
            bodies[cc.index_b].c = c_b;
            bodies[cc.index_b].q = q_b;
        }
    }

    min_separation >= -3.0 * LINEAR_SLOP
}

/// Gravity, applied forces and exponential damping. Only dynamic bodies change.
pub(crate) fn integrate_velocities(bodies: &mut [SolverBody], ctx: &StepContext) {
    let h = ctx.dt;
    for sb in bodies.iter_mut().filter(|sb| sb.is_dynamic()) {
        let linear = (ctx.gravity * (sb.mass * sb.gravity_scale) + sb.force) * sb.inv_mass;
        let angular = sb.inv_inertia * sb.torque;

        sb.v = sb.v.mul_add(h, linear) * (-h * sb.linear_damping).exp();
        sb.w = (sb.w + h * angular) * (-h * sb.angular_damping).exp();
    }
}

/// Semi-implicit Euler on the solved velocities, with per-step motion caps
pub(crate) fn integrate_positions(bodies: &mut [SolverBody], ctx: &StepContext) {
    let h = ctx.dt;
    for sb in bodies.iter_mut().filter(|sb| sb.is_dynamic()) {
        let translation = sb.v * h;
        let length_sq = translation.length_squared();
        if length_sq > MAX_TRANSLATION * MAX_TRANSLATION {
            sb.v *= MAX_TRANSLATION / length_sq.sqrt();
        }

        let rotation = h * sb.w;
        if rotation * rotation > MAX_ROTATION * MAX_ROTATION {
            sb.w *= MAX_ROTATION / rotation.abs();
        }

        sb.c = sb.c.mul_add(h, sb.v);
        sb.q = sb.q.integrate(h * sb.w);
    }
}

/// Advance sleep timers and return the island's smallest one. A moving
/// kinematic body keeps the island awake.
pub(crate) fn update_sleep_timers(bodies: &mut [SolverBody], ctx: &StepContext) -> f32 {
    let lin_tol_sq = ctx.sleep_linear_threshold * ctx.sleep_linear_threshold;
    let ang_tol_sq = ctx.sleep_angular_threshold * ctx.sleep_angular_threshold;
    let mut min_sleep_time = f32::MAX;

    for sb in bodies.iter_mut() {
        match sb.body_type {
            BodyType::Static => {}
            BodyType::Kinematic => {
                if sb.v != Vec2::ZERO || sb.w != 0.0 {
                    min_sleep_time = 0.0;
                }
            }
            BodyType::Dynamic => {
                if !sb.enable_sleep || sb.w * sb.w > ang_tol_sq || sb.v.length_squared() > lin_tol_sq {
                    sb.sleep_time = 0.0;
                } else {
                    sb.sleep_time += ctx.dt;
                }
                min_sleep_time = min_sleep_time.min(sb.sleep_time);
            }
        }
    }
    min_sleep_time
}

#[inline]
pub(crate) fn store_velocity(bodies: &mut [SolverBody], index: usize, v: Vec2, w: f32) {
    let sb = &mut bodies[index];
    if sb.is_dynamic() {
        sb.v = v;
        sb.w = w;
    }
}
