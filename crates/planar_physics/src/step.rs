//! The step pipeline
//!
//! ```text
//! update_pairs   moved proxies -> new contacts          (parallel query, serial create)
//! collide        contact slots -> manifolds + bits      (parallel, per-worker bitsets)
//! contact states begin/end events, disjoint removal     (driving thread)
//! solve          islands -> scratch -> solve_island     (parallel, one island per item)
//! finalize       kinematic motion, shape bounds, tree   (parallel bounds, serial tree)
//! sleep          islands past the sleep timer
//! ```
//!
//! Every parallel phase writes only through `TaskSlots` or a worker context and
//! is finished before the next phase starts, so the driving thread sees a
//! settled world between phases.

use std::collections::{HashMap, HashSet};

use planar_math::Vec2;
use planar_memory::ScratchError;
use planar_structures::{Arena, TaskSlots};

use crate::body::{Body, BodyType};
use crate::broad_phase::BroadPhase;
use crate::contact::{pair_key, Contact, ContactKey};
use crate::error::{EntityKind, PhysicsError, Result};
use crate::events::{CollisionEventType, PreSolve};
use crate::island::Island;
use crate::joint::{Joint, JointConstraint};
use crate::profile::Timer;
use crate::shape::{Shape, ShapeHandle, ShapeKey};
use crate::solver::{solve_island, ContactConstraint, IslandWork, SolverBody, StepContext};
use crate::task::WorkerContext;
use crate::world::PhysicsWorld;

/// Smallest range handed to one task, per phase
const PAIR_MIN_RANGE: usize = 64;
const COLLIDE_MIN_RANGE: usize = 64;
const ISLAND_MIN_RANGE: usize = 1;
const FINALIZE_MIN_RANGE: usize = 64;

impl PhysicsWorld {
    pub(crate) fn step_internal(&mut self, dt: f32) -> Result<()> {
        let step_timer = Timer::start();
        let mut timer = Timer::start();
        self.events.clear();

        self.update_pairs()?;
        self.profile.pairs = timer.lap_ms();

        let began = self.collide();
        self.profile.collide = timer.lap_ms();

        let ctx = StepContext {
            dt,
            inv_dt: 1.0 / dt,
            gravity: self.config.gravity,
            velocity_iterations: self.config.velocity_iterations,
            position_iterations: self.config.position_iterations,
            restitution_threshold: self.config.restitution_threshold,
            warm_starting: self.config.warm_starting,
            sleep_linear_threshold: self.config.sleep_linear_threshold,
            sleep_angular_threshold: self.config.sleep_angular_threshold,
        };
        let sleepy = self.solve(&ctx)?;
        self.profile.solve = timer.lap_ms();

        // Begin events carry the impulses of the step that created them
        for key in began {
            if let Some(contact) = self.contacts.get(key) {
                let event = self.make_event(contact, CollisionEventType::Started);
                self.events.push(event);
            }
        }

        self.finalize(dt);
        self.sleep_islands(&sleepy);
        self.profile.finalize = timer.lap_ms();

        self.tasks.finish_all();
        self.step_count += 1;
        self.profile.step = step_timer.elapsed_ms();

        log::trace!(
            "Step {}: {} contacts, {} islands ({} asleep), {} events, {:.3} ms",
            self.step_count,
            self.contacts.len(),
            self.islands.island_count(),
            sleepy.len(),
            self.events.len(),
            self.profile.step
        );
        Ok(())
    }

    /// Query moved proxies for new pairs and create their contacts.
    ///
    /// New pairs are counted before any contact is created, so running out of
    /// contact capacity leaves the world as it was.
    fn update_pairs(&mut self) -> Result<()> {
        let move_count = self.broad_phase.move_count();
        if move_count == 0 {
            return Ok(());
        }

        let mut found: Vec<Vec<(ShapeKey, ShapeKey)>> = vec![Vec::new(); move_count];
        {
            let slots = TaskSlots::new(&mut found);
            let filter = PairFilter {
                shapes: &self.shapes,
                bodies: &self.bodies,
                joints: &self.joints,
                pairs: &self.pairs,
            };
            let broad_phase = &self.broad_phase;
            let task = |start: usize, end: usize, _thread: usize| {
                for (move_index, out) in slots.claim_range(start..end) {
                    broad_phase.query_move(move_index, |a, b| {
                        if filter.should_create(a, b) {
                            out.push((a, b));
                        }
                    });
                }
            };
            self.tasks.parallel_for(move_count, PAIR_MIN_RANGE, &task);
        }

        // Merge in move-buffer order so contact slots do not depend on scheduling
        let mut seen = HashSet::new();
        let new_pairs: Vec<(ShapeKey, ShapeKey)> = found
            .into_iter()
            .flatten()
            .filter(|&(a, b)| seen.insert(pair_key(a, b)))
            .collect();

        if new_pairs.len() > self.contacts.remaining() {
            log::warn!(
                "{} new contacts do not fit: {} of {} in use",
                new_pairs.len(),
                self.contacts.len(),
                self.contacts.capacity()
            );
            return Err(PhysicsError::CapacityExceeded {
                kind: EntityKind::Contact,
                capacity: self.contacts.capacity(),
            });
        }

        for (a, b) in new_pairs {
            self.create_contact(a, b)?;
        }
        self.broad_phase.clear_moves();
        Ok(())
    }

    /// Update every contact's manifold, then apply the state changes in slot
    /// order. Returns the contacts that began touching.
    fn collide(&mut self) -> Vec<ContactKey> {
        let slot_count = self.contacts.slot_count();
        if slot_count == 0 {
            return Vec::new();
        }
        self.tasks.reset_contexts(slot_count);

        {
            let shapes = &self.shapes;
            let bodies = &self.bodies;
            let broad_phase = &self.broad_phase;
            let pre_solve = self.pre_solve.as_deref();
            let tasks = &self.tasks;
            let slots = TaskSlots::new(self.contacts.slots_mut());

            let task = |start: usize, end: usize, thread: usize| {
                let mut worker = tasks.context(thread);
                for (index, slot) in slots.claim_range(start..end) {
                    if let Some(contact) = slot.value_mut() {
                        update_contact(contact, index, shapes, bodies, broad_phase, pre_solve, &mut worker);
                    }
                }
            };
            tasks.parallel_for(slot_count, COLLIDE_MIN_RANGE, &task);
        }

        let (changed, disjoint) = self.tasks.merge_contexts(slot_count);

        for index in disjoint.iter_ones() {
            if let Some(key) = self.contacts.key_at(index) {
                self.destroy_contact(key, true);
            }
        }

        let mut began = Vec::new();
        for index in changed.iter_ones() {
            let Some(key) = self.contacts.key_at(index) else { continue };
            let Some(contact) = self.contacts.get(key) else { continue };
            if contact.touching {
                let (body_a, body_b) = (contact.body_a, contact.body_b);
                began.push(key);
                for body_key in [body_a, body_b] {
                    if let Some(body) = self.bodies.get_mut(body_key) {
                        body.wake();
                    }
                }
            } else {
                let event = self.make_event(contact, CollisionEventType::Stopped);
                self.events.push(event);
            }
        }
        began
    }

    /// Build islands, solve them in parallel and write the results back.
    /// Returns the islands that may go to sleep.
    fn solve(&mut self, ctx: &StepContext) -> Result<Vec<usize>> {
        let mut timer = Timer::start();
        self.islands.build(&mut self.bodies, &self.contacts, &self.joints);
        self.profile.build_islands = timer.lap_ms();

        let graph = &self.islands;
        let island_count = graph.island_count();
        if island_count == 0 {
            self.profile.solve_islands = 0.0;
            return Ok(Vec::new());
        }

        let scope = self.scratch.scope();
        let solver_bodies = scope
            .alloc_slice(graph.bodies.len(), SolverBody::default())
            .map_err(scratch_error)?;
        let constraints = scope
            .alloc_slice(graph.contacts.len(), ContactConstraint::default())
            .map_err(scratch_error)?;
        let joint_constraints = scope
            .alloc_slice(graph.joints.len(), JointConstraint::default())
            .map_err(scratch_error)?;

        for (sb, &key) in solver_bodies.iter_mut().zip(&graph.bodies) {
            if let Some(body) = self.bodies.get(key) {
                *sb = SolverBody::from_body(key, body);
            }
        }
        for (cc, edge) in constraints.iter_mut().zip(&graph.contacts) {
            if let Some(contact) = self.contacts.get(edge.key) {
                *cc = ContactConstraint::new(
                    edge.key,
                    edge.index_a,
                    edge.index_b,
                    &contact.manifold,
                    contact.friction,
                    contact.restitution,
                    ctx.warm_starting,
                );
            }
        }
        for (jc, edge) in joint_constraints.iter_mut().zip(&graph.joints) {
            if let Some(joint) = self.joints.get(edge.key) {
                *jc = JointConstraint::new(edge.key, joint, edge.index_a, edge.index_b, ctx.warm_starting);
            }
        }

        let mut work = split_islands(&graph.islands, solver_bodies, constraints, joint_constraints);
        {
            let slots = TaskSlots::new(&mut work);
            let task = |start: usize, end: usize, _thread: usize| {
                for (_, island) in slots.claim_range(start..end) {
                    solve_island(island, ctx);
                }
            };
            self.tasks.parallel_for(island_count, ISLAND_MIN_RANGE, &task);
        }
        self.profile.solve_islands = timer.lap_ms();

        let mut sleepy = Vec::new();
        for (island_index, island) in work.iter().enumerate() {
            for sb in island.bodies.iter().filter(|sb| sb.body_type == BodyType::Dynamic) {
                if let Some(body) = self.bodies.get_mut(sb.body) {
                    body.set_center(sb.c, sb.q.normalize());
                    body.linear_velocity = sb.v;
                    body.angular_velocity = sb.w;
                    body.sleep_time = sb.sleep_time;
                    body.force = Vec2::ZERO;
                    body.torque = 0.0;
                }
            }

            for cc in island.contacts.iter() {
                let Some(contact) = self.contacts.get_mut(cc.contact) else { continue };
                for (mp, cp) in contact.manifold.points_mut().iter_mut().zip(cc.points()) {
                    mp.normal_impulse = cp.normal_impulse;
                    mp.tangent_impulse = cp.tangent_impulse;
                    mp.max_normal_impulse = cp.max_normal_impulse;
                }
            }

            for jc in island.joints.iter() {
                if let Some(joint) = self.joints.get_mut(jc.joint) {
                    joint.store_impulses(jc);
                }
            }

            if self.config.sleeping_enabled && island.min_sleep_time >= self.config.time_to_sleep {
                sleepy.push(island_index);
            }
        }

        Ok(sleepy)
    }

    /// Move kinematic bodies, refresh shape bounds and sync the broad phase.
    /// A kinematic body that stays still for `time_to_sleep` goes to sleep.
    fn finalize(&mut self, dt: f32) {
        let sleeping_enabled = self.config.sleeping_enabled;
        let time_to_sleep = self.config.time_to_sleep;
        for body in self.bodies.values_mut() {
            if body.body_type != BodyType::Kinematic || !body.enabled {
                continue;
            }
            if body.linear_velocity == Vec2::ZERO && body.angular_velocity == 0.0 {
                if body.awake {
                    body.sleep_time += dt;
                    if sleeping_enabled && body.enable_sleep && body.sleep_time >= time_to_sleep {
                        body.sleep();
                    }
                }
                continue;
            }
            body.wake();
            let center = body.center.mul_add(dt, body.linear_velocity);
            let rotation = body.transform.q.integrate(dt * body.angular_velocity);
            body.set_center(center, rotation);
        }

        let slot_count = self.shapes.slot_count();
        if slot_count == 0 {
            return;
        }

        let mut enlarged = vec![false; slot_count];
        {
            let bodies = &self.bodies;
            let shapes = TaskSlots::new(self.shapes.slots_mut());
            let flags = TaskSlots::new(&mut enlarged);
            let task = |start: usize, end: usize, _thread: usize| {
                for ((_, slot), (_, flag)) in shapes.claim_range(start..end).zip(flags.claim_range(start..end)) {
                    let Some(shape) = slot.value_mut() else { continue };
                    if shape.proxy.is_none() {
                        continue;
                    }
                    let Some(body) = bodies.get(shape.body) else { continue };
                    if !body.is_active() {
                        continue;
                    }
                    shape.aabb = shape.compute_aabb(&body.transform);
                    *flag = !shape.fat_aabb.contains_aabb(&shape.aabb);
                }
            };
            self.tasks.parallel_for(slot_count, FINALIZE_MIN_RANGE, &task);
        }

        for index in (0..slot_count).filter(|&i| enlarged[i]) {
            let Some(key) = self.shapes.key_at(index) else { continue };
            let Some(shape) = self.shapes.get_mut(key) else { continue };
            let Some(proxy) = shape.proxy else { continue };
            if self.broad_phase.move_proxy(proxy, shape.aabb) {
                shape.fat_aabb = self.broad_phase.fat_aabb(proxy).unwrap_or(shape.aabb);
            }
        }
    }

    fn sleep_islands(&mut self, sleepy: &[usize]) {
        for &island_index in sleepy {
            let Some(island) = self.islands.islands.get(island_index) else { continue };
            for &key in &self.islands.bodies[island.body_start..island.body_end] {
                if let Some(body) = self.bodies.get_mut(key) {
                    if body.is_dynamic() {
                        body.sleep();
                    }
                }
            }
        }
    }
}

/// Read-only view used to decide whether a candidate pair gets a contact
struct PairFilter<'a> {
    shapes: &'a Arena<Shape>,
    bodies: &'a Arena<Body>,
    joints: &'a Arena<Joint>,
    pairs: &'a HashMap<u64, ContactKey>,
}

impl PairFilter<'_> {
    fn should_create(&self, key_a: ShapeKey, key_b: ShapeKey) -> bool {
        let (Some(shape_a), Some(shape_b)) = (self.shapes.get(key_a), self.shapes.get(key_b)) else {
            return false;
        };
        if shape_a.body == shape_b.body || !shape_a.filter.should_collide(&shape_b.filter) {
            return false;
        }
        if self.pairs.contains_key(&pair_key(key_a, key_b)) {
            return false;
        }

        let (Some(body_a), Some(body_b)) = (self.bodies.get(shape_a.body), self.bodies.get(shape_b.body)) else {
            return false;
        };
        if !body_a.is_dynamic() && !body_b.is_dynamic() {
            return false;
        }

        // Joints may keep their bodies from colliding
        let fewer = if body_a.joints.len() <= body_b.joints.len() { body_a } else { body_b };
        !fewer.joints.iter().any(|&jk| {
            self.joints
                .get(jk)
                .is_some_and(|joint| !joint.collide_connected && joint.connects(shape_a.body, shape_b.body))
        })
    }
}

fn update_contact(
    contact: &mut Contact,
    index: usize,
    shapes: &Arena<Shape>,
    bodies: &Arena<Body>,
    broad_phase: &BroadPhase,
    pre_solve: Option<&dyn PreSolve>,
    worker: &mut WorkerContext,
) {
    let (Some(shape_a), Some(shape_b)) = (shapes.get(contact.shape_a), shapes.get(contact.shape_b)) else {
        worker.contact_disjoint.set(index);
        return;
    };
    let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
        worker.contact_disjoint.set(index);
        return;
    };

    if contact.refilter {
        contact.refilter = false;
        if !shape_a.filter.should_collide(&shape_b.filter) {
            worker.contact_disjoint.set(index);
            return;
        }
    }

    // Contacts of sleeping bodies keep their manifold until something wakes them
    if !body_a.is_active() && !body_b.is_active() {
        return;
    }

    let overlap = match (shape_a.proxy, shape_b.proxy) {
        (Some(a), Some(b)) => broad_phase.test_overlap(a, b),
        _ => false,
    };
    if !overlap {
        worker.contact_disjoint.set(index);
        return;
    }

    let was_touching = contact.touching;
    let touching = contact.update(shape_a, &body_a.transform, shape_b, &body_b.transform);

    contact.enabled = true;
    if touching && !contact.sensor {
        if let Some(hook) = pre_solve {
            contact.enabled = hook.pre_solve(
                ShapeHandle(contact.shape_a),
                ShapeHandle(contact.shape_b),
                &contact.manifold,
            );
        }
    }

    if touching != was_touching {
        worker.contact_state.set(index);
    }
}

fn scratch_error(err: ScratchError) -> PhysicsError {
    log::warn!("Scratch budget too small for this scene: {err}");
    PhysicsError::from(err)
}

/// Cut the step arrays into one disjoint piece per island
fn split_islands<'a>(
    islands: &[Island],
    mut bodies: &'a mut [SolverBody],
    mut contacts: &'a mut [ContactConstraint],
    mut joints: &'a mut [JointConstraint],
) -> Vec<IslandWork<'a>> {
    let mut work = Vec::with_capacity(islands.len());
    for island in islands {
        let (island_bodies, rest) = std::mem::take(&mut bodies).split_at_mut(island.body_count());
        bodies = rest;
        let (island_contacts, rest) = std::mem::take(&mut contacts).split_at_mut(island.contact_count());
        contacts = rest;
        let (island_joints, rest) = std::mem::take(&mut joints).split_at_mut(island.joint_count());
        joints = rest;

        work.push(IslandWork {
            bodies: island_bodies,
            contacts: island_contacts,
            joints: island_joints,
            min_sleep_time: f32::MAX,
        });
    }
    work
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyKey;

    #[test]
    fn test_split_islands_is_contiguous() {
        let islands = [
            Island { body_start: 0, body_end: 2, contact_start: 0, contact_end: 1, joint_start: 0, joint_end: 0 },
            Island { body_start: 2, body_end: 5, contact_start: 1, contact_end: 3, joint_start: 0, joint_end: 1 },
        ];
        let mut bodies = [SolverBody::default(); 5];
        for (i, sb) in bodies.iter_mut().enumerate() {
            sb.body = BodyKey::new(i as u32, 0);
        }
        let mut contacts = [ContactConstraint::default(); 3];
        let mut joints = [JointConstraint::default(); 1];

        let work = split_islands(&islands, &mut bodies, &mut contacts, &mut joints);
        assert_eq!(work.len(), 2);
        assert_eq!(work[0].bodies.len(), 2);
        assert_eq!(work[0].contacts.len(), 1);
        assert!(work[0].joints.is_empty());
        assert_eq!(work[1].bodies[0].body, BodyKey::new(2, 0));
        assert_eq!(work[1].contacts.len(), 2);
        assert_eq!(work[1].joints.len(), 1);
    }
}
