//! Island building
//!
//! Islands are recomputed every step by a depth-first search from each awake
//! dynamic body across touching contacts and joints. Static and kinematic bodies
//! stop the search, so a large static floor never merges unrelated piles; each
//! island that touches one gets its own read-only copy of it.
//!
//! A moving kinematic body never seeds an island, but it wakes every dynamic
//! body it touches or is jointed to before the search starts.

use planar_math::Vec2;
use planar_structures::{Arena, BitSet};

use crate::body::{Body, BodyKey, BodyType};
use crate::contact::{Contact, ContactKey};
use crate::joint::{Joint, JointKey};

/// Constraint edge with both endpoints resolved to island-local body indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IslandEdge<K> {
    pub key: K,
    pub index_a: usize,
    pub index_b: usize,
}

/// Ranges of one island inside the flat body, contact and joint lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Island {
    pub body_start: usize,
    pub body_end: usize,
    pub contact_start: usize,
    pub contact_end: usize,
    pub joint_start: usize,
    pub joint_end: usize,
}

impl Island {
    pub fn body_count(&self) -> usize {
        self.body_end - self.body_start
    }

    pub fn contact_count(&self) -> usize {
        self.contact_end - self.contact_start
    }

    pub fn joint_count(&self) -> usize {
        self.joint_end - self.joint_start
    }
}

/// Reusable island graph for the current step
#[derive(Debug, Default)]
pub(crate) struct IslandGraph {
    pub islands: Vec<Island>,
    pub bodies: Vec<BodyKey>,
    pub contacts: Vec<IslandEdge<ContactKey>>,
    pub joints: Vec<IslandEdge<JointKey>>,
    body_visited: BitSet,
    contact_visited: BitSet,
    joint_visited: BitSet,
    stack: Vec<BodyKey>,
    /// Per body slot: (island id, local index) of its latest copy
    local: Vec<(u32, u32)>,
}

impl IslandGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    /// Total number of solver bodies across islands, counting static copies
    pub fn solver_body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Rebuild islands from the awake bodies. Sleeping bodies reached through a
    /// touching contact or a joint are woken; awake ones keep their sleep timers.
    pub fn build(&mut self, bodies: &mut Arena<Body>, contacts: &Arena<Contact>, joints: &Arena<Joint>) {
        self.islands.clear();
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
        self.stack.clear();
        self.body_visited.reset(bodies.slot_count());
        self.contact_visited.reset(contacts.slot_count());
        self.joint_visited.reset(joints.slot_count());
        self.local.clear();
        self.local.resize(bodies.slot_count(), (u32::MAX, 0));

        self.wake_kinematic_partners(bodies, contacts, joints);

        for seed_index in 0..bodies.slot_count() {
            let Some(seed) = bodies.key_at(seed_index) else { continue };
            let Some(body) = bodies.get(seed) else { continue };
            if !body.awake || !body.enabled || !body.is_dynamic() || self.body_visited.get(seed_index) {
                continue;
            }

            let island_id = self.islands.len() as u32;
            let mut island = Island {
                body_start: self.bodies.len(),
                contact_start: self.contacts.len(),
                joint_start: self.joints.len(),
                ..Default::default()
            };

            self.body_visited.set(seed_index);
            self.add_body(seed, island_id, island.body_start);
            self.stack.push(seed);

            while let Some(key) = self.stack.pop() {
                if let Some(body) = bodies.get_mut(key) {
                    if !body.awake {
                        body.wake();
                    }
                }
                let Some(body) = bodies.get(key) else { continue };

                for &contact_key in &body.contacts {
                    let slot = contact_key.index() as usize;
                    if self.contact_visited.get(slot) {
                        continue;
                    }
                    let Some(contact) = contacts.get(contact_key) else { continue };
                    if !contact.touching || !contact.enabled || contact.sensor {
                        continue;
                    }
                    let other = contact.other_body(key);
                    let Some(other_body) = bodies.get(other) else { continue };
                    if !other_body.enabled {
                        continue;
                    }

                    self.contact_visited.set(slot);
                    self.reach(other, other_body.is_dynamic(), island_id, island.body_start);
                    self.contacts.push(IslandEdge {
                        key: contact_key,
                        index_a: self.local_index(contact.body_a),
                        index_b: self.local_index(contact.body_b),
                    });
                }

                for &joint_key in &body.joints {
                    let slot = joint_key.index() as usize;
                    if self.joint_visited.get(slot) {
                        continue;
                    }
                    let Some(joint) = joints.get(joint_key) else { continue };
                    let other = joint.other_body(key);
                    let Some(other_body) = bodies.get(other) else { continue };
                    if !other_body.enabled {
                        continue;
                    }

                    self.joint_visited.set(slot);
                    self.reach(other, other_body.is_dynamic(), island_id, island.body_start);
                    self.joints.push(IslandEdge {
                        key: joint_key,
                        index_a: self.local_index(joint.body_a),
                        index_b: self.local_index(joint.body_b),
                    });
                }
            }

            island.body_end = self.bodies.len();
            island.contact_end = self.contacts.len();
            island.joint_end = self.joints.len();
            self.islands.push(island);
        }
    }

    /// Wake the sleeping dynamic partners of every moving kinematic body
    fn wake_kinematic_partners(
        &mut self,
        bodies: &mut Arena<Body>,
        contacts: &Arena<Contact>,
        joints: &Arena<Joint>,
    ) {
        for (key, body) in bodies.iter() {
            let moving = body.linear_velocity != Vec2::ZERO || body.angular_velocity != 0.0;
            if body.body_type != BodyType::Kinematic || !body.is_active() || !moving {
                continue;
            }
            for &contact_key in &body.contacts {
                let Some(contact) = contacts.get(contact_key) else { continue };
                if contact.touching && contact.enabled && !contact.sensor {
                    self.stack.push(contact.other_body(key));
                }
            }
            for &joint_key in &body.joints {
                if let Some(joint) = joints.get(joint_key) {
                    self.stack.push(joint.other_body(key));
                }
            }
        }

        while let Some(key) = self.stack.pop() {
            if let Some(partner) = bodies.get_mut(key) {
                if partner.is_dynamic() && partner.enabled && !partner.awake {
                    partner.wake();
                }
            }
        }
    }

    /// Make `other` part of the current island. Dynamic bodies join the search;
    /// static and kinematic bodies get one copy per island and stop there.
    fn reach(&mut self, other: BodyKey, dynamic: bool, island_id: u32, body_start: usize) {
        let slot = other.index() as usize;
        if dynamic {
            if !self.body_visited.get(slot) {
                self.body_visited.set(slot);
                self.add_body(other, island_id, body_start);
                self.stack.push(other);
            }
        } else if self.local[slot].0 != island_id {
            self.add_body(other, island_id, body_start);
        }
    }

    fn add_body(&mut self, key: BodyKey, island_id: u32, body_start: usize) {
        let local = (self.bodies.len() - body_start) as u32;
        self.local[key.index() as usize] = (island_id, local);
        self.bodies.push(key);
    }

    fn local_index(&self, key: BodyKey) -> usize {
        self.local[key.index() as usize].1 as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::contact::Contact;
    use crate::geometry::Circle;
    use crate::joint::{DistanceJointDef, JointDef};
    use crate::shape::{Shape, ShapeDef};
    use crate::body::BodyHandle;
    use planar_math::Vec2;

    struct Scene {
        bodies: Arena<Body>,
        shapes: Arena<Shape>,
        contacts: Arena<Contact>,
        joints: Arena<Joint>,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: Arena::with_capacity(16),
                shapes: Arena::with_capacity(16),
                contacts: Arena::with_capacity(16),
                joints: Arena::with_capacity(16),
            }
        }

        fn body(&mut self, def: BodyDef) -> BodyKey {
            let key = self.bodies.insert(Body::new(&def)).unwrap();
            let shape = self
                .shapes
                .insert(Shape::new(key, Circle::new(Vec2::ZERO, 0.5).into(), &ShapeDef::default()))
                .unwrap();
            self.bodies[key].shapes.push(shape);
            key
        }

        fn touch(&mut self, a: BodyKey, b: BodyKey) -> ContactKey {
            let sa = self.bodies[a].shapes[0];
            let sb = self.bodies[b].shapes[0];
            let mut contact = Contact::new(sa, &self.shapes[sa], sb, &self.shapes[sb]);
            contact.touching = true;
            let key = self.contacts.insert(contact).unwrap();
            self.bodies[a].contacts.push(key);
            self.bodies[b].contacts.push(key);
            key
        }

        fn join(&mut self, a: BodyKey, b: BodyKey) {
            let def: JointDef = DistanceJointDef::new(BodyHandle(a), BodyHandle(b), 1.0).into();
            let key = self.joints.insert(Joint::new(&def, a, b, Vec2::ZERO)).unwrap();
            self.bodies[a].joints.push(key);
            self.bodies[b].joints.push(key);
        }

        fn build(&mut self) -> IslandGraph {
            let mut graph = IslandGraph::new();
            graph.build(&mut self.bodies, &self.contacts, &self.joints);
            graph
        }
    }

    #[test]
    fn test_static_ground_does_not_merge_islands() {
        let mut scene = Scene::new();
        let ground = scene.body(BodyDef::fixed());
        let a = scene.body(BodyDef::dynamic());
        let b = scene.body(BodyDef::dynamic());
        scene.touch(ground, a);
        scene.touch(ground, b);

        let graph = scene.build();
        assert_eq!(graph.island_count(), 2);
        // Each island carries its own copy of the ground
        assert_eq!(graph.solver_body_count(), 4);
        for island in &graph.islands {
            assert_eq!(island.body_count(), 2);
            assert_eq!(island.contact_count(), 1);
            let edge = graph.contacts[island.contact_start];
            assert_ne!(edge.index_a, edge.index_b);
            assert!(edge.index_a < 2 && edge.index_b < 2);
        }
    }

    #[test]
    fn test_contacts_and_joints_link_bodies() {
        let mut scene = Scene::new();
        let a = scene.body(BodyDef::dynamic());
        let b = scene.body(BodyDef::dynamic());
        let c = scene.body(BodyDef::dynamic());
        let lone = scene.body(BodyDef::dynamic());
        scene.touch(a, b);
        scene.join(b, c);

        let graph = scene.build();
        assert_eq!(graph.island_count(), 2);
        let first = graph.islands[0];
        assert_eq!(first.body_count(), 3);
        assert_eq!(first.contact_count(), 1);
        assert_eq!(first.joint_count(), 1);
        assert_eq!(graph.islands[1].body_count(), 1);
        assert_eq!(graph.bodies[graph.islands[1].body_start], lone);
    }

    #[test]
    fn test_non_touching_and_sensor_contacts_do_not_link() {
        let mut scene = Scene::new();
        let a = scene.body(BodyDef::dynamic());
        let b = scene.body(BodyDef::dynamic());
        let c = scene.body(BodyDef::dynamic());
        let ab = scene.touch(a, b);
        let bc = scene.touch(b, c);
        scene.contacts[ab].touching = false;
        scene.contacts[bc].sensor = true;

        assert_eq!(scene.build().island_count(), 3);
    }

    #[test]
    fn test_sleeping_body_is_woken_by_awake_neighbour() {
        let mut scene = Scene::new();
        let awake = scene.body(BodyDef::dynamic());
        let asleep = scene.body(BodyDef::dynamic().with_awake(false));
        let alone = scene.body(BodyDef::dynamic().with_awake(false));
        scene.touch(awake, asleep);

        let graph = scene.build();
        assert_eq!(graph.island_count(), 1);
        assert!(scene.bodies[asleep].awake);
        assert!(!scene.bodies[alone].awake);
    }

    #[test]
    fn test_build_keeps_sleep_timers_of_awake_bodies() {
        let mut scene = Scene::new();
        let ground = scene.body(BodyDef::fixed());
        let resting = scene.body(BodyDef::dynamic());
        scene.touch(ground, resting);
        scene.bodies[resting].sleep_time = 0.25;

        scene.build();
        assert!(scene.bodies[resting].awake);
        assert_eq!(scene.bodies[resting].sleep_time, 0.25);
    }

    #[test]
    fn test_moving_kinematic_wakes_touching_sleepers() {
        let mut scene = Scene::new();
        let platform = scene.body(BodyDef::kinematic().with_linear_velocity(0.0, 1.0));
        let rider = scene.body(BodyDef::dynamic().with_awake(false));
        let towed = scene.body(BodyDef::dynamic().with_awake(false));
        scene.touch(platform, rider);
        scene.join(platform, towed);

        let graph = scene.build();
        assert!(scene.bodies[rider].awake);
        assert!(scene.bodies[towed].awake);
        // Kinematic bodies still do not link islands
        assert_eq!(graph.island_count(), 2);
    }

    #[test]
    fn test_still_kinematic_leaves_sleepers_alone() {
        let mut scene = Scene::new();
        let platform = scene.body(BodyDef::kinematic());
        let rider = scene.body(BodyDef::dynamic().with_awake(false));
        scene.touch(platform, rider);

        let graph = scene.build();
        assert!(!scene.bodies[rider].awake);
        assert_eq!(graph.island_count(), 0);
    }
}
