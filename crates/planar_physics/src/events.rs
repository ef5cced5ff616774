//! Physics events (contact begin/end, sensors) and the pre-solve hook

use planar_math::Vec2;

use crate::body::BodyHandle;
use crate::manifold::Manifold;
use crate::shape::ShapeHandle;

/// Contact data from a collision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactData {
    /// Contact point in world space
    pub point: Vec2,
    /// Contact normal (pointing from shape1 to shape2)
    pub normal: Vec2,
    /// Penetration depth, zero for speculative points
    pub depth: f32,
    /// Normal impulse applied at this point during the step
    pub impulse: f32,
}

/// Type of collision event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionEventType {
    /// Shapes started touching
    Started,
    /// Shapes stopped touching
    Stopped,
}

/// A begin or end touch between two shapes
#[derive(Debug, Clone)]
pub struct CollisionEvent {
    pub shape1: ShapeHandle,
    pub shape2: ShapeHandle,
    pub body1: BodyHandle,
    pub body2: BodyHandle,
    pub event_type: CollisionEventType,
    /// Whether either shape is a sensor
    pub is_sensor: bool,
    /// Contact points (empty for sensor events and stopped events)
    pub contacts: Vec<ContactData>,
    pub user_data1: u128,
    pub user_data2: u128,
}

impl CollisionEvent {
    pub fn is_started(&self) -> bool {
        self.event_type == CollisionEventType::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.event_type == CollisionEventType::Stopped
    }

    /// Whether the event involves this shape
    pub fn involves(&self, shape: ShapeHandle) -> bool {
        self.shape1 == shape || self.shape2 == shape
    }

    /// Get the average contact point
    pub fn average_contact_point(&self) -> Option<Vec2> {
        if self.contacts.is_empty() {
            return None;
        }
        let sum = self.contacts.iter().fold(Vec2::ZERO, |acc, c| acc + c.point);
        Some(sum / self.contacts.len() as f32)
    }

    /// Get the average contact normal
    pub fn average_normal(&self) -> Option<Vec2> {
        let sum = self.contacts.iter().fold(Vec2::ZERO, |acc, c| acc + c.normal);
        let (len, normal) = sum.length_and_normalize();
        if len > 0.0001 {
            Some(normal)
        } else {
            None
        }
    }

    /// Total normal impulse over all points
    pub fn total_impulse(&self) -> f32 {
        self.contacts.iter().map(|c| c.impulse).sum()
    }
}

/// Called for every touching, non-sensor contact before it is solved.
///
/// Return false to disable the contact for the current step. May run on worker
/// threads, so implementations only get shared access.
pub trait PreSolve: Send + Sync {
    fn pre_solve(&self, shape1: ShapeHandle, shape2: ShapeHandle, manifold: &Manifold) -> bool;
}

impl<F> PreSolve for F
where
    F: Fn(ShapeHandle, ShapeHandle, &Manifold) -> bool + Send + Sync,
{
    fn pre_solve(&self, shape1: ShapeHandle, shape2: ShapeHandle, manifold: &Manifold) -> bool {
        self(shape1, shape2, manifold)
    }
}

/// Events gathered during the last step
#[derive(Debug, Default)]
pub struct EventCollector {
    /// Collision events, in the order the contacts changed state
    pub collision_events: Vec<CollisionEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all collected events
    pub fn clear(&mut self) {
        self.collision_events.clear();
    }

    pub fn push(&mut self, event: CollisionEvent) {
        self.collision_events.push(event);
    }

    pub fn len(&self) -> usize {
        self.collision_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collision_events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.collision_events.iter()
    }

    /// Solid contacts that began touching
    pub fn started_collisions(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.collision_events.iter().filter(|e| !e.is_sensor && e.is_started())
    }

    /// Solid contacts that stopped touching
    pub fn stopped_collisions(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.collision_events.iter().filter(|e| !e.is_sensor && e.is_stopped())
    }

    /// Shapes that started overlapping a sensor
    pub fn sensor_enters(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.collision_events.iter().filter(|e| e.is_sensor && e.is_started())
    }

    /// Shapes that stopped overlapping a sensor
    pub fn sensor_exits(&self) -> impl Iterator<Item = &CollisionEvent> {
        self.collision_events.iter().filter(|e| e.is_sensor && e.is_stopped())
    }
}
