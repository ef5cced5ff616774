//! World queries (ray casts, overlap tests)
//!
//! Queries run against the broad-phase tree and then the exact shape geometry.
//! Shapes of disabled bodies have no proxy and are never reported.

use planar_math::{RayCastInput, Vec2, AABB};
use planar_structures::Arena;

use crate::body::{Body, BodyHandle};
use crate::broad_phase::BroadPhase;
use crate::filter::QueryFilter;
use crate::shape::{Shape, ShapeHandle, ShapeKey};

/// Result of a ray cast query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastHit {
    /// The shape that was hit
    pub shape: ShapeHandle,
    /// The body owning the shape
    pub body: BodyHandle,
    /// Hit point in world space
    pub point: Vec2,
    /// Surface normal at the hit point
    pub normal: Vec2,
    /// Fraction along the input segment
    pub fraction: f32,
    /// User data from the shape
    pub user_data: u128,
}

/// Query interface for the physics world
pub struct PhysicsQuery<'a> {
    pub(crate) broad_phase: &'a BroadPhase,
    pub(crate) shapes: &'a Arena<Shape>,
    pub(crate) bodies: &'a Arena<Body>,
}

impl<'a> PhysicsQuery<'a> {
    /// Visit every shape whose bounds overlap `aabb`. Return false to stop.
    pub fn query_aabb<F>(&self, aabb: &AABB, mut callback: F)
    where
        F: FnMut(ShapeHandle) -> bool,
    {
        self.broad_phase.query(aabb, |key| match self.shapes.get(key) {
            Some(shape) if shape.aabb.intersects(aabb) => callback(ShapeHandle(key)),
            _ => true,
        });
    }

    /// Every shape passing `filter` whose bounds overlap `aabb`
    pub fn overlap_aabb(&self, aabb: &AABB, filter: QueryFilter) -> Vec<ShapeHandle> {
        let mut results = Vec::new();
        self.query_aabb(aabb, |handle| {
            if self.shapes.get(handle.0).is_some_and(|shape| filter.accepts(&shape.filter)) {
                results.push(handle);
            }
            true
        });
        results
    }

    /// Closest solid shape along the ray
    pub fn ray_cast(&self, input: &RayCastInput, filter: QueryFilter) -> Option<RayCastHit> {
        if !input.is_valid() {
            return None;
        }

        let mut closest = None;
        self.broad_phase.ray_cast(input, |sub_input, key| {
            let Some(hit) = self.ray_cast_shape(sub_input, key, filter) else {
                return -1.0;
            };
            let fraction = hit.fraction;
            closest = Some(hit);
            fraction
        });
        closest
    }

    /// All solid shapes along the ray, nearest first
    pub fn ray_cast_all(&self, input: &RayCastInput, filter: QueryFilter) -> Vec<RayCastHit> {
        let mut hits = Vec::new();
        if !input.is_valid() {
            return hits;
        }

        self.broad_phase.ray_cast(input, |sub_input, key| {
            if let Some(hit) = self.ray_cast_shape(sub_input, key, filter) {
                hits.push(hit);
            }
            sub_input.max_fraction
        });

        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }

    /// First shape passing `filter` that contains the point
    pub fn point_inside(&self, point: Vec2, filter: QueryFilter) -> Option<ShapeHandle> {
        let probe = AABB::new(point, point);
        let mut result = None;
        self.query_aabb(&probe, |handle| {
            let Some(shape) = self.shapes.get(handle.0) else { return true };
            let Some(body) = self.bodies.get(shape.body) else { return true };
            if filter.accepts(&shape.filter) && shape.geometry.contains_point(body.transform.inv_apply(point)) {
                result = Some(handle);
                return false;
            }
            true
        });
        result
    }

    fn ray_cast_shape(&self, input: &RayCastInput, key: ShapeKey, filter: QueryFilter) -> Option<RayCastHit> {
        let shape = self.shapes.get(key)?;
        if shape.is_sensor || !filter.accepts(&shape.filter) {
            return None;
        }
        let body = self.bodies.get(shape.body)?;
        let output = shape.geometry.ray_cast_world(input, &body.transform);
        output.hit.then(|| RayCastHit {
            shape: ShapeHandle(key),
            body: BodyHandle(shape.body),
            point: output.point,
            normal: output.normal,
            fraction: output.fraction,
            user_data: shape.user_data,
        })
    }
}
