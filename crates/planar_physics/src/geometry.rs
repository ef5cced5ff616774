//! Shape primitives, polygon construction and mass properties
//!
//! All geometry is expressed in the local frame of the owning body.

use planar_math::{Rot, Transform, Vec2, AABB};
use serde::{Deserialize, Serialize};

use crate::config::constants::{HUGE, MAX_POLYGON_VERTICES};
use crate::hull::Hull;

/// Solid circle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

/// Segment swept by a radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub center1: Vec2,
    pub center2: Vec2,
    pub radius: f32,
}

/// Zero-thickness line segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub point1: Vec2,
    pub point2: Vec2,
}

/// Solid convex polygon with an optional rounding radius.
///
/// Vertices are counter-clockwise. A two-vertex polygon is a capsule, which is
/// how the narrow phase treats capsules and segments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: [Vec2; MAX_POLYGON_VERTICES],
    pub normals: [Vec2; MAX_POLYGON_VERTICES],
    pub centroid: Vec2,
    pub radius: f32,
    pub count: usize,
}

/// Mass properties of a shape or body
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MassData {
    /// Mass in kilograms
    pub mass: f32,
    /// Center of mass relative to the local origin
    pub center: Vec2,
    /// Rotational inertia about the local origin
    pub rotational_inertia: f32,
    /// Distance from the center of mass to the closest surface
    pub min_extent: f32,
    /// Distance from the local origin to the furthest point
    pub max_extent: f32,
}

impl Circle {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn is_valid(&self) -> bool {
        self.center.is_valid() && self.radius.is_finite() && self.radius > 0.0
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        let rr = self.radius * self.radius;
        let mass = density * core::f32::consts::PI * rr;
        MassData {
            mass,
            center: self.center,
            rotational_inertia: mass * (0.5 * rr + self.center.dot(self.center)),
            min_extent: self.radius,
            max_extent: self.center.length() + self.radius,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let p = xf.apply(self.center);
        AABB::from_center_half_extents(p, Vec2::splat(self.radius))
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }
}

impl Capsule {
    pub fn new(center1: Vec2, center2: Vec2, radius: f32) -> Self {
        Self { center1, center2, radius }
    }

    pub fn is_valid(&self) -> bool {
        self.center1.is_valid()
            && self.center2.is_valid()
            && self.radius.is_finite()
            && self.radius > 0.0
            && self.center1.distance_squared(self.center2) > f32::EPSILON * f32::EPSILON
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        let radius = self.radius;
        let rr = radius * radius;
        let length = (self.center2 - self.center1).length();
        let ll = length * length;

        let mass = density * (core::f32::consts::PI * radius + 2.0 * length) * radius;
        let center = self.center1.lerp(self.center2, 0.5);

        // Two half circles make one full circle offset by half the length on average
        let circle_inertia = 0.5 * (rr + ll);
        let box_inertia = (4.0 * rr + ll) / 12.0;
        let central = mass * (circle_inertia + box_inertia);

        MassData {
            mass,
            center,
            rotational_inertia: central + mass * center.dot(center),
            min_extent: radius,
            max_extent: self.center1.length().max(self.center2.length()) + radius,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let v1 = xf.apply(self.center1);
        let v2 = xf.apply(self.center2);
        let r = Vec2::splat(self.radius);
        AABB::new(v1.min(v2) - r, v1.max(v2) + r)
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        let rr = self.radius * self.radius;
        let closest = closest_point_on_segment(point, self.center1, self.center2);
        point.distance_squared(closest) <= rr
    }
}

impl Segment {
    pub fn new(point1: Vec2, point2: Vec2) -> Self {
        Self { point1, point2 }
    }

    pub fn is_valid(&self) -> bool {
        self.point1.is_valid()
            && self.point2.is_valid()
            && self.point1.distance_squared(self.point2) > f32::EPSILON * f32::EPSILON
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        let v1 = xf.apply(self.point1);
        let v2 = xf.apply(self.point2);
        AABB::new(v1.min(v2), v1.max(v2))
    }
}

impl Polygon {
    /// Build from a hull computed by `compute_hull`
    pub fn new(hull: &Hull, radius: f32) -> Self {
        debug_assert!(hull.count >= 3);
        let mut shape = Self::empty();
        shape.count = hull.count;
        shape.radius = radius;
        shape.vertices[..hull.count].copy_from_slice(hull.points());

        for i in 0..shape.count {
            let i2 = if i + 1 < shape.count { i + 1 } else { 0 };
            let edge = shape.vertices[i2] - shape.vertices[i];
            shape.normals[i] = edge.cross_scalar(1.0).normalize();
        }
        shape.centroid = compute_polygon_centroid(shape.vertices());
        shape
    }

    fn empty() -> Self {
        Self {
            vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            centroid: Vec2::ZERO,
            radius: 0.0,
            count: 0,
        }
    }

    /// Axis-aligned box centered on the origin
    pub fn make_box(hx: f32, hy: f32) -> Self {
        let mut shape = Self::empty();
        shape.count = 4;
        shape.vertices[0] = Vec2::new(-hx, -hy);
        shape.vertices[1] = Vec2::new(hx, -hy);
        shape.vertices[2] = Vec2::new(hx, hy);
        shape.vertices[3] = Vec2::new(-hx, hy);
        shape.normals[0] = Vec2::new(0.0, -1.0);
        shape.normals[1] = Vec2::new(1.0, 0.0);
        shape.normals[2] = Vec2::new(0.0, 1.0);
        shape.normals[3] = Vec2::new(-1.0, 0.0);
        shape
    }

    pub fn make_square(h: f32) -> Self {
        Self::make_box(h, h)
    }

    pub fn make_rounded_box(hx: f32, hy: f32, radius: f32) -> Self {
        let mut shape = Self::make_box(hx, hy);
        shape.radius = radius;
        shape
    }

    /// Box rotated by `angle` and centered at `center`
    pub fn make_offset_box(hx: f32, hy: f32, center: Vec2, angle: f32) -> Self {
        let xf = Transform::new(center, Rot::from_angle(angle));
        let base = Self::make_box(hx, hy);
        let mut shape = base;
        for i in 0..4 {
            shape.vertices[i] = xf.apply(base.vertices[i]);
            shape.normals[i] = xf.q.rotate(base.normals[i]);
        }
        shape.centroid = center;
        shape
    }

    /// Capsule expressed as a rounded two-vertex polygon
    pub fn make_capsule(p1: Vec2, p2: Vec2, radius: f32) -> Self {
        let mut shape = Self::empty();
        shape.vertices[0] = p1;
        shape.vertices[1] = p2;
        shape.centroid = p1.lerp(p2, 0.5);

        let axis = (p2 - p1).normalize();
        let normal = axis.right_perp();
        shape.normals[0] = normal;
        shape.normals[1] = -normal;
        shape.count = 2;
        shape.radius = radius;
        shape
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    /// Same polygon expressed in another frame
    pub fn transformed(&self, xf: &Transform) -> Self {
        let mut shape = *self;
        for i in 0..self.count {
            shape.vertices[i] = xf.apply(self.vertices[i]);
            shape.normals[i] = xf.q.rotate(self.normals[i]);
        }
        shape.centroid = xf.apply(self.centroid);
        shape
    }

    pub fn is_valid(&self) -> bool {
        if self.count < 3 || self.count > MAX_POLYGON_VERTICES || !self.radius.is_finite() || self.radius < 0.0 {
            return false;
        }
        let n = self.count;
        for i in 0..n {
            let v1 = self.vertices[i];
            let v2 = self.vertices[(i + 1) % n];
            let edge = v2 - v1;
            if !v1.is_valid() || edge.length_squared() <= f32::EPSILON * f32::EPSILON {
                return false;
            }
            // Strictly convex, counter-clockwise
            let v3 = self.vertices[(i + 2) % n];
            if edge.cross(v3 - v2) <= 0.0 {
                return false;
            }
        }
        true
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        debug_assert!(self.count > 0);

        if self.count == 1 {
            return Circle::new(self.vertices[0], self.radius).compute_mass(density);
        }
        if self.count == 2 {
            return Capsule::new(self.vertices[0], self.vertices[1], self.radius).compute_mass(density);
        }

        let count = self.count;
        let radius = self.radius;
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];

        if radius > 0.0 {
            // Push out vertices according to radius so the rounded corners are approximated
            for i in 0..count {
                let j = if i == 0 { count - 1 } else { i - 1 };
                let n1 = self.normals[j];
                let n2 = self.normals[i];

                let mid = (n1 + n2).normalize();
                let t1 = n1.left_perp();
                let sin_half_angle = mid.cross(t1);

                let offset = if sin_half_angle > f32::EPSILON { radius / sin_half_angle } else { radius };
                vertices[i] = self.vertices[i].mul_add(offset, mid);
            }
        } else {
            vertices[..count].copy_from_slice(&self.vertices[..count]);
        }

        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        // Reference point for the triangle fan; the first vertex limits round-off
        let r = vertices[0];
        let inv3 = 1.0 / 3.0;

        for i in 1..count - 1 {
            let e1 = vertices[i] - r;
            let e2 = vertices[i + 1] - r;
            let d = e1.cross(e2);

            let triangle_area = 0.5 * d;
            area += triangle_area;

            // Area weighted centroid, r at origin
            center = center.mul_add(triangle_area * inv3, e1 + e2);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * inv3 * d) * (intx2 + inty2);
        }

        let mass = density * area;
        let inv_area = if area > f32::EPSILON { 1.0 / area } else { 0.0 };
        center *= inv_area;
        let mass_center = r + center;

        // Inertia about r, shifted to the center of mass and then to the local origin
        let rotational_inertia =
            density * inertia + mass * (mass_center.dot(mass_center) - center.dot(center));

        let mut min_extent = HUGE;
        let mut max_extent_sqr = 0.0_f32;
        for i in 0..count {
            let plane_offset = self.normals[i].dot(self.vertices[i] - mass_center);
            min_extent = min_extent.min(plane_offset);
            max_extent_sqr = max_extent_sqr.max(self.vertices[i].length_squared());
        }

        MassData {
            mass,
            center: mass_center,
            rotational_inertia,
            min_extent: min_extent + radius,
            max_extent: max_extent_sqr.sqrt() + radius,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform) -> AABB {
        debug_assert!(self.count > 0);
        let mut lower = xf.apply(self.vertices[0]);
        let mut upper = lower;
        for &v in &self.vertices[1..self.count] {
            let v = xf.apply(v);
            lower = lower.min(v);
            upper = upper.max(v);
        }
        let r = Vec2::splat(self.radius);
        AABB::new(lower - r, upper + r)
    }

    /// Point test including the rounding radius
    pub fn contains_point(&self, point: Vec2) -> bool {
        let mut inside = true;
        for i in 0..self.count {
            if self.normals[i].dot(point - self.vertices[i]) > 0.0 {
                inside = false;
                break;
            }
        }
        if inside {
            return true;
        }
        if self.radius <= 0.0 {
            return false;
        }

        let n = self.count;
        let rr = self.radius * self.radius;
        (0..n).any(|i| {
            let closest = closest_point_on_segment(point, self.vertices[i], self.vertices[(i + 1) % n]);
            point.distance_squared(closest) <= rr
        })
    }
}

/// Area-weighted centroid of a convex polygon
pub fn compute_polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    let count = vertices.len();
    if count == 0 {
        return Vec2::ZERO;
    }
    if count < 3 {
        let sum = vertices.iter().fold(Vec2::ZERO, |acc, &v| acc + v);
        return sum * (1.0 / count as f32);
    }

    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    let origin = vertices[0];
    let inv3 = 1.0 / 3.0;

    for i in 1..count - 1 {
        let e1 = vertices[i] - origin;
        let e2 = vertices[i + 1] - origin;
        let a = 0.5 * e1.cross(e2);
        center = center.mul_add(a * inv3, e1 + e2);
        area += a;
    }

    if area <= f32::EPSILON {
        return origin;
    }
    origin + center * (1.0 / area)
}

/// Closest point to `p` on the segment `a -> b`
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let d = b - a;
    let dd = d.dot(d);
    if dd == 0.0 {
        return a;
    }
    let t = ((p - a).dot(d) / dd).clamp(0.0, 1.0);
    a.mul_add(t, d)
}
