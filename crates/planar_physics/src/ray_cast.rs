//! Ray casts against individual shapes, in the shape's local frame
//!
//! A ray with a non-zero radius is a swept circle. Hit points are reported on
//! the surface of the shape, not at the center of the swept circle.

use planar_math::{RayCastInput, RayCastOutput};

use crate::geometry::{Capsule, Circle, Polygon, Segment};

/// Ray against a circle, using the numerically stable form from Ray Tracing Gems
pub fn ray_cast_circle(input: &RayCastInput, shape: &Circle) -> RayCastOutput {
    debug_assert!(input.is_valid());

    let p = shape.center;
    let radius = shape.radius + input.radius;

    // Shift the ray so the circle sits at the origin
    let s = input.p1 - p;
    let (length, d) = input.translation().length_and_normalize();
    if length == 0.0 {
        return RayCastOutput::miss();
    }

    // Closest point on the infinite line to the center
    let t = -s.dot(d);
    let c = s.mul_add(t, d);
    let cc = c.dot(c);
    let rr = radius * radius;
    if cc > rr {
        return RayCastOutput::miss();
    }

    let h = (rr - cc).sqrt();
    let fraction = t - h;
    if fraction < 0.0 || input.max_fraction * length < fraction {
        // Starts inside or ends short
        return RayCastOutput::miss();
    }

    let hit_point = s.mul_add(fraction, d);
    let normal = hit_point.normalize();
    RayCastOutput::hit(p.mul_add(shape.radius, normal), normal, fraction / length)
}

/// Ray against a capsule: the side walls by Cramer's rule, the caps as circles
pub fn ray_cast_capsule(input: &RayCastInput, shape: &Capsule) -> RayCastOutput {
    debug_assert!(input.is_valid());

    let v1 = shape.center1;
    let v2 = shape.center2;
    let (capsule_length, a) = (v2 - v1).length_and_normalize();

    if capsule_length < f32::EPSILON {
        return ray_cast_circle(input, &Circle::new(v1, shape.radius));
    }

    let p1 = input.p1;
    let d = input.translation();
    let radius = shape.radius + input.radius;

    // Ray start relative to the capsule start, and its part perpendicular to the axis
    let q = p1 - v1;
    let qa = q.dot(a);
    let qp = q.mul_add(-qa, a);

    if qp.dot(qp) < radius * radius {
        if qa < 0.0 {
            return ray_cast_circle(input, &Circle::new(v1, shape.radius));
        }
        if qa > capsule_length {
            return ray_cast_circle(input, &Circle::new(v2, shape.radius));
        }
        // Starts inside
        return RayCastOutput::miss();
    }

    // Perpendicular to the axis, pointing right
    let mut n = a.right_perp();

    let (ray_length, u) = d.length_and_normalize();
    if ray_length == 0.0 {
        return RayCastOutput::miss();
    }

    // Intersect with both infinite side lines:
    //   v1 +/- radius * n + s1 * a = p1 + s2 * u
    //   s1 * a - s2 * u = q -/+ radius * n
    let den = -a.x * u.y + u.x * a.y;
    if -f32::EPSILON < den && den < f32::EPSILON {
        // Parallel and outside the infinite capsule
        return RayCastOutput::miss();
    }

    let b1 = q.mul_sub(radius, n);
    let b2 = q.mul_add(radius, n);
    let inv_den = 1.0 / den;

    let s21 = (a.x * b1.y - b1.x * a.y) * inv_den;
    let s22 = (a.x * b2.y - b2.x * a.y) * inv_den;

    let (s2, b) = if s21 < s22 {
        (s21, b1)
    } else {
        n = -n;
        (s22, b2)
    };

    if s2 < 0.0 || input.max_fraction * ray_length < s2 {
        return RayCastOutput::miss();
    }

    let s1 = (-b.x * u.y + u.x * b.y) * inv_den;
    if s1 < 0.0 {
        ray_cast_circle(input, &Circle::new(v1, shape.radius))
    } else if capsule_length < s1 {
        ray_cast_circle(input, &Circle::new(v2, shape.radius))
    } else {
        let point = v1.lerp(v2, s1 / capsule_length).mul_add(shape.radius, n);
        RayCastOutput::hit(point, n, s2 / ray_length)
    }
}

/// Ray against a two-sided segment. A thick ray treats the segment as a zero-radius capsule.
pub fn ray_cast_segment(input: &RayCastInput, shape: &Segment) -> RayCastOutput {
    if input.radius > 0.0 {
        return ray_cast_capsule(input, &Capsule::new(shape.point1, shape.point2, 0.0));
    }

    let p1 = input.p1;
    let d = input.translation();

    let v1 = shape.point1;
    let v2 = shape.point2;
    let (length, e) = (v2 - v1).length_and_normalize();
    if length == 0.0 {
        return RayCastOutput::miss();
    }

    // Right of v1 -> v2
    let mut normal = e.right_perp();

    // dot(normal, p1 + t * d - v1) = 0
    let numerator = normal.dot(v1 - p1);
    let denominator = normal.dot(d);
    if denominator == 0.0 {
        return RayCastOutput::miss();
    }

    let t = numerator / denominator;
    if t < 0.0 || input.max_fraction < t {
        return RayCastOutput::miss();
    }

    let p = p1.mul_add(t, d);
    let s = (p - v1).dot(e);
    if s < 0.0 || length < s {
        return RayCastOutput::miss();
    }

    if numerator > 0.0 {
        normal = -normal;
    }
    RayCastOutput::hit(p, normal, t)
}

/// Ray against a convex polygon.
///
/// Sharp polygons cast against thin rays clip the ray by each edge half-space.
/// Otherwise the rounded outline is the union of offset edges and vertex circles,
/// and the earliest front-facing hit among them wins.
pub fn ray_cast_polygon(input: &RayCastInput, shape: &Polygon) -> RayCastOutput {
    debug_assert!(input.is_valid());

    if shape.radius == 0.0 && input.radius == 0.0 {
        return clip_ray(input, shape);
    }

    let radius = shape.radius + input.radius;
    let thin = RayCastInput { radius: 0.0, ..*input };
    let count = shape.count;
    let mut best = RayCastOutput::miss();
    let mut best_fraction = input.max_fraction;

    for i in 0..count {
        let n = shape.normals[i];
        let v1 = shape.vertices[i];
        let v2 = shape.vertices[if i + 1 < count { i + 1 } else { 0 }];

        let edge = Segment::new(v1.mul_add(radius, n), v2.mul_add(radius, n));
        let out = ray_cast_segment(&thin, &edge);
        // Only hits entering through the outer side count
        if out.hit && out.normal.dot(n) > 0.0 && out.fraction <= best_fraction {
            best_fraction = out.fraction;
            best = RayCastOutput::hit(out.point.mul_sub(input.radius, n), n, out.fraction);
        }

        let out = ray_cast_circle(input, &Circle::new(v1, shape.radius));
        if out.hit && out.fraction < best_fraction {
            best_fraction = out.fraction;
            best = out;
        }
    }

    best
}

fn clip_ray(input: &RayCastInput, shape: &Polygon) -> RayCastOutput {
    let p1 = input.p1;
    let d = input.translation();

    let mut lower = 0.0_f32;
    let mut upper = input.max_fraction;
    let mut index = None;

    for i in 0..shape.count {
        // dot(normal, p1 + a * d - v) = 0
        let numerator = shape.normals[i].dot(shape.vertices[i] - p1);
        let denominator = shape.normals[i].dot(d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return RayCastOutput::miss();
            }
        } else if denominator < 0.0 && numerator < lower * denominator {
            // Entering this half-space
            lower = numerator / denominator;
            index = Some(i);
        } else if denominator > 0.0 && numerator < upper * denominator {
            // Leaving this half-space
            upper = numerator / denominator;
        }

        if upper < lower {
            return RayCastOutput::miss();
        }
    }

    match index {
        Some(i) => RayCastOutput::hit(p1.mul_add(lower, d), shape.normals[i], lower),
        // Starts inside
        None => RayCastOutput::miss(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use planar_math::Vec2;

    fn ray(x1: f32, y1: f32, x2: f32, y2: f32) -> RayCastInput {
        RayCastInput::new(Vec2::new(x1, y1), Vec2::new(x2, y2))
    }

    #[test]
    fn test_circle_hit_and_miss() {
        let circle = Circle::new(Vec2::ZERO, 1.0);
        let out = ray_cast_circle(&ray(-3.0, 0.0, 3.0, 0.0), &circle);
        assert!(out.hit);
        assert_relative_eq!(out.fraction, 2.0 / 6.0, epsilon = 1e-6);
        assert_relative_eq!(out.normal.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(out.point.x, -1.0, epsilon = 1e-6);

        assert!(!ray_cast_circle(&ray(-3.0, 2.0, 3.0, 2.0), &circle).hit);
        // Too short
        assert!(!ray_cast_circle(&ray(-3.0, 0.0, 3.0, 0.0).with_max_fraction(0.2), &circle).hit);
        // Starts inside
        assert!(!ray_cast_circle(&ray(0.0, 0.0, 3.0, 0.0), &circle).hit);
    }

    #[test]
    fn test_thick_ray_reports_surface_point() {
        let circle = Circle::new(Vec2::ZERO, 1.0);
        let out = ray_cast_circle(&ray(-4.0, 0.0, 4.0, 0.0).with_radius(0.5), &circle);
        assert!(out.hit);
        assert_relative_eq!(out.fraction, 2.5 / 8.0, epsilon = 1e-6);
        assert_relative_eq!(out.point.x, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_capsule_side_and_cap() {
        let capsule = Capsule::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.5);

        let side = ray_cast_capsule(&ray(0.0, 2.0, 0.0, -2.0), &capsule);
        assert!(side.hit);
        assert_relative_eq!(side.fraction, 1.5 / 4.0, epsilon = 1e-5);
        assert_relative_eq!(side.normal.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(side.point.y, 0.5, epsilon = 1e-5);

        let cap = ray_cast_capsule(&ray(3.0, 0.0, -3.0, 0.0), &capsule);
        assert!(cap.hit);
        assert_relative_eq!(cap.point.x, 1.5, epsilon = 1e-5);
        assert_relative_eq!(cap.normal.x, 1.0, epsilon = 1e-5);

        assert!(!ray_cast_capsule(&ray(0.0, 0.0, 0.0, 3.0), &capsule).hit);
    }

    #[test]
    fn test_segment_both_sides() {
        let segment = Segment::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let down = ray_cast_segment(&ray(0.0, 1.0, 0.0, -1.0), &segment);
        assert!(down.hit);
        assert_relative_eq!(down.fraction, 0.5, epsilon = 1e-6);
        assert_relative_eq!(down.normal.y, 1.0, epsilon = 1e-6);

        let up = ray_cast_segment(&ray(0.0, -1.0, 0.0, 1.0), &segment);
        assert!(up.hit);
        assert_relative_eq!(up.normal.y, -1.0, epsilon = 1e-6);

        assert!(!ray_cast_segment(&ray(2.0, 1.0, 2.0, -1.0), &segment).hit);
    }

    #[test]
    fn test_polygon_clip() {
        let square = Polygon::make_square(1.0);
        let out = ray_cast_polygon(&ray(-3.0, 0.5, 3.0, 0.5), &square);
        assert!(out.hit);
        assert_relative_eq!(out.fraction, 2.0 / 6.0, epsilon = 1e-6);
        assert_eq!(out.normal, Vec2::new(-1.0, 0.0));

        assert!(!ray_cast_polygon(&ray(-3.0, 1.5, 3.0, 1.5), &square).hit);
        assert!(!ray_cast_polygon(&ray(0.0, 0.0, 3.0, 0.0), &square).hit);
    }

    #[test]
    fn test_rounded_polygon_and_thick_ray() {
        let rounded = Polygon::make_rounded_box(1.0, 1.0, 0.25);
        let out = ray_cast_polygon(&ray(-3.0, 0.0, 3.0, 0.0), &rounded);
        assert!(out.hit);
        assert_relative_eq!(out.point.x, -1.25, epsilon = 1e-5);
        assert_relative_eq!(out.normal.x, -1.0, epsilon = 1e-5);

        // Corner region is a circle around the vertex
        let diag = ray_cast_polygon(&ray(3.0, 3.0, 0.0, 0.0), &rounded);
        assert!(diag.hit);
        let expected = 1.0 + 0.25 * core::f32::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(diag.point.x, expected, epsilon = 1e-4);

        let square = Polygon::make_square(1.0);
        let thick = ray_cast_polygon(&ray(-3.0, 0.0, 3.0, 0.0).with_radius(0.5), &square);
        assert!(thick.hit);
        assert_relative_eq!(thick.fraction, 1.5 / 6.0, epsilon = 1e-5);
        assert_relative_eq!(thick.point.x, -1.0, epsilon = 1e-5);
    }
}
