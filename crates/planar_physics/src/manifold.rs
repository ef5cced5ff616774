//! Narrow phase: contact manifolds for each supported pair of shape types
//!
//! Every routine takes shape A and shape B with their world transforms and returns
//! a manifold whose normal points from A to B. Manifold points are speculative:
//! they are kept while the shapes are up to `SPECULATIVE_DISTANCE` apart, so a
//! contact never pops into existence at full penetration.
//!
//! Capsules and segments are handled as two-vertex rounded polygons, which keeps
//! the point ids, and therefore warm starting, stable across shape types.

use planar_math::{Transform, Vec2};
use serde::{Deserialize, Serialize};

use crate::config::constants::{LINEAR_SLOP, MAX_POLYGON_VERTICES, SPECULATIVE_DISTANCE};
use crate::geometry::{Capsule, Circle, Polygon, Segment};
use crate::shape::{ShapeGeometry, ShapeType};

/// Stable identity of a manifold point, built from the features that produced it
#[inline]
pub const fn make_id(a: usize, b: usize) -> u16 {
    ((a as u16 & 0xFF) << 8) | (b as u16 & 0xFF)
}

/// One contact point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifoldPoint {
    /// World position, midway between the two surfaces
    pub point: Vec2,
    /// Point relative to the origin of shape A's body, in world orientation
    pub anchor_a: Vec2,
    /// Point relative to the origin of shape B's body, in world orientation
    pub anchor_b: Vec2,
    /// Negative when overlapping
    pub separation: f32,
    /// Accumulated normal impulse from the last solve
    pub normal_impulse: f32,
    /// Accumulated friction impulse from the last solve
    pub tangent_impulse: f32,
    /// Largest incremental normal impulse applied during the last solve
    pub max_normal_impulse: f32,
    /// Relative normal velocity before the last solve, negative when approaching
    pub normal_velocity: f32,
    /// Feature id used to match points between steps
    pub id: u16,
    /// The id matched a point of the previous manifold
    pub persisted: bool,
}

impl ManifoldPoint {
    /// Overlap depth, positive when the shapes overlap
    #[inline]
    pub fn penetration(&self) -> f32 {
        -self.separation
    }
}

/// Contact points between two shapes sharing one normal
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifold {
    pub points: [ManifoldPoint; 2],
    /// Unit normal pointing from shape A to shape B
    pub normal: Vec2,
    pub point_count: usize,
}

impl Manifold {
    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    #[inline]
    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    fn push(&mut self, point: ManifoldPoint) {
        debug_assert!(self.point_count < 2);
        self.points[self.point_count] = point;
        self.point_count += 1;
    }

    /// Express local anchors (in A's frame, relative to `origin`) in world space
    fn finish(mut self, xf_a: &Transform, xf_b: &Transform, origin: Vec2) -> Self {
        self.normal = xf_a.q.rotate(self.normal);
        for mp in &mut self.points[..self.point_count] {
            mp.anchor_a = xf_a.q.rotate(mp.anchor_a + origin);
            mp.anchor_b = mp.anchor_a + (xf_a.p - xf_b.p);
            mp.point = xf_a.p + mp.anchor_a;
        }
        self
    }
}

/// Whether the narrow phase can collide shape types `a` and `b`, in either order
pub fn is_supported(a: ShapeType, b: ShapeType) -> bool {
    !(a == ShapeType::Segment && b == ShapeType::Segment)
}

/// Dispatch on the shape types. Expects `a.shape_type() >= b.shape_type()`;
/// unsupported pairs produce an empty manifold.
pub fn collide(a: &ShapeGeometry, xf_a: &Transform, b: &ShapeGeometry, xf_b: &Transform) -> Manifold {
    use ShapeGeometry as G;
    match (a, b) {
        (G::Circle(a), G::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (G::Capsule(a), G::Circle(b)) => collide_capsule_and_circle(a, xf_a, b, xf_b),
        (G::Capsule(a), G::Capsule(b)) => collide_capsules(a, xf_a, b, xf_b),
        (G::Segment(a), G::Circle(b)) => collide_segment_and_circle(a, xf_a, b, xf_b),
        (G::Segment(a), G::Capsule(b)) => collide_segment_and_capsule(a, xf_a, b, xf_b),
        (G::Polygon(a), G::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
        (G::Polygon(a), G::Capsule(b)) => collide_polygon_and_capsule(a, xf_a, b, xf_b),
        (G::Polygon(a), G::Segment(b)) => collide_polygon_and_segment(a, xf_a, b, xf_b),
        (G::Polygon(a), G::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        _ => Manifold::default(),
    }
}

/// Single point between two circles, or nothing when the centers coincide
fn circle_point(point_a: Vec2, radius_a: f32, point_b: Vec2, radius_b: f32) -> Option<(Vec2, Vec2, f32)> {
    let (distance, normal) = (point_b - point_a).length_and_normalize();
    if distance < f32::EPSILON {
        // No usable normal
        return None;
    }
    let separation = distance - radius_a - radius_b;
    if separation > SPECULATIVE_DISTANCE {
        return None;
    }
    let c_a = point_a.mul_add(radius_a, normal);
    let c_b = point_b.mul_add(-radius_b, normal);
    Some((normal, c_a.lerp(c_b, 0.5), separation))
}

pub fn collide_circles(circle_a: &Circle, xf_a: &Transform, circle_b: &Circle, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();
    let xf = xf_a.inv_mul(xf_b);

    let point_a = circle_a.center;
    let point_b = xf.apply(circle_b.center);

    if let Some((normal, contact, separation)) = circle_point(point_a, circle_a.radius, point_b, circle_b.radius) {
        manifold.normal = normal;
        manifold.push(ManifoldPoint {
            anchor_a: contact,
            separation,
            id: 0,
            ..Default::default()
        });
    }
    manifold.finish(xf_a, xf_b, Vec2::ZERO)
}

/// Closest point on the capsule axis to the circle center, then a circle test
pub fn collide_capsule_and_circle(
    capsule_a: &Capsule,
    xf_a: &Transform,
    circle_b: &Circle,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let xf = xf_a.inv_mul(xf_b);

    // Circle center in A's frame
    let p_b = xf.apply(circle_b.center);

    let p1 = capsule_a.center1;
    let p2 = capsule_a.center2;
    let e = p2 - p1;

    let s1 = (p_b - p1).dot(e);
    let s2 = (p2 - p_b).dot(e);
    let p_a = if s1 < 0.0 {
        p1
    } else if s2 < 0.0 {
        p2
    } else {
        p1.mul_add(s1 / e.dot(e), e)
    };

    if let Some((normal, contact, separation)) = circle_point(p_a, capsule_a.radius, p_b, circle_b.radius) {
        manifold.normal = normal;
        manifold.push(ManifoldPoint {
            anchor_a: contact,
            separation,
            id: 0,
            ..Default::default()
        });
    }
    manifold.finish(xf_a, xf_b, Vec2::ZERO)
}

pub fn collide_segment_and_circle(
    segment_a: &Segment,
    xf_a: &Transform,
    circle_b: &Circle,
    xf_b: &Transform,
) -> Manifold {
    let capsule = Capsule::new(segment_a.point1, segment_a.point2, 0.0);
    collide_capsule_and_circle(&capsule, xf_a, circle_b, xf_b)
}

pub fn collide_polygon_and_circle(
    polygon_a: &Polygon,
    xf_a: &Transform,
    circle_b: &Circle,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let xf = xf_a.inv_mul(xf_b);

    // Circle center in A's frame
    let c = xf.apply(circle_b.center);
    let radius_a = polygon_a.radius;
    let radius_b = circle_b.radius;
    let radius = radius_a + radius_b;

    // Edge of maximum separation
    let count = polygon_a.count;
    let mut normal_index = 0;
    let mut separation = -f32::MAX;
    for i in 0..count {
        let s = polygon_a.normals[i].dot(c - polygon_a.vertices[i]);
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    if separation - radius > SPECULATIVE_DISTANCE {
        return manifold;
    }

    let v1 = polygon_a.vertices[normal_index];
    let v2 = polygon_a.vertices[if normal_index + 1 < count { normal_index + 1 } else { 0 }];

    let u1 = (c - v1).dot(v2 - v1);
    let u2 = (c - v2).dot(v1 - v2);

    if (u1 < 0.0 || u2 < 0.0) && separation > f32::EPSILON {
        // Center is outside the polygon and nearest to a vertex
        let v = if u1 < 0.0 { v1 } else { v2 };
        let (distance, normal) = (c - v).length_and_normalize();
        if distance < f32::EPSILON || distance - radius > SPECULATIVE_DISTANCE {
            return manifold;
        }
        let c_a = v.mul_add(radius_a, normal);
        let c_b = c.mul_sub(radius_b, normal);
        manifold.normal = normal;
        manifold.push(ManifoldPoint {
            anchor_a: c_a.lerp(c_b, 0.5),
            separation: (c_b - c_a).dot(normal),
            id: 0,
            ..Default::default()
        });
    } else {
        // Center projects onto the face; it may be inside the polygon
        let normal = polygon_a.normals[normal_index];

        // Projection of the center onto the reference face, pushed out by the polygon radius
        let c_a = c.mul_add(radius_a - (c - v1).dot(normal), normal);
        // Deepest point of the circle along the face normal
        let c_b = c.mul_sub(radius_b, normal);
        manifold.normal = normal;
        manifold.push(ManifoldPoint {
            anchor_a: c_a.lerp(c_b, 0.5),
            separation: (c_b - c_a).dot(normal),
            id: 0,
            ..Default::default()
        });
    }
    manifold.finish(xf_a, xf_b, Vec2::ZERO)
}

pub fn collide_capsules(capsule_a: &Capsule, xf_a: &Transform, capsule_b: &Capsule, xf_b: &Transform) -> Manifold {
    let poly_a = Polygon::make_capsule(capsule_a.center1, capsule_a.center2, capsule_a.radius);
    let poly_b = Polygon::make_capsule(capsule_b.center1, capsule_b.center2, capsule_b.radius);
    collide_polygons(&poly_a, xf_a, &poly_b, xf_b)
}

pub fn collide_segment_and_capsule(
    segment_a: &Segment,
    xf_a: &Transform,
    capsule_b: &Capsule,
    xf_b: &Transform,
) -> Manifold {
    let poly_a = Polygon::make_capsule(segment_a.point1, segment_a.point2, 0.0);
    let poly_b = Polygon::make_capsule(capsule_b.center1, capsule_b.center2, capsule_b.radius);
    collide_polygons(&poly_a, xf_a, &poly_b, xf_b)
}

pub fn collide_polygon_and_capsule(
    polygon_a: &Polygon,
    xf_a: &Transform,
    capsule_b: &Capsule,
    xf_b: &Transform,
) -> Manifold {
    let poly_b = Polygon::make_capsule(capsule_b.center1, capsule_b.center2, capsule_b.radius);
    collide_polygons(polygon_a, xf_a, &poly_b, xf_b)
}

pub fn collide_polygon_and_segment(
    polygon_a: &Polygon,
    xf_a: &Transform,
    segment_b: &Segment,
    xf_b: &Transform,
) -> Manifold {
    let poly_b = Polygon::make_capsule(segment_b.point1, segment_b.point2, 0.0);
    collide_polygons(polygon_a, xf_a, &poly_b, xf_b)
}

/// Polygon against polygon by separating axes, then edge clipping.
///
/// When the polygons are separated and the closest features are two vertices the
/// manifold is a single vertex-vertex point, which keeps rounded corners smooth.
pub fn collide_polygons(polygon_a: &Polygon, xf_a: &Transform, polygon_b: &Polygon, xf_b: &Transform) -> Manifold {
    // Work in A's frame shifted to A's first vertex to reduce round-off
    let origin = polygon_a.vertices[0];
    let sf_a = Transform::new(xf_a.p + xf_a.q.rotate(origin), xf_a.q);
    let xf = sf_a.inv_mul(xf_b);

    let mut local_a = *polygon_a;
    for v in &mut local_a.vertices[..local_a.count] {
        *v -= origin;
    }

    let mut local_b = *polygon_b;
    for i in 0..local_b.count {
        local_b.vertices[i] = xf.apply(polygon_b.vertices[i]);
        local_b.normals[i] = xf.q.rotate(polygon_b.normals[i]);
    }

    let (mut edge_a, separation_a) = find_max_separation(&local_a, &local_b);
    let (mut edge_b, separation_b) = find_max_separation(&local_b, &local_a);

    let radius = local_a.radius + local_b.radius;
    if separation_a > SPECULATIVE_DISTANCE + radius || separation_b > SPECULATIVE_DISTANCE + radius {
        return Manifold::default();
    }

    // Pick the reference face, preferring A, then the most anti-parallel incident edge
    let flip = separation_b > separation_a + 0.1 * LINEAR_SLOP;
    if flip {
        edge_a = incident_edge(&local_a, local_b.normals[edge_b]);
    } else {
        edge_b = incident_edge(&local_b, local_a.normals[edge_a]);
    }

    let manifold = if separation_a.max(separation_b) > 0.1 * LINEAR_SLOP {
        // Separated: check for vertex-vertex proximity before clipping
        let i11 = edge_a;
        let i12 = next_index(edge_a, local_a.count);
        let i21 = edge_b;
        let i22 = next_index(edge_b, local_b.count);

        let v11 = local_a.vertices[i11];
        let v12 = local_a.vertices[i12];
        let v21 = local_b.vertices[i21];
        let v22 = local_b.vertices[i22];

        let result = segment_distance(v11, v12, v21, v22);
        let corner = match (result.fraction1, result.fraction2) {
            (f1, f2) if f1 == 0.0 && f2 == 0.0 => Some((v11, v21, make_id(i11, i21))),
            (f1, f2) if f1 == 0.0 && f2 == 1.0 => Some((v11, v22, make_id(i11, i22))),
            (f1, f2) if f1 == 1.0 && f2 == 0.0 => Some((v12, v21, make_id(i12, i21))),
            (f1, f2) if f1 == 1.0 && f2 == 1.0 => Some((v12, v22, make_id(i12, i22))),
            _ => None,
        };

        match corner {
            Some((va, vb, id)) => vertex_vertex(va, local_a.radius, vb, local_b.radius, id),
            None => clip_polygons(&local_a, &local_b, edge_a, edge_b, flip),
        }
    } else {
        clip_polygons(&local_a, &local_b, edge_a, edge_b, flip)
    };

    manifold.finish(xf_a, xf_b, origin)
}

fn vertex_vertex(va: Vec2, radius_a: f32, vb: Vec2, radius_b: f32, id: u16) -> Manifold {
    let mut manifold = Manifold::default();
    let (distance, normal) = (vb - va).length_and_normalize();
    if distance < f32::EPSILON || distance > SPECULATIVE_DISTANCE + radius_a + radius_b {
        return manifold;
    }
    let c_a = va.mul_add(radius_a, normal);
    let c_b = vb.mul_sub(radius_b, normal);
    manifold.normal = normal;
    manifold.push(ManifoldPoint {
        anchor_a: c_a.lerp(c_b, 0.5),
        separation: distance - radius_a - radius_b,
        id,
        ..Default::default()
    });
    manifold
}

#[inline]
fn next_index(i: usize, count: usize) -> usize {
    if i + 1 < count {
        i + 1
    } else {
        0
    }
}

/// Largest separation of `poly2` along the face normals of `poly1`
fn find_max_separation(poly1: &Polygon, poly2: &Polygon) -> (usize, f32) {
    let mut best_index = 0;
    let mut max_separation = -f32::MAX;

    for i in 0..poly1.count {
        let n = poly1.normals[i];
        let v1 = poly1.vertices[i];

        // Deepest point of poly2 for this normal
        let si = poly2.vertices[..poly2.count]
            .iter()
            .map(|&v2| n.dot(v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge of `poly` whose normal is most anti-parallel to `direction`
fn incident_edge(poly: &Polygon, direction: Vec2) -> usize {
    let mut edge = 0;
    let mut min_dot = f32::MAX;
    for i in 0..poly.count {
        let dot = direction.dot(poly.normals[i]);
        if dot < min_dot {
            min_dot = dot;
            edge = i;
        }
    }
    edge
}

/// Clip the incident edge against the side planes of the reference edge
fn clip_polygons(poly_a: &Polygon, poly_b: &Polygon, edge_a: usize, edge_b: usize, flip: bool) -> Manifold {
    let mut manifold = Manifold::default();

    // Reference polygon 1, incident polygon 2
    let (poly1, poly2, i11, i21) = if flip {
        (poly_b, poly_a, edge_b, edge_a)
    } else {
        (poly_a, poly_b, edge_a, edge_b)
    };
    let i12 = next_index(i11, poly1.count);
    let i22 = next_index(i21, poly2.count);

    let normal = poly1.normals[i11];

    let v11 = poly1.vertices[i11];
    let v12 = poly1.vertices[i12];
    let v21 = poly2.vertices[i21];
    let v22 = poly2.vertices[i22];

    let tangent = Vec2::scalar_cross(1.0, normal);

    let lower1 = 0.0;
    let upper1 = (v12 - v11).dot(tangent);

    // The incident edge runs opposite to the tangent
    let upper2 = (v21 - v11).dot(tangent);
    let lower2 = (v22 - v11).dot(tangent);

    let span = upper2 - lower2;
    let v_lower = if lower2 < lower1 && span > f32::EPSILON {
        v22.lerp(v21, (lower1 - lower2) / span)
    } else {
        v22
    };
    let v_upper = if upper2 > upper1 && span > f32::EPSILON {
        v22.lerp(v21, (upper1 - lower2) / span)
    } else {
        v21
    };

    let separation_lower = (v_lower - v11).dot(normal);
    let separation_upper = (v_upper - v11).dot(normal);

    // Put the points midway between the rounded surfaces
    let r1 = poly1.radius;
    let r2 = poly2.radius;
    let v_lower = v_lower.mul_add(0.5 * (r1 - r2 - separation_lower), normal);
    let v_upper = v_upper.mul_add(0.5 * (r1 - r2 - separation_upper), normal);

    let radius = r1 + r2;
    let lower = (v_lower, separation_lower - radius);
    let upper = (v_upper, separation_upper - radius);

    let (normal, candidates) = if flip {
        (-normal, [(upper, make_id(i21, i12)), (lower, make_id(i22, i11))])
    } else {
        (normal, [(lower, make_id(i11, i22)), (upper, make_id(i12, i21))])
    };

    manifold.normal = normal;
    for ((anchor, separation), id) in candidates {
        if separation <= SPECULATIVE_DISTANCE {
            manifold.push(ManifoldPoint {
                anchor_a: anchor,
                separation,
                id,
                ..Default::default()
            });
        }
    }
    manifold
}

/// Closest points between two segments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentDistance {
    pub closest1: Vec2,
    pub closest2: Vec2,
    pub fraction1: f32,
    pub fraction2: f32,
    pub distance_squared: f32,
}

/// Closest points between segments `p1 -> q1` and `p2 -> q2`
pub fn segment_distance(p1: Vec2, q1: Vec2, p2: Vec2, q2: Vec2) -> SegmentDistance {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let dd1 = d1.dot(d1);
    let dd2 = d2.dot(d2);
    let rd1 = r.dot(d1);
    let rd2 = r.dot(d2);

    let eps_sqr = f32::EPSILON * f32::EPSILON;

    let (f1, f2) = if dd1 < eps_sqr || dd2 < eps_sqr {
        if dd1 >= eps_sqr {
            // Segment 2 is a point
            ((-rd1 / dd1).clamp(0.0, 1.0), 0.0)
        } else if dd2 >= eps_sqr {
            // Segment 1 is a point
            (0.0, (rd2 / dd2).clamp(0.0, 1.0))
        } else {
            (0.0, 0.0)
        }
    } else {
        let d12 = d1.dot(d2);
        let denom = dd1 * dd2 - d12 * d12;

        // Zero when parallel
        let mut f1 = if denom != 0.0 {
            ((d12 * rd2 - rd1 * dd2) / denom).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Closest point on segment 2 to p1 + f1 * d1
        let mut f2 = (d12 * f1 + rd2) / dd2;

        // Clamping segment 2 requires recomputing segment 1
        if f2 < 0.0 {
            f2 = 0.0;
            f1 = (-rd1 / dd1).clamp(0.0, 1.0);
        } else if f2 > 1.0 {
            f2 = 1.0;
            f1 = ((d12 - rd1) / dd1).clamp(0.0, 1.0);
        }
        (f1, f2)
    };

    let closest1 = p1.mul_add(f1, d1);
    let closest2 = p2.mul_add(f2, d2);
    SegmentDistance {
        closest1,
        closest2,
        fraction1: f1,
        fraction2: f2,
        distance_squared: closest1.distance_squared(closest2),
    }
}

// Feature indices must fit in a byte of the point id
const _: () = assert!(MAX_POLYGON_VERTICES <= 255);
