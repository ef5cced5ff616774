//! Convex hull of a small point cloud, the input to polygon construction

use planar_math::Vec2;

use crate::config::constants::{LINEAR_SLOP, MAX_POLYGON_VERTICES};

/// Counter-clockwise convex hull with at most `MAX_POLYGON_VERTICES` points.
/// An empty hull (`count == 0`) signals that the input was degenerate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hull {
    pub points: [Vec2; MAX_POLYGON_VERTICES],
    pub count: usize,
}

impl Default for Hull {
    fn default() -> Self {
        Self {
            points: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            count: 0,
        }
    }
}

impl Hull {
    pub fn points(&self) -> &[Vec2] {
        &self.points[..self.count]
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Compute the hull of 3..=8 points. Near-duplicate and collinear points are dropped.
///
/// Returns an empty hull when fewer than three usable points remain or the input
/// is larger than a polygon can hold.
pub fn compute_hull(points: &[Vec2]) -> Hull {
    let mut hull = Hull::default();
    if points.len() < 3 || points.len() > MAX_POLYGON_VERTICES {
        return hull;
    }

    // Weld close points
    let weld_tolerance = 16.0 * LINEAR_SLOP * LINEAR_SLOP;
    let mut unique: Vec<Vec2> = Vec::with_capacity(points.len());
    for &p in points {
        if !p.is_valid() {
            return hull;
        }
        if unique.iter().all(|q| q.distance_squared(p) >= weld_tolerance) {
            unique.push(p);
        }
    }
    if unique.len() < 3 {
        return hull;
    }

    unique.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));

    // Monotone chain; `<= 0` also drops exactly collinear points
    let mut chain: Vec<Vec2> = Vec::with_capacity(2 * unique.len());
    for &p in &unique {
        while chain.len() >= 2 && turn(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0 {
            chain.pop();
        }
        chain.push(p);
    }
    let lower_len = chain.len() + 1;
    for &p in unique.iter().rev().skip(1) {
        while chain.len() >= lower_len && turn(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0 {
            chain.pop();
        }
        chain.push(p);
    }
    chain.pop();

    // Drop nearly collinear points until stable
    let linear_tolerance = 2.0 * LINEAR_SLOP;
    loop {
        let n = chain.len();
        if n < 3 {
            return hull;
        }
        let mut removed = false;
        for i in 0..n {
            let p1 = chain[(i + n - 1) % n];
            let p2 = chain[i];
            let p3 = chain[(i + 1) % n];
            let e = (p3 - p1).normalize();
            let distance = (p2 - p1).cross(e);
            if distance <= linear_tolerance {
                chain.remove(i);
                removed = true;
                break;
            }
        }
        if !removed {
            break;
        }
    }

    hull.count = chain.len();
    hull.points[..chain.len()].copy_from_slice(&chain);
    hull
}

/// Check that a hull is counter-clockwise, strictly convex and free of collinear points
pub fn validate_hull(hull: &Hull) -> bool {
    if hull.count < 3 || hull.count > MAX_POLYGON_VERTICES {
        return false;
    }
    let points = hull.points();
    let n = points.len();

    // All points must be behind every edge
    for i in 0..n {
        let p1 = points[i];
        let p2 = points[(i + 1) % n];
        let e = (p2 - p1).normalize();
        for (j, &p) in points.iter().enumerate() {
            if j == i || j == (i + 1) % n {
                continue;
            }
            if e.cross(p - p1) <= 0.0 {
                return false;
            }
        }
    }

    // No collinear points
    let linear_tolerance = LINEAR_SLOP;
    for i in 0..n {
        let p1 = points[(i + n - 1) % n];
        let p2 = points[i];
        let p3 = points[(i + 1) % n];
        let e = (p3 - p1).normalize();
        if (p2 - p1).cross(e) <= linear_tolerance {
            return false;
        }
    }
    true
}

/// Positive for a left (counter-clockwise) turn
#[inline]
fn turn(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b - a).cross(c - a)
}
