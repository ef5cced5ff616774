//! 2x2 matrix used by point constraints

use crate::vector::Vec2;

/// Column-major 2x2 matrix
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mat22 {
    pub cx: Vec2,
    pub cy: Vec2,
}

impl Mat22 {
    pub const ZERO: Self = Self { cx: Vec2::ZERO, cy: Vec2::ZERO };

    #[inline]
    pub const fn new(cx: Vec2, cy: Vec2) -> Self {
        Self { cx, cy }
    }

    #[inline]
    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.cx.x * v.x + self.cy.x * v.y,
            self.cx.y * v.x + self.cy.y * v.y,
        )
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.cx.x * self.cy.y - self.cy.x * self.cx.y
    }

    /// Inverse, or zero when singular
    pub fn inverse(&self) -> Self {
        let (a, b, c, d) = (self.cx.x, self.cy.x, self.cx.y, self.cy.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Self {
            cx: Vec2::new(det * d, -det * c),
            cy: Vec2::new(-det * b, det * a),
        }
    }

    /// Solve `A * x = b`. Returns zero when singular.
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.cx.x, self.cy.x, self.cx.y, self.cy.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_matches_inverse() {
        let m = Mat22::new(Vec2::new(4.0, 1.0), Vec2::new(2.0, 3.0));
        let b = Vec2::new(1.0, -2.0);
        let x = m.solve(b);
        let y = m.inverse().mul_vec(b);
        assert_relative_eq!(x.x, y.x, epsilon = 1e-6);
        assert_relative_eq!(x.y, y.y, epsilon = 1e-6);
        let check = m.mul_vec(x);
        assert_relative_eq!(check.x, b.x, epsilon = 1e-5);
        assert_relative_eq!(check.y, b.y, epsilon = 1e-5);
    }

    #[test]
    fn test_singular_is_zero() {
        let m = Mat22::new(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(m.solve(Vec2::ONE), Vec2::ZERO);
    }
}
