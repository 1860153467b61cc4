//! Four-corner frames and the bilinear mapping between them and `[0, 1]^2`.

use nalgebra::{Matrix2, Point2, Vector2};
use serde::{Deserialize, Serialize};

const INVERSE_MAX_ITERS: usize = 20;
const INVERSE_TOL: f32 = 1e-6;

/// A quadrilateral given by its corners, in any coordinate system (pixels or
/// millimeters).
///
/// `relative_to_pixel(u, v)` maps the unit square onto the quad bilinearly:
/// `u` runs from the left edge to the right edge and `v` from the top edge to
/// the bottom edge. For an axis-aligned rectangle this is exactly
/// `origin + fraction * (opposite - origin)` per axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageFrame {
    pub top_left: Point2<f32>,
    pub top_right: Point2<f32>,
    pub bottom_right: Point2<f32>,
    pub bottom_left: Point2<f32>,
}

impl PageFrame {
    pub fn new(
        top_left: Point2<f32>,
        top_right: Point2<f32>,
        bottom_right: Point2<f32>,
        bottom_left: Point2<f32>,
    ) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Axis-aligned rectangle from `(x0, y0)` to `(x1, y1)`.
    pub fn from_rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::new(
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        )
    }

    /// Corners in TL, TR, BR, BL order.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    #[inline]
    pub fn relative_to_pixel(&self, u: f32, v: f32) -> Point2<f32> {
        let top = self.top_left.coords.lerp(&self.top_right.coords, u);
        let bottom = self.bottom_left.coords.lerp(&self.bottom_right.coords, u);
        Point2::from(top.lerp(&bottom, v))
    }

    /// Inverse of [`relative_to_pixel`](Self::relative_to_pixel) by Newton
    /// iteration. Returns `None` when the quad is degenerate near `p` or the
    /// iteration does not converge.
    pub fn pixel_to_relative(&self, p: Point2<f32>) -> Option<(f32, f32)> {
        let (a, b, c, d) = self.bilinear_terms();
        let target = p.coords - a;
        let mut uv = Vector2::new(0.5_f32, 0.5);
        for _ in 0..INVERSE_MAX_ITERS {
            let (u, v) = (uv.x, uv.y);
            let residual = b * u + c * v + d * (u * v) - target;
            if residual.norm() < INVERSE_TOL * self.scale().max(1.0) {
                return Some((u, v));
            }
            let jac = Matrix2::from_columns(&[b + d * v, c + d * u]);
            let step = jac.try_inverse()? * residual;
            uv -= step;
            if !uv.x.is_finite() || !uv.y.is_finite() {
                return None;
            }
        }
        let residual = b * uv.x + c * uv.y + d * (uv.x * uv.y) - target;
        (residual.norm() < 1e-3 * self.scale().max(1.0)).then_some((uv.x, uv.y))
    }

    // p(u, v) = a + b u + c v + d u v
    fn bilinear_terms(&self) -> (Vector2<f32>, Vector2<f32>, Vector2<f32>, Vector2<f32>) {
        let a = self.top_left.coords;
        let b = self.top_right.coords - a;
        let c = self.bottom_left.coords - a;
        let d = self.bottom_right.coords - self.top_right.coords - self.bottom_left.coords + a;
        (a, b, c, d)
    }

    /// Mean horizontal extent (top and bottom edges).
    pub fn mean_width(&self) -> f32 {
        0.5 * ((self.top_right - self.top_left).norm()
            + (self.bottom_right - self.bottom_left).norm())
    }

    /// Mean vertical extent (left and right edges).
    pub fn mean_height(&self) -> f32 {
        0.5 * ((self.bottom_left - self.top_left).norm()
            + (self.bottom_right - self.top_right).norm())
    }

    fn scale(&self) -> f32 {
        self.mean_width().max(self.mean_height())
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f32 {
        let h = self.mean_height();
        if h <= f32::EPSILON {
            return f32::INFINITY;
        }
        self.mean_width() / h
    }

    /// Shoelace area; positive for clockwise-in-image (y down) corner order.
    pub fn signed_area(&self) -> f32 {
        let c = self.corners();
        let mut acc = 0.0;
        for i in 0..4 {
            let p = c[i];
            let q = c[(i + 1) % 4];
            acc += p.x * q.y - q.x * p.y;
        }
        0.5 * acc
    }

    /// True when any side is shorter than `min_side`, the corners are not in
    /// TL, TR, BR, BL order, or the quad is not convex.
    pub fn is_degenerate(&self, min_side: f32) -> bool {
        let c = self.corners();
        let mut sign = 0.0_f32;
        for i in 0..4 {
            let p = c[i];
            let q = c[(i + 1) % 4];
            let r = c[(i + 2) % 4];
            if (q - p).norm() < min_side {
                return true;
            }
            let e1 = q - p;
            let e2 = r - q;
            let cross = e1.x * e2.y - e1.y * e2.x;
            if cross.abs() <= f32::EPSILON {
                return true;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return true;
            }
        }
        self.signed_area() <= 0.0
    }
}
