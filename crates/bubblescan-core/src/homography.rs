//! Planar projective transforms between page millimeters and image pixels.

use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector2, Vector3};
use std::f64::consts::SQRT_2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Pure scale + translation, e.g. page millimeters to a scan of known DPI.
    pub fn scale_translate(sx: f64, sy: f64, tx: f64, ty: f64) -> Self {
        Self::new(Matrix3::new(sx, 0.0, tx, 0.0, sy, ty, 0.0, 0.0, 1.0))
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// Local isotropic scale at `p`: square root of the Jacobian determinant,
    /// i.e. destination units per source unit around that point.
    pub fn local_scale(&self, p: Point2<f32>) -> f64 {
        let x = p.x as f64;
        let y = p.y as f64;
        let h = &self.h;
        let w = h[(2, 0)] * x + h[(2, 1)] * y + h[(2, 2)];
        if w.abs() < 1e-12 {
            return 0.0;
        }
        let u = (h[(0, 0)] * x + h[(0, 1)] * y + h[(0, 2)]) / w;
        let v = (h[(1, 0)] * x + h[(1, 1)] * y + h[(1, 2)]) / w;
        let dudx = (h[(0, 0)] - u * h[(2, 0)]) / w;
        let dudy = (h[(0, 1)] - u * h[(2, 1)]) / w;
        let dvdx = (h[(1, 0)] - v * h[(2, 0)]) / w;
        let dvdy = (h[(1, 1)] - v * h[(2, 1)]) / w;
        (dudx * dvdy - dudy * dvdx).abs().sqrt()
    }

    /// Root-mean-square distance between `apply(src[i])` and `dst[i]`.
    pub fn reprojection_rms(&self, src: &[Point2<f32>], dst: &[Point2<f32>]) -> f64 {
        if src.is_empty() || src.len() != dst.len() {
            return f64::INFINITY;
        }
        let sum: f64 = src
            .iter()
            .zip(dst)
            .map(|(s, d)| {
                let p = self.apply(*s);
                let dx = (p.x - d.x) as f64;
                let dy = (p.y - d.y) as f64;
                dx * dx + dy * dy
            })
            .sum();
        (sum / src.len() as f64).sqrt()
    }
}

/// Similarity moving a point set onto its centroid with a mean distance of
/// sqrt(2) from the origin. The DLT system is solved in these coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Conditioning {
    center: Vector2<f64>,
    scale: f64,
}

impl Conditioning {
    fn fit(pts: &[Point2<f32>]) -> Self {
        let n = pts.len().max(1) as f64;
        let center = pts
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + Vector2::new(p.x as f64, p.y as f64))
            / n;
        let spread = pts
            .iter()
            .map(|p| (Vector2::new(p.x as f64, p.y as f64) - center).norm())
            .sum::<f64>()
            / n;
        let scale = if spread > 1e-12 { SQRT_2 / spread } else { 1.0 };
        Self { center, scale }
    }

    fn point(&self, p: Point2<f32>) -> Vector2<f64> {
        (Vector2::new(p.x as f64, p.y as f64) - self.center) * self.scale
    }

    fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        Matrix3::new(
            s, 0.0, -s * self.center.x, //
            0.0, s, -s * self.center.y, //
            0.0, 0.0, 1.0,
        )
    }

    fn inverse_matrix(&self) -> Matrix3<f64> {
        let r = 1.0 / self.scale;
        Matrix3::new(
            r, 0.0, self.center.x, //
            0.0, r, self.center.y, //
            0.0, 0.0, 1.0,
        )
    }
}

/// The two linear constraints one correspondence puts on the row-major
/// entries of H.
fn constraint_rows(s: Vector2<f64>, d: Vector2<f64>) -> [SVector<f64, 9>; 2] {
    let (x, y) = (s.x, s.y);
    [
        SVector::from_column_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -d.x * x, -d.x * y, -d.x]),
        SVector::from_column_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -d.y * x, -d.y * y, -d.y]),
    ]
}

/// Least-squares DLT shared by the four-point and many-point entry points.
///
/// Accumulates the normal matrix of all constraint rows and takes the
/// eigenvector of its smallest eigenvalue. Returns `None` when the
/// correspondences leave more than one solution.
fn solve_dlt(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    let cs = Conditioning::fit(src);
    let cd = Conditioning::fit(dst);

    let normal = src
        .iter()
        .zip(dst)
        .flat_map(|(s, d)| constraint_rows(cs.point(*s), cd.point(*d)))
        .fold(SMatrix::<f64, 9, 9>::zeros(), |m, r| m + r * r.transpose());

    let eig = normal.symmetric_eigen();
    let mut order: Vec<usize> = (0..9).collect();
    order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let largest = eig.eigenvalues[order[8]];
    if !largest.is_finite() || largest <= 0.0 || eig.eigenvalues[order[1]] < 1e-10 * largest {
        return None;
    }

    let h = eig.eigenvectors.column(order[0]);
    let conditioned = Matrix3::from_fn(|r, c| h[3 * r + c]);
    let h = cd.inverse_matrix() * conditioned * cs.matrix();

    let w = h[(2, 2)];
    if w.abs() < 1e-12 {
        return None;
    }
    let h = h / w;
    h.iter().all(|v| v.is_finite()).then(|| Homography::new(h))
}

/// Estimate H such that `dst ~ H * src` from at least four correspondences.
///
/// Exactly four points go through [`homography_from_4pt`] and its
/// collinearity check; more are fitted in the least-squares sense.
pub fn estimate_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    match (<&[_; 4]>::try_from(src), <&[_; 4]>::try_from(dst)) {
        (Ok(s), Ok(d)) => homography_from_4pt(s, d),
        _ => solve_dlt(src, dst),
    }
}

fn has_collinear_triple(pts: &[Point2<f32>; 4]) -> bool {
    let span = pts
        .iter()
        .flat_map(|a| pts.iter().map(move |b| (a - b).norm()))
        .fold(0.0_f32, f32::max) as f64;
    if span < 1e-9 {
        return true;
    }
    let tol = 1e-6 * span * span;
    [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)]
        .into_iter()
        .any(|(i, j, k)| {
            let ab = pts[j] - pts[i];
            let ac = pts[k] - pts[i];
            let cross = (ab.x as f64) * (ac.y as f64) - (ab.y as f64) * (ac.x as f64);
            cross.abs() < tol
        })
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Returns `None`
/// when three of the points are collinear.
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    if has_collinear_triple(src) || has_collinear_triple(dst) {
        return None;
    }
    solve_dlt(src, dst)
}
