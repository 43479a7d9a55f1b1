//! Normalized DLT and geometric degeneracy checks.

use nalgebra::{Matrix2, Matrix3, SMatrix, SVector, SymmetricEigen};

use crate::error::DegeneracyReason;

/// Relative spread below which a point set counts as collinear.
const COLLINEAR_EIG_RATIO: f64 = 1e-8;
/// Triangle area (in conditioned units) below which three points count as
/// collinear.
const COLLINEAR_TRIANGLE_AREA: f64 = 1e-3;

/// Hartley conditioning of a point set: the similarity that moves its
/// centroid to the origin and its mean radius to sqrt(2), together with the
/// principal spreads used for degeneracy checks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Conditioning {
    count: usize,
    centroid: [f64; 2],
    scale: f64,
    /// Smaller and larger eigenvalue of the centred second-moment matrix.
    spread: (f64, f64),
}

impl Conditioning {
    pub(crate) fn of(pts: &[[f64; 2]]) -> Self {
        let n = pts.len().max(1) as f64;
        let (sum_x, sum_y) = pts
            .iter()
            .fold((0.0, 0.0), |(ax, ay), p| (ax + p[0], ay + p[1]));
        let centroid = [sum_x / n, sum_y / n];

        let (mut radius, mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0);
        for p in pts {
            let (dx, dy) = (p[0] - centroid[0], p[1] - centroid[1]);
            radius += dx.hypot(dy);
            sxx += dx * dx;
            syy += dy * dy;
            sxy += dx * dy;
        }
        let mean_radius = radius / n;
        let scale = if mean_radius > 1e-15 {
            std::f64::consts::SQRT_2 / mean_radius
        } else {
            1.0
        };
        let eig = (Matrix2::new(sxx, sxy, sxy, syy) / n).symmetric_eigenvalues();

        Self {
            count: pts.len(),
            centroid,
            scale,
            spread: (eig[0].min(eig[1]), eig[0].max(eig[1])),
        }
    }

    pub(crate) fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        [
            self.scale * (p[0] - self.centroid[0]),
            self.scale * (p[1] - self.centroid[1]),
        ]
    }

    pub(crate) fn matrix(&self) -> Matrix3<f64> {
        let [cx, cy] = self.centroid;
        let s = self.scale;
        Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
    }

    /// Closed-form inverse of [`Self::matrix`]; `scale` is always positive.
    pub(crate) fn inverse_matrix(&self) -> Matrix3<f64> {
        let [cx, cy] = self.centroid;
        let r = 1.0 / self.scale;
        Matrix3::new(r, 0.0, cx, 0.0, r, cy, 0.0, 0.0, 1.0)
    }

    /// True when the set lies (numerically) on one line or one point.
    pub(crate) fn is_collinear(&self) -> bool {
        let (lo, hi) = self.spread;
        self.count < 3 || hi <= 1e-12 || lo.abs() <= COLLINEAR_EIG_RATIO * hi
    }
}

pub(crate) fn is_collinear_set(pts: &[[f64; 2]]) -> bool {
    Conditioning::of(pts).is_collinear()
}

/// True when any three of the four points are (nearly) collinear.
///
/// Areas are measured after conditioning, so the tolerance is scale-free.
pub(crate) fn has_collinear_triple(pts: &[[f64; 2]; 4]) -> bool {
    let cond = Conditioning::of(pts);
    let p = pts.map(|q| cond.apply(q));
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[a, b, c]| {
        let cross = (p[b][0] - p[a][0]) * (p[c][1] - p[a][1])
            - (p[b][1] - p[a][1]) * (p[c][0] - p[a][0]);
        0.5 * cross.abs() < COLLINEAR_TRIANGLE_AREA
    })
}

/// Estimate the homography H with `dst ≈ H(src)` from ≥4 correspondences.
///
/// Both sets are conditioned, the normal matrix AᵀA of the DLT system is
/// accumulated pair by pair, and its least-significant eigenvector is taken
/// as the conditioned solution. The result is scaled so that `h[(2,2)] == 1`
/// when possible. It is not validated; wrap it in
/// [`super::Homography::new`] before use.
pub(crate) fn estimate_homography_dlt(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<Matrix3<f64>, DegeneracyReason> {
    let n = src.len().min(dst.len());
    if n < 4 {
        return Err(DegeneracyReason::TooFewPoints { got: n });
    }
    let (src, dst) = (&src[..n], &dst[..n]);
    let from = Conditioning::of(src);
    let to = Conditioning::of(dst);
    if from.is_collinear() || to.is_collinear() {
        return Err(DegeneracyReason::CollinearPoints);
    }

    let mut normal = SMatrix::<f64, 9, 9>::zeros();
    for (s, d) in src.iter().zip(dst) {
        let [x, y] = from.apply(*s);
        let [u, v] = to.apply(*d);
        // Cross product of (u, v, 1) with H(x, y, 1), first two components.
        let eq_v = SVector::<f64, 9>::from([0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
        let eq_u = SVector::<f64, 9>::from([x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u]);
        normal += eq_v * eq_v.transpose() + eq_u * eq_u.transpose();
    }

    let eig = SymmetricEigen::new(normal);
    let null: SVector<f64, 9> = eig.eigenvectors.column(eig.eigenvalues.iamin()).into_owned();
    let conditioned = Matrix3::from_row_slice(null.as_slice());

    let h = to.inverse_matrix() * conditioned * from.matrix();
    if !h.iter().all(|v| v.is_finite()) {
        return Err(DegeneracyReason::NonFinite);
    }
    let scale = h[(2, 2)];
    Ok(if scale.abs() < 1e-15 { h } else { h / scale })
}
