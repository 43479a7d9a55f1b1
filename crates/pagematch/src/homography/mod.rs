//! Planar homography: validated type, DLT estimation, robust fitting.
//!
//! Throughout the crate the homography maps **capture** pixel coordinates to
//! **template** pixel coordinates, so reprojection errors are measured in
//! template pixels.

mod core;
mod ransac;

use nalgebra::{Matrix3, Vector3};

use crate::error::DegeneracyReason;

pub(crate) use self::core::estimate_homography_dlt;
pub use ransac::{fit_homography_ransac, RansacHomographyConfig, RansacHomographyResult};

/// Scale-free determinant bound below which a matrix counts as singular.
const MIN_NORMALIZED_DET: f64 = 1e-14;

/// Project `p` through a raw 3×3 matrix. Returns NaN at the line at infinity.
pub(crate) fn project_raw(h: &Matrix3<f64>, p: [f64; 2]) -> [f64; 2] {
    let v = h * Vector3::new(p[0], p[1], 1.0);
    if v[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [v[0] / v[2], v[1] / v[2]]
}

/// A finite, invertible 3×3 projective transform.
///
/// Only obtainable through [`Homography::new`] (or `identity`), so holders may
/// rely on the invariant. Serialized as a row-major `[[f64; 3]; 3]`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(into = "[[f64; 3]; 3]", try_from = "[[f64; 3]; 3]")]
pub struct Homography {
    h: Matrix3<f64>,
    h_inv: Matrix3<f64>,
}

fn unit_scale(m: Matrix3<f64>) -> Matrix3<f64> {
    let s = m[(2, 2)];
    if s.abs() > 1e-15 {
        m / s
    } else {
        m
    }
}

impl Homography {
    /// Validate and wrap a matrix. The result is scaled so `h[(2,2)] == 1`
    /// when that entry is non-zero.
    pub fn new(m: Matrix3<f64>) -> Result<Self, DegeneracyReason> {
        if !m.iter().all(|v| v.is_finite()) {
            return Err(DegeneracyReason::NonFinite);
        }
        let norm = m.norm();
        if norm < 1e-300 || (m / norm).determinant().abs() < MIN_NORMALIZED_DET {
            return Err(DegeneracyReason::NonInvertible);
        }
        let inv = m.try_inverse().ok_or(DegeneracyReason::NonInvertible)?;
        if !inv.iter().all(|v| v.is_finite()) {
            return Err(DegeneracyReason::NonInvertible);
        }
        Ok(Self {
            h: unit_scale(m),
            h_inv: unit_scale(inv),
        })
    }

    pub fn identity() -> Self {
        Self {
            h: Matrix3::identity(),
            h_inv: Matrix3::identity(),
        }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        let m = &self.h;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Map a capture point into template coordinates.
    pub fn project(&self, p: [f64; 2]) -> [f64; 2] {
        project_raw(&self.h, p)
    }

    /// The template-to-capture transform.
    pub fn inverse(&self) -> Self {
        Self {
            h: self.h_inv,
            h_inv: self.h,
        }
    }

    /// Euclidean distance between `project(src)` and `dst`.
    pub fn reprojection_error(&self, src: [f64; 2], dst: [f64; 2]) -> f64 {
        let p = self.project(src);
        let (dx, dy) = (p[0] - dst[0], p[1] - dst[1]);
        (dx * dx + dy * dy).sqrt()
    }

    /// Row-major f32 entries, the layout `imageproc` projections expect.
    pub(crate) fn to_f32_row_major(&self) -> [f32; 9] {
        let a = self.to_array();
        [
            a[0][0] as f32, a[0][1] as f32, a[0][2] as f32,
            a[1][0] as f32, a[1][1] as f32, a[1][2] as f32,
            a[2][0] as f32, a[2][1] as f32, a[2][2] as f32,
        ]
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_array()
    }
}

impl TryFrom<[[f64; 3]; 3]> for Homography {
    type Error = DegeneracyReason;

    fn try_from(a: [[f64; 3]; 3]) -> Result<Self, Self::Error> {
        Homography::new(Matrix3::new(
            a[0][0], a[0][1], a[0][2],
            a[1][0], a[1][1], a[1][2],
            a[2][0], a[2][1], a[2][2],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_singular_and_non_finite() {
        let singular = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        assert_eq!(Homography::new(singular), Err(DegeneracyReason::NonInvertible));
        assert_eq!(
            Homography::new(Matrix3::zeros()),
            Err(DegeneracyReason::NonInvertible)
        );
        let mut bad = Matrix3::identity();
        bad[(0, 2)] = f64::NAN;
        assert_eq!(Homography::new(bad), Err(DegeneracyReason::NonFinite));
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = Homography::new(Matrix3::new(
            1.02, 0.05, 12.0, -0.04, 0.97, -8.0, 1e-5, 2e-5, 1.0,
        ))
        .unwrap();
        let p = [311.0, 207.5];
        let q = h.inverse().project(h.project(p));
        assert_relative_eq!(p[0], q[0], epsilon = 1e-9);
        assert_relative_eq!(p[1], q[1], epsilon = 1e-9);
    }

    #[test]
    fn serializes_row_major() {
        let h = Homography::new(Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, -3.0, 0.0, 0.0, 1.0)).unwrap();
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, "[[1.0,0.0,5.0],[0.0,1.0,-3.0],[0.0,0.0,1.0]]");
        let back: Homography = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);

        let singular = "[[0.0,0.0,0.0],[0.0,0.0,0.0],[0.0,0.0,0.0]]";
        assert!(serde_json::from_str::<Homography>(singular).is_err());
    }
}
