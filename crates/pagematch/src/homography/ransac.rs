//! Seeded RANSAC over 4-point DLT models.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::core::{estimate_homography_dlt, has_collinear_triple, is_collinear_set};
use super::{project_raw, Homography};
use crate::error::DegeneracyReason;

const SAMPLE_SIZE: usize = 4;

/// RANSAC configuration for homography fitting.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RansacHomographyConfig {
    /// Maximum number of RANSAC iterations.
    pub max_iters: usize,
    /// Inlier threshold (reprojection error in template pixels).
    pub inlier_threshold: f64,
    /// Minimum number of inliers for a valid model. Never below 4.
    pub min_inliers: usize,
    /// Probability that at least one all-inlier sample is drawn; drives the
    /// adaptive iteration count. Values outside (0, 1) disable adaptation.
    pub confidence: f64,
    /// Random seed.
    pub seed: u64,
}

impl Default for RansacHomographyConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 5.0,
            min_inliers: 6,
            confidence: 0.995,
            seed: 0,
        }
    }
}

/// Result of RANSAC homography fitting.
#[derive(Debug, Clone)]
pub struct RansacHomographyResult {
    /// Capture-to-template homography refit on the consensus set.
    pub h: Homography,
    /// True for inliers of the final model.
    pub inlier_mask: Vec<bool>,
    pub n_inliers: usize,
    /// Reprojection error of every correspondence under `h`.
    pub errors: Vec<f64>,
    /// Hypotheses evaluated (degenerate samples included).
    pub iterations: usize,
}

impl RansacHomographyResult {
    pub fn inlier_ratio(&self) -> f64 {
        if self.inlier_mask.is_empty() {
            0.0
        } else {
            self.n_inliers as f64 / self.inlier_mask.len() as f64
        }
    }

    /// Mean reprojection error over inliers, in template pixels.
    pub fn mean_inlier_error(&self) -> f64 {
        let (sum, n) = self
            .errors
            .iter()
            .zip(&self.inlier_mask)
            .filter(|(_, m)| **m)
            .fold((0.0, 0usize), |(s, n), (e, _)| (s + e, n + 1));
        if n == 0 {
            f64::NAN
        } else {
            sum / n as f64
        }
    }
}

/// Iterations needed to draw one all-inlier sample with `confidence`, given
/// the current inlier fraction.
fn adaptive_iterations(inlier_fraction: f64, confidence: f64, cap: usize) -> usize {
    if !(confidence > 0.0 && confidence < 1.0) {
        return cap;
    }
    let p_good = inlier_fraction.powi(SAMPLE_SIZE as i32);
    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    if p_good <= f64::EPSILON {
        return cap;
    }
    let n = (1.0 - confidence).ln() / (1.0 - p_good).ln();
    if n.is_finite() {
        (n.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}

/// Partial Fisher–Yates draw of `SAMPLE_SIZE` distinct indices. `pool` holds
/// a permutation of `0..n` and is left permuted for the next draw.
fn sample_indices(rng: &mut StdRng, pool: &mut [usize]) -> [usize; SAMPLE_SIZE] {
    let n = pool.len();
    let mut out = [0usize; SAMPLE_SIZE];
    for (i, slot) in out.iter_mut().enumerate() {
        let j = rng.gen_range(i..n);
        pool.swap(i, j);
        *slot = pool[i];
    }
    out
}

fn score(
    h: &nalgebra::Matrix3<f64>,
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    thresh: f64,
) -> (usize, Vec<bool>, Vec<f64>) {
    let mut mask = vec![false; src.len()];
    let mut errors = vec![f64::INFINITY; src.len()];
    let mut count = 0usize;
    for i in 0..src.len() {
        let p = project_raw(h, src[i]);
        let err = ((p[0] - dst[i][0]).powi(2) + (p[1] - dst[i][1]).powi(2)).sqrt();
        if err.is_finite() {
            errors[i] = err;
            if err < thresh {
                mask[i] = true;
                count += 1;
            }
        }
    }
    (count, mask, errors)
}

/// Fit a homography with `dst ≈ H(src)` robustly.
///
/// `src`: capture points. `dst`: template points, index-aligned with `src`.
/// The RNG is seeded from the config, so identical inputs give identical
/// results.
pub fn fit_homography_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    config: &RansacHomographyConfig,
) -> Result<RansacHomographyResult, DegeneracyReason> {
    let n = src.len().min(dst.len());
    if n < SAMPLE_SIZE {
        return Err(DegeneracyReason::TooFewPoints { got: n });
    }
    let (src, dst) = (&src[..n], &dst[..n]);
    if is_collinear_set(src) || is_collinear_set(dst) {
        return Err(DegeneracyReason::CollinearPoints);
    }
    let min_inliers = config.min_inliers.max(SAMPLE_SIZE);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut pool: Vec<usize> = (0..n).collect();

    let cap = config.max_iters.max(1);
    let mut budget = cap;
    let mut iterations = 0usize;
    let mut degenerate_samples = 0usize;
    let mut best_inliers = 0usize;
    let mut best_mask: Vec<bool> = vec![false; n];

    while iterations < budget {
        iterations += 1;
        let idx = sample_indices(&mut rng, &mut pool);
        let s4 = idx.map(|i| src[i]);
        let d4 = idx.map(|i| dst[i]);
        if has_collinear_triple(&s4) || has_collinear_triple(&d4) {
            degenerate_samples += 1;
            tracing::trace!("ransac sample {:?} rejected: collinear triple", idx);
            continue;
        }

        let h = match estimate_homography_dlt(&s4, &d4) {
            Ok(h) => h,
            Err(reason) => {
                degenerate_samples += 1;
                tracing::trace!("ransac sample {:?} rejected: {}", idx, reason);
                continue;
            }
        };

        let (count, mask, _) = score(&h, src, dst, config.inlier_threshold);
        if count > best_inliers {
            best_inliers = count;
            best_mask = mask;
            budget = adaptive_iterations(count as f64 / n as f64, config.confidence, cap);
        }
    }

    if best_inliers == 0 && degenerate_samples == iterations {
        return Err(DegeneracyReason::CollinearPoints);
    }
    if best_inliers < min_inliers {
        return Err(DegeneracyReason::TooFewInliers {
            needed: min_inliers,
            found: best_inliers,
        });
    }

    // Refit on the consensus set, then re-score once with the refit model.
    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let refit = estimate_homography_dlt(&inlier_src, &inlier_dst)?;
    let h = Homography::new(refit)?;
    let (n_inliers, inlier_mask, errors) = score(h.matrix(), src, dst, config.inlier_threshold);

    if n_inliers < min_inliers {
        return Err(DegeneracyReason::TooFewInliers {
            needed: min_inliers,
            found: n_inliers,
        });
    }

    tracing::debug!(
        "ransac: {}/{} inliers after {} iterations ({} degenerate samples)",
        n_inliers,
        n,
        iterations,
        degenerate_samples
    );

    Ok(RansacHomographyResult {
        h,
        inlier_mask,
        n_inliers,
        errors,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn make_test_homography() -> Matrix3<f64> {
        Matrix3::new(
            0.95, -0.12, 40.0,
            0.11, 0.97, -15.0,
            0.00003, 0.00002, 1.0,
        )
    }

    fn inlier_grid(h: &Matrix3<f64>, rng: &mut StdRng) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..40 {
            let s = [(i % 8) as f64 * 90.0 + 20.0, (i / 8) as f64 * 110.0 + 30.0];
            let d = project_raw(h, s);
            src.push(s);
            dst.push([d[0] + rng.gen_range(-0.5..0.5), d[1] + rng.gen_range(-0.5..0.5)]);
        }
        (src, dst)
    }

    #[test]
    fn ransac_with_outliers() {
        let h_true = make_test_homography();
        let mut rng = StdRng::seed_from_u64(42);
        let (mut src, mut dst) = inlier_grid(&h_true, &mut rng);
        for _ in 0..25 {
            src.push([rng.gen_range(0.0..800.0), rng.gen_range(0.0..600.0)]);
            dst.push([rng.gen_range(0.0..800.0), rng.gen_range(0.0..600.0)]);
        }

        let result = fit_homography_ransac(&src, &dst, &RansacHomographyConfig::default()).unwrap();
        assert!(result.n_inliers >= 40, "inliers: {}", result.n_inliers);
        assert!(result.inlier_mask[..40].iter().all(|&m| m));
        assert!(result.mean_inlier_error() < 1.0);

        for corner in [[0.0, 0.0], [800.0, 0.0], [800.0, 600.0], [0.0, 600.0]] {
            let est = result.h.project(corner);
            let truth = project_raw(&h_true, corner);
            let err = ((est[0] - truth[0]).powi(2) + (est[1] - truth[1]).powi(2)).sqrt();
            assert!(err < 2.0, "corner error {}", err);
        }
    }

    #[test]
    fn ransac_is_deterministic() {
        let h_true = make_test_homography();
        let mut rng = StdRng::seed_from_u64(7);
        let (mut src, mut dst) = inlier_grid(&h_true, &mut rng);
        for _ in 0..30 {
            src.push([rng.gen_range(0.0..800.0), rng.gen_range(0.0..600.0)]);
            dst.push([rng.gen_range(0.0..800.0), rng.gen_range(0.0..600.0)]);
        }
        let cfg = RansacHomographyConfig::default();
        let a = fit_homography_ransac(&src, &dst, &cfg).unwrap();
        let b = fit_homography_ransac(&src, &dst, &cfg).unwrap();
        assert_eq!(a.h, b.h);
        assert_eq!(a.inlier_mask, b.inlier_mask);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn adaptive_budget_stops_early_on_clean_data() {
        let h_true = make_test_homography();
        let mut rng = StdRng::seed_from_u64(3);
        let (src, dst) = inlier_grid(&h_true, &mut rng);
        let result = fit_homography_ransac(&src, &dst, &RansacHomographyConfig::default()).unwrap();
        assert_eq!(result.n_inliers, 40);
        assert!(result.iterations < 50, "iterations: {}", result.iterations);
    }

    #[test]
    fn too_few_points_is_degenerate() {
        let pts = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let err = fit_homography_ransac(&pts, &pts, &RansacHomographyConfig::default()).unwrap_err();
        assert_eq!(err, DegeneracyReason::TooFewPoints { got: 3 });
    }

    #[test]
    fn collinear_input_is_degenerate() {
        let src: Vec<[f64; 2]> = (0..20).map(|i| [i as f64 * 7.0, 3.0]).collect();
        let dst: Vec<[f64; 2]> = (0..20).map(|i| [i as f64 * 6.0 + 1.0, 9.0]).collect();
        let err = fit_homography_ransac(&src, &dst, &RansacHomographyConfig::default()).unwrap_err();
        assert_eq!(err, DegeneracyReason::CollinearPoints);
    }

    #[test]
    fn pure_noise_has_too_few_inliers() {
        let mut rng = StdRng::seed_from_u64(99);
        let src: Vec<[f64; 2]> = (0..30)
            .map(|_| [rng.gen_range(0.0..800.0), rng.gen_range(0.0..600.0)])
            .collect();
        let dst: Vec<[f64; 2]> = (0..30)
            .map(|_| [rng.gen_range(0.0..800.0), rng.gen_range(0.0..600.0)])
            .collect();
        let cfg = RansacHomographyConfig {
            inlier_threshold: 1.0,
            min_inliers: 12,
            ..RansacHomographyConfig::default()
        };
        let err = fit_homography_ransac(&src, &dst, &cfg).unwrap_err();
        assert!(matches!(err, DegeneracyReason::TooFewInliers { needed: 12, .. }));
    }

    #[test]
    fn adaptive_iterations_bounds() {
        assert_eq!(adaptive_iterations(1.0, 0.995, 2000), 1);
        assert_eq!(adaptive_iterations(0.0, 0.995, 2000), 2000);
        let half = adaptive_iterations(0.5, 0.995, 2000);
        assert!((80..=90).contains(&half), "{}", half);
        assert_eq!(adaptive_iterations(0.5, 1.0, 2000), 2000);
    }
}
