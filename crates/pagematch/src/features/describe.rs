//! Rotated BRIEF descriptors.

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{Descriptor, PATCH_RADIUS};

const N_PAIRS: usize = 256;
/// Sample offsets are clipped so that any rotation stays inside the patch.
const MAX_OFFSET: f64 = 13.0;

/// 256 point-pair tests drawn from an isotropic Gaussian around the keypoint.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SamplingPattern {
    pairs: Vec<[i8; 4]>,
}

impl SamplingPattern {
    /// Deterministic for a given seed.
    pub(crate) fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        // sigma^2 = S^2 / 25 for patch size S = 31
        let sigma = (2 * PATCH_RADIUS + 1) as f64 / 5.0;
        let draw = |rng: &mut StdRng| -> i8 {
            let v: f64 = rng.sample(StandardNormal);
            (v * sigma).round().clamp(-MAX_OFFSET, MAX_OFFSET) as i8
        };

        let mut pairs = Vec::with_capacity(N_PAIRS);
        while pairs.len() < N_PAIRS {
            let p = [draw(&mut rng), draw(&mut rng), draw(&mut rng), draw(&mut rng)];
            if p[0] == p[2] && p[1] == p[3] {
                continue;
            }
            pairs.push(p);
        }
        Self { pairs }
    }

    /// Describe the keypoint at level coordinates (`x`, `y`) with orientation
    /// `angle` on a pre-smoothed level image.
    pub(crate) fn describe(&self, smoothed: &GrayImage, x: u32, y: u32, angle: f32) -> Descriptor {
        let (w, h) = smoothed.dimensions();
        let (sin_a, cos_a) = angle.sin_cos();
        let sample = |dx: i8, dy: i8| -> u8 {
            let (fx, fy) = (dx as f32, dy as f32);
            let rx = (fx * cos_a - fy * sin_a).round() as i32;
            let ry = (fx * sin_a + fy * cos_a).round() as i32;
            let px = (x as i32 + rx).clamp(0, w as i32 - 1) as u32;
            let py = (y as i32 + ry).clamp(0, h as i32 - 1) as u32;
            smoothed.get_pixel(px, py)[0]
        };

        let mut bits = [0u64; 4];
        for (i, p) in self.pairs.iter().enumerate() {
            if sample(p[0], p[1]) < sample(p[2], p[3]) {
                bits[i / 64] |= 1u64 << (i % 64);
            }
        }
        Descriptor(bits)
    }
}

pub(super) fn smooth_level(level: &GrayImage, sigma: f32) -> GrayImage {
    if sigma.is_finite() && sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(level, sigma)
    } else {
        level.clone()
    }
}
