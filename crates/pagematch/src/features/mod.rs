//! Oriented FAST / rotated BRIEF feature extraction.
//!
//! The extractor builds a scale pyramid, detects FAST-9 corners on every
//! level, keeps the strongest ones by Harris response under a per-level
//! budget, assigns an intensity-centroid orientation, and describes each
//! keypoint with a 256-bit rotated BRIEF string computed on a smoothed copy
//! of its level. Keypoint coordinates are always reported in level-0 pixels.

mod describe;
mod detect;

use image::GrayImage;

pub(crate) use describe::SamplingPattern;

/// Half-size of the square patch used for orientation and description.
pub(crate) const PATCH_RADIUS: i32 = 15;

/// Feature extraction parameters, shared by template and capture.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    /// Upper bound on keypoints retained across all pyramid levels.
    pub max_features: usize,
    /// Number of pyramid levels (level 0 is full resolution).
    pub n_levels: usize,
    /// Downscale ratio between consecutive levels. Must be > 1.
    pub scale_factor: f32,
    /// Minimum distance in level pixels between a keypoint and the border.
    pub edge_threshold: u32,
    /// FAST intensity threshold.
    pub fast_threshold: u8,
    /// Harris detector free parameter.
    pub harris_k: f32,
    /// Sigma of the Gaussian applied to each level before description.
    pub descriptor_blur_sigma: f32,
    /// Seed for the BRIEF sampling pattern. Template and capture must agree.
    pub pattern_seed: u64,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            max_features: 5000,
            n_levels: 8,
            scale_factor: 1.2,
            edge_threshold: 31,
            fast_threshold: 20,
            harris_k: 0.04,
            descriptor_blur_sigma: 2.0,
            pattern_seed: 0x0EB1_7E55,
        }
    }
}

/// A detected keypoint in level-0 pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Harris corner response at the detection level.
    pub response: f32,
    /// Dominant orientation in radians.
    pub angle: f32,
    /// Pyramid level the keypoint was detected on.
    pub octave: u8,
    /// Diameter of the described patch in level-0 pixels.
    pub size: f32,
}

/// A 256-bit binary descriptor stored as 4 x u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    pub fn zeros() -> Self {
        Self([0; 4])
    }

    /// Number of differing bits (0..=256).
    #[inline]
    pub fn hamming(&self, other: &Self) -> u32 {
        (self.0[0] ^ other.0[0]).count_ones()
            + (self.0[1] ^ other.0[1]).count_ones()
            + (self.0[2] ^ other.0[2]).count_ones()
            + (self.0[3] ^ other.0[3]).count_ones()
    }
}

/// Keypoints and their descriptors, index-aligned.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn point(&self, idx: usize) -> [f64; 2] {
        let kp = &self.keypoints[idx];
        [kp.x as f64, kp.y as f64]
    }

    /// Count of keypoints per pyramid level.
    pub fn octave_histogram(&self) -> Vec<usize> {
        let mut hist = Vec::new();
        for kp in &self.keypoints {
            let o = kp.octave as usize;
            if hist.len() <= o {
                hist.resize(o + 1, 0);
            }
            hist[o] += 1;
        }
        hist
    }
}

/// Owned, reusable ORB-style extractor.
///
/// The sampling pattern is generated once at construction; extraction itself
/// takes `&self` and may run from several threads at once.
#[derive(Debug, Clone)]
pub struct OrbExtractor {
    config: OrbConfig,
    pattern: SamplingPattern,
}

impl Default for OrbExtractor {
    fn default() -> Self {
        Self::new(OrbConfig::default())
    }
}

impl OrbExtractor {
    pub fn new(config: OrbConfig) -> Self {
        let pattern = SamplingPattern::generate(config.pattern_seed);
        Self { config, pattern }
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    /// Detect and describe features on a normalized grayscale raster.
    pub fn extract(&self, gray: &GrayImage) -> FeatureSet {
        let levels = detect::build_pyramid(gray, &self.config);
        let budgets = detect::level_budgets(&self.config, levels.len());

        let mut out = FeatureSet::default();
        for (level, budget) in levels.iter().zip(budgets) {
            if budget == 0 {
                continue;
            }
            let candidates = detect::detect_level(level, budget, &self.config);
            if candidates.is_empty() {
                continue;
            }
            let smoothed = describe::smooth_level(&level.image, self.config.descriptor_blur_sigma);
            for c in candidates {
                let desc = self.pattern.describe(&smoothed, c.x, c.y, c.angle);
                out.keypoints.push(Keypoint {
                    x: c.x as f32 * level.scale[0],
                    y: c.y as f32 * level.scale[1],
                    response: c.response,
                    angle: c.angle,
                    octave: level.octave,
                    size: (2 * PATCH_RADIUS + 1) as f32 * level.scale[0],
                });
                out.descriptors.push(desc);
            }
        }

        tracing::debug!(
            "extracted {} keypoints over {} levels from {}x{} raster",
            out.len(),
            levels.len(),
            gray.width(),
            gray.height()
        );
        out
    }
}
