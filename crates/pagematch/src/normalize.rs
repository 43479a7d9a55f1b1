//! Raster normalization ahead of feature extraction.
//!
//! Grayscale conversion always runs first. Additional stages are optional and
//! applied in configuration order; the default pipeline is grayscale only.

use image::{DynamicImage, GrayImage};

/// One optional post-grayscale normalization stage.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizeStep {
    /// Isotropic Gaussian smoothing.
    GaussianBlur { sigma: f32 },
    /// Square median filter, `radius` pixels in each direction.
    Median { radius: u32 },
    /// Global histogram equalization.
    EqualizeHistogram,
}

/// Normalizer configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Stages applied after grayscale conversion.
    pub steps: Vec<NormalizeStep>,
}

/// Converts arbitrary rasters into the single-channel form the feature
/// extractor consumes.
///
/// Pure and deterministic: the same input always yields the same output, with
/// the same width and height as the input.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn normalize(&self, raster: &DynamicImage) -> GrayImage {
        let mut gray = raster.to_luma8();
        for step in &self.config.steps {
            gray = apply_step(gray, *step);
        }
        gray
    }
}

fn apply_step(gray: GrayImage, step: NormalizeStep) -> GrayImage {
    match step {
        NormalizeStep::GaussianBlur { sigma } => {
            if !(sigma.is_finite() && sigma > 0.0) {
                tracing::warn!("skipping gaussian_blur stage with invalid sigma {}", sigma);
                return gray;
            }
            imageproc::filter::gaussian_blur_f32(&gray, sigma)
        }
        NormalizeStep::Median { radius } => {
            if radius == 0 {
                return gray;
            }
            imageproc::filter::median_filter(&gray, radius, radius)
        }
        NormalizeStep::EqualizeHistogram => imageproc::contrast::equalize_histogram(&gray),
    }
}
