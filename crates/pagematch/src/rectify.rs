//! Warping a normalized capture into the template pixel grid.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

use crate::error::DegeneracyReason;
use crate::homography::Homography;

/// Resampling kernel used when rectifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RectifyInterpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
}

impl From<RectifyInterpolation> for Interpolation {
    fn from(i: RectifyInterpolation) -> Self {
        match i {
            RectifyInterpolation::Nearest => Interpolation::Nearest,
            RectifyInterpolation::Bilinear => Interpolation::Bilinear,
            RectifyInterpolation::Bicubic => Interpolation::Bicubic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    pub interpolation: RectifyInterpolation,
    /// Value written where the template grid maps outside the capture.
    pub fill: u8,
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            interpolation: RectifyInterpolation::Bilinear,
            fill: 0,
        }
    }
}

/// Resample `capture` onto a `width` × `height` template grid.
///
/// `h` maps capture pixels to template pixels; each output pixel samples the
/// capture at `h⁻¹(x, y)`.
pub fn rectify(
    capture: &GrayImage,
    h: &Homography,
    width: u32,
    height: u32,
    config: &RectifyConfig,
) -> Result<GrayImage, DegeneracyReason> {
    let projection =
        Projection::from_matrix(h.to_f32_row_major()).ok_or(DegeneracyReason::NonInvertible)?;
    let mut out = GrayImage::from_pixel(width, height, Luma([config.fill]));
    warp_into(
        capture,
        &projection,
        config.interpolation.into(),
        Luma([config.fill]),
        &mut out,
    );
    Ok(out)
}
