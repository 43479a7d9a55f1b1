//! pagematch: register captured form pages onto a reference template.
//!
//! Given a photo or video frame of a known paper form, the crate recovers the
//! capture-to-template homography and resamples the capture into the
//! template's pixel grid, so that template coordinates (field boxes, OCR
//! regions, overlays) are valid on the rectified frame.
//!
//! The pipeline stages are:
//!
//! 1. **Normalize** – grayscale conversion plus optional smoothing stages.
//! 2. **Features** – pyramid FAST corners ranked by Harris response, oriented
//!    by intensity centroid, described by 256-bit rotated BRIEF strings.
//! 3. **Match** – brute-force Hamming matching with cross-check.
//! 4. **Estimate** – seeded RANSAC over normalized 4-point DLT, refit on
//!    inliers.
//! 5. **Rectify** – bilinear warp into the template grid.
//!
//! # Public API
//! - [`FeatureMatcher`] implementing the [`PageMatcher`] strategy trait
//! - [`TemplateStore`] / [`Template`] for the named template catalog
//! - [`FrameSource`] implementations for stills, files and sequences
//! - [`RegistrationConfig`] for tuning, loadable from JSON
//!
//! ```no_run
//! use pagematch::{FeatureMatcher, PageMatcher};
//!
//! let template = image::open("form.png").unwrap();
//! let capture = image::open("photo.jpg").unwrap();
//! let matcher = FeatureMatcher::new("intake", template);
//! let frame = matcher.register(&capture, None).unwrap();
//! frame.raster.save("rectified.png").unwrap();
//! ```

mod config;
mod error;
mod features;
mod homography;
mod matcher;
mod matching;
mod normalize;
mod rectify;
mod source;
mod template;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::RegistrationConfig;
pub use error::{ConfigError, DegeneracyReason, RegistrationError};
pub use features::{Descriptor, FeatureSet, Keypoint, OrbConfig, OrbExtractor};
pub use homography::{
    fit_homography_ransac, Homography, RansacHomographyConfig, RansacHomographyResult,
};
pub use matcher::{
    FeatureMatcher, MatchedPair, PageMatcher, RegisteredFrame, RegistrationDiagnostics,
    RegistrationReport, StageTimings,
};
pub use matching::{
    match_descriptors, Correspondence, MatchConfig, MatchPolicy, MIN_CORRESPONDENCES_FLOOR,
};
pub use normalize::{NormalizeStep, Normalizer, NormalizerConfig};
pub use rectify::{rectify, RectifyConfig, RectifyInterpolation};
pub use source::{
    FrameSequence, FrameSource, ImageFile, SequenceFrame, StillImage, DEFAULT_FRAME_PERIOD,
};
pub use template::{Template, TemplateStore};
