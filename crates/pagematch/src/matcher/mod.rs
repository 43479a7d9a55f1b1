//! Registration orchestration.
//!
//! [`PageMatcher`] is the strategy seam; [`FeatureMatcher`] is the
//! feature + RANSAC strategy. A registration call runs:
//!
//! 1. resolve an `Arc<Template>` snapshot (once, used for the whole call),
//! 2. normalize the capture and extract its features,
//! 3. match capture descriptors against the template's cached descriptors,
//! 4. fit a capture-to-template homography with RANSAC,
//! 5. warp the normalized capture into the template grid.

use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, GrayImage};

use crate::config::RegistrationConfig;
use crate::error::RegistrationError;
use crate::features::OrbExtractor;
use crate::homography::{fit_homography_ransac, Homography, RansacHomographyResult};
use crate::matching::match_descriptors;
use crate::normalize::Normalizer;
use crate::rectify::rectify;
use crate::source::FrameSource;
use crate::template::{Template, TemplateStore};


/// Strategy interface for page registration.
pub trait PageMatcher: Send + Sync {
    /// Build a template from `reference` with this matcher's normalizer and
    /// extractor, and make it the active catalog entry.
    ///
    /// Returns the previously active template.
    fn set_catalog(&self, name: &str, reference: DynamicImage) -> Arc<Template>;

    /// Register `capture` against the named template, or the active one.
    fn register(
        &self,
        capture: &DynamicImage,
        template_name: Option<&str>,
    ) -> Result<RegisteredFrame, RegistrationError>;
}

/// One template/capture correspondence as it was used for estimation.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MatchedPair {
    pub template_xy: [f64; 2],
    pub capture_xy: [f64; 2],
    /// Hamming distance between the two descriptors.
    pub distance: u32,
    /// Whether the pair is an inlier of the final homography.
    pub inlier: bool,
    /// Reprojection error under the final homography (template pixels).
    pub error_px: f64,
}

/// Wall-clock time spent per stage, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct StageTimings {
    pub normalize_ms: f64,
    pub extract_ms: f64,
    pub match_ms: f64,
    pub estimate_ms: f64,
    pub rectify_ms: f64,
    pub total_ms: f64,
}

/// Intermediate data of a registration call, returned instead of displayed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistrationDiagnostics {
    pub template_keypoints: usize,
    pub capture_keypoints: usize,
    /// Accepted correspondences, ascending by descriptor distance.
    pub matches: Vec<MatchedPair>,
    pub ransac_iterations: usize,
    pub timings: StageTimings,
}

/// A capture rectified into template coordinates.
#[derive(Debug, Clone)]
pub struct RegisteredFrame {
    /// Normalized capture warped into the template grid; same width and
    /// height as the template.
    pub raster: GrayImage,
    /// Capture-to-template transform.
    pub homography: Homography,
    pub template_name: String,
    /// Generation id of the template snapshot the call used.
    pub template_id: u64,
    pub n_correspondences: usize,
    pub n_inliers: usize,
    pub inlier_ratio: f64,
    /// Mean inlier reprojection error in template pixels.
    pub mean_reprojection_error: f64,
    pub diagnostics: Option<RegistrationDiagnostics>,
}

/// Serializable summary of a [`RegisteredFrame`] (everything but pixels).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistrationReport {
    pub template_name: String,
    pub template_id: u64,
    pub width: u32,
    pub height: u32,
    pub homography: Homography,
    pub n_correspondences: usize,
    pub n_inliers: usize,
    pub inlier_ratio: f64,
    pub mean_reprojection_error_px: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<RegistrationDiagnostics>,
}

impl RegisteredFrame {
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    pub fn report(&self) -> RegistrationReport {
        RegistrationReport {
            template_name: self.template_name.clone(),
            template_id: self.template_id,
            width: self.width(),
            height: self.height(),
            homography: self.homography,
            n_correspondences: self.n_correspondences,
            n_inliers: self.n_inliers,
            inlier_ratio: self.inlier_ratio,
            mean_reprojection_error_px: self.mean_reprojection_error,
            diagnostics: self.diagnostics.clone(),
        }
    }
}

fn elapsed_ms(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1e3
}

/// Feature-based registration against a catalog of templates.
///
/// `Send + Sync`: concurrent `register` calls share the catalog and the
/// extractor read-only; catalog swaps never disturb calls in flight.
#[derive(Debug)]
pub struct FeatureMatcher {
    config: RegistrationConfig,
    normalizer: Normalizer,
    extractor: OrbExtractor,
    store: TemplateStore,
}

impl FeatureMatcher {
    /// Matcher with default configuration and `reference` as the active
    /// template.
    pub fn new(name: &str, reference: DynamicImage) -> Self {
        Self::with_config(name, reference, RegistrationConfig::default())
    }

    /// Matcher with an explicit configuration. Use
    /// [`RegistrationConfig::validate`] first for configs built in code; an
    /// invalid one is logged here and used as given.
    pub fn with_config(name: &str, reference: DynamicImage, config: RegistrationConfig) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!("{}", e);
        }
        let normalizer = Normalizer::new(config.normalizer.clone());
        let extractor = OrbExtractor::new(config.features.clone());
        let initial = Template::build(name, reference, &normalizer, &extractor);
        Self {
            config,
            normalizer,
            extractor,
            store: TemplateStore::new(initial),
        }
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Build a template with this matcher's pipeline settings.
    pub fn build_template(&self, name: &str, reference: DynamicImage) -> Template {
        Template::build(name, reference, &self.normalizer, &self.extractor)
    }

    /// Add (or replace) a named template without activating it.
    pub fn insert_template(&self, name: &str, reference: DynamicImage) -> Option<Arc<Template>> {
        self.store.insert(self.build_template(name, reference))
    }

    /// Pull one frame from `source` and register it.
    ///
    /// An exhausted, closed or unreadable source yields `EmptyCapture`.
    pub fn register_next(
        &self,
        source: &mut dyn FrameSource,
        template_name: Option<&str>,
    ) -> Result<RegisteredFrame, RegistrationError> {
        let frame = source.read_frame().ok_or(RegistrationError::EmptyCapture)?;
        self.register(&frame, template_name)
    }

    /// Robustly fit the capture-to-template homography for paired points.
    ///
    /// `capture_pts[i]` corresponds to `template_pts[i]`.
    pub fn estimate(
        &self,
        capture_pts: &[[f64; 2]],
        template_pts: &[[f64; 2]],
    ) -> Result<RansacHomographyResult, RegistrationError> {
        fit_homography_ransac(capture_pts, template_pts, &self.config.ransac)
            .map_err(RegistrationError::DegenerateHomography)
    }

    /// Register against an explicit template snapshot.
    pub fn register_with_template(
        &self,
        template: &Template,
        capture: &DynamicImage,
    ) -> Result<RegisteredFrame, RegistrationError> {
        let t_start = Instant::now();
        if capture.width() == 0 || capture.height() == 0 {
            return Err(RegistrationError::EmptyCapture);
        }
        let min_matches = self.config.matching.effective_min_correspondences();

        let t = Instant::now();
        let gray = self.normalizer.normalize(capture);
        let normalize_ms = elapsed_ms(t);

        let t = Instant::now();
        let capture_features = self.extractor.extract(&gray);
        let extract_ms = elapsed_ms(t);

        let t = Instant::now();
        let template_features = template.features();
        let correspondences = match_descriptors(
            &template_features.descriptors,
            &capture_features.descriptors,
            &self.config.matching,
        );
        let match_ms = elapsed_ms(t);

        tracing::debug!(
            "template '{}': {} keypoints, capture: {} keypoints, {} correspondences",
            template.name(),
            template_features.len(),
            capture_features.len(),
            correspondences.len()
        );
        if correspondences.len() < min_matches {
            tracing::info!(
                "registration against '{}' failed: {} correspondences (need {})",
                template.name(),
                correspondences.len(),
                min_matches
            );
            return Err(RegistrationError::InsufficientMatches {
                needed: min_matches,
                found: correspondences.len(),
            });
        }

        let t = Instant::now();
        let src: Vec<[f64; 2]> = correspondences
            .iter()
            .map(|c| capture_features.point(c.capture_idx))
            .collect();
        let dst: Vec<[f64; 2]> = correspondences
            .iter()
            .map(|c| template_features.point(c.template_idx))
            .collect();
        let fit = self.estimate(&src, &dst).map_err(|e| {
            tracing::info!("registration against '{}' failed: {}", template.name(), e);
            e
        })?;
        let estimate_ms = elapsed_ms(t);

        let t = Instant::now();
        let raster = rectify(
            &gray,
            &fit.h,
            template.width(),
            template.height(),
            &self.config.rectify,
        )?;
        let rectify_ms = elapsed_ms(t);

        let inlier_ratio = fit.inlier_ratio();
        let mean_reprojection_error = fit.mean_inlier_error();
        let total_ms = elapsed_ms(t_start);

        tracing::info!(
            "registered against '{}' (generation {}): {}/{} inliers, mean error {:.2} px, {:.1} ms",
            template.name(),
            template.id(),
            fit.n_inliers,
            correspondences.len(),
            mean_reprojection_error,
            total_ms
        );

        let diagnostics = self.config.collect_diagnostics.then(|| RegistrationDiagnostics {
            template_keypoints: template_features.len(),
            capture_keypoints: capture_features.len(),
            matches: correspondences
                .iter()
                .enumerate()
                .map(|(i, c)| MatchedPair {
                    template_xy: dst[i],
                    capture_xy: src[i],
                    distance: c.distance,
                    inlier: fit.inlier_mask[i],
                    error_px: fit.errors[i],
                })
                .collect(),
            ransac_iterations: fit.iterations,
            timings: StageTimings {
                normalize_ms,
                extract_ms,
                match_ms,
                estimate_ms,
                rectify_ms,
                total_ms,
            },
        });

        Ok(RegisteredFrame {
            raster,
            homography: fit.h,
            template_name: template.name().to_string(),
            template_id: template.id(),
            n_correspondences: correspondences.len(),
            n_inliers: fit.n_inliers,
            inlier_ratio,
            mean_reprojection_error,
            diagnostics,
        })
    }
}

impl PageMatcher for FeatureMatcher {
    fn set_catalog(&self, name: &str, reference: DynamicImage) -> Arc<Template> {
        // Features are computed before the store lock is taken.
        let template = self.build_template(name, reference);
        self.store.set_catalog(template)
    }

    fn register(
        &self,
        capture: &DynamicImage,
        template_name: Option<&str>,
    ) -> Result<RegisteredFrame, RegistrationError> {
        let template = self.store.resolve(template_name)?;
        self.register_with_template(&template, capture)
    }
}
