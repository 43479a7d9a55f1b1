//! Top-level registration configuration.

use std::path::Path;

use crate::error::ConfigError;
use crate::features::OrbConfig;
use crate::homography::RansacHomographyConfig;
use crate::matching::MatchConfig;
use crate::normalize::NormalizerConfig;
use crate::rectify::RectifyConfig;

/// Every knob of the registration pipeline.
///
/// Missing sections and fields fall back to their defaults when loaded from
/// JSON, so a config file only needs to list what it changes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub normalizer: NormalizerConfig,
    pub features: OrbConfig,
    pub matching: MatchConfig,
    pub ransac: RansacHomographyConfig,
    pub rectify: RectifyConfig,
    /// Attach [`crate::RegistrationDiagnostics`] to every registered frame.
    pub collect_diagnostics: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            features: OrbConfig::default(),
            matching: MatchConfig::default(),
            ransac: RansacHomographyConfig::default(),
            rectify: RectifyConfig::default(),
            collect_diagnostics: false,
        }
    }
}

impl RegistrationConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot drive the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.matching.validate()?;
        let t = self.ransac.inlier_threshold;
        if !(t.is_finite() && t > 0.0) {
            return Err(ConfigError::Invalid {
                field: "ransac.inlier_threshold",
                reason: format!("must be a positive number of pixels, got {}", t),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::MatchPolicy;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: RegistrationConfig = serde_json::from_str(
            r#"{
                "matching": { "policy": { "kind": "ratio_test", "ratio": 0.7 } },
                "ransac": { "inlier_threshold": 3.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.matching.policy, MatchPolicy::RatioTest { ratio: 0.7 });
        assert_eq!(cfg.matching.min_correspondences, 10);
        assert_eq!(cfg.ransac.inlier_threshold, 3.0);
        assert_eq!(cfg.ransac.max_iters, 2000);
        assert_eq!(cfg.features.max_features, 5000);
        assert!(!cfg.collect_diagnostics);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RegistrationConfig::from_json_file(Path::new("/nonexistent/pagematch.json"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn file_with_unusable_ratio_is_invalid() {
        let path = std::env::temp_dir().join(format!(
            "pagematch-config-{}-bad-ratio.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"{ "matching": { "policy": { "kind": "ratio_test", "ratio": 0.0 } } }"#,
        )
        .unwrap();
        let err = RegistrationConfig::from_json_file(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "matching.policy.ratio",
                ..
            }
        ));
    }

    #[test]
    fn non_positive_inlier_threshold_is_invalid() {
        let mut cfg = RegistrationConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.ransac.inlier_threshold = 0.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let path = std::env::temp_dir().join(format!(
            "pagematch-config-{}-malformed.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();
        let err = RegistrationConfig::from_json_file(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
