//! Error types surfaced by registration and configuration loading.

use std::path::PathBuf;

/// Why a point set could not produce a usable homography.
#[derive(Debug, Clone, PartialEq)]
pub enum DegeneracyReason {
    /// Fewer than four correspondences were available.
    TooFewPoints { got: usize },
    /// The point set (or every sampled subset) is collinear.
    CollinearPoints,
    /// The best consensus set was too small to trust.
    TooFewInliers { needed: usize, found: usize },
    /// The estimated matrix has (near-)zero determinant.
    NonInvertible,
    /// The estimate contains NaN or infinite entries.
    NonFinite,
}

impl std::fmt::Display for DegeneracyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFewPoints { got } => write!(f, "too few points: need 4, got {}", got),
            Self::CollinearPoints => write!(f, "point configuration is collinear"),
            Self::TooFewInliers { needed, found } => {
                write!(f, "too few inliers: need {}, found {}", needed, found)
            }
            Self::NonInvertible => write!(f, "estimated matrix is not invertible"),
            Self::NonFinite => write!(f, "estimated matrix has non-finite entries"),
        }
    }
}

/// Failure modes of a single registration call.
///
/// Every variant is terminal for the call: there is no identity fallback and
/// no internal retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// The capture was missing, empty, or could not be decoded.
    EmptyCapture,
    /// Descriptor matching produced too few correspondences.
    InsufficientMatches { needed: usize, found: usize },
    /// Correspondences exist but no valid transform could be estimated.
    DegenerateHomography(DegeneracyReason),
    /// A template name was requested that the catalog does not hold.
    UnknownTemplate { name: String },
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCapture => write!(f, "capture is empty or unreadable"),
            Self::InsufficientMatches { needed, found } => write!(
                f,
                "insufficient matches: need {}, found {}",
                needed, found
            ),
            Self::DegenerateHomography(reason) => write!(f, "degenerate homography: {}", reason),
            Self::UnknownTemplate { name } => write!(f, "unknown template '{}'", name),
        }
    }
}

impl std::error::Error for RegistrationError {}

impl From<DegeneracyReason> for RegistrationError {
    fn from(reason: DegeneracyReason) -> Self {
        Self::DegenerateHomography(reason)
    }
}

/// Failure to load a [`crate::RegistrationConfig`] from disk.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    /// A field holds a value the pipeline cannot run with.
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            Self::Invalid { field, reason } => write!(f, "invalid config {}: {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure() {
        let e = RegistrationError::InsufficientMatches { needed: 10, found: 3 };
        assert_eq!(e.to_string(), "insufficient matches: need 10, found 3");

        let e: RegistrationError = DegeneracyReason::CollinearPoints.into();
        assert!(e.to_string().contains("collinear"));
    }
}
