//! Brute-force Hamming descriptor matching.

use crate::error::ConfigError;
use crate::features::Descriptor;

/// Hard floor: a homography needs at least four correspondences.
pub const MIN_CORRESPONDENCES_FLOOR: usize = 4;

/// Which nearest-neighbour pairs are accepted as correspondences.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Keep a pair only when each descriptor is the other's nearest neighbour.
    #[default]
    CrossCheck,
    /// Keep a template->capture pair when the best distance is below `ratio`
    /// times the second-best distance.
    RatioTest { ratio: f32 },
}

/// Matching configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub policy: MatchPolicy,
    /// Fewer accepted pairs than this fails registration with
    /// `InsufficientMatches`. Values below 4 are raised to 4.
    pub min_correspondences: usize,
    /// Pairs with a Hamming distance above this are discarded.
    pub max_distance: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::CrossCheck,
            min_correspondences: 10,
            max_distance: 256,
        }
    }
}

impl MatchConfig {
    pub fn effective_min_correspondences(&self) -> usize {
        self.min_correspondences.max(MIN_CORRESPONDENCES_FLOOR)
    }

    /// A ratio outside `(0, 1]` (or NaN) would reject every pair.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let MatchPolicy::RatioTest { ratio } = self.policy {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ConfigError::Invalid {
                    field: "matching.policy.ratio",
                    reason: format!("must be in (0, 1], got {}", ratio),
                });
            }
        }
        Ok(())
    }
}

/// One accepted template/capture descriptor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Correspondence {
    pub template_idx: usize,
    pub capture_idx: usize,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

/// Nearest and second-nearest neighbour of one query. Ties keep the lower
/// index.
#[derive(Debug, Clone, Copy)]
struct Nearest {
    best_idx: usize,
    best: u32,
    second: u32,
}

fn nearest(query: &Descriptor, train: &[Descriptor]) -> Option<Nearest> {
    let mut out: Option<Nearest> = None;
    for (j, d) in train.iter().enumerate() {
        let dist = query.hamming(d);
        match &mut out {
            None => {
                out = Some(Nearest {
                    best_idx: j,
                    best: dist,
                    second: u32::MAX,
                })
            }
            Some(n) => {
                if dist < n.best {
                    n.second = n.best;
                    n.best = dist;
                    n.best_idx = j;
                } else if dist < n.second {
                    n.second = dist;
                }
            }
        }
    }
    out
}

/// Match template descriptors against capture descriptors.
///
/// The result is sorted by ascending distance, ties broken by template then
/// capture index. Ranking is informational: every accepted pair is returned.
pub fn match_descriptors(
    template: &[Descriptor],
    capture: &[Descriptor],
    config: &MatchConfig,
) -> Vec<Correspondence> {
    if template.is_empty() || capture.is_empty() {
        return Vec::new();
    }

    let mut out = match config.policy {
        MatchPolicy::CrossCheck => {
            let backward: Vec<usize> = capture
                .iter()
                .filter_map(|c| nearest(c, template).map(|n| n.best_idx))
                .collect();
            template
                .iter()
                .enumerate()
                .filter_map(|(i, t)| {
                    let n = nearest(t, capture)?;
                    (backward[n.best_idx] == i).then_some(Correspondence {
                        template_idx: i,
                        capture_idx: n.best_idx,
                        distance: n.best,
                    })
                })
                .collect::<Vec<_>>()
        }
        MatchPolicy::RatioTest { ratio } => template
            .iter()
            .enumerate()
            .filter_map(|(i, t)| {
                let n = nearest(t, capture)?;
                let passes = n.second == u32::MAX || (n.best as f32) < ratio * n.second as f32;
                passes.then_some(Correspondence {
                    template_idx: i,
                    capture_idx: n.best_idx,
                    distance: n.best,
                })
            })
            .collect::<Vec<_>>(),
    };

    out.retain(|c| c.distance <= config.max_distance);
    out.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then(a.template_idx.cmp(&b.template_idx))
            .then(a.capture_idx.cmp(&b.capture_idx))
    });

    tracing::debug!(
        "matched {} of {} template / {} capture descriptors ({:?})",
        out.len(),
        template.len(),
        capture.len(),
        config.policy
    );
    out
}
