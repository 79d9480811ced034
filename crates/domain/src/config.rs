//! Hyperparameter configuration of the scoring function.
//!
//! A `HyperParams` value can only be obtained through validation, so every
//! configuration that exists in memory satisfies:
//! - the five component weights are non-negative and sum to 1.0 (within 1e-6)
//! - the high/medium genre boosts are >= 0 and the low-confidence penalty is <= 0
//! - genre thresholds lie in [0, 1] and are strictly ordered high > medium > low
//! - cast tier weights are >= 0 and the lead cutoff comes before the supporting cutoff
//! - popularity sub-weights are >= 0 and sum to 1.0
//! - the accuracy threshold lies in [0, 1]
//!
//! Tuning never mutates a configuration: it copies it into a
//! `HyperParamsDraft`, edits the draft, and validates a new value.

use crate::error::{Result, TuningError};
use serde::{Deserialize, Serialize};

/// Tolerance used for every "sums to 1.0" check
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// The five primary weights of the hybrid score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub genre: f64,
    pub cast: f64,
    pub franchise: f64,
    pub rating: f64,
    pub popularity: f64,
}

impl ComponentWeights {
    pub const COUNT: usize = 5;
    pub const NAMES: [&'static str; 5] = ["genre", "cast", "franchise", "rating", "popularity"];

    pub fn to_array(&self) -> [f64; 5] {
        [self.genre, self.cast, self.franchise, self.rating, self.popularity]
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        Self {
            genre: values[0],
            cast: values[1],
            franchise: values[2],
            rating: values[3],
            popularity: values[4],
        }
    }

    pub fn sum(&self) -> f64 {
        self.to_array().iter().sum()
    }

    /// Scale all weights so they sum to 1.0.
    ///
    /// Returns `None` when a weight is negative or non-finite, or when the
    /// total is zero.
    pub fn normalized(&self) -> Option<Self> {
        let values = self.to_array();
        if values.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return None;
        }
        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return None;
        }
        Some(Self::from_array(values.map(|w| w / total)))
    }

    /// Pin component `index` to `value` and rescale the other four
    /// proportionally so the total stays at 1.0.
    pub fn with_component(&self, index: usize, value: f64) -> Option<Self> {
        if index >= Self::COUNT || !(0.0..=1.0).contains(&value) {
            return None;
        }
        let mut values = self.to_array();
        let rest: f64 = values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, w)| *w)
            .sum();
        if rest <= 0.0 {
            return None;
        }
        let scale = (1.0 - value) / rest;
        for (i, w) in values.iter_mut().enumerate() {
            *w = if i == index { value } else { *w * scale };
        }
        Some(Self::from_array(values))
    }
}

/// Genre-confidence boost/penalty policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenreBoost {
    pub boost_high: f64,
    pub boost_medium: f64,
    /// Penalty applied below `threshold_low`; always <= 0
    pub boost_low: f64,
    pub threshold_high: f64,
    pub threshold_medium: f64,
    pub threshold_low: f64,
}

impl GenreBoost {
    /// Boost for a given genre similarity.
    pub fn boost_for(&self, genre_sim: f64) -> f64 {
        if genre_sim > self.threshold_high {
            self.boost_high
        } else if genre_sim > self.threshold_medium {
            self.boost_medium
        } else if genre_sim < self.threshold_low {
            self.boost_low
        } else {
            0.0
        }
    }
}

/// Cast weights tiered by billing position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CastTiers {
    pub lead_weight: f64,
    pub supporting_weight: f64,
    pub background_weight: f64,
    /// Positions below this are lead roles
    pub lead_cutoff: usize,
    /// Positions below this (and at or above `lead_cutoff`) are supporting roles
    pub supporting_cutoff: usize,
}

impl CastTiers {
    /// Weight of a cast member by zero-based billing position
    pub fn weight_for(&self, position: usize) -> f64 {
        if position < self.lead_cutoff {
            self.lead_weight
        } else if position < self.supporting_cutoff {
            self.supporting_weight
        } else {
            self.background_weight
        }
    }
}

/// Sub-weights of the popularity component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopularityMix {
    pub rating_weight: f64,
    pub count_weight: f64,
}

/// Editable, unvalidated form of a configuration.
///
/// This is the only way to build a new `HyperParams`: fill a draft and call
/// `HyperParams::try_from(draft)` (or `draft.build()`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperParamsDraft {
    pub weights: ComponentWeights,
    pub genre_boost: GenreBoost,
    pub cast_tiers: CastTiers,
    pub popularity: PopularityMix,
    pub accuracy_threshold: f64,
}

impl HyperParamsDraft {
    pub fn build(self) -> Result<HyperParams> {
        HyperParams::try_from(self)
    }
}

/// Immutable, validated hyperparameter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HyperParamsDraft")]
pub struct HyperParams {
    weights: ComponentWeights,
    genre_boost: GenreBoost,
    cast_tiers: CastTiers,
    popularity: PopularityMix,
    accuracy_threshold: f64,
}

/// One differing parameter between two configurations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDelta {
    pub name: &'static str,
    pub left: f64,
    pub right: f64,
    pub delta: f64,
}

impl HyperParams {
    pub fn weights(&self) -> &ComponentWeights {
        &self.weights
    }

    pub fn genre_boost(&self) -> &GenreBoost {
        &self.genre_boost
    }

    pub fn cast_tiers(&self) -> &CastTiers {
        &self.cast_tiers
    }

    pub fn popularity(&self) -> &PopularityMix {
        &self.popularity
    }

    pub fn accuracy_threshold(&self) -> f64 {
        self.accuracy_threshold
    }

    /// Copy this configuration into an editable draft
    pub fn to_draft(&self) -> HyperParamsDraft {
        HyperParamsDraft {
            weights: self.weights,
            genre_boost: self.genre_boost,
            cast_tiers: self.cast_tiers,
            popularity: self.popularity,
            accuracy_threshold: self.accuracy_threshold,
        }
    }

    /// Every parameter as a (name, value) pair in a fixed order.
    pub fn named_values(&self) -> Vec<(&'static str, f64)> {
        let w = &self.weights;
        let g = &self.genre_boost;
        let c = &self.cast_tiers;
        vec![
            ("genre_weight", w.genre),
            ("cast_weight", w.cast),
            ("franchise_weight", w.franchise),
            ("rating_weight", w.rating),
            ("popularity_weight", w.popularity),
            ("genre_boost_high", g.boost_high),
            ("genre_boost_medium", g.boost_medium),
            ("genre_boost_low", g.boost_low),
            ("genre_threshold_high", g.threshold_high),
            ("genre_threshold_medium", g.threshold_medium),
            ("genre_threshold_low", g.threshold_low),
            ("cast_lead_weight", c.lead_weight),
            ("cast_supporting_weight", c.supporting_weight),
            ("cast_background_weight", c.background_weight),
            ("cast_lead_cutoff", c.lead_cutoff as f64),
            ("cast_supporting_cutoff", c.supporting_cutoff as f64),
            ("popularity_rating_weight", self.popularity.rating_weight),
            ("popularity_count_weight", self.popularity.count_weight),
            ("accuracy_threshold", self.accuracy_threshold),
        ]
    }

    /// Stable identity of the configuration, rounded to 6 decimals.
    ///
    /// Two configurations with the same fingerprint are treated as the same
    /// search point.
    pub fn fingerprint(&self) -> String {
        self.named_values()
            .iter()
            .map(|(_, v)| format!("{:.6}", v))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Parameters whose values differ by more than 0.001
    pub fn diff(&self, other: &HyperParams) -> Vec<ParamDelta> {
        self.named_values()
            .into_iter()
            .zip(other.named_values())
            .filter(|((_, a), (_, b))| (a - b).abs() > 0.001)
            .map(|((name, left), (_, right))| ParamDelta {
                name,
                left,
                right,
                delta: right - left,
            })
            .collect()
    }
}

impl TryFrom<HyperParamsDraft> for HyperParams {
    type Error = TuningError;

    fn try_from(draft: HyperParamsDraft) -> Result<Self> {
        validate(&draft)?;
        Ok(Self {
            weights: draft.weights,
            genre_boost: draft.genre_boost,
            cast_tiers: draft.cast_tiers,
            popularity: draft.popularity,
            accuracy_threshold: draft.accuracy_threshold,
        })
    }
}

/// The production baseline the first model version is built from
impl Default for HyperParams {
    fn default() -> Self {
        Self {
            weights: ComponentWeights {
                genre: 0.40,
                cast: 0.15,
                franchise: 0.05,
                rating: 0.30,
                popularity: 0.10,
            },
            genre_boost: GenreBoost {
                boost_high: 0.15,
                boost_medium: 0.10,
                boost_low: -0.20,
                threshold_high: 0.7,
                threshold_medium: 0.5,
                threshold_low: 0.3,
            },
            cast_tiers: CastTiers {
                lead_weight: 1.0,
                supporting_weight: 0.7,
                background_weight: 0.3,
                lead_cutoff: 5,
                supporting_cutoff: 15,
            },
            popularity: PopularityMix {
                rating_weight: 0.7,
                count_weight: 0.3,
            },
            accuracy_threshold: 0.65,
        }
    }
}

fn validate(draft: &HyperParamsDraft) -> Result<()> {
    let weights = draft.weights.to_array();
    for (name, w) in ComponentWeights::NAMES.iter().zip(weights) {
        non_negative(&format!("{}_weight", name), w)?;
    }
    let total = draft.weights.sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(TuningError::validation(format!(
            "component weights must sum to 1.0, got {:.9}",
            total
        )));
    }

    let g = &draft.genre_boost;
    non_negative("genre_boost_high", g.boost_high)?;
    non_negative("genre_boost_medium", g.boost_medium)?;
    if !g.boost_low.is_finite() || g.boost_low > 0.0 {
        return Err(TuningError::validation(format!(
            "genre_boost_low must be <= 0, got {}",
            g.boost_low
        )));
    }
    unit_interval("genre_threshold_high", g.threshold_high)?;
    unit_interval("genre_threshold_medium", g.threshold_medium)?;
    unit_interval("genre_threshold_low", g.threshold_low)?;
    if !(g.threshold_high > g.threshold_medium && g.threshold_medium > g.threshold_low) {
        return Err(TuningError::validation(format!(
            "genre thresholds must satisfy high > medium > low, got {} / {} / {}",
            g.threshold_high, g.threshold_medium, g.threshold_low
        )));
    }

    let c = &draft.cast_tiers;
    non_negative("cast_lead_weight", c.lead_weight)?;
    non_negative("cast_supporting_weight", c.supporting_weight)?;
    non_negative("cast_background_weight", c.background_weight)?;
    if c.lead_cutoff >= c.supporting_cutoff {
        return Err(TuningError::validation(format!(
            "cast lead cutoff ({}) must be below supporting cutoff ({})",
            c.lead_cutoff, c.supporting_cutoff
        )));
    }

    let p = &draft.popularity;
    non_negative("popularity_rating_weight", p.rating_weight)?;
    non_negative("popularity_count_weight", p.count_weight)?;
    if (p.rating_weight + p.count_weight - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(TuningError::validation(format!(
            "popularity sub-weights must sum to 1.0, got {:.9}",
            p.rating_weight + p.count_weight
        )));
    }

    unit_interval("accuracy_threshold", draft.accuracy_threshold)
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(TuningError::validation(format!(
            "{} must be >= 0, got {}",
            name, value
        )));
    }
    Ok(())
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(TuningError::validation(format!(
            "{} must lie in [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let params = HyperParams::default();
        assert!(params.to_draft().build().is_ok());
        assert!((params.weights().sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        let mut draft = HyperParams::default().to_draft();
        draft.weights.genre = 0.5;
        let err = draft.build().unwrap_err();
        assert!(matches!(err, TuningError::Validation(_)));
    }

    #[test]
    fn test_rejects_positive_low_penalty() {
        let mut draft = HyperParams::default().to_draft();
        draft.genre_boost.boost_low = 0.05;
        assert!(draft.build().is_err());
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let mut draft = HyperParams::default().to_draft();
        draft.genre_boost.threshold_medium = 0.7;
        assert!(draft.build().is_err());

        let mut draft = HyperParams::default().to_draft();
        draft.genre_boost.threshold_high = 1.2;
        assert!(draft.build().is_err());
    }

    #[test]
    fn test_with_component_keeps_sum() {
        let weights = *HyperParams::default().weights();
        let adjusted = weights.with_component(0, 0.44).unwrap();

        assert!((adjusted.genre - 0.44).abs() < 1e-12);
        assert!((adjusted.sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
        // The rest keep their relative proportions
        assert!((adjusted.rating / adjusted.cast - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalized_rejects_negative() {
        let weights = ComponentWeights::from_array([0.5, -0.1, 0.2, 0.2, 0.2]);
        assert!(weights.normalized().is_none());

        let weights = ComponentWeights::from_array([2.0, 1.0, 1.0, 0.0, 0.0]);
        let normalized = weights.normalized().unwrap();
        assert!((normalized.genre - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_deserialize_validates() {
        let mut draft = HyperParams::default().to_draft();
        draft.weights.cast = 0.9;
        let json = serde_json::to_string(&draft).unwrap();
        let parsed: std::result::Result<HyperParams, _> = serde_json::from_str(&json);
        assert!(parsed.is_err());

        let json = serde_json::to_string(&HyperParams::default()).unwrap();
        let parsed: HyperParams = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, HyperParams::default());
    }

    #[test]
    fn test_boost_tiers() {
        let boost = *HyperParams::default().genre_boost();
        assert_eq!(boost.boost_for(0.8), 0.15);
        assert_eq!(boost.boost_for(0.6), 0.10);
        assert_eq!(boost.boost_for(0.4), 0.0);
        assert_eq!(boost.boost_for(0.1), -0.20);
    }

    #[test]
    fn test_diff_lists_changed_parameters() {
        let base = HyperParams::default();
        let mut draft = base.to_draft();
        draft.genre_boost.boost_high = 0.20;
        let other = draft.build().unwrap();

        let diff = base.diff(&other);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].name, "genre_boost_high");
        assert!((diff[0].delta - 0.05).abs() < 1e-9);
        assert_ne!(base.fingerprint(), other.fingerprint());
    }
}
