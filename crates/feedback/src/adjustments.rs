//! Per-reason feature adjustment policy.
//!
//! A dislike never edits the active configuration. It produces advisory
//! deltas (per genre, per cast member) that the search engine folds into its
//! priors for the next retraining cycle.
//!
//! | reason          | genres            | top 5 cast | other              |
//! |-----------------|-------------------|------------|--------------------|
//! | wrong_genre     | -0.15             |            |                    |
//! | poor_quality    |                   | -0.10      |                    |
//! | not_interested  | -0.075            | -0.075     |                    |
//! | already_watched |                   |            | suppress the item  |
//! | irrelevant      | -0.05             |            |                    |
//! | other           |                   |            | recorded only      |

use domain::{DislikeReason, NegativeTrainingExample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GENRE_DEEMPHASIS: f64 = 0.15;
pub const CAST_DEEMPHASIS: f64 = 0.10;
pub const IRRELEVANT_DEEMPHASIS: f64 = 0.05;

/// Only the top-billed cast members are penalized
pub const TOP_CAST: usize = 5;

/// Multiplicative deductions one reason applies to each listed feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyRule {
    pub genre_delta: f64,
    pub cast_delta: f64,
    pub suppress: bool,
}

pub fn policy(reason: DislikeReason) -> PolicyRule {
    let (genre_delta, cast_delta, suppress) = match reason {
        DislikeReason::WrongGenre => (-GENRE_DEEMPHASIS, 0.0, false),
        DislikeReason::PoorQuality => (0.0, -CAST_DEEMPHASIS, false),
        DislikeReason::NotInterested => (-GENRE_DEEMPHASIS * 0.5, -GENRE_DEEMPHASIS * 0.5, false),
        DislikeReason::AlreadyWatched => (0.0, 0.0, true),
        DislikeReason::Irrelevant => (-IRRELEVANT_DEEMPHASIS, 0.0, false),
        DislikeReason::Other => (0.0, 0.0, false),
    };
    PolicyRule {
        genre_delta,
        cast_delta,
        suppress,
    }
}

/// Advisory deltas derived from one dislike
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureAdjustment {
    pub reason: DislikeReason,
    pub genre_deltas: BTreeMap<String, f64>,
    pub cast_deltas: BTreeMap<String, f64>,
    /// Set for already-watched items: filter instead of re-weighting
    pub suppress: bool,
}

impl FeatureAdjustment {
    pub fn is_empty(&self) -> bool {
        self.genre_deltas.is_empty() && self.cast_deltas.is_empty() && !self.suppress
    }
}

/// Apply the policy table to one disliked item.
pub fn feature_adjustment(reason: DislikeReason, genres: &[String], cast: &[String]) -> FeatureAdjustment {
    let rule = policy(reason);
    let mut adjustment = FeatureAdjustment {
        reason,
        suppress: rule.suppress,
        ..Default::default()
    };

    if rule.genre_delta != 0.0 {
        for genre in genres.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
            adjustment.genre_deltas.insert(genre.to_string(), rule.genre_delta);
        }
    }
    if rule.cast_delta != 0.0 {
        for name in cast.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).take(TOP_CAST) {
            adjustment.cast_deltas.insert(name.to_string(), rule.cast_delta);
        }
    }
    adjustment
}

/// Direction hints for the search engine, aggregated over a batch of
/// negative examples.
///
/// Each bias is the mean per-feature deduction of the batch and lies in
/// [-1, 0]; zero means "no evidence".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPriors {
    pub genre_bias: f64,
    pub cast_bias: f64,
}

impl SearchPriors {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_neutral(&self) -> bool {
        self.genre_bias == 0.0 && self.cast_bias == 0.0
    }

    pub fn from_examples(examples: &[NegativeTrainingExample]) -> Self {
        if examples.is_empty() {
            return Self::neutral();
        }
        let n = examples.len() as f64;
        let (genre, cast) = examples.iter().fold((0.0, 0.0), |(g, c), example| {
            let rule = policy(example.reason);
            (g + rule.genre_delta, c + rule.cast_delta)
        });
        Self {
            genre_bias: (genre / n).clamp(-1.0, 0.0),
            cast_bias: (cast / n).clamp(-1.0, 0.0),
        }
    }
}
