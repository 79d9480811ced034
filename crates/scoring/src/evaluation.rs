//! Accuracy of a configuration over a held-out labeled set.
//!
//! An example counts as correct when the hybrid score lands within
//! `CORRECTNESS_TOLERANCE` of its label. Accuracy is the weight-averaged
//! share of correct examples.
//!
//! ## Performance Note
//! Evaluating one configuration is a pure pass over a read-only snapshot, so
//! batches of configurations are spread across Rayon's thread pool.

use crate::scorer::score;
use domain::{HoldoutSet, HyperParams};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Maximum |score - label| for a prediction to count as correct
pub const CORRECTNESS_TOLERANCE: f64 = 0.2;

// Absorbs rounding in |score - label| so that an error of exactly 0.2 passes
const TOLERANCE_SLACK: f64 = 1e-12;

/// Result of evaluating one configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    /// Weighted share of correct predictions in [0, 1]
    pub accuracy: f64,
    /// Weighted mean absolute error
    pub avg_error: f64,
    /// Examples that could be scored
    pub evaluated: usize,
    /// Examples whose profile or item is missing from the snapshot
    pub skipped: usize,
}

impl Evaluation {
    fn empty() -> Self {
        Self {
            accuracy: 0.0,
            avg_error: 0.0,
            evaluated: 0,
            skipped: 0,
        }
    }
}

/// A/B result for two configurations on the same dataset
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    pub accuracy_a: f64,
    pub accuracy_b: f64,
    /// accuracy_b - accuracy_a
    pub delta: f64,
}

/// Scores configurations against a shared holdout snapshot.
#[derive(Clone)]
pub struct Evaluator {
    holdout: Arc<HoldoutSet>,
}

impl Evaluator {
    pub fn new(holdout: Arc<HoldoutSet>) -> Self {
        Self { holdout }
    }

    pub fn holdout(&self) -> &HoldoutSet {
        &self.holdout
    }

    /// Shortcut for `evaluate(params).accuracy`
    pub fn accuracy(&self, params: &HyperParams) -> f64 {
        self.evaluate(params).accuracy
    }

    /// Evaluate one configuration.
    ///
    /// An empty (or fully unscorable) set yields accuracy 0.
    pub fn evaluate(&self, params: &HyperParams) -> Evaluation {
        let mut eval = Evaluation::empty();
        let mut total_weight = 0.0;
        let mut correct_weight = 0.0;
        let mut error_sum = 0.0;

        for example in self.holdout.examples() {
            let (Some(profile), Some(item)) = (
                self.holdout.get_profile(example.user_id),
                self.holdout.get_item(example.item_id),
            ) else {
                eval.skipped += 1;
                continue;
            };

            let predicted = score(item, profile, params).hybrid_score;
            let error = (predicted - example.label).abs();

            total_weight += example.weight;
            error_sum += example.weight * error;
            if error <= CORRECTNESS_TOLERANCE + TOLERANCE_SLACK {
                correct_weight += example.weight;
            }
            eval.evaluated += 1;
        }

        if total_weight > 0.0 {
            eval.accuracy = correct_weight / total_weight;
            eval.avg_error = error_sum / total_weight;
        }
        eval
    }

    /// Evaluate a batch of configurations in parallel.
    ///
    /// Results come back in input order.
    pub fn evaluate_many(&self, configs: &[HyperParams]) -> Vec<Evaluation> {
        let start = Instant::now();
        let results: Vec<Evaluation> = configs.par_iter().map(|c| self.evaluate(c)).collect();
        debug!(
            configs = configs.len(),
            examples = self.holdout.examples().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Evaluated configuration batch"
        );
        results
    }

    /// Run both configurations over the same snapshot. No state changes.
    pub fn compare(&self, a: &HyperParams, b: &HyperParams) -> Comparison {
        let (eval_a, eval_b) = rayon::join(|| self.evaluate(a), || self.evaluate(b));
        Comparison {
            accuracy_a: eval_a.accuracy,
            accuracy_b: eval_b.accuracy,
            delta: eval_b.accuracy - eval_a.accuracy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{CandidateItem, LabeledExample, UserProfile};

    fn holdout(labels: &[(f64, f64)]) -> Arc<HoldoutSet> {
        let mut set = HoldoutSet::new();
        let mut profile = UserProfile::new(1);
        profile.genre_preferences.insert("Drama".to_string(), 1.0);
        set.insert_profile(profile);
        set.insert_item(CandidateItem {
            id: 10,
            title: "Drama".to_string(),
            genres: vec!["Drama".to_string()],
            cast: vec![],
            franchise_id: None,
            avg_rating: 8.0,
            rating_count: 999,
        });
        for (label, weight) in labels {
            set.push_example(LabeledExample {
                user_id: 1,
                item_id: 10,
                label: *label,
                weight: *weight,
            });
        }
        Arc::new(set)
    }

    fn predicted() -> f64 {
        let set = holdout(&[]);
        let profile = set.get_profile(1).unwrap();
        let item = set.get_item(10).unwrap();
        score(item, profile, &HyperParams::default()).hybrid_score
    }

    #[test]
    fn test_empty_holdout_has_zero_accuracy() {
        let evaluator = Evaluator::new(Arc::new(HoldoutSet::new()));
        let eval = evaluator.evaluate(&HyperParams::default());
        assert_eq!(eval.accuracy, 0.0);
        assert_eq!(eval.evaluated, 0);
    }

    #[test]
    fn test_accuracy_is_weighted() {
        let p = predicted();
        // One correct example with weight 1.0, one miss with weight 3.0
        let far = if p > 0.5 { 0.0 } else { 1.0 };
        let evaluator = Evaluator::new(holdout(&[(p, 1.0), (far, 3.0)]));
        let eval = evaluator.evaluate(&HyperParams::default());

        assert_eq!(eval.evaluated, 2);
        assert!((eval.accuracy - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_references_are_skipped() {
        let mut set = (*holdout(&[(predicted(), 1.0)])).clone();
        set.push_example(LabeledExample {
            user_id: 2,
            item_id: 10,
            label: 0.0,
            weight: 1.0,
        });
        let eval = Evaluator::new(Arc::new(set)).evaluate(&HyperParams::default());
        assert_eq!(eval.skipped, 1);
        assert_eq!(eval.accuracy, 1.0);
    }

    #[test]
    fn test_evaluate_many_preserves_order() {
        let evaluator = Evaluator::new(holdout(&[(predicted(), 1.0)]));
        let mut draft = HyperParams::default().to_draft();
        draft.genre_boost.boost_high = 0.25;
        draft.genre_boost.boost_medium = 0.20;
        let other = draft.build().unwrap();

        let configs = vec![HyperParams::default(), other];
        let results = evaluator.evaluate_many(&configs);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], evaluator.evaluate(&configs[0]));
        assert_eq!(results[1], evaluator.evaluate(&configs[1]));
    }

    #[test]
    fn test_compare_reports_delta() {
        let evaluator = Evaluator::new(holdout(&[(predicted(), 1.0)]));
        let same = evaluator.compare(&HyperParams::default(), &HyperParams::default());
        assert_eq!(same.delta, 0.0);
        assert_eq!(same.accuracy_a, same.accuracy_b);
    }
}
