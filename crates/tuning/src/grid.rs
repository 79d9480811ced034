//! Grid search around a base configuration.
//!
//! ## Algorithm
//! 1. For each primary weight (genre, cast, franchise, rating, popularity),
//!    step through `current * (1 + radius * k / steps)` for
//!    k in -steps..=steps, k != 0, and renormalize the other four weights
//!    proportionally so the sum stays at 1.0
//! 2. For each secondary parameter, apply `-step` and `+step` from a small
//!    fixed step set, one parameter at a time
//!
//! Primary weights move one at a time rather than as a cartesian product: a
//! joint move followed by renormalization would push the stepped weight
//! outside `current * (1 ± radius)`, while a single move keeps it exactly on
//! its step and the other four keep their mutual ratios.
//!
//! The point list is fixed at construction and ordered by parameter index.
//! A cursor walks it, so successive `generate` calls never replay a point;
//! points that fail validation or are already in the experiment history are
//! skipped.

use crate::space::{seen_fingerprints, Candidate};
use crate::strategy::SearchStrategy;
use domain::{
    ComponentWeights, ExperimentRecord, HyperParams, HyperParamsDraft, Result, SearchMethod,
    TuningError,
};
use feedback::SearchPriors;
use tracing::debug;

pub const DEFAULT_RADIUS: f64 = 0.10;
pub const DEFAULT_STEPS: usize = 3;

/// Step applied to boosts and genre thresholds
const FINE_STEP: f64 = 0.05;
/// Step applied to cast tier weights and the popularity mix
const COARSE_STEP: f64 = 0.1;

/// Secondary parameters in generation order, with their step
const SECONDARY: [(&str, f64); 10] = [
    ("genre_boost_high", FINE_STEP),
    ("genre_boost_medium", FINE_STEP),
    ("genre_boost_low", FINE_STEP),
    ("genre_threshold_high", FINE_STEP),
    ("genre_threshold_medium", FINE_STEP),
    ("genre_threshold_low", FINE_STEP),
    ("cast_lead_weight", COARSE_STEP),
    ("cast_supporting_weight", COARSE_STEP),
    ("cast_background_weight", COARSE_STEP),
    ("popularity_rating_weight", COARSE_STEP),
];

fn nudge(draft: &mut HyperParamsDraft, name: &str, delta: f64) {
    let g = &mut draft.genre_boost;
    let c = &mut draft.cast_tiers;
    match name {
        "genre_boost_high" => g.boost_high += delta,
        "genre_boost_medium" => g.boost_medium += delta,
        "genre_boost_low" => g.boost_low += delta,
        "genre_threshold_high" => g.threshold_high += delta,
        "genre_threshold_medium" => g.threshold_medium += delta,
        "genre_threshold_low" => g.threshold_low += delta,
        "cast_lead_weight" => c.lead_weight += delta,
        "cast_supporting_weight" => c.supporting_weight += delta,
        "cast_background_weight" => c.background_weight += delta,
        "popularity_rating_weight" => {
            draft.popularity.rating_weight += delta;
            draft.popularity.count_weight = 1.0 - draft.popularity.rating_weight;
        }
        _ => {}
    }
}

pub struct GridSearch {
    points: Vec<HyperParamsDraft>,
    cursor: usize,
}

impl GridSearch {
    pub fn new(base: &HyperParams, radius: f64, steps: usize) -> Self {
        let points = grid_points(base, radius, steps);
        debug!(points = points.len(), radius, steps, "Built search grid");
        Self { points, cursor: 0 }
    }

    /// Points not yet handed out (including ones that may later be skipped)
    pub fn remaining(&self) -> usize {
        self.points.len() - self.cursor
    }
}

fn grid_points(base: &HyperParams, radius: f64, steps: usize) -> Vec<HyperParamsDraft> {
    let mut points = Vec::new();
    let steps_i = steps as i64;

    let weights = base.weights().to_array();
    for (index, current) in weights.iter().enumerate() {
        for k in -steps_i..=steps_i {
            if k == 0 {
                continue;
            }
            let value = current * (1.0 + radius * k as f64 / steps as f64);
            if let Some(adjusted) = base.weights().with_component(index, value) {
                let mut draft = base.to_draft();
                draft.weights = adjusted;
                points.push(draft);
            }
        }
    }

    for (name, step) in SECONDARY {
        for direction in [-1.0, 1.0] {
            let mut draft = base.to_draft();
            nudge(&mut draft, name, direction * step);
            points.push(draft);
        }
    }

    points
}

impl SearchStrategy for GridSearch {
    fn method(&self) -> SearchMethod {
        SearchMethod::Grid
    }

    fn generate(
        &mut self,
        n: usize,
        history: &[ExperimentRecord],
        _priors: &SearchPriors,
    ) -> Result<Vec<Candidate>> {
        let mut seen = seen_fingerprints(history);
        let mut out = Vec::with_capacity(n);
        let mut scanned = 0;

        while out.len() < n && self.cursor < self.points.len() {
            let draft = self.points[self.cursor];
            self.cursor += 1;
            scanned += 1;

            let Ok(config) = draft.build() else {
                continue;
            };
            if seen.insert(config.fingerprint()) {
                out.push(Candidate::new(config));
            }
        }

        if n > 0 && out.is_empty() {
            return Err(TuningError::SearchSpaceExhausted {
                method: SearchMethod::Grid.to_string(),
                attempts: scanned,
            });
        }
        Ok(out)
    }
}

/// Number of points a grid of this shape contains before validation
pub fn grid_size(steps: usize) -> usize {
    ComponentWeights::COUNT * 2 * steps + SECONDARY.len() * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_all(search: &mut GridSearch) -> Vec<Candidate> {
        search
            .generate(1000, &[], &SearchPriors::neutral())
            .unwrap()
    }

    #[test]
    fn test_grid_respects_radius_and_sum() {
        let base = HyperParams::default();
        let mut search = GridSearch::new(&base, DEFAULT_RADIUS, DEFAULT_STEPS);
        let candidates = generate_all(&mut search);

        assert!(!candidates.is_empty());
        for candidate in &candidates {
            let w = candidate.config.weights();
            assert!((w.sum() - 1.0).abs() < 1e-6);
            assert!(w.genre >= 0.36 - 1e-9 && w.genre <= 0.44 + 1e-9);
        }
    }

    #[test]
    fn test_grid_is_deterministic_and_ordered() {
        let base = HyperParams::default();
        let a = generate_all(&mut GridSearch::new(&base, DEFAULT_RADIUS, DEFAULT_STEPS));
        let b = generate_all(&mut GridSearch::new(&base, DEFAULT_RADIUS, DEFAULT_STEPS));
        assert_eq!(a, b);

        // First point lowers the genre weight by the full radius
        assert!((a[0].config.weights().genre - 0.36).abs() < 1e-9);
        assert_eq!(a.len(), grid_size(DEFAULT_STEPS));
    }

    #[test]
    fn test_grid_does_not_replay() {
        let base = HyperParams::default();
        let mut search = GridSearch::new(&base, DEFAULT_RADIUS, DEFAULT_STEPS);
        let first = search.generate(5, &[], &SearchPriors::neutral()).unwrap();
        let second = search.generate(5, &[], &SearchPriors::neutral()).unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 5);
        for c in &second {
            assert!(!first.contains(c));
        }
    }

    #[test]
    fn test_primary_points_move_one_weight() {
        let base = HyperParams::default();
        let base_weights = base.weights().to_array();
        let candidates = generate_all(&mut GridSearch::new(&base, DEFAULT_RADIUS, DEFAULT_STEPS));
        let primary = ComponentWeights::COUNT * 2 * DEFAULT_STEPS;

        for (n, candidate) in candidates.iter().take(primary).enumerate() {
            let stepped = n / (2 * DEFAULT_STEPS);
            let ratios: Vec<f64> = candidate
                .config
                .weights()
                .to_array()
                .iter()
                .zip(base_weights.iter())
                .map(|(w, b)| w / b)
                .collect();
            let others: Vec<f64> = ratios
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != stepped)
                .map(|(_, r)| *r)
                .collect();
            // The untouched weights are scaled together
            for r in &others {
                assert!((r - others[0]).abs() < 1e-9);
            }
            assert!((ratios[stepped] - others[0]).abs() > 1e-9);
        }
    }

    #[test]
    fn test_exhausted_grid_errors() {
        let base = HyperParams::default();
        let mut search = GridSearch::new(&base, DEFAULT_RADIUS, DEFAULT_STEPS);
        generate_all(&mut search);
        assert_eq!(search.remaining(), 0);

        let err = search.generate(1, &[], &SearchPriors::neutral()).unwrap_err();
        assert!(matches!(err, TuningError::SearchSpaceExhausted { .. }));
    }
}
