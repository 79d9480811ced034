//! Adaptive (Bayesian-like) search seeded from elite experiments.
//!
//! ## Algorithm
//! 1. Take completed experiments; with fewer than `MIN_HISTORY`, fall back
//!    to random search
//! 2. Elites = top quartile by accuracy (at least one)
//! 3. For each candidate, pick an elite with probability proportional to
//!    its improvement over baseline (floored so no elite has zero chance)
//! 4. Perturb every searchable parameter with Gaussian noise,
//!    sigma = fraction of the parameter's range, and revalidate
//!
//! Search priors shift the mean of the genre and cast weight noise by
//! `bias * sigma`.

use crate::random::RandomSearch;
use crate::space::{seen_fingerprints, Bounds, Candidate, ParamSpace, MAX_ATTEMPTS};
use crate::strategy::SearchStrategy;
use domain::{
    ComponentWeights, ExperimentRecord, HyperParams, Result, SearchMethod, TuningError,
};
use feedback::SearchPriors;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand_distr::Normal;
use tracing::debug;

/// Completed experiments required before elites are trusted
pub const MIN_HISTORY: usize = 4;

pub const DEFAULT_SIGMA_FRACTION: f64 = 0.05;

/// Selection weight every elite gets on top of its improvement
const SELECTION_FLOOR: f64 = 1e-3;

pub struct AdaptiveSearch {
    space: ParamSpace,
    sigma_fraction: f64,
    fallback: RandomSearch,
}

impl AdaptiveSearch {
    /// `fallback` also supplies the random source for perturbations.
    pub fn new(space: ParamSpace, sigma_fraction: f64, fallback: RandomSearch) -> Self {
        Self {
            space,
            sigma_fraction,
            fallback,
        }
    }

    /// `Ok(None)` when the perturbed draft fails validation
    fn perturb(&mut self, config: &HyperParams, priors: &SearchPriors) -> Result<Option<HyperParams>> {
        let space = self.space;
        let fraction = self.sigma_fraction;
        let rng = self.fallback.rng_mut();

        let mut draft = config.to_draft();

        let sigma_w = fraction * space.weight.width();
        let mut weights = draft.weights.to_array();
        for (index, w) in weights.iter_mut().enumerate() {
            let shift = match index {
                0 => priors.genre_bias * sigma_w,
                1 => priors.cast_bias * sigma_w,
                _ => 0.0,
            };
            *w = space.weight.clamp(gaussian(rng, *w + shift, sigma_w)?);
        }
        let Some(normalized) = ComponentWeights::from_array(weights).normalized() else {
            return Ok(None);
        };
        draft.weights = normalized;

        let g = &mut draft.genre_boost;
        g.boost_high = jitter(rng, g.boost_high, space.boost_high, fraction)?;
        g.boost_medium = jitter(rng, g.boost_medium, space.boost_medium, fraction)?;
        g.boost_low = jitter(rng, g.boost_low, space.boost_low, fraction)?;
        g.threshold_high = jitter(rng, g.threshold_high, space.threshold_high, fraction)?;
        g.threshold_medium = jitter(rng, g.threshold_medium, space.threshold_medium, fraction)?;
        g.threshold_low = jitter(rng, g.threshold_low, space.threshold_low, fraction)?;

        let c = &mut draft.cast_tiers;
        c.supporting_weight = jitter(rng, c.supporting_weight, space.supporting_weight, fraction)?;
        c.background_weight = jitter(rng, c.background_weight, space.background_weight, fraction)?;

        let rating = jitter(rng, draft.popularity.rating_weight, space.popularity_rating, fraction)?;
        draft.popularity.rating_weight = rating;
        draft.popularity.count_weight = 1.0 - rating;

        draft.accuracy_threshold = jitter(rng, draft.accuracy_threshold, space.accuracy_threshold, fraction)?;

        Ok(draft.build().ok())
    }
}

/// Top quartile of completed experiments by accuracy (ties: lower sequence)
pub fn select_elites<'a>(completed: &[&'a ExperimentRecord]) -> Vec<&'a ExperimentRecord> {
    let mut ranked: Vec<&ExperimentRecord> = completed.to_vec();
    ranked.sort_by(|a, b| {
        let acc_a = a.accuracy.unwrap_or(0.0);
        let acc_b = b.accuracy.unwrap_or(0.0);
        acc_b
            .partial_cmp(&acc_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.sequence.cmp(&b.sequence))
    });
    let count = completed.len().div_ceil(4).max(1);
    ranked.truncate(count);
    ranked
}

impl SearchStrategy for AdaptiveSearch {
    fn method(&self) -> SearchMethod {
        SearchMethod::Adaptive
    }

    fn generate(
        &mut self,
        n: usize,
        history: &[ExperimentRecord],
        priors: &SearchPriors,
    ) -> Result<Vec<Candidate>> {
        let completed: Vec<&ExperimentRecord> = history
            .iter()
            .filter(|e| e.is_completed() && e.accuracy.is_some())
            .collect();
        if completed.len() < MIN_HISTORY {
            debug!(
                completed = completed.len(),
                "Not enough completed experiments for adaptive search, using random"
            );
            return self.fallback.generate(n, history, priors);
        }

        let elites = select_elites(&completed);
        let selection: Vec<f64> = elites
            .iter()
            .map(|e| e.improvement.unwrap_or(0.0).max(0.0) + SELECTION_FLOOR)
            .collect();
        let picker = WeightedIndex::new(&selection)
            .map_err(|err| TuningError::validation(format!("invalid elite weights: {}", err)))?;
        debug!(elites = elites.len(), completed = completed.len(), "Adaptive search seeded");

        let mut seen = seen_fingerprints(history);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let mut produced = None;
            for _ in 0..MAX_ATTEMPTS {
                let elite = elites[picker.sample(self.fallback.rng_mut())];
                let Some(config) = self.perturb(&elite.config, priors)? else {
                    continue;
                };
                if seen.insert(config.fingerprint()) {
                    produced = Some(Candidate::with_parent(config, elite.experiment_id.clone()));
                    break;
                }
            }
            let candidate = produced.ok_or_else(|| TuningError::SearchSpaceExhausted {
                method: SearchMethod::Adaptive.to_string(),
                attempts: MAX_ATTEMPTS,
            })?;
            out.push(candidate);
        }
        Ok(out)
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, value: f64, bounds: Bounds, fraction: f64) -> Result<f64> {
    Ok(bounds.clamp(gaussian(rng, value, fraction * bounds.width())?))
}

/// One draw from `N(mean, sigma)`
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, sigma: f64) -> Result<f64> {
    let normal = Normal::new(mean, sigma)
        .map_err(|err| TuningError::validation(format!("invalid perturbation sigma {}: {}", sigma, err)))?;
    Ok(normal.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::ExperimentStatus;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn search(seed: u64) -> AdaptiveSearch {
        let space = ParamSpace::default();
        let fallback = RandomSearch::new(space, HyperParams::default(), StdRng::seed_from_u64(seed));
        AdaptiveSearch::new(space, DEFAULT_SIGMA_FRACTION, fallback)
    }

    fn completed(seq: u64, accuracy: f64) -> ExperimentRecord {
        ExperimentRecord {
            experiment_id: format!("random_20260101_000000_{:04}", seq),
            sequence: seq,
            method: SearchMethod::Random,
            config: HyperParams::default(),
            status: ExperimentStatus::Completed,
            accuracy: Some(accuracy),
            improvement: Some(accuracy - 0.5),
            failure_reason: None,
            parent_experiment_id: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_falls_back_to_random_with_short_history() {
        let history: Vec<ExperimentRecord> = (1..=3).map(|i| completed(i, 0.6)).collect();
        let candidates = search(3).generate(5, &history, &SearchPriors::neutral()).unwrap();
        assert_eq!(candidates.len(), 5);
        assert!(candidates.iter().all(|c| c.parent_experiment_id.is_none()));
    }

    #[test]
    fn test_parents_are_elites() {
        let history: Vec<ExperimentRecord> = (1..=8).map(|i| completed(i, 0.5 + i as f64 * 0.01)).collect();
        let candidates = search(5).generate(20, &history, &SearchPriors::neutral()).unwrap();

        // 8 completed -> 2 elites: the two most accurate
        let elite_ids = [history[7].experiment_id.clone(), history[6].experiment_id.clone()];
        for candidate in &candidates {
            let parent = candidate.parent_experiment_id.as_ref().unwrap();
            assert!(elite_ids.contains(parent));
            assert!((candidate.config.weights().sum() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_elite_count_is_top_quartile() {
        let history: Vec<ExperimentRecord> = (1..=5).map(|i| completed(i, 0.6)).collect();
        let refs: Vec<&ExperimentRecord> = history.iter().collect();
        let elites = select_elites(&refs);
        assert_eq!(elites.len(), 2);
        // Equal accuracy: lower sequence wins
        assert_eq!(elites[0].sequence, 1);
    }

    #[test]
    fn test_gaussian_is_centered() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| gaussian(&mut rng, 0.3, 0.05).unwrap()).sum::<f64>() / n as f64;
        assert!((mean - 0.3).abs() < 0.005);
    }

    #[test]
    fn test_gaussian_rejects_negative_sigma() {
        let mut rng = StdRng::seed_from_u64(11);
        let err = gaussian(&mut rng, 0.3, -0.1).unwrap_err();
        assert!(matches!(err, TuningError::Validation(_)));
    }
}
