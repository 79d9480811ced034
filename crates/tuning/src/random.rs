//! Random search: independent uniform draws over the search space.

use crate::space::{seen_fingerprints, Candidate, ParamSpace, MAX_ATTEMPTS};
use crate::strategy::SearchStrategy;
use domain::{
    CastTiers, ComponentWeights, ExperimentRecord, GenreBoost, HyperParams, HyperParamsDraft,
    PopularityMix, Result, SearchMethod, TuningError,
};
use feedback::SearchPriors;
use rand::rngs::StdRng;
use std::collections::HashSet;

pub struct RandomSearch {
    space: ParamSpace,
    /// Cast position cutoffs aren't searched; they are copied from here
    base: HyperParams,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: ParamSpace, base: HyperParams, rng: StdRng) -> Self {
        Self { space, base, rng }
    }

    /// Draw one configuration, retrying up to `MAX_ATTEMPTS` times.
    pub(crate) fn draw(&mut self, priors: &SearchPriors, seen: &mut HashSet<String>) -> Result<HyperParams> {
        for _ in 0..MAX_ATTEMPTS {
            let Some(draft) = self.sample_draft(priors) else {
                continue;
            };
            let Ok(config) = draft.build() else {
                continue;
            };
            if seen.insert(config.fingerprint()) {
                return Ok(config);
            }
        }
        Err(TuningError::SearchSpaceExhausted {
            method: SearchMethod::Random.to_string(),
            attempts: MAX_ATTEMPTS,
        })
    }

    /// One raw draw. Genre and cast draws are scaled by `1 + bias` before
    /// the weights are renormalized.
    fn sample_draft(&mut self, priors: &SearchPriors) -> Option<HyperParamsDraft> {
        let space = &self.space;
        let rng = &mut self.rng;

        let mut raw = [0.0; ComponentWeights::COUNT];
        for w in raw.iter_mut() {
            *w = space.weight.sample(rng);
        }
        raw[0] *= 1.0 + priors.genre_bias;
        raw[1] *= 1.0 + priors.cast_bias;
        let weights = ComponentWeights::from_array(raw).normalized()?;

        let rating_weight = space.popularity_rating.sample(rng);
        let base_tiers = self.base.cast_tiers();

        Some(HyperParamsDraft {
            weights,
            genre_boost: GenreBoost {
                boost_high: space.boost_high.sample(rng),
                boost_medium: space.boost_medium.sample(rng),
                boost_low: space.boost_low.sample(rng),
                threshold_high: space.threshold_high.sample(rng),
                threshold_medium: space.threshold_medium.sample(rng),
                threshold_low: space.threshold_low.sample(rng),
            },
            cast_tiers: CastTiers {
                lead_weight: space.lead_weight,
                supporting_weight: space.supporting_weight.sample(rng),
                background_weight: space.background_weight.sample(rng),
                lead_cutoff: base_tiers.lead_cutoff,
                supporting_cutoff: base_tiers.supporting_cutoff,
            },
            popularity: PopularityMix {
                rating_weight,
                count_weight: 1.0 - rating_weight,
            },
            accuracy_threshold: space.accuracy_threshold.sample(rng),
        })
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

impl SearchStrategy for RandomSearch {
    fn method(&self) -> SearchMethod {
        SearchMethod::Random
    }

    fn generate(
        &mut self,
        n: usize,
        history: &[ExperimentRecord],
        priors: &SearchPriors,
    ) -> Result<Vec<Candidate>> {
        let mut seen = seen_fingerprints(history);
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let config = self.draw(priors, &mut seen)?;
            out.push(Candidate::new(config));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn search(seed: u64) -> RandomSearch {
        RandomSearch::new(ParamSpace::default(), HyperParams::default(), StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_same_seed_same_candidates() {
        let a = search(42).generate(10, &[], &SearchPriors::neutral()).unwrap();
        let b = search(42).generate(10, &[], &SearchPriors::neutral()).unwrap();
        assert_eq!(a, b);

        let c = search(43).generate(10, &[], &SearchPriors::neutral()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_candidates_are_valid_and_in_bounds() {
        let space = ParamSpace::default();
        let candidates = search(1).generate(50, &[], &SearchPriors::neutral()).unwrap();
        assert_eq!(candidates.len(), 50);

        for candidate in candidates {
            let config = candidate.config;
            assert!((config.weights().sum() - 1.0).abs() < 1e-6);
            let g = config.genre_boost();
            assert!(space.boost_low.contains(g.boost_low));
            assert!(g.threshold_high > g.threshold_medium && g.threshold_medium > g.threshold_low);
            assert_eq!(config.cast_tiers().lead_weight, 1.0);
            assert!(space.accuracy_threshold.contains(config.accuracy_threshold()));
            assert!(candidate.parent_experiment_id.is_none());
        }
    }

    #[test]
    fn test_priors_shrink_genre_weight() {
        let neutral = search(9).generate(200, &[], &SearchPriors::neutral()).unwrap();
        let biased = search(9)
            .generate(
                200,
                &[],
                &SearchPriors {
                    genre_bias: -0.5,
                    cast_bias: 0.0,
                },
            )
            .unwrap();

        let mean = |cs: &[Candidate]| cs.iter().map(|c| c.config.weights().genre).sum::<f64>() / cs.len() as f64;
        assert!(mean(&biased) < mean(&neutral));
    }
}
