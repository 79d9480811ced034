//! The search space: per-parameter bounds and the candidate type.

use domain::{ExperimentId, ExperimentRecord, HyperParams};
use rand::Rng;
use std::collections::HashSet;

/// Draws per candidate before a generator gives up
pub const MAX_ATTEMPTS: usize = 32;

/// Closed interval a parameter is sampled from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lo: f64,
    pub hi: f64,
}

impl Bounds {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.lo..=self.hi).contains(&value)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lo, self.hi)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.random_range(self.lo..=self.hi)
    }
}

/// Bounds of every tunable parameter.
///
/// Primary weights are drawn from `weight` and renormalized; the lead cast
/// weight is held fixed and the popularity count weight is always
/// `1 - popularity_rating`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpace {
    pub weight: Bounds,
    pub boost_high: Bounds,
    pub boost_medium: Bounds,
    pub boost_low: Bounds,
    pub threshold_high: Bounds,
    pub threshold_medium: Bounds,
    pub threshold_low: Bounds,
    pub lead_weight: f64,
    pub supporting_weight: Bounds,
    pub background_weight: Bounds,
    pub popularity_rating: Bounds,
    pub accuracy_threshold: Bounds,
}

impl Default for ParamSpace {
    fn default() -> Self {
        Self {
            weight: Bounds::new(0.0, 1.0),
            boost_high: Bounds::new(0.05, 0.25),
            boost_medium: Bounds::new(0.05, 0.20),
            boost_low: Bounds::new(-0.30, -0.05),
            threshold_high: Bounds::new(0.6, 0.8),
            threshold_medium: Bounds::new(0.4, 0.6),
            threshold_low: Bounds::new(0.2, 0.4),
            lead_weight: 1.0,
            supporting_weight: Bounds::new(0.5, 0.9),
            background_weight: Bounds::new(0.1, 0.5),
            popularity_rating: Bounds::new(0.6, 0.8),
            accuracy_threshold: Bounds::new(0.60, 0.70),
        }
    }
}

/// A generated configuration waiting to be evaluated
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub config: HyperParams,
    /// Elite this candidate was derived from (adaptive search only)
    pub parent_experiment_id: Option<ExperimentId>,
}

impl Candidate {
    pub fn new(config: HyperParams) -> Self {
        Self {
            config,
            parent_experiment_id: None,
        }
    }

    pub fn with_parent(config: HyperParams, parent: ExperimentId) -> Self {
        Self {
            config,
            parent_experiment_id: Some(parent),
        }
    }
}

/// Fingerprints of every configuration already in the experiment history
pub fn seen_fingerprints(history: &[ExperimentRecord]) -> HashSet<String> {
    history.iter().map(|e| e.config.fingerprint()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_samples_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let bounds = Bounds::new(-0.30, -0.05);
        for _ in 0..1000 {
            assert!(bounds.contains(bounds.sample(&mut rng)));
        }
    }

    #[test]
    fn test_default_bounds_keep_thresholds_ordered() {
        let space = ParamSpace::default();
        assert!(space.threshold_high.lo >= space.threshold_medium.hi);
        assert!(space.threshold_medium.lo >= space.threshold_low.hi);
    }
}
