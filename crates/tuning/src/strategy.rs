//! The search strategy trait and the engine that builds strategies.

use crate::adaptive::{AdaptiveSearch, DEFAULT_SIGMA_FRACTION};
use crate::grid::{GridSearch, DEFAULT_RADIUS, DEFAULT_STEPS};
use crate::random::RandomSearch;
use crate::space::{Candidate, ParamSpace};
use domain::{ExperimentRecord, HyperParams, Result, SearchMethod};
use feedback::SearchPriors;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

/// Core trait for candidate generators.
///
/// ## Design Note
/// - Generators are stateful: each `generate` call continues where the
///   previous one stopped and never replays a configuration
/// - `history` is the persisted experiment set; configurations already in it
///   are never produced again
/// - Every returned configuration is already validated
pub trait SearchStrategy: Send {
    fn method(&self) -> SearchMethod;

    /// Produce up to `n` fresh candidates.
    ///
    /// # Returns
    /// * `Ok(Vec<Candidate>)` - Valid candidates (grid may return fewer than
    ///   `n` when it runs out of points)
    /// * `Err(SearchSpaceExhausted)` - No valid candidate could be produced
    fn generate(
        &mut self,
        n: usize,
        history: &[ExperimentRecord],
        priors: &SearchPriors,
    ) -> Result<Vec<Candidate>>;
}

/// Tunables shared by every strategy the engine builds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSettings {
    pub grid_radius: f64,
    pub grid_steps: usize,
    pub sigma_fraction: f64,
    /// Fixed seed for reproducible runs; `None` draws from the OS
    pub seed: Option<u64>,
    pub space: ParamSpace,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            grid_radius: DEFAULT_RADIUS,
            grid_steps: DEFAULT_STEPS,
            sigma_fraction: DEFAULT_SIGMA_FRACTION,
            seed: None,
            space: ParamSpace::default(),
        }
    }
}

/// Builds a strategy per batch.
///
/// ## Example
/// ```ignore
/// let engine = SearchEngine::new(SearchSettings { seed: Some(7), ..Default::default() });
/// let candidates = engine.generate(SearchMethod::Random, 10, &base, &history, &priors)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    settings: SearchSettings,
}

impl SearchEngine {
    pub fn new(settings: SearchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Strategy for one batch, centred on `base`.
    ///
    /// A fixed seed is salted with the history length so that two batches
    /// over a growing history don't draw the same stream.
    pub fn strategy(&self, method: SearchMethod, base: &HyperParams, history_len: usize) -> Box<dyn SearchStrategy> {
        let s = self.settings;
        match method {
            SearchMethod::Grid => Box::new(GridSearch::new(base, s.grid_radius, s.grid_steps)),
            SearchMethod::Random => Box::new(RandomSearch::new(s.space, *base, self.rng(history_len))),
            SearchMethod::Adaptive => {
                let fallback = RandomSearch::new(s.space, *base, self.rng(history_len));
                Box::new(AdaptiveSearch::new(s.space, s.sigma_fraction, fallback))
            }
        }
    }

    /// Generate `n` candidates with a fresh strategy.
    pub fn generate(
        &self,
        method: SearchMethod,
        n: usize,
        base: &HyperParams,
        history: &[ExperimentRecord],
        priors: &SearchPriors,
    ) -> Result<Vec<Candidate>> {
        let mut strategy = self.strategy(method, base, history.len());
        let candidates = strategy.generate(n, history, priors)?;
        debug!(
            method = %strategy.method(),
            requested = n,
            produced = candidates.len(),
            history = history.len(),
            "Generated candidates"
        );
        Ok(candidates)
    }

    fn rng(&self, salt: usize) -> StdRng {
        match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(salt as u64)),
            None => StdRng::from_os_rng(),
        }
    }
}
