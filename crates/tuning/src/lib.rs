//! # Tuning Crate
//!
//! Hyperparameter search, experiment tracking, and model versioning.
//!
//! ## Components
//!
//! ### Search Engine
//! Three `SearchStrategy` implementations built by `SearchEngine`:
//! - Grid: deterministic steps around the current configuration
//! - Random: uniform draws over `ParamSpace`, seedable
//! - Adaptive: Gaussian perturbations of elite experiments, falling back to
//!   random while the history is short
//!
//! ### Experiment Tracker
//! Persists every evaluated configuration; `best` and `statistics` read the
//! history back.
//!
//! ### Model Version Manager
//! Promotion rule and the single-writer `activate` critical section.
//!
//! ### Search Runner
//! Ties the three together for one batch, with resumable, stoppable
//! parallel evaluation.
//!
//! ## Example Usage
//!
//! ```ignore
//! use tuning::{Baseline, ExperimentTracker, SearchEngine, SearchRunner, StopFlag};
//!
//! let tracker = Arc::new(ExperimentTracker::new(store.clone()));
//! let runner = SearchRunner::new(tracker.clone(), evaluator, SearchEngine::default());
//! let report = runner.run(SearchMethod::Adaptive, 10, &baseline, &priors, &StopFlag::new())?;
//! ```

pub mod adaptive;
pub mod grid;
pub mod random;
pub mod runner;
pub mod space;
pub mod strategy;
pub mod tracker;
pub mod versioning;

// Re-export main types
pub use adaptive::AdaptiveSearch;
pub use grid::GridSearch;
pub use random::RandomSearch;
pub use runner::{Baseline, BatchReport, SearchRunner, StopFlag};
pub use space::{Bounds, Candidate, ParamSpace};
pub use strategy::{SearchEngine, SearchSettings, SearchStrategy};
pub use tracker::{ExperimentStatistics, ExperimentTracker};
pub use versioning::{ActivationOutcome, ModelVersionManager, VersionComparison, MIN_IMPROVEMENT};
