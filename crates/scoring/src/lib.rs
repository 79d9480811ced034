//! Scoring and evaluation of hyperparameter configurations.
//!
//! This crate provides:
//! - `score`: the hybrid scoring function and its sub-scores
//! - `Evaluator`: weighted accuracy over a held-out set, batch evaluation,
//!   and A/B comparison of two configurations
//!
//! ## Example Usage
//! ```ignore
//! use scoring::{score, Evaluator};
//! use std::sync::Arc;
//!
//! let breakdown = score(&item, &profile, &HyperParams::default());
//! println!("hybrid = {:.3}", breakdown.hybrid_score);
//!
//! let evaluator = Evaluator::new(Arc::new(holdout));
//! let results = evaluator.evaluate_many(&candidates);
//! ```

pub mod evaluation;
pub mod scorer;

// Re-export main types
pub use evaluation::{Comparison, Evaluation, Evaluator, CORRECTNESS_TOLERANCE};
pub use scorer::{score, ScoreBreakdown};
