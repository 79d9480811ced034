//! Feedback side of the retraining loop.
//!
//! This crate provides:
//! - `FeedbackLedger`: append-only record of dislikes and negative examples
//! - Feature-adjustment policy per dislike reason, and `SearchPriors`
//!   aggregated over a retraining batch
//! - Read-side pattern analysis and feedback metrics
//! - `RetrainTrigger` implementations composed in a `TriggerSet`
//!
//! ## Data Flow
//! 1. A dislike is validated and appended together with its training example
//! 2. The reason is mapped to advisory genre/cast deltas
//! 3. Triggers observe the unused-example count (and active accuracy)
//! 4. A retraining cycle consumes a batch and marks it used

pub mod adjustments;
pub mod ledger;
pub mod patterns;
pub mod training;
pub mod triggers;

// Re-export main types
pub use adjustments::{feature_adjustment, FeatureAdjustment, SearchPriors};
pub use ledger::{FeedbackLedger, RecordedDislike, DEFAULT_HISTORY_LIMIT, MAX_BATCH_SIZE};
pub use patterns::{analyze_patterns, DislikePatterns, FeedbackMetrics, RecentTrend, PATTERN_WINDOW_DAYS};
pub use training::{derive_training_example, DISLIKE_WEIGHT};
pub use triggers::{
    AccuracyTrigger, FeedbackVolumeTrigger, RetrainTrigger, TriggerDecision, TriggerInputs,
    TriggerSet, TriggerState,
};
