//! Conversion of a dislike into a negative training example.

use domain::{DislikeEvent, ExampleId, NegativeTrainingExample};

/// Confidence multiplier of a dislike relative to an explicit rating
pub const DISLIKE_WEIGHT: f64 = 0.8;

/// Target score of every negative example
pub const NEGATIVE_LABEL: f64 = 0.0;

/// Derive the negative training example for a dislike.
///
/// Deterministic: the only inputs are the event and the id to assign.
pub fn derive_training_example(event: &DislikeEvent, example_id: ExampleId) -> NegativeTrainingExample {
    NegativeTrainingExample {
        example_id,
        dislike_id: event.dislike_id,
        user_id: event.user_id,
        item_id: event.item_id,
        reason: event.reason,
        actual: NEGATIVE_LABEL,
        predicted: event.predicted_score,
        error: (event.predicted_score - NEGATIVE_LABEL).abs(),
        weight: DISLIKE_WEIGHT,
        used: false,
        created_at: event.created_at,
        item: Default::default(),
    }
}
