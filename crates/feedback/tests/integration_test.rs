//! Integration tests for the feedback ledger and retraining triggers.
//!
//! These walk a realistic sequence: dislikes accumulate, the trigger flips
//! to READY, a batch is consumed, and the trigger falls back to WAITING.

use domain::{DislikeReason, DislikeRequest, MemoryStore};
use feedback::{
    FeedbackLedger, FeedbackVolumeTrigger, SearchPriors, TriggerInputs, TriggerSet, TriggerState,
    MAX_BATCH_SIZE,
};
use std::sync::Arc;

fn dislike(item_id: u32, reason: DislikeReason) -> DislikeRequest {
    DislikeRequest {
        item_id,
        title: format!("Movie {}", item_id),
        set_id: Some(1),
        predicted_score: 0.75,
        reason,
        genres: vec!["Action".to_string(), "Sci-Fi".to_string()],
        cast: vec!["Lead".to_string()],
        comment: "not for me".to_string(),
    }
}

fn state(ledger: &FeedbackLedger, triggers: &TriggerSet) -> TriggerState {
    let inputs = TriggerInputs {
        unused_examples: ledger.unused_count().unwrap(),
        active_accuracy: None,
    };
    triggers.evaluate(&inputs).state
}

#[test]
fn test_wrong_genre_dislike_end_to_end() {
    let ledger = FeedbackLedger::new(Arc::new(MemoryStore::new()));
    let recorded = ledger.record_dislike(42, &dislike(7, DislikeReason::WrongGenre)).unwrap();

    assert_eq!(recorded.example.actual, 0.0);
    assert_eq!(recorded.example.error, 0.75);
    assert_eq!(recorded.example.weight, 0.8);
    assert_eq!(recorded.adjustment.genre_deltas.len(), 2);
    assert!(recorded.adjustment.genre_deltas.values().all(|d| *d == -0.15));
    assert!(recorded.adjustment.cast_deltas.is_empty());
}

#[test]
fn test_trigger_cycle() {
    let ledger = FeedbackLedger::new(Arc::new(MemoryStore::new()));
    let triggers = TriggerSet::new().add_trigger(FeedbackVolumeTrigger::new(20));

    for item in 0..19 {
        ledger.record_dislike(1, &dislike(item, DislikeReason::NotInterested)).unwrap();
    }
    assert_eq!(state(&ledger, &triggers), TriggerState::Waiting);
    // Repeated checks without new feedback don't change anything
    assert_eq!(state(&ledger, &triggers), TriggerState::Waiting);

    ledger.record_dislike(1, &dislike(19, DislikeReason::NotInterested)).unwrap();
    assert_eq!(state(&ledger, &triggers), TriggerState::Ready);

    let batch = ledger.unused_batch(MAX_BATCH_SIZE).unwrap();
    assert_eq!(batch.len(), 20);
    let priors = SearchPriors::from_examples(&batch);
    assert!((priors.genre_bias + 0.075).abs() < 1e-12);

    let ids: Vec<u64> = batch.iter().map(|e| e.example_id).collect();
    ledger.mark_used(&ids).unwrap();
    assert_eq!(state(&ledger, &triggers), TriggerState::Waiting);
}

#[test]
fn test_metrics_track_all_examples() {
    let ledger = FeedbackLedger::new(Arc::new(MemoryStore::new()));
    assert_eq!(ledger.feedback_metrics().unwrap().total_negative_examples, 0);

    ledger.record_dislike(1, &dislike(1, DislikeReason::Other)).unwrap();
    ledger.record_dislike(2, &dislike(2, DislikeReason::Irrelevant)).unwrap();

    let metrics = ledger.feedback_metrics().unwrap();
    assert_eq!(metrics.total_negative_examples, 2);
    assert_eq!(metrics.unused_examples, 2);
    assert!((metrics.avg_predicted_score - 0.75).abs() < 1e-12);
}
