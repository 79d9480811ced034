//! Append-only ledger of dislikes and their negative training examples.
//!
//! Recording a dislike is one atomic store write that appends the event and
//! the example derived from it. Nothing in the ledger is ever edited except
//! the `used` flag of examples, which only moves from false to true.

use crate::adjustments::{feature_adjustment, FeatureAdjustment};
use crate::patterns::{analyze_patterns, dislike_weight, DislikePatterns, FeedbackMetrics};
use crate::training::derive_training_example;
use chrono::{DateTime, Utc};
use domain::{
    Collection, DislikeEvent, DislikeRequest, DislikedItem, ExampleId, MovieId, NegativeTrainingExample,
    PersistenceStore, Result, TuningError, UserId,
};
use std::sync::Arc;
use tracing::info;

/// Upper bound on one retraining batch
pub const MAX_BATCH_SIZE: usize = 100;

/// Default number of entries returned by `dislike_history`
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// What one recorded dislike produced
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDislike {
    pub event: DislikeEvent,
    pub example: NegativeTrainingExample,
    pub adjustment: FeatureAdjustment,
}

impl RecordedDislike {
    pub fn dislike_id(&self) -> u64 {
        self.event.dislike_id
    }
}

#[derive(Clone)]
pub struct FeedbackLedger {
    store: Arc<dyn PersistenceStore>,
}

impl FeedbackLedger {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self { store }
    }

    pub fn record_dislike(&self, user_id: UserId, request: &DislikeRequest) -> Result<RecordedDislike> {
        self.record_dislike_at(user_id, request, Utc::now())
    }

    /// Validate, then append the event and its training example in one write.
    ///
    /// Invalid input is rejected before any id is allocated.
    pub fn record_dislike_at(
        &self,
        user_id: UserId,
        request: &DislikeRequest,
        now: DateTime<Utc>,
    ) -> Result<RecordedDislike> {
        validate_request(request)?;

        let dislike_id = self.store.next_sequence(Collection::Dislikes)?;
        let example_id = self.store.next_sequence(Collection::Examples)?;

        let event = DislikeEvent {
            dislike_id,
            user_id,
            item_id: request.item_id,
            title: request.title.trim().to_string(),
            set_id: request.set_id,
            predicted_score: request.predicted_score,
            reason: request.reason,
            comment: request.comment.clone(),
            created_at: now,
        };
        let example = derive_training_example(&event, example_id).with_item(DislikedItem {
            title: event.title.clone(),
            genres: request.genres.clone(),
            cast: request.cast.clone(),
        });
        self.store.record_feedback(event.clone(), example.clone())?;

        info!(
            dislike_id,
            user_id,
            item_id = event.item_id,
            reason = %event.reason,
            error = example.error,
            "Dislike recorded"
        );

        let adjustment = feature_adjustment(request.reason, &request.genres, &request.cast);
        Ok(RecordedDislike {
            event,
            example,
            adjustment,
        })
    }

    /// Most recent dislikes of one user, newest first
    pub fn dislike_history(&self, user_id: UserId, limit: usize) -> Result<Vec<DislikeEvent>> {
        let mut events = self.store.dislikes_for_user(user_id)?;
        events.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.dislike_id.cmp(&a.dislike_id))
        });
        events.truncate(limit);
        Ok(events)
    }

    pub fn pattern_analysis(&self, user_id: UserId, now: DateTime<Utc>, window_days: i64) -> Result<DislikePatterns> {
        let events = self.store.dislikes_for_user(user_id)?;
        Ok(analyze_patterns(&events, now, window_days))
    }

    /// Frequency/recency weight of this user's dislikes of one item
    pub fn dislike_weight(&self, user_id: UserId, item_id: MovieId, now: DateTime<Utc>) -> Result<f64> {
        let events = self.store.dislikes_for_user(user_id)?;
        let matching: Vec<&DislikeEvent> = events.iter().filter(|e| e.item_id == item_id).collect();
        Ok(dislike_weight(&matching, now))
    }

    pub fn feedback_metrics(&self) -> Result<FeedbackMetrics> {
        let examples = self.store.examples()?;
        Ok(FeedbackMetrics::from_examples(&examples))
    }

    pub fn unused_count(&self) -> Result<usize> {
        self.store.count_unused()
    }

    /// Unused examples, most recent first, at most `min(limit, MAX_BATCH_SIZE)`
    pub fn unused_batch(&self, limit: usize) -> Result<Vec<NegativeTrainingExample>> {
        let mut unused: Vec<NegativeTrainingExample> =
            self.store.examples()?.into_iter().filter(|e| !e.used).collect();
        unused.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.example_id.cmp(&a.example_id))
        });
        unused.truncate(limit.min(MAX_BATCH_SIZE));
        Ok(unused)
    }

    /// Flip `used` on a consumed batch. Returns how many flags changed.
    pub fn mark_used(&self, ids: &[ExampleId]) -> Result<usize> {
        let flipped = self.store.mark_examples_used(ids)?;
        info!(requested = ids.len(), flipped, "Negative examples marked as used");
        Ok(flipped)
    }
}

fn validate_request(request: &DislikeRequest) -> Result<()> {
    if request.title.trim().is_empty() {
        return Err(TuningError::validation("title must not be empty"));
    }
    if !(0.0..=1.0).contains(&request.predicted_score) {
        return Err(TuningError::validation(format!(
            "predicted score must lie in [0, 1], got {}",
            request.predicted_score
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{DislikeReason, MemoryStore};

    fn ledger() -> FeedbackLedger {
        FeedbackLedger::new(Arc::new(MemoryStore::new()))
    }

    fn request(item_id: MovieId, score: f64, reason: DislikeReason) -> DislikeRequest {
        DislikeRequest {
            item_id,
            title: format!("Movie {}", item_id),
            predicted_score: score,
            reason,
            genres: vec!["Action".to_string(), "Sci-Fi".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_record_dislike_produces_example_and_adjustment() {
        let ledger = ledger();
        let recorded = ledger
            .record_dislike(1, &request(10, 0.75, DislikeReason::WrongGenre))
            .unwrap();

        assert_eq!(recorded.dislike_id(), 1);
        assert_eq!(recorded.example.actual, 0.0);
        assert_eq!(recorded.example.error, 0.75);
        assert_eq!(recorded.example.weight, 0.8);
        assert_eq!(recorded.adjustment.genre_deltas.get("Action"), Some(&-0.15));
        assert_eq!(recorded.adjustment.genre_deltas.get("Sci-Fi"), Some(&-0.15));
        assert_eq!(ledger.unused_count().unwrap(), 1);
    }

    #[test]
    fn test_example_keeps_item_features() {
        let ledger = ledger();
        let mut dislike = request(10, 0.6, DislikeReason::PoorQuality);
        dislike.cast = vec!["Lead".to_string(), "Sidekick".to_string()];
        ledger.record_dislike(1, &dislike).unwrap();

        let stored = ledger.unused_batch(10).unwrap();
        assert_eq!(stored[0].item.title, "Movie 10");
        assert_eq!(stored[0].item.genres, vec!["Action", "Sci-Fi"]);
        assert_eq!(stored[0].item.cast, vec!["Lead", "Sidekick"]);
    }

    #[test]
    fn test_invalid_requests_have_no_side_effect() {
        let ledger = ledger();
        let mut blank = request(10, 0.5, DislikeReason::Other);
        blank.title = "   ".to_string();
        assert!(matches!(ledger.record_dislike(1, &blank), Err(TuningError::Validation(_))));

        let out_of_range = request(10, 1.2, DislikeReason::Other);
        assert!(ledger.record_dislike(1, &out_of_range).is_err());

        assert_eq!(ledger.unused_count().unwrap(), 0);
        // First id is still 1 after the rejected calls
        let ok = ledger.record_dislike(1, &request(10, 0.5, DislikeReason::Other)).unwrap();
        assert_eq!(ok.dislike_id(), 1);
    }

    #[test]
    fn test_history_is_newest_first_and_limited() {
        let ledger = ledger();
        let now = Utc::now();
        for i in 0..5 {
            ledger
                .record_dislike_at(1, &request(i, 0.5, DislikeReason::Other), now + Duration::minutes(i as i64))
                .unwrap();
        }
        ledger.record_dislike_at(2, &request(99, 0.5, DislikeReason::Other), now).unwrap();

        let history = ledger.dislike_history(1, 3).unwrap();
        let items: Vec<MovieId> = history.iter().map(|e| e.item_id).collect();
        assert_eq!(items, vec![4, 3, 2]);
    }

    #[test]
    fn test_unused_batch_and_mark_used() {
        let ledger = ledger();
        let now = Utc::now();
        for i in 0..4 {
            ledger
                .record_dislike_at(1, &request(i, 0.5, DislikeReason::Other), now + Duration::seconds(i as i64))
                .unwrap();
        }

        let batch = ledger.unused_batch(2).unwrap();
        let ids: Vec<ExampleId> = batch.iter().map(|e| e.example_id).collect();
        assert_eq!(ids, vec![4, 3]);

        assert_eq!(ledger.mark_used(&ids).unwrap(), 2);
        assert_eq!(ledger.mark_used(&ids).unwrap(), 0);
        assert_eq!(ledger.unused_count().unwrap(), 2);
        assert!(ledger.unused_batch(500).unwrap().iter().all(|e| !e.used));
    }

    #[test]
    fn test_patterns_and_weight_from_store() {
        let ledger = ledger();
        let now = Utc::now();
        for _ in 0..3 {
            ledger.record_dislike_at(7, &request(10, 0.9, DislikeReason::PoorQuality), now).unwrap();
        }

        let patterns = ledger.pattern_analysis(7, now, 30).unwrap();
        assert_eq!(patterns.total, 3);
        assert_eq!(patterns.reason_histogram.get("poor_quality"), Some(&3));
        assert!((ledger.dislike_weight(7, 10, now).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(ledger.dislike_weight(7, 11, now).unwrap(), 0.0);

        // Unknown user degrades to empty aggregates
        assert_eq!(ledger.pattern_analysis(8, now, 30).unwrap().total, 0);
    }
}
