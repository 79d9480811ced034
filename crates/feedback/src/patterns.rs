//! Read-side aggregations over recorded feedback.
//!
//! Pure functions over slices of records; empty input gives zeroed output.

use chrono::{DateTime, Duration, Utc};
use domain::{DislikeEvent, NegativeTrainingExample};
use serde::Serialize;
use std::collections::BTreeMap;

/// Default rolling window for recent-trend analysis
pub const PATTERN_WINDOW_DAYS: i64 = 30;

/// Dislikes inside the rolling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RecentTrend {
    pub window_days: i64,
    pub count: usize,
    pub avg_predicted_score: f64,
}

/// What a user keeps disliking, and why
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DislikePatterns {
    /// Reason name -> count
    pub reason_histogram: BTreeMap<String, usize>,
    pub recent: RecentTrend,
    pub total: usize,
}

impl DislikePatterns {
    /// Most frequent reason (ties go to the alphabetically first)
    pub fn dominant_reason(&self) -> Option<&str> {
        self.reason_histogram
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(reason, _)| reason.as_str())
    }
}

pub fn analyze_patterns(events: &[DislikeEvent], now: DateTime<Utc>, window_days: i64) -> DislikePatterns {
    let mut patterns = DislikePatterns {
        recent: RecentTrend {
            window_days,
            ..Default::default()
        },
        ..Default::default()
    };

    let cutoff = now - Duration::days(window_days);
    let mut recent_score_sum = 0.0;

    for event in events {
        *patterns
            .reason_histogram
            .entry(event.reason.as_str().to_string())
            .or_insert(0) += 1;
        patterns.total += 1;

        if event.created_at > cutoff {
            patterns.recent.count += 1;
            recent_score_sum += event.predicted_score;
        }
    }

    if patterns.recent.count > 0 {
        patterns.recent.avg_predicted_score = recent_score_sum / patterns.recent.count as f64;
    }
    patterns
}

/// Aggregate error statistics over negative examples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FeedbackMetrics {
    pub total_negative_examples: usize,
    pub unused_examples: usize,
    pub avg_error: f64,
    pub max_error: f64,
    pub min_error: f64,
    pub avg_predicted_score: f64,
}

impl FeedbackMetrics {
    pub fn from_examples(examples: &[NegativeTrainingExample]) -> Self {
        if examples.is_empty() {
            return Self::default();
        }

        let n = examples.len() as f64;
        let mut metrics = FeedbackMetrics {
            total_negative_examples: examples.len(),
            max_error: f64::MIN,
            min_error: f64::MAX,
            ..Default::default()
        };
        let mut error_sum = 0.0;
        let mut predicted_sum = 0.0;

        for example in examples {
            error_sum += example.error;
            predicted_sum += example.predicted;
            metrics.max_error = metrics.max_error.max(example.error);
            metrics.min_error = metrics.min_error.min(example.error);
            if !example.used {
                metrics.unused_examples += 1;
            }
        }

        metrics.avg_error = error_sum / n;
        metrics.avg_predicted_score = predicted_sum / n;
        metrics
    }
}

/// Frequency and recency weight of repeated dislikes of one item.
///
/// `min(count / 3, 1) * max(0.5, 1 - days_since_last / 180)`; 0 when the
/// item was never disliked.
pub fn dislike_weight(events: &[&DislikeEvent], now: DateTime<Utc>) -> f64 {
    let Some(last) = events.iter().map(|e| e.created_at).max() else {
        return 0.0;
    };

    let frequency = (events.len() as f64 / 3.0).min(1.0);
    let days_since = (now - last).num_seconds() as f64 / 86_400.0;
    let decay = if days_since > 0.0 {
        (1.0 - days_since / 180.0).max(0.5)
    } else {
        1.0
    };
    frequency * decay
}
