//! Experiment tracker: every (configuration, result) pair that was tried.
//!
//! Records go pending -> completed | failed exactly once. A second transition
//! fails with `InvalidStateTransition` and leaves the stored record as it was.

use chrono::{DateTime, Utc};
use domain::{
    Collection, ExperimentId, ExperimentRecord, ExperimentStatus, HyperParams, PersistenceStore,
    Result, SearchMethod, TuningError,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Aggregates over the experiment history.
///
/// Accuracy figures cover completed experiments only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExperimentStatistics {
    pub count: usize,
    pub mean_accuracy: f64,
    pub best_accuracy: f64,
    pub best_improvement: f64,
    pub best_experiment_id: Option<ExperimentId>,
    pub failed: usize,
    pub pending: usize,
}

pub struct ExperimentTracker {
    store: Arc<dyn PersistenceStore>,
    // Serialises read-check-write of a single transition
    transitions: Mutex<()>,
}

impl ExperimentTracker {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            store,
            transitions: Mutex::new(()),
        }
    }

    pub fn start(
        &self,
        config: HyperParams,
        method: SearchMethod,
        parent: Option<ExperimentId>,
    ) -> Result<ExperimentId> {
        self.start_at(config, method, parent, Utc::now())
    }

    /// Persist a new pending experiment.
    ///
    /// Ids look like `random_20260101_120000_0007`; the suffix is a
    /// store-allocated sequence, so ids are unique even within one second.
    pub fn start_at(
        &self,
        config: HyperParams,
        method: SearchMethod,
        parent: Option<ExperimentId>,
        now: DateTime<Utc>,
    ) -> Result<ExperimentId> {
        let sequence = self.store.next_sequence(Collection::Experiments)?;
        let experiment_id = format!("{}_{}_{:04}", method, now.format("%Y%m%d_%H%M%S"), sequence);

        let record = ExperimentRecord {
            experiment_id: experiment_id.clone(),
            sequence,
            method,
            config,
            status: ExperimentStatus::Pending,
            accuracy: None,
            improvement: None,
            failure_reason: None,
            parent_experiment_id: parent,
            created_at: now,
            completed_at: None,
        };
        self.store.insert_experiment(record)?;

        debug!(experiment_id = %experiment_id, "Experiment started");
        Ok(experiment_id)
    }

    pub fn complete(&self, experiment_id: &str, accuracy: f64, improvement: f64) -> Result<ExperimentRecord> {
        if !(0.0..=1.0).contains(&accuracy) {
            return Err(TuningError::validation(format!(
                "accuracy must lie in [0, 1], got {}",
                accuracy
            )));
        }
        if !improvement.is_finite() {
            return Err(TuningError::validation("improvement must be finite"));
        }

        let record = self.transition(experiment_id, |record, now| {
            record.complete(accuracy, improvement, now)
        })?;
        info!(
            experiment_id,
            accuracy,
            improvement,
            "Experiment completed"
        );
        Ok(record)
    }

    pub fn fail(&self, experiment_id: &str, reason: &str) -> Result<ExperimentRecord> {
        let record = self.transition(experiment_id, |record, now| record.fail(reason, now))?;
        warn!(experiment_id, reason, "Experiment failed");
        Ok(record)
    }

    fn transition(
        &self,
        experiment_id: &str,
        apply: impl FnOnce(&mut ExperimentRecord, DateTime<Utc>) -> Result<()>,
    ) -> Result<ExperimentRecord> {
        let _guard = self
            .transitions
            .lock()
            .map_err(|_| TuningError::Persistence("experiment transition lock poisoned".to_string()))?;

        let mut record = self
            .store
            .get_experiment(experiment_id)?
            .ok_or_else(|| TuningError::missing("experiment", experiment_id))?;
        apply(&mut record, Utc::now())?;
        self.store.update_experiment(record.clone())?;
        Ok(record)
    }

    pub fn get(&self, experiment_id: &str) -> Result<Option<ExperimentRecord>> {
        self.store.get_experiment(experiment_id)
    }

    /// All experiments in creation order
    pub fn history(&self) -> Result<Vec<ExperimentRecord>> {
        let mut records = self.store.experiments()?;
        records.sort_by_key(|e| e.sequence);
        Ok(records)
    }

    /// Experiments left pending by an interrupted batch, oldest first
    pub fn pending(&self) -> Result<Vec<ExperimentRecord>> {
        Ok(self
            .history()?
            .into_iter()
            .filter(|e| e.status == ExperimentStatus::Pending)
            .collect())
    }

    /// Most accurate completed experiment, optionally for one method.
    ///
    /// Ties go to the earliest completion, then the lowest sequence.
    pub fn best(&self, method: Option<SearchMethod>) -> Result<Option<ExperimentRecord>> {
        let history = self.history()?;
        Ok(best_of(
            history
                .iter()
                .filter(|e| e.is_completed())
                .filter(|e| method.is_none_or(|m| e.method == m)),
        )
        .cloned())
    }

    /// Degrades to zeroes on an empty history.
    pub fn statistics(&self) -> Result<ExperimentStatistics> {
        let history = self.history()?;
        let mut stats = ExperimentStatistics::default();

        let completed: Vec<&ExperimentRecord> = history.iter().filter(|e| e.is_completed()).collect();
        for record in &history {
            match record.status {
                ExperimentStatus::Failed => stats.failed += 1,
                ExperimentStatus::Pending => stats.pending += 1,
                ExperimentStatus::Completed => {}
            }
        }

        stats.count = completed.len();
        if completed.is_empty() {
            return Ok(stats);
        }

        let accuracies: Vec<f64> = completed.iter().filter_map(|e| e.accuracy).collect();
        stats.mean_accuracy = accuracies.iter().sum::<f64>() / accuracies.len().max(1) as f64;
        stats.best_improvement = completed
            .iter()
            .filter_map(|e| e.improvement)
            .fold(f64::MIN, f64::max);

        if let Some(best) = best_of(completed.iter().copied()) {
            stats.best_accuracy = best.accuracy.unwrap_or(0.0);
            stats.best_experiment_id = Some(best.experiment_id.clone());
        }
        Ok(stats)
    }
}

/// Ranking used by `best`: accuracy desc, completed_at asc, sequence asc
pub fn rank(a: &ExperimentRecord, b: &ExperimentRecord) -> Ordering {
    let acc_a = a.accuracy.unwrap_or(f64::MIN);
    let acc_b = b.accuracy.unwrap_or(f64::MIN);
    acc_b
        .partial_cmp(&acc_a)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.completed_at.cmp(&b.completed_at))
        .then_with(|| a.sequence.cmp(&b.sequence))
}

pub(crate) fn best_of<'a>(records: impl Iterator<Item = &'a ExperimentRecord>) -> Option<&'a ExperimentRecord> {
    records.min_by(|a, b| rank(a, b))
}
