//! # Tuning Orchestrator
//!
//! Façade over the feedback-to-retraining loop, called by request handlers:
//! 1. `ingest_dislike`: ledger write, training impact, advisory deltas, and
//!    the user's updated dislike patterns
//! 2. `check_and_trigger_retraining`: evaluate triggers; when READY, consume
//!    a batch, run a search biased by the batch, promote the best result,
//!    and mark the batch used. A stopped cycle leaves the batch unused
//! 3. `run_search`: an ad hoc search batch without consuming feedback
//! 4. Read-side reports: tuning statistics, versions, patterns, metrics
//!
//! Search and evaluation are CPU-bound and run on `spawn_blocking`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use domain::{
    DislikeEvent, DislikeRequest, ExampleId, ExperimentId, ExperimentRecord, HoldoutSet,
    HyperParams, JsonFileStore, ModelVersion, PersistenceStore, SearchMethod, TuningError,
    UserId, VersionId, VersionStatus,
};
use feedback::{
    DislikePatterns, FeatureAdjustment, FeedbackLedger, FeedbackMetrics, SearchPriors,
    TriggerDecision, TriggerInputs, TriggerSet,
};
use scoring::Evaluator;
use tuning::{
    Baseline, BatchReport, ExperimentStatistics, ExperimentTracker, ModelVersionManager,
    SearchEngine, SearchRunner, StopFlag, VersionComparison,
};

use crate::settings::Settings;

/// Error and weight of the negative example a dislike produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainingImpact {
    pub error: f64,
    pub weight: f64,
}

/// Everything a request handler gets back from one dislike
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DislikeReceipt {
    pub dislike_id: u64,
    pub training_impact: TrainingImpact,
    pub feature_adjustments: FeatureAdjustment,
    pub user_patterns: DislikePatterns,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrainOutcome {
    pub triggered: bool,
    /// Negative examples consumed (and marked used) by this cycle
    pub batch_size: usize,
    /// The search was stopped; its batch stays unused for the next cycle
    pub stopped: bool,
    pub promoted_version_id: Option<VersionId>,
    /// Triggers that fired; empty when nothing was triggered
    pub fired_by: Vec<String>,
    pub experiments: Vec<ExperimentId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TuningReport {
    #[serde(flatten)]
    pub statistics: ExperimentStatistics,
    pub active_version_id: Option<VersionId>,
    pub active_accuracy: Option<f64>,
}

/// Main façade; cheap to clone (all state sits behind `Arc`s or the store)
#[derive(Clone)]
pub struct TuningOrchestrator {
    settings: Settings,
    ledger: FeedbackLedger,
    tracker: Arc<ExperimentTracker>,
    versions: Arc<ModelVersionManager>,
    holdout: Arc<HoldoutSet>,
    evaluator: Evaluator,
    engine: SearchEngine,
    triggers: Arc<TriggerSet>,
    stop: StopFlag,
}

impl TuningOrchestrator {
    /// Wire every component over one store and holdout snapshot.
    ///
    /// When no version is ACTIVE yet, the default configuration is evaluated
    /// and installed as the baseline.
    pub fn new(store: Arc<dyn PersistenceStore>, holdout: HoldoutSet, settings: Settings) -> Result<Self> {
        settings.validate().context("Invalid settings")?;

        let holdout = Arc::new(holdout);
        let evaluator = Evaluator::new(holdout.clone());
        let versions = Arc::new(ModelVersionManager::new(store.clone(), settings.min_improvement));

        let baseline_config = HyperParams::default();
        let baseline = versions
            .ensure_baseline(baseline_config, evaluator.accuracy(&baseline_config))
            .context("Failed to install baseline version")?;
        info!(
            "Active version {} (accuracy {:.4})",
            baseline.version_id, baseline.accuracy
        );

        Ok(Self {
            ledger: FeedbackLedger::new(store.clone()),
            tracker: Arc::new(ExperimentTracker::new(store)),
            versions,
            holdout,
            evaluator,
            engine: SearchEngine::new(settings.search_settings()),
            triggers: Arc::new(settings.triggers()),
            stop: StopFlag::new(),
            settings,
        })
    }

    /// Open the JSON state file and load the holdout set named in `settings`.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let store = JsonFileStore::open(&settings.state_path)
            .with_context(|| format!("Failed to open state file {}", settings.state_path.display()))?;
        let holdout = load_holdout(&settings.holdout_path)?;
        Self::new(Arc::new(store), holdout, settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Handle for stopping a running batch after its current chunk.
    ///
    /// A stop applies to the batch that is running, or to the next one if
    /// none is, and is cleared once that batch returns.
    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Record one dislike.
    ///
    /// Fails with `Unauthenticated` when there is no user, and with
    /// `Validation` on a blank title or an out-of-range score; neither leaves
    /// anything behind.
    pub fn ingest_dislike(&self, user_id: Option<UserId>, request: DislikeRequest) -> Result<DislikeReceipt> {
        let user_id = user_id.ok_or(TuningError::Unauthenticated)?;
        let now = Utc::now();

        let recorded = self.ledger.record_dislike_at(user_id, &request, now)?;
        let user_patterns = self
            .ledger
            .pattern_analysis(user_id, now, self.settings.pattern_window_days)?;

        Ok(DislikeReceipt {
            dislike_id: recorded.dislike_id(),
            training_impact: TrainingImpact {
                error: recorded.example.error,
                weight: recorded.example.weight,
            },
            feature_adjustments: recorded.adjustment,
            user_patterns,
        })
    }

    /// Current trigger decision. Pure read; repeated calls agree.
    pub fn trigger_state(&self) -> Result<TriggerDecision> {
        let active_accuracy = self
            .versions
            .active()?
            .map(|v| self.evaluator.accuracy(&v.config));
        let inputs = TriggerInputs {
            unused_examples: self.ledger.unused_count()?,
            active_accuracy,
        };
        Ok(self.triggers.evaluate(&inputs))
    }

    /// Run one retraining cycle if any trigger fires.
    pub async fn check_and_trigger_retraining(&self) -> Result<RetrainOutcome> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.retrain_cycle())
            .await
            .context("Retraining task panicked")?
    }

    fn retrain_cycle(&self) -> Result<RetrainOutcome> {
        let start = Instant::now();
        let decision = self.trigger_state()?;
        if !decision.is_ready() {
            return Ok(RetrainOutcome::default());
        }
        info!(
            "Retraining triggered by {:?} ({} unused examples)",
            decision.fired_by, decision.unused_examples
        );

        let batch = self.ledger.unused_batch(self.settings.batch_cap)?;
        let priors = SearchPriors::from_examples(&batch);

        // The batch joins the evaluation set for this cycle only
        let evaluator = Evaluator::new(Arc::new(self.holdout.with_negatives(&batch)));
        let base = self.active_config()?;
        let baseline = Baseline {
            config: base,
            accuracy: evaluator.accuracy(&base),
        };

        let runner = SearchRunner::new(self.tracker.clone(), evaluator, self.engine.clone());
        let method = self.settings.search_method;
        let n = self.settings.search_batch_size;
        let result = match runner.run(method, n, &baseline, &priors, &self.stop) {
            Err(TuningError::SearchSpaceExhausted { .. }) if method == SearchMethod::Grid => {
                warn!("Grid around the active configuration is exhausted, falling back to random search");
                runner.run(SearchMethod::Random, n, &baseline, &priors, &self.stop)
            }
            other => other,
        };
        self.stop.reset();
        let report = result.context("Search batch failed")?;

        let promoted_version_id = match &report.best {
            Some(best) => self.promote(best)?,
            None => None,
        };

        if report.stopped {
            warn!(
                "Retraining stopped after {} experiments; {} examples stay unused",
                report.completed,
                batch.len()
            );
            return Ok(RetrainOutcome {
                triggered: true,
                stopped: true,
                promoted_version_id,
                fired_by: decision.fired_by,
                experiments: report.experiment_ids,
                ..Default::default()
            });
        }

        // Consumed even when nothing was promoted
        let ids: Vec<ExampleId> = batch.iter().map(|e| e.example_id).collect();
        self.ledger.mark_used(&ids)?;

        info!(
            "Retraining cycle done in {:.2?}: {} examples, {} experiments, promoted {:?}",
            start.elapsed(),
            ids.len(),
            report.experiment_ids.len(),
            promoted_version_id
        );

        Ok(RetrainOutcome {
            triggered: true,
            batch_size: ids.len(),
            stopped: false,
            promoted_version_id,
            fired_by: decision.fired_by,
            experiments: report.experiment_ids,
        })
    }

    fn promote(&self, best: &ExperimentRecord) -> Result<Option<VersionId>> {
        let version = self.versions.promote(best)?;
        if version.status != VersionStatus::Candidate {
            return Ok(None);
        }
        let outcome = self.versions.activate(&version.version_id)?;
        Ok(outcome.activated_version().map(str::to_string))
    }

    /// Run an ad hoc search batch of `n` candidates.
    ///
    /// Priors come from the unused negative examples, which are left
    /// unconsumed. Nothing is promoted.
    pub async fn run_search(&self, method: SearchMethod, n: usize) -> Result<BatchReport> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.search_batch(method, n))
            .await
            .context("Search task panicked")?
    }

    fn search_batch(&self, method: SearchMethod, n: usize) -> Result<BatchReport> {
        let unused = self.ledger.unused_batch(self.settings.batch_cap)?;
        let priors = SearchPriors::from_examples(&unused);
        let base = self.active_config()?;
        let baseline = Baseline {
            config: base,
            accuracy: self.evaluator.accuracy(&base),
        };

        let runner = SearchRunner::new(self.tracker.clone(), self.evaluator.clone(), self.engine.clone());
        let result = runner.run(method, n, &baseline, &priors, &self.stop);
        self.stop.reset();
        let report = result?;
        if report.stopped {
            warn!("Search stopped early; unfinished experiments stay pending for the next run");
        }
        Ok(report)
    }

    pub fn tuning_report(&self) -> Result<TuningReport> {
        let statistics = self.tracker.statistics()?;
        let active = self.versions.active()?;
        Ok(TuningReport {
            statistics,
            active_version_id: active.as_ref().map(|v| v.version_id.clone()),
            active_accuracy: active.map(|v| v.accuracy),
        })
    }

    pub fn experiment_history(&self) -> Result<Vec<ExperimentRecord>> {
        Ok(self.tracker.history()?)
    }

    pub fn version_history(&self) -> Result<Vec<ModelVersion>> {
        Ok(self.versions.history()?)
    }

    /// A/B evaluation of two stored versions on the current holdout
    pub fn compare_versions(&self, a: &str, b: &str) -> Result<VersionComparison> {
        Ok(self.versions.compare(a, b, &self.evaluator)?)
    }

    pub fn dislike_patterns(&self, user_id: UserId) -> Result<DislikePatterns> {
        Ok(self
            .ledger
            .pattern_analysis(user_id, Utc::now(), self.settings.pattern_window_days)?)
    }

    pub fn dislike_history(&self, user_id: UserId, limit: usize) -> Result<Vec<DislikeEvent>> {
        Ok(self.ledger.dislike_history(user_id, limit)?)
    }

    pub fn feedback_metrics(&self) -> Result<FeedbackMetrics> {
        Ok(self.ledger.feedback_metrics()?)
    }

    fn active_config(&self) -> Result<HyperParams> {
        Ok(self
            .versions
            .active()?
            .map(|v| v.config)
            .unwrap_or_default())
    }
}

fn load_holdout(path: &Path) -> Result<HoldoutSet> {
    let holdout = HoldoutSet::load_from_file(path)
        .with_context(|| format!("Failed to load holdout set from {}", path.display()))?;
    let (profiles, items, examples) = holdout.counts();
    info!(
        "Loaded holdout set: {} profiles, {} items, {} examples",
        profiles, items, examples
    );
    Ok(holdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        CandidateItem, DislikeReason, ExperimentStatus, LabeledExample, MemoryStore, UserProfile,
    };

    fn holdout() -> HoldoutSet {
        let mut set = HoldoutSet::new();
        let mut profile = UserProfile::new(1);
        profile.genre_preferences.insert("Action".to_string(), 0.5);
        profile.genre_preferences.insert("Sci-Fi".to_string(), 0.5);
        set.insert_profile(profile);
        for id in 1..=5 {
            set.insert_item(CandidateItem {
                id,
                title: format!("Movie {}", id),
                genres: vec!["Action".to_string()],
                cast: Vec::new(),
                franchise_id: None,
                avg_rating: 6.0,
                rating_count: 1000,
            });
            set.push_example(LabeledExample {
                user_id: 1,
                item_id: id,
                label: 0.6,
                weight: 1.0,
            });
        }
        set
    }

    fn settings() -> Settings {
        Settings {
            accuracy_trigger: false,
            seed: Some(99),
            search_batch_size: 4,
            ..Default::default()
        }
    }

    fn orchestrator() -> TuningOrchestrator {
        orchestrator_with(settings())
    }

    fn orchestrator_with(settings: Settings) -> TuningOrchestrator {
        TuningOrchestrator::new(Arc::new(MemoryStore::new()), holdout(), settings).unwrap()
    }

    fn request(item_id: u32) -> DislikeRequest {
        DislikeRequest {
            item_id,
            title: format!("Movie {}", item_id),
            predicted_score: 0.75,
            reason: DislikeReason::WrongGenre,
            genres: vec!["Action".to_string(), "Sci-Fi".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_baseline_version_on_startup() {
        let orchestrator = orchestrator();
        let versions = orchestrator.version_history().unwrap();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].is_active());
        assert!(versions[0].experiment_id.is_none());
    }

    #[test]
    fn test_ingest_requires_user() {
        let orchestrator = orchestrator();
        let err = orchestrator.ingest_dislike(None, request(1)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TuningError>(),
            Some(TuningError::Unauthenticated)
        ));

        let mut blank = request(1);
        blank.title = String::new();
        let err = orchestrator.ingest_dislike(Some(1), blank).unwrap_err();
        assert!(matches!(err.downcast_ref::<TuningError>(), Some(TuningError::Validation(_))));
        assert_eq!(orchestrator.feedback_metrics().unwrap().total_negative_examples, 0);
    }

    #[test]
    fn test_ingest_returns_impact_and_patterns() {
        let orchestrator = orchestrator();
        let receipt = orchestrator.ingest_dislike(Some(3), request(1)).unwrap();
        assert_eq!(receipt.training_impact.error, 0.75);
        assert_eq!(receipt.training_impact.weight, 0.8);
        assert_eq!(receipt.feature_adjustments.genre_deltas.get("Sci-Fi"), Some(&-0.15));
        assert_eq!(receipt.user_patterns.total, 1);
        assert_eq!(receipt.user_patterns.reason_histogram.get("wrong_genre"), Some(&1));
    }

    #[tokio::test]
    async fn test_no_retraining_below_threshold() {
        let orchestrator = orchestrator();
        for item in 1..=19 {
            orchestrator.ingest_dislike(Some(1), request(item)).unwrap();
        }
        let outcome = orchestrator.check_and_trigger_retraining().await.unwrap();
        assert!(!outcome.triggered);
        assert_eq!(outcome.batch_size, 0);
        assert!(orchestrator.experiment_history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retraining_consumes_batch() {
        let orchestrator = orchestrator();
        for item in 1..=20 {
            orchestrator.ingest_dislike(Some(1), request(item % 5 + 1)).unwrap();
        }

        let outcome = orchestrator.check_and_trigger_retraining().await.unwrap();
        assert!(outcome.triggered);
        assert_eq!(outcome.batch_size, 20);
        assert_eq!(outcome.fired_by, vec!["feedback_volume"]);
        assert_eq!(outcome.experiments.len(), 4);

        // Batch consumed: back to waiting
        assert!(!orchestrator.trigger_state().unwrap().is_ready());
        assert_eq!(orchestrator.feedback_metrics().unwrap().unused_examples, 0);
        let again = orchestrator.check_and_trigger_retraining().await.unwrap();
        assert!(!again.triggered);

        let active: Vec<_> = orchestrator
            .version_history()
            .unwrap()
            .into_iter()
            .filter(|v| v.is_active())
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_run_search_and_report() {
        let orchestrator = orchestrator();
        let empty = orchestrator.tuning_report().unwrap();
        assert_eq!(empty.statistics.count, 0);
        assert_eq!(empty.statistics.mean_accuracy, 0.0);

        let report = orchestrator.run_search(SearchMethod::Grid, 5).await.unwrap();
        assert_eq!(report.experiment_ids.len(), 5);

        let summary = orchestrator.tuning_report().unwrap();
        assert_eq!(summary.statistics.count, 5);
        assert!(summary.statistics.best_experiment_id.is_some());
        assert!(summary.active_version_id.is_some());
    }

    #[tokio::test]
    async fn test_stopped_cycle_keeps_batch_for_next_cycle() {
        let orchestrator = orchestrator();
        for item in 1..=20 {
            orchestrator.ingest_dislike(Some(1), request(item % 5 + 1)).unwrap();
        }

        orchestrator.stop_handle().stop();
        let stopped = orchestrator.check_and_trigger_retraining().await.unwrap();
        assert!(stopped.triggered);
        assert!(stopped.stopped);
        assert_eq!(stopped.batch_size, 0);
        assert_eq!(orchestrator.feedback_metrics().unwrap().unused_examples, 20);
        assert!(orchestrator.trigger_state().unwrap().is_ready());
        assert!(!orchestrator.stop_handle().is_stopped());

        // The next cycle finishes the pending experiments and consumes the batch
        let resumed = orchestrator.check_and_trigger_retraining().await.unwrap();
        assert!(!resumed.stopped);
        assert_eq!(resumed.batch_size, 20);
        assert_eq!(orchestrator.feedback_metrics().unwrap().unused_examples, 0);

        let history = orchestrator.experiment_history().unwrap();
        assert_eq!(history.len(), stopped.experiments.len() + resumed.experiments.len());
        assert!(history.iter().all(|e| e.status == ExperimentStatus::Completed));
    }

    #[tokio::test]
    async fn test_run_search_resumes_after_stop() {
        let orchestrator = orchestrator();
        orchestrator.stop_handle().stop();
        let first = orchestrator.run_search(SearchMethod::Random, 3).await.unwrap();
        assert!(first.stopped);
        assert_eq!(first.completed, 0);

        let second = orchestrator.run_search(SearchMethod::Random, 2).await.unwrap();
        assert!(!second.stopped);
        assert_eq!(second.resumed, first.experiment_ids);
        assert_eq!(second.completed, 5);
        assert_eq!(orchestrator.tuning_report().unwrap().statistics.pending, 0);
    }

    #[tokio::test]
    async fn test_exhausted_grid_falls_back_to_random_in_cycle() {
        let orchestrator = orchestrator_with(Settings {
            search_method: SearchMethod::Grid,
            ..settings()
        });

        // Walk the whole grid around the active configuration
        let walked = orchestrator.run_search(SearchMethod::Grid, 1000).await.unwrap();
        assert!(!walked.experiment_ids.is_empty());
        let err = orchestrator.run_search(SearchMethod::Grid, 1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TuningError>(),
            Some(TuningError::SearchSpaceExhausted { .. })
        ));

        for item in 1..=20 {
            orchestrator.ingest_dislike(Some(1), request(item % 5 + 1)).unwrap();
        }
        let outcome = orchestrator.check_and_trigger_retraining().await.unwrap();
        assert!(outcome.triggered);
        assert_eq!(outcome.batch_size, 20);
        assert_eq!(outcome.experiments.len(), 4);
        assert!(outcome.experiments.iter().all(|id| id.starts_with("random_")));
        assert!(!orchestrator.trigger_state().unwrap().is_ready());
    }
}
