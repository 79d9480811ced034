//! Batch execution: generate, persist, evaluate, record.
//!
//! ## Flow
//! 1. Pick up experiments an interrupted batch left pending
//! 2. Generate the new candidates (nothing is persisted if this fails)
//! 3. Start one pending experiment per candidate
//! 4. Evaluate in chunks of one configuration per Rayon worker, checking the
//!    stop flag between chunks
//! 5. Complete or fail each experiment
//!
//! A stopped batch leaves the rest pending; the next `run` finishes them
//! before anything new is evaluated.

use crate::space::Candidate;
use crate::strategy::SearchEngine;
use crate::tracker::{best_of, ExperimentTracker};
use domain::{ExperimentId, ExperimentRecord, HyperParams, Result, SearchMethod};
use feedback::SearchPriors;
use scoring::Evaluator;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Cooperative cancellation for a running batch
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The configuration new candidates are centred on, and its accuracy on the
/// evaluation set (improvement is measured against it)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub config: HyperParams,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Experiments created by this batch, in generation order
    pub experiment_ids: Vec<ExperimentId>,
    /// Pending experiments from an earlier batch that were picked up
    pub resumed: Vec<ExperimentId>,
    pub completed: usize,
    pub failed: usize,
    pub stopped: bool,
    /// Most accurate experiment completed by this batch
    pub best: Option<ExperimentRecord>,
}

pub struct SearchRunner {
    tracker: Arc<ExperimentTracker>,
    evaluator: Evaluator,
    engine: SearchEngine,
}

impl SearchRunner {
    pub fn new(tracker: Arc<ExperimentTracker>, evaluator: Evaluator, engine: SearchEngine) -> Self {
        Self {
            tracker,
            evaluator,
            engine,
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn run(
        &self,
        method: SearchMethod,
        n: usize,
        baseline: &Baseline,
        priors: &SearchPriors,
        stop: &StopFlag,
    ) -> Result<BatchReport> {
        let start = Instant::now();
        let history = self.tracker.history()?;
        let pending: Vec<ExperimentRecord> = history
            .iter()
            .filter(|e| e.status == domain::ExperimentStatus::Pending)
            .cloned()
            .collect();

        let candidates = self
            .engine
            .generate(method, n, &baseline.config, &history, priors)?;

        let mut report = BatchReport {
            resumed: pending.iter().map(|e| e.experiment_id.clone()).collect(),
            ..Default::default()
        };

        let mut queue: Vec<(ExperimentId, HyperParams)> = pending
            .into_iter()
            .map(|e| (e.experiment_id, e.config))
            .collect();
        for Candidate {
            config,
            parent_experiment_id,
        } in candidates
        {
            let id = self.tracker.start(config, method, parent_experiment_id)?;
            report.experiment_ids.push(id.clone());
            queue.push((id, config));
        }

        debug!(
            method = %method,
            new = report.experiment_ids.len(),
            resumed = report.resumed.len(),
            "Search batch queued"
        );

        let mut finished: Vec<ExperimentRecord> = Vec::new();
        let chunk_size = rayon::current_num_threads().max(1);
        for chunk in queue.chunks(chunk_size) {
            if stop.is_stopped() {
                report.stopped = true;
                break;
            }

            let configs: Vec<HyperParams> = chunk.iter().map(|(_, config)| *config).collect();
            let evaluations = self.evaluator.evaluate_many(&configs);

            for ((experiment_id, _), evaluation) in chunk.iter().zip(evaluations) {
                if evaluation.evaluated == 0 {
                    self.tracker
                        .fail(experiment_id, "no scorable examples in the evaluation set")?;
                    report.failed += 1;
                    continue;
                }
                let record = self.tracker.complete(
                    experiment_id,
                    evaluation.accuracy,
                    evaluation.accuracy - baseline.accuracy,
                )?;
                report.completed += 1;
                finished.push(record);
            }
        }

        report.best = best_of(finished.iter()).cloned();
        info!(
            method = %method,
            completed = report.completed,
            failed = report.failed,
            stopped = report.stopped,
            best_accuracy = ?report.best.as_ref().and_then(|b| b.accuracy),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search batch finished"
        );
        Ok(report)
    }
}
