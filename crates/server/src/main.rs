//! Simple test harness for the tuning orchestrator.
//!
//! Loads settings from the environment, opens the state file and holdout
//! set, then runs one retraining check and prints the tuning report.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::{Settings, TuningOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,server=debug,tuning=debug,feedback=debug")),
        )
        .init();

    info!("Starting tuner test harness");

    let settings = Settings::from_env().context("Failed to load settings")?;
    info!(
        "State file: {}, holdout: {}",
        settings.state_path.display(),
        settings.holdout_path.display()
    );
    let orchestrator = TuningOrchestrator::from_settings(settings)?;

    let decision = orchestrator.trigger_state()?;
    info!(
        "Trigger state: {:?} ({} unused examples, fired: {:?})",
        decision.state, decision.unused_examples, decision.fired_by
    );

    let outcome = orchestrator.check_and_trigger_retraining().await?;
    if outcome.triggered {
        info!(
            "Retraining consumed {} examples across {} experiments; promoted: {}",
            outcome.batch_size,
            outcome.experiments.len(),
            outcome.promoted_version_id.as_deref().unwrap_or("none")
        );
    } else {
        info!("No retraining needed");
    }

    let report = orchestrator.tuning_report()?;
    info!(
        "Experiments: {} completed ({} failed, {} pending), mean accuracy {:.4}, best {:.4} ({})",
        report.statistics.count,
        report.statistics.failed,
        report.statistics.pending,
        report.statistics.mean_accuracy,
        report.statistics.best_accuracy,
        report.statistics.best_experiment_id.as_deref().unwrap_or("-")
    );
    info!(
        "Active version: {} (accuracy {:.4})",
        report.active_version_id.as_deref().unwrap_or("-"),
        report.active_accuracy.unwrap_or(0.0)
    );

    Ok(())
}
