use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use domain::{DislikeReason, DislikeRequest, MovieId, SearchMethod, UserId, VersionStatus};
use server::{RetrainOutcome, Settings, TuningOrchestrator, TuningReport};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

/// Tuner - feedback-driven tuning of the recommendation scorer
#[derive(Parser)]
#[command(name = "tuner")]
#[command(about = "Record dislikes, retrain, and manage scorer versions", long_about = None)]
struct Cli {
    /// State file (overrides TUNER_STATE_PATH)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Holdout dataset (overrides TUNER_HOLDOUT_PATH)
    #[arg(long)]
    holdout: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a dislike for a recommended movie
    Dislike {
        /// Authenticated user; omitting it is rejected
        #[arg(long)]
        user_id: Option<UserId>,

        #[arg(long)]
        item_id: MovieId,

        #[arg(long)]
        title: String,

        /// Score the item had when it was recommended
        #[arg(long)]
        predicted_score: f64,

        /// wrong_genre, poor_quality, not_interested, already_watched, irrelevant, other
        #[arg(long, default_value = "not_interested")]
        reason: DislikeReason,

        /// Comma-separated genres of the item
        #[arg(long, value_delimiter = ',')]
        genres: Vec<String>,

        /// Comma-separated cast, in billing order
        #[arg(long, value_delimiter = ',')]
        cast: Vec<String>,

        #[arg(long)]
        set_id: Option<u64>,

        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Check the retraining triggers and run a cycle if one fires
    Retrain,

    /// Run a search batch without consuming feedback
    Search {
        /// grid, random, or adaptive
        #[arg(long)]
        method: Option<SearchMethod>,

        /// Number of candidates
        #[arg(long)]
        n: Option<usize>,
    },

    /// Summarise all experiments
    Report,

    /// List model versions, newest first
    Versions,

    /// A/B evaluate two versions on the holdout set
    Compare {
        #[arg(long)]
        a: String,

        #[arg(long)]
        b: String,
    },

    /// Show what a user keeps disliking
    Patterns {
        #[arg(long)]
        user_id: UserId,

        /// Also list the most recent dislikes
        #[arg(long, default_value = "0")]
        history: usize,
    },

    /// Error statistics over all negative examples
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("Failed to load settings")?;
    if let Some(state) = cli.state {
        settings.state_path = state;
    }
    if let Some(holdout) = cli.holdout {
        settings.holdout_path = holdout;
    }
    debug!(
        "Using state {} and holdout {}",
        settings.state_path.display(),
        settings.holdout_path.display()
    );

    let start = Instant::now();
    let orchestrator = TuningOrchestrator::from_settings(settings)?;
    debug!("Orchestrator ready in {:?}", start.elapsed());

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Dislike {
            user_id,
            item_id,
            title,
            predicted_score,
            reason,
            genres,
            cast,
            set_id,
            comment,
        } => {
            let request = DislikeRequest {
                item_id,
                title,
                set_id,
                predicted_score,
                reason,
                genres,
                cast,
                comment,
            };
            handle_dislike(&orchestrator, user_id, request)?
        }
        Commands::Retrain => handle_retrain(&orchestrator).await?,
        Commands::Search { method, n } => handle_search(&orchestrator, method, n).await?,
        Commands::Report => print_report(&orchestrator.tuning_report()?),
        Commands::Versions => handle_versions(&orchestrator)?,
        Commands::Compare { a, b } => handle_compare(&orchestrator, &a, &b)?,
        Commands::Patterns { user_id, history } => handle_patterns(&orchestrator, user_id, history)?,
        Commands::Metrics => handle_metrics(&orchestrator)?,
    }

    Ok(())
}

/// Handle the 'dislike' command
fn handle_dislike(orchestrator: &TuningOrchestrator, user_id: Option<UserId>, request: DislikeRequest) -> Result<()> {
    let receipt = orchestrator.ingest_dislike(user_id, request)?;

    println!("{} Dislike #{} recorded", "✓".green(), receipt.dislike_id);
    println!(
        "{}Training impact: error {:.3}, weight {:.2}",
        "• ".cyan(),
        receipt.training_impact.error,
        receipt.training_impact.weight
    );

    let adjustments = &receipt.feature_adjustments;
    if adjustments.suppress {
        println!("{}Item will be suppressed (already watched)", "• ".cyan());
    }
    for (genre, delta) in &adjustments.genre_deltas {
        println!("{}Genre {}: {:+.3}", "• ".cyan(), genre, delta);
    }
    for (name, delta) in &adjustments.cast_deltas {
        println!("{}Cast {}: {:+.3}", "• ".cyan(), name, delta);
    }

    let patterns = &receipt.user_patterns;
    println!(
        "{}User has {} dislikes ({} in the last {} days)",
        "• ".cyan(),
        patterns.total,
        patterns.recent.count,
        patterns.recent.window_days
    );
    Ok(())
}

/// Handle the 'retrain' command
async fn handle_retrain(orchestrator: &TuningOrchestrator) -> Result<()> {
    let start = Instant::now();
    let outcome = orchestrator.check_and_trigger_retraining().await?;
    print_outcome(&outcome);
    println!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

fn print_outcome(outcome: &RetrainOutcome) {
    if !outcome.triggered {
        println!("{} Waiting: no retraining trigger fired", "•".yellow());
        return;
    }
    println!(
        "{} Retraining triggered by {}",
        "✓".green(),
        outcome.fired_by.join(", ").bold()
    );
    if outcome.stopped {
        println!("{}Stopped early; feedback stays queued for the next cycle", "• ".yellow());
    } else {
        println!("{}Examples consumed: {}", "• ".cyan(), outcome.batch_size);
    }
    println!("{}Experiments run: {}", "• ".cyan(), outcome.experiments.len());
    match &outcome.promoted_version_id {
        Some(version_id) => println!("{}Promoted version {}", "• ".cyan(), version_id.green()),
        None => println!("{}No candidate beat the active version", "• ".cyan()),
    }
}

/// Handle the 'search' command
async fn handle_search(orchestrator: &TuningOrchestrator, method: Option<SearchMethod>, n: Option<usize>) -> Result<()> {
    let method = method.unwrap_or(orchestrator.settings().search_method);
    let n = n.unwrap_or(orchestrator.settings().search_batch_size);

    let start = Instant::now();
    let report = orchestrator.run_search(method, n).await?;

    println!(
        "{}",
        format!("{} search: {} new experiments", method, report.experiment_ids.len())
            .bold()
            .blue()
    );
    if !report.resumed.is_empty() {
        println!("{}Resumed {} pending experiments", "• ".cyan(), report.resumed.len());
    }
    println!(
        "{}Completed {}, failed {}{}",
        "• ".cyan(),
        report.completed,
        report.failed,
        if report.stopped { " (stopped early)" } else { "" }
    );
    if let Some(best) = &report.best {
        println!(
            "{}Best: {} accuracy {:.4} ({:+.4})",
            "• ".cyan(),
            best.experiment_id,
            best.accuracy.unwrap_or(0.0),
            best.improvement.unwrap_or(0.0)
        );
    }
    for id in &report.experiment_ids {
        println!("  - {}", id);
    }
    println!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

/// Boxed summary of the experiment history
fn print_report(report: &TuningReport) {
    let stats = &report.statistics;
    let rows = [
        ("Experiments", stats.count.to_string()),
        ("Failed", stats.failed.to_string()),
        ("Pending", stats.pending.to_string()),
        ("Mean accuracy", format!("{:.4}", stats.mean_accuracy)),
        ("Best accuracy", format!("{:.4}", stats.best_accuracy)),
        ("Best improvement", format!("{:+.4}", stats.best_improvement)),
        (
            "Best experiment",
            stats.best_experiment_id.clone().unwrap_or_else(|| "-".to_string()),
        ),
        (
            "Active version",
            match (&report.active_version_id, report.active_accuracy) {
                (Some(id), Some(accuracy)) => format!("{} ({:.4})", id, accuracy),
                _ => "-".to_string(),
            },
        ),
    ];

    let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let value_width = rows.iter().map(|(_, value)| value.len()).max().unwrap_or(0);
    let inner = label_width + value_width + 5;
    let title = "TUNING REPORT";

    println!("╔{}╗", "═".repeat(inner));
    println!("║{}║", format!("{:^inner$}", title, inner = inner).bold());
    println!("╠{}╣", "═".repeat(inner));
    for (label, value) in &rows {
        println!(
            "║ {:<lw$} : {:>vw$} ║",
            label,
            value,
            lw = label_width,
            vw = value_width
        );
    }
    println!("╚{}╝", "═".repeat(inner));
}

/// Handle the 'versions' command
fn handle_versions(orchestrator: &TuningOrchestrator) -> Result<()> {
    let versions = orchestrator.version_history()?;
    println!("{}", "Model versions:".bold().blue());
    for version in versions {
        let status = match version.status {
            VersionStatus::Active => version.status.to_string().green(),
            VersionStatus::Candidate => version.status.to_string().yellow(),
            VersionStatus::Superseded => version.status.to_string().normal(),
            VersionStatus::Rejected => version.status.to_string().red(),
        };
        println!(
            "{} [{}] accuracy {:.4} from {} at {}",
            version.version_id.bold(),
            status,
            version.accuracy,
            version.experiment_id.as_deref().unwrap_or("baseline"),
            version.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Handle the 'compare' command
fn handle_compare(orchestrator: &TuningOrchestrator, a: &str, b: &str) -> Result<()> {
    let result = orchestrator.compare_versions(a, b)?;
    let comparison = &result.comparison;

    println!("{}", format!("{} vs {}", result.version_a, result.version_b).bold().blue());
    println!("{}{}: {:.4}", "• ".cyan(), result.version_a, comparison.accuracy_a);
    println!("{}{}: {:.4}", "• ".cyan(), result.version_b, comparison.accuracy_b);
    let delta = format!("{:+.4}", comparison.delta);
    println!(
        "{}Delta: {}",
        "• ".cyan(),
        if comparison.delta >= 0.0 { delta.green() } else { delta.red() }
    );

    if result.differences.is_empty() {
        println!("Configurations are identical");
    } else {
        println!("Differing parameters:");
        for d in &result.differences {
            println!("  - {}: {:.4} -> {:.4} ({:+.4})", d.name, d.left, d.right, d.delta);
        }
    }
    Ok(())
}

/// Handle the 'patterns' command
fn handle_patterns(orchestrator: &TuningOrchestrator, user_id: UserId, history: usize) -> Result<()> {
    let patterns = orchestrator.dislike_patterns(user_id)?;

    println!("{}", format!("Dislike patterns for user {}:", user_id).bold().blue());
    println!("{}Total dislikes: {}", "• ".green(), patterns.total);
    println!(
        "{}Last {} days: {} (avg predicted score {:.3})",
        "• ".green(),
        patterns.recent.window_days,
        patterns.recent.count,
        patterns.recent.avg_predicted_score
    );
    if let Some(reason) = patterns.dominant_reason() {
        println!("{}Most common reason: {}", "• ".green(), reason);
    }
    for (reason, count) in &patterns.reason_histogram {
        println!("  - {}: {}", reason, count);
    }

    if history > 0 {
        println!("Recent dislikes:");
        for event in orchestrator.dislike_history(user_id, history)? {
            println!(
                "  - #{} {} ({}) predicted {:.2} at {}",
                event.dislike_id,
                event.title,
                event.reason,
                event.predicted_score,
                event.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

/// Handle the 'metrics' command
fn handle_metrics(orchestrator: &TuningOrchestrator) -> Result<()> {
    let metrics = orchestrator.feedback_metrics()?;
    println!("{}", "Feedback metrics:".bold().blue());
    println!("{}Negative examples: {}", "• ".cyan(), metrics.total_negative_examples);
    println!("{}Unused: {}", "• ".cyan(), metrics.unused_examples);
    println!("{}Avg error: {:.4}", "• ".cyan(), metrics.avg_error);
    println!("{}Max error: {:.4}", "• ".cyan(), metrics.max_error);
    println!("{}Min error: {:.4}", "• ".cyan(), metrics.min_error);
    println!("{}Avg predicted score: {:.4}", "• ".cyan(), metrics.avg_predicted_score);

    let decision = orchestrator.trigger_state()?;
    println!(
        "{}Trigger: {:?}{}",
        "• ".cyan(),
        decision.state,
        if decision.fired_by.is_empty() {
            String::new()
        } else {
            format!(" ({})", decision.fired_by.join(", "))
        }
    );
    Ok(())
}
