//! Model versions: accepted configurations and the single ACTIVE one.
//!
//! ## Lifecycle
//! ```text
//! CANDIDATE -> ACTIVE -> SUPERSEDED
//!     \-> REJECTED
//! ```
//! At most one version is ACTIVE. `activate` runs inside a critical section
//! and commits "previous ACTIVE -> SUPERSEDED" and "candidate -> ACTIVE" as
//! one store write, so concurrent activations serialise.

use chrono::Utc;
use domain::{
    Collection, ExperimentRecord, HyperParams, ModelVersion, ParamDelta, PersistenceStore, Result,
    TuningError, VersionId, VersionStatus,
};
use scoring::{Comparison, Evaluator};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Accuracy gain over the ACTIVE version required for promotion
pub const MIN_IMPROVEMENT: f64 = 0.05;

// An improvement of exactly MIN_IMPROVEMENT must qualify despite rounding
const PROMOTION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActivationOutcome {
    Activated {
        version_id: VersionId,
        superseded: Option<VersionId>,
    },
    /// The candidate no longer beats the ACTIVE version and was rejected
    Rejected {
        version_id: VersionId,
        active_accuracy: f64,
    },
}

impl ActivationOutcome {
    pub fn activated_version(&self) -> Option<&str> {
        match self {
            ActivationOutcome::Activated { version_id, .. } => Some(version_id),
            ActivationOutcome::Rejected { .. } => None,
        }
    }
}

/// A/B evaluation of two stored versions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionComparison {
    pub version_a: VersionId,
    pub version_b: VersionId,
    pub comparison: Comparison,
    /// Parameters that differ by more than 0.001
    pub differences: Vec<ParamDelta>,
}

pub struct ModelVersionManager {
    store: Arc<dyn PersistenceStore>,
    min_improvement: f64,
    activation: Mutex<()>,
}

impl ModelVersionManager {
    pub fn new(store: Arc<dyn PersistenceStore>, min_improvement: f64) -> Self {
        Self {
            store,
            min_improvement,
            activation: Mutex::new(()),
        }
    }

    pub fn min_improvement(&self) -> f64 {
        self.min_improvement
    }

    pub fn active(&self) -> Result<Option<ModelVersion>> {
        Ok(self.store.versions()?.into_iter().find(|v| v.is_active()))
    }

    pub fn get(&self, version_id: &str) -> Result<Option<ModelVersion>> {
        Ok(self.store.versions()?.into_iter().find(|v| v.version_id == version_id))
    }

    /// Every version, newest first
    pub fn history(&self) -> Result<Vec<ModelVersion>> {
        let mut versions = self.store.versions()?;
        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.version_id.cmp(&a.version_id))
        });
        Ok(versions)
    }

    /// Install `config` as the ACTIVE version when none is active.
    ///
    /// Returns the ACTIVE version either way.
    pub fn ensure_baseline(&self, config: HyperParams, accuracy: f64) -> Result<ModelVersion> {
        let _guard = self.lock()?;
        if let Some(active) = self.active()? {
            return Ok(active);
        }

        let now = Utc::now();
        let version = ModelVersion {
            version_id: self.next_version_id()?,
            experiment_id: None,
            config,
            accuracy,
            status: VersionStatus::Active,
            created_at: now,
            activated_at: Some(now),
            retired_at: None,
        };
        self.store.insert_version(version.clone())?;
        info!(version_id = %version.version_id, accuracy, "Baseline version installed");
        Ok(version)
    }

    /// Wrap a completed experiment as a version.
    ///
    /// The version is a CANDIDATE when the experiment beats the ACTIVE
    /// version by at least `min_improvement` (or nothing is active), and is
    /// stored REJECTED otherwise. Either way the experiment is untouched.
    pub fn promote(&self, experiment: &ExperimentRecord) -> Result<ModelVersion> {
        let accuracy = match (experiment.is_completed(), experiment.accuracy) {
            (true, Some(accuracy)) => accuracy,
            _ => {
                return Err(TuningError::validation(format!(
                    "experiment {} is {} and cannot be promoted",
                    experiment.experiment_id, experiment.status
                )));
            }
        };

        let active = self.active()?;
        let qualifies = active
            .as_ref()
            .is_none_or(|a| self.beats(accuracy, a.accuracy));

        let now = Utc::now();
        let version = ModelVersion {
            version_id: self.next_version_id()?,
            experiment_id: Some(experiment.experiment_id.clone()),
            config: experiment.config,
            accuracy,
            status: if qualifies {
                VersionStatus::Candidate
            } else {
                VersionStatus::Rejected
            },
            created_at: now,
            activated_at: None,
            retired_at: if qualifies { None } else { Some(now) },
        };
        self.store.insert_version(version.clone())?;

        info!(
            version_id = %version.version_id,
            experiment_id = %experiment.experiment_id,
            accuracy,
            active_accuracy = ?active.as_ref().map(|a| a.accuracy),
            status = %version.status,
            "Promotion decided"
        );
        Ok(version)
    }

    /// Make a CANDIDATE the ACTIVE version.
    ///
    /// The promotion rule is re-checked against whatever is ACTIVE at the
    /// moment the critical section is entered; a candidate that no longer
    /// qualifies is rejected instead.
    pub fn activate(&self, version_id: &str) -> Result<ActivationOutcome> {
        let _guard = self.lock()?;
        let versions = self.store.versions()?;

        let mut candidate = versions
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned()
            .ok_or_else(|| TuningError::missing("model version", version_id))?;
        if candidate.status != VersionStatus::Candidate {
            return Err(TuningError::transition(
                "model version",
                version_id,
                candidate.status,
                VersionStatus::Active,
            ));
        }
        let previous = versions.iter().find(|v| v.is_active()).cloned();
        let now = Utc::now();

        let stale = previous
            .as_ref()
            .filter(|active| !self.beats(candidate.accuracy, active.accuracy));
        if let Some(active) = stale {
            candidate.reject(now)?;
            self.store.update_versions(std::slice::from_ref(&candidate))?;
            info!(
                version_id,
                accuracy = candidate.accuracy,
                active_accuracy = active.accuracy,
                "Candidate rejected at activation"
            );
            return Ok(ActivationOutcome::Rejected {
                version_id: candidate.version_id,
                active_accuracy: active.accuracy,
            });
        }

        candidate.activate(now)?;
        let mut updates = Vec::with_capacity(2);
        let superseded = match previous {
            Some(mut old) => {
                old.supersede(now)?;
                let id = old.version_id.clone();
                updates.push(old);
                Some(id)
            }
            None => None,
        };
        updates.push(candidate);
        self.store.update_versions(&updates)?;

        info!(version_id, superseded = ?superseded, "Version activated");
        Ok(ActivationOutcome::Activated {
            version_id: version_id.to_string(),
            superseded,
        })
    }

    /// Evaluate two stored versions on the same dataset. No state change.
    pub fn compare(&self, a: &str, b: &str, evaluator: &Evaluator) -> Result<VersionComparison> {
        let version_a = self.get(a)?.ok_or_else(|| TuningError::missing("model version", a))?;
        let version_b = self.get(b)?.ok_or_else(|| TuningError::missing("model version", b))?;

        Ok(VersionComparison {
            comparison: evaluator.compare(&version_a.config, &version_b.config),
            differences: version_a.config.diff(&version_b.config),
            version_a: version_a.version_id,
            version_b: version_b.version_id,
        })
    }

    fn beats(&self, accuracy: f64, active_accuracy: f64) -> bool {
        accuracy + PROMOTION_TOLERANCE >= active_accuracy + self.min_improvement
    }

    fn next_version_id(&self) -> Result<VersionId> {
        let sequence = self.store.next_sequence(Collection::Versions)?;
        Ok(format!("v{:04}", sequence))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.activation
            .lock()
            .map_err(|_| TuningError::Persistence("version activation lock poisoned".to_string()))
    }
}
