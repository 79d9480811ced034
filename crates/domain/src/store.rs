//! Durable storage for the tuning loop.
//!
//! Every component talks to storage through the `PersistenceStore` trait.
//! Implementations only provide two hooks, `read` and `write`; all the
//! record-level operations are built on top of them. A `write` either commits
//! the whole change or leaves the stored state exactly as it was.
//!
//! Two implementations ship here:
//! - `MemoryStore`: state behind a `RwLock`, used by tests and the demo harness
//! - `JsonFileStore`: the same state mirrored to a JSON document on disk,
//!   replaced atomically (write temp file, then rename) on every commit

use crate::error::{Result, TuningError};
use crate::types::{
    DislikeEvent, ExampleId, ExperimentRecord, ModelVersion, NegativeTrainingExample, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Record families that draw ids from their own sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Dislikes,
    Examples,
    Experiments,
    Versions,
}

impl Collection {
    fn key(&self) -> &'static str {
        match self {
            Collection::Dislikes => "dislikes",
            Collection::Examples => "examples",
            Collection::Experiments => "experiments",
            Collection::Versions => "versions",
        }
    }
}

/// Everything the loop persists.
///
/// Records are kept in insertion order, which is also creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    sequences: BTreeMap<String, u64>,
    #[serde(default)]
    dislikes: Vec<DislikeEvent>,
    #[serde(default)]
    examples: Vec<NegativeTrainingExample>,
    #[serde(default)]
    experiments: Vec<ExperimentRecord>,
    #[serde(default)]
    versions: Vec<ModelVersion>,
}

impl StoreState {
    fn bump(&mut self, collection: Collection) -> u64 {
        let seq = self.sequences.entry(collection.key().to_string()).or_insert(0);
        *seq += 1;
        *seq
    }
}

/// Storage abstraction shared by the ledger, tracker, and version manager.
pub trait PersistenceStore: Send + Sync {
    /// Run `f` against a consistent view of the state.
    fn read(&self, f: &mut dyn FnMut(&StoreState)) -> Result<()>;

    /// Apply `f` as one atomic change. If `f` fails, or the change cannot be
    /// made durable, the stored state is unchanged.
    fn write(&self, f: &mut dyn FnMut(&mut StoreState) -> Result<()>) -> Result<()>;

    /// Next id in a collection's sequence (starts at 1, never reused)
    fn next_sequence(&self, collection: Collection) -> Result<u64> {
        let mut next = 0;
        self.write(&mut |state| {
            next = state.bump(collection);
            Ok(())
        })?;
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Feedback
    // ------------------------------------------------------------------

    /// Append a dislike and the training example derived from it together.
    fn record_feedback(&self, event: DislikeEvent, example: NegativeTrainingExample) -> Result<()> {
        if example.dislike_id != event.dislike_id {
            return Err(TuningError::validation(format!(
                "example {} references dislike {}, expected {}",
                example.example_id, example.dislike_id, event.dislike_id
            )));
        }
        self.write(&mut |state| {
            if state.dislikes.iter().any(|d| d.dislike_id == event.dislike_id) {
                return Err(TuningError::validation(format!(
                    "dislike {} already recorded",
                    event.dislike_id
                )));
            }
            if state.examples.iter().any(|e| e.example_id == example.example_id) {
                return Err(TuningError::validation(format!(
                    "training example {} already recorded",
                    example.example_id
                )));
            }
            state.dislikes.push(event.clone());
            state.examples.push(example.clone());
            Ok(())
        })
    }

    fn dislikes(&self) -> Result<Vec<DislikeEvent>> {
        let mut out = Vec::new();
        self.read(&mut |state| out = state.dislikes.clone())?;
        Ok(out)
    }

    fn dislikes_for_user(&self, user_id: UserId) -> Result<Vec<DislikeEvent>> {
        let mut out = Vec::new();
        self.read(&mut |state| {
            out = state
                .dislikes
                .iter()
                .filter(|d| d.user_id == user_id)
                .cloned()
                .collect();
        })?;
        Ok(out)
    }

    fn examples(&self) -> Result<Vec<NegativeTrainingExample>> {
        let mut out = Vec::new();
        self.read(&mut |state| out = state.examples.clone())?;
        Ok(out)
    }

    fn count_unused(&self) -> Result<usize> {
        let mut count = 0;
        self.read(&mut |state| count = state.examples.iter().filter(|e| !e.used).count())?;
        Ok(count)
    }

    /// Flip `used` on every listed example. Unknown ids fail the whole batch.
    ///
    /// Returns how many examples actually changed.
    fn mark_examples_used(&self, ids: &[ExampleId]) -> Result<usize> {
        let wanted: HashSet<ExampleId> = ids.iter().copied().collect();
        let mut flipped = 0;
        self.write(&mut |state| {
            flipped = 0;
            let known: HashSet<ExampleId> = state.examples.iter().map(|e| e.example_id).collect();
            if let Some(missing) = wanted.iter().find(|id| !known.contains(id)) {
                return Err(TuningError::missing("training example", missing.to_string()));
            }
            for example in state.examples.iter_mut() {
                if wanted.contains(&example.example_id) && example.mark_used() {
                    flipped += 1;
                }
            }
            Ok(())
        })?;
        Ok(flipped)
    }

    // ------------------------------------------------------------------
    // Experiments
    // ------------------------------------------------------------------

    fn insert_experiment(&self, record: ExperimentRecord) -> Result<()> {
        self.write(&mut |state| {
            if state
                .experiments
                .iter()
                .any(|e| e.experiment_id == record.experiment_id)
            {
                return Err(TuningError::validation(format!(
                    "experiment {} already exists",
                    record.experiment_id
                )));
            }
            state.experiments.push(record.clone());
            Ok(())
        })
    }

    /// Replace a stored experiment by id
    fn update_experiment(&self, record: ExperimentRecord) -> Result<()> {
        self.write(&mut |state| {
            let slot = state
                .experiments
                .iter_mut()
                .find(|e| e.experiment_id == record.experiment_id)
                .ok_or_else(|| TuningError::missing("experiment", record.experiment_id.clone()))?;
            *slot = record.clone();
            Ok(())
        })
    }

    fn get_experiment(&self, experiment_id: &str) -> Result<Option<ExperimentRecord>> {
        let mut out = None;
        self.read(&mut |state| {
            out = state
                .experiments
                .iter()
                .find(|e| e.experiment_id == experiment_id)
                .cloned();
        })?;
        Ok(out)
    }

    fn experiments(&self) -> Result<Vec<ExperimentRecord>> {
        let mut out = Vec::new();
        self.read(&mut |state| out = state.experiments.clone())?;
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Model versions
    // ------------------------------------------------------------------

    fn insert_version(&self, version: ModelVersion) -> Result<()> {
        self.write(&mut |state| {
            if state.versions.iter().any(|v| v.version_id == version.version_id) {
                return Err(TuningError::validation(format!(
                    "model version {} already exists",
                    version.version_id
                )));
            }
            state.versions.push(version.clone());
            Ok(())
        })
    }

    /// Replace several versions by id in one commit
    fn update_versions(&self, updates: &[ModelVersion]) -> Result<()> {
        self.write(&mut |state| {
            for update in updates {
                let slot = state
                    .versions
                    .iter_mut()
                    .find(|v| v.version_id == update.version_id)
                    .ok_or_else(|| TuningError::missing("model version", update.version_id.clone()))?;
                *slot = update.clone();
            }
            Ok(())
        })
    }

    fn versions(&self) -> Result<Vec<ModelVersion>> {
        let mut out = Vec::new();
        self.read(&mut |state| out = state.versions.clone())?;
        Ok(out)
    }
}

fn poisoned<E>(_: E) -> TuningError {
    TuningError::Persistence("store lock poisoned".to_string())
}

// =============================================================================
// In-memory store
// =============================================================================

/// Non-durable store. Changes are applied to a copy and swapped in on success.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceStore for MemoryStore {
    fn read(&self, f: &mut dyn FnMut(&StoreState)) -> Result<()> {
        let guard = self.state.read().map_err(poisoned)?;
        f(&guard);
        Ok(())
    }

    fn write(&self, f: &mut dyn FnMut(&mut StoreState) -> Result<()>) -> Result<()> {
        let mut guard = self.state.write().map_err(poisoned)?;
        let mut next = guard.clone();
        f(&mut next)?;
        *guard = next;
        Ok(())
    }
}

// =============================================================================
// JSON file store
// =============================================================================

/// Store mirrored to a single JSON document.
///
/// The in-memory state only advances after the new document has been
/// renamed into place.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonFileStore {
    /// Open an existing document or start empty if the file doesn't exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let state: StoreState = serde_json::from_str(&raw)?;
            debug!(
                path = %path.display(),
                experiments = state.experiments.len(),
                versions = state.versions.len(),
                "Loaded store document"
            );
            state
        } else {
            StoreState::default()
        };

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let body = serde_json::to_vec_pretty(state)?;
        fs::write(&tmp, body)?;
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }
}

impl PersistenceStore for JsonFileStore {
    fn read(&self, f: &mut dyn FnMut(&StoreState)) -> Result<()> {
        let guard = self.state.read().map_err(poisoned)?;
        f(&guard);
        Ok(())
    }

    fn write(&self, f: &mut dyn FnMut(&mut StoreState) -> Result<()>) -> Result<()> {
        let mut guard = self.state.write().map_err(poisoned)?;
        let mut next = guard.clone();
        f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}
