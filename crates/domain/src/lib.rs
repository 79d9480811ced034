//! # Domain Crate
//!
//! Shared vocabulary of the feedback-to-retraining loop.
//!
//! ## Main Components
//!
//! - **config**: Validated, immutable hyperparameter configuration (`HyperParams`)
//! - **types**: Feedback, experiment, and model version records
//! - **store**: `PersistenceStore` trait with in-memory and JSON-file stores
//! - **dataset**: Held-out labeled dataset used for evaluation
//! - **error**: Error kinds shared by every crate
//!
//! ## Example Usage
//!
//! ```ignore
//! use domain::{HyperParams, HoldoutSet, JsonFileStore};
//! use std::path::Path;
//!
//! let holdout = HoldoutSet::load_from_file(Path::new("data/holdout.json"))?;
//! let store = JsonFileStore::open("data/tuner-state.json")?;
//!
//! let mut draft = HyperParams::default().to_draft();
//! draft.genre_boost.boost_high = 0.2;
//! let config = draft.build()?;
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod store;
pub mod types;

pub use config::{
    CastTiers, ComponentWeights, GenreBoost, HyperParams, HyperParamsDraft, ParamDelta,
    PopularityMix, WEIGHT_SUM_TOLERANCE,
};
pub use dataset::{HoldoutSet, LabeledExample};
pub use error::{Result, TuningError};
pub use store::{Collection, JsonFileStore, MemoryStore, PersistenceStore, StoreState};
pub use types::{
    // Type aliases
    DislikeId,
    ExampleId,
    ExperimentId,
    FranchiseId,
    MovieId,
    RecommendationSetId,
    UserId,
    VersionId,
    // Records
    CandidateItem,
    DislikeEvent,
    DislikeRequest,
    DislikedItem,
    ExperimentRecord,
    ModelVersion,
    NegativeTrainingExample,
    UserProfile,
    // Enums
    DislikeReason,
    ExperimentStatus,
    SearchMethod,
    VersionStatus,
};
