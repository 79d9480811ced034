//! Server crate for the recommendation tuning loop.
//!
//! This crate contains the orchestrator that request handlers call into, and
//! the environment-driven settings it is built from.

pub mod orchestrator;
pub mod settings;

pub use orchestrator::{DislikeReceipt, RetrainOutcome, TrainingImpact, TuningOrchestrator, TuningReport};
pub use settings::{Settings, SettingsError};
