//! Error types shared by every crate in the tuning loop.
//!
//! Each variant is one failure kind a caller can react to. All of them are
//! scoped to a single operation; nothing here is fatal to the process.

use thiserror::Error;

/// Errors that can occur while recording feedback, searching, or promoting
/// configurations.
///
/// The `#[derive(Error)]` macro from thiserror implements `Display` from the
/// `#[error(...)]` attributes.
#[derive(Error, Debug)]
pub enum TuningError {
    /// Bad input shape or range. Rejected before any side effect.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No user context was supplied with the request
    #[error("Not authenticated: request carries no user id")]
    Unauthenticated,

    /// A transition was attempted on a terminal or wrong-state record.
    /// The stored record is left untouched.
    #[error("Invalid state transition for {entity} {id}: {from} -> {to}")]
    InvalidStateTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    /// The search engine could not produce a valid configuration
    #[error("Search space exhausted for {method} search after {attempts} attempts")]
    SearchSpaceExhausted { method: String, attempts: usize },

    /// Referenced record doesn't exist (e.g. completing an unknown experiment)
    #[error("Missing reference: {entity} with id {id}")]
    MissingReference { entity: String, id: String },

    /// The store failed to commit a write, or a stored document could not be read
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl TuningError {
    pub fn validation(reason: impl Into<String>) -> Self {
        TuningError::Validation(reason.into())
    }

    pub fn transition(
        entity: &str,
        id: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        TuningError::InvalidStateTransition {
            entity: entity.to_string(),
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn missing(entity: &str, id: impl Into<String>) -> Self {
        TuningError::MissingReference {
            entity: entity.to_string(),
            id: id.into(),
        }
    }
}

impl From<std::io::Error> for TuningError {
    fn from(err: std::io::Error) -> Self {
        TuningError::Persistence(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for TuningError {
    fn from(err: serde_json::Error) -> Self {
        TuningError::Persistence(format!("JSON error: {}", err))
    }
}

/// Convenience type alias for Results across the workspace
pub type Result<T> = std::result::Result<T, TuningError>;
