//! Core domain types for the feedback-to-retraining loop.
//!
//! This module defines the records that flow between the components:
//! - Catalog inputs (`CandidateItem`, `UserProfile`)
//! - Feedback records (`DislikeEvent`, `NegativeTrainingExample`)
//! - Search records (`ExperimentRecord`, `ModelVersion`)
//!
//! Records that carry a lifecycle expose their transitions as methods that
//! fail with `InvalidStateTransition` instead of letting callers poke at the
//! status field.

use crate::config::HyperParams;
use crate::error::{Result, TuningError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Type Aliases
// =============================================================================

/// Opaque user identifier supplied by the identity provider
pub type UserId = u32;

/// Catalog identifier of a movie
pub type MovieId = u32;

/// Catalog identifier of a franchise/collection
pub type FranchiseId = u32;

pub type DislikeId = u64;
pub type ExampleId = u64;
pub type RecommendationSetId = u64;

/// Encodes search method, creation time and sequence, e.g. `grid_20260101_120000_0007`
pub type ExperimentId = String;

pub type VersionId = String;

// =============================================================================
// Catalog Inputs
// =============================================================================

/// A movie that can be scored for a user.
///
/// Supplied by the catalog service and never modified here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: MovieId,
    pub title: String,
    pub genres: Vec<String>,
    /// Cast names ordered by billing position
    pub cast: Vec<String>,
    pub franchise_id: Option<FranchiseId>,
    /// Average rating on a 0-10 scale
    pub avg_rating: f64,
    pub rating_count: u32,
}

impl CandidateItem {
    pub fn genre_set(&self) -> HashSet<&str> {
        self.genres
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .collect()
    }
}

/// What we know about a user's taste.
///
/// Built outside this crate and treated as an immutable input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    /// Item -> rating on a 0-10 scale
    #[serde(default)]
    pub ratings: BTreeMap<MovieId, f64>,
    /// Share of the user's history per genre
    #[serde(default)]
    pub genre_preferences: BTreeMap<String, f64>,
    /// Cast the user gravitates to, most important first
    #[serde(default)]
    pub favorite_cast: Vec<String>,
    /// Franchises present in the user's history
    #[serde(default)]
    pub franchises: BTreeSet<FranchiseId>,
}

impl UserProfile {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    /// Genres with a positive share in the preference distribution
    pub fn preferred_genres(&self) -> HashSet<&str> {
        self.genre_preferences
            .iter()
            .filter(|(_, share)| **share > 0.0)
            .map(|(genre, _)| genre.as_str())
            .collect()
    }

    /// Top N genres by preference share (ties broken by name)
    pub fn top_genres(&self, n: usize) -> Vec<&str> {
        let mut genres: Vec<(&str, f64)> = self
            .genre_preferences
            .iter()
            .map(|(g, s)| (g.as_str(), *s))
            .collect();
        genres.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        genres.into_iter().take(n).map(|(g, _)| g).collect()
    }
}

// =============================================================================
// Feedback Records
// =============================================================================

/// Why a user rejected a recommendation
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DislikeReason {
    WrongGenre,
    PoorQuality,
    AlreadyWatched,
    #[default]
    NotInterested,
    Irrelevant,
    Other,
}

impl DislikeReason {
    pub const ALL: [DislikeReason; 6] = [
        DislikeReason::WrongGenre,
        DislikeReason::PoorQuality,
        DislikeReason::AlreadyWatched,
        DislikeReason::NotInterested,
        DislikeReason::Irrelevant,
        DislikeReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DislikeReason::WrongGenre => "wrong_genre",
            DislikeReason::PoorQuality => "poor_quality",
            DislikeReason::AlreadyWatched => "already_watched",
            DislikeReason::NotInterested => "not_interested",
            DislikeReason::Irrelevant => "irrelevant",
            DislikeReason::Other => "other",
        }
    }
}

impl fmt::Display for DislikeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DislikeReason {
    type Err = TuningError;

    fn from_str(s: &str) -> Result<Self> {
        DislikeReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s.trim())
            .ok_or_else(|| TuningError::validation(format!("unknown dislike reason: {}", s)))
    }
}

/// Incoming dislike as submitted by a request handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DislikeRequest {
    pub item_id: MovieId,
    pub title: String,
    pub set_id: Option<RecommendationSetId>,
    /// Score the model gave the item when it was recommended
    pub predicted_score: f64,
    #[serde(default)]
    pub reason: DislikeReason,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cast: Vec<String>,
    #[serde(default)]
    pub comment: String,
}

/// One explicit dislike. Append-only: never mutated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DislikeEvent {
    pub dislike_id: DislikeId,
    pub user_id: UserId,
    pub item_id: MovieId,
    pub title: String,
    pub set_id: Option<RecommendationSetId>,
    pub predicted_score: f64,
    pub reason: DislikeReason,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Item features submitted with a dislike.
///
/// Kept on the training example so a disliked item outside the holdout
/// catalog can still be scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DislikedItem {
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Billing order
    #[serde(default)]
    pub cast: Vec<String>,
}

impl DislikedItem {
    /// Catalog entry for an item known only through this dislike.
    ///
    /// Rating and popularity are unknown and left at zero.
    pub fn to_candidate(&self, id: MovieId) -> CandidateItem {
        CandidateItem {
            id,
            title: self.title.clone(),
            genres: self.genres.clone(),
            cast: self.cast.clone(),
            franchise_id: None,
            avg_rating: 0.0,
            rating_count: 0,
        }
    }
}

/// Labeled data point with target 0.0 derived from a dislike.
///
/// The only mutation allowed is flipping `used` from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeTrainingExample {
    pub example_id: ExampleId,
    pub dislike_id: DislikeId,
    pub user_id: UserId,
    pub item_id: MovieId,
    pub reason: DislikeReason,
    pub actual: f64,
    pub predicted: f64,
    pub error: f64,
    pub weight: f64,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub item: DislikedItem,
}

impl NegativeTrainingExample {
    pub fn with_item(mut self, item: DislikedItem) -> Self {
        self.item = item;
        self
    }

    /// Mark as consumed by a retraining batch. Returns true if the flag flipped.
    pub fn mark_used(&mut self) -> bool {
        let flipped = !self.used;
        self.used = true;
        flipped
    }
}

// =============================================================================
// Experiments
// =============================================================================

/// How a candidate configuration was generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Grid,
    Random,
    /// Bayesian-like search seeded from elite experiments
    Adaptive,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Grid => "grid",
            SearchMethod::Random => "random",
            SearchMethod::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = TuningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "grid" => Ok(SearchMethod::Grid),
            "random" => Ok(SearchMethod::Random),
            "adaptive" | "bayesian" => Ok(SearchMethod::Adaptive),
            other => Err(TuningError::validation(format!("unknown search method: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExperimentStatus::Pending => "pending",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One evaluation of a configuration against a held-out dataset.
///
/// Transitions pending -> completed | failed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: ExperimentId,
    pub sequence: u64,
    pub method: SearchMethod,
    pub config: HyperParams,
    pub status: ExperimentStatus,
    pub accuracy: Option<f64>,
    pub improvement: Option<f64>,
    pub failure_reason: Option<String>,
    /// Elite this candidate was perturbed from (adaptive search only)
    pub parent_experiment_id: Option<ExperimentId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExperimentRecord {
    pub fn is_completed(&self) -> bool {
        self.status == ExperimentStatus::Completed
    }

    pub fn complete(&mut self, accuracy: f64, improvement: f64, at: DateTime<Utc>) -> Result<()> {
        self.ensure_pending(ExperimentStatus::Completed)?;
        self.status = ExperimentStatus::Completed;
        self.accuracy = Some(accuracy);
        self.improvement = Some(improvement);
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        self.ensure_pending(ExperimentStatus::Failed)?;
        self.status = ExperimentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(at);
        Ok(())
    }

    fn ensure_pending(&self, to: ExperimentStatus) -> Result<()> {
        if self.status != ExperimentStatus::Pending {
            return Err(TuningError::transition(
                "experiment",
                self.experiment_id.clone(),
                self.status,
                to,
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Model Versions
// =============================================================================

/// Lifecycle: Candidate -> Active -> Superseded, or Candidate -> Rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Candidate,
    Active,
    Superseded,
    Rejected,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionStatus::Candidate => "candidate",
            VersionStatus::Active => "active",
            VersionStatus::Superseded => "superseded",
            VersionStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// An accepted configuration wrapped as an immutable version.
///
/// Never deleted; superseded versions stay for audit and rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version_id: VersionId,
    pub experiment_id: Option<ExperimentId>,
    pub config: HyperParams,
    pub accuracy: f64,
    pub status: VersionStatus,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
}

impl ModelVersion {
    pub fn is_active(&self) -> bool {
        self.status == VersionStatus::Active
    }

    pub fn activate(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(VersionStatus::Candidate, VersionStatus::Active)?;
        self.activated_at = Some(at);
        Ok(())
    }

    pub fn supersede(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(VersionStatus::Active, VersionStatus::Superseded)?;
        self.retired_at = Some(at);
        Ok(())
    }

    pub fn reject(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(VersionStatus::Candidate, VersionStatus::Rejected)?;
        self.retired_at = Some(at);
        Ok(())
    }

    fn transition(&mut self, from: VersionStatus, to: VersionStatus) -> Result<()> {
        if self.status != from {
            return Err(TuningError::transition(
                "model version",
                self.version_id.clone(),
                self.status,
                to,
            ));
        }
        self.status = to;
        Ok(())
    }
}
