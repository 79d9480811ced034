//! Held-out labeled dataset used to measure a configuration's accuracy.
//!
//! The on-disk form is a JSON document:
//!
//! ```json
//! { "profiles": [...], "items": [...], "examples": [{"user_id": 1, "item_id": 10, "label": 0.8}] }
//! ```
//!
//! Positive examples come from real ratings (label = rating / 10). Negative
//! training examples from the feedback ledger are appended with label 0.0 and
//! their own weight via `with_negatives`.

use crate::error::{Result, TuningError};
use crate::types::{CandidateItem, MovieId, NegativeTrainingExample, UserId, UserProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

fn default_weight() -> f64 {
    1.0
}

/// One (user, item, target) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub user_id: UserId,
    pub item_id: MovieId,
    /// Target score in [0, 1]
    pub label: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HoldoutDocument {
    #[serde(default)]
    profiles: Vec<UserProfile>,
    #[serde(default)]
    items: Vec<CandidateItem>,
    #[serde(default)]
    examples: Vec<LabeledExample>,
}

/// Read-only evaluation snapshot.
///
/// Owns profiles and items indexed by id; examples keep file order.
#[derive(Debug, Clone, Default)]
pub struct HoldoutSet {
    profiles: HashMap<UserId, UserProfile>,
    items: HashMap<MovieId, CandidateItem>,
    examples: Vec<LabeledExample>,
}

impl HoldoutSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a holdout document
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let doc: HoldoutDocument = serde_json::from_str(&raw)?;

        let mut set = HoldoutSet::new();
        for profile in doc.profiles {
            set.insert_profile(profile);
        }
        for item in doc.items {
            set.insert_item(item);
        }
        for example in doc.examples {
            set.push_example(example);
        }
        set.validate()?;

        let (profiles, items, examples) = set.counts();
        info!(
            path = %path.display(),
            profiles, items, examples,
            "Loaded holdout set"
        );
        Ok(set)
    }

    pub fn insert_profile(&mut self, profile: UserProfile) {
        self.profiles.insert(profile.user_id, profile);
    }

    pub fn insert_item(&mut self, item: CandidateItem) {
        self.items.insert(item.id, item);
    }

    pub fn push_example(&mut self, example: LabeledExample) {
        self.examples.push(example);
    }

    pub fn get_profile(&self, user_id: UserId) -> Option<&UserProfile> {
        self.profiles.get(&user_id)
    }

    pub fn get_item(&self, item_id: MovieId) -> Option<&CandidateItem> {
        self.items.get(&item_id)
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    /// (profiles, items, examples)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.profiles.len(), self.items.len(), self.examples.len())
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Check that:
    /// - every example references a known profile and item
    /// - labels are in [0, 1] and weights are positive
    /// - item ratings are on the 0-10 scale
    pub fn validate(&self) -> Result<()> {
        for item in self.items.values() {
            if !(0.0..=10.0).contains(&item.avg_rating) {
                return Err(TuningError::validation(format!(
                    "item {} has average rating {} outside [0, 10]",
                    item.id, item.avg_rating
                )));
            }
        }
        for (idx, example) in self.examples.iter().enumerate() {
            if !self.profiles.contains_key(&example.user_id) {
                return Err(TuningError::missing("user profile", example.user_id.to_string()));
            }
            if !self.items.contains_key(&example.item_id) {
                return Err(TuningError::missing("item", example.item_id.to_string()));
            }
            if !(0.0..=1.0).contains(&example.label) {
                return Err(TuningError::validation(format!(
                    "example {} has label {} outside [0, 1]",
                    idx, example.label
                )));
            }
            if !(example.weight > 0.0) || !example.weight.is_finite() {
                return Err(TuningError::validation(format!(
                    "example {} has non-positive weight {}",
                    idx, example.weight
                )));
            }
        }
        Ok(())
    }

    /// Copy of this set extended with negative training examples.
    ///
    /// Every negative is kept. An item the set doesn't know is built from the
    /// features captured with the dislike, and an unknown user gets an empty
    /// profile.
    pub fn with_negatives(&self, negatives: &[NegativeTrainingExample]) -> HoldoutSet {
        let mut set = self.clone();
        let mut new_items = 0usize;
        let mut new_profiles = 0usize;
        for negative in negatives {
            set.items.entry(negative.item_id).or_insert_with(|| {
                new_items += 1;
                negative.item.to_candidate(negative.item_id)
            });
            set.profiles.entry(negative.user_id).or_insert_with(|| {
                new_profiles += 1;
                UserProfile::new(negative.user_id)
            });
            set.examples.push(LabeledExample {
                user_id: negative.user_id,
                item_id: negative.item_id,
                label: negative.actual,
                weight: negative.weight,
            });
        }
        if new_items > 0 || new_profiles > 0 {
            info!(
                new_items,
                new_profiles, "Negatives outside the holdout added from dislike features"
            );
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DislikeReason, DislikedItem};
    use chrono::Utc;

    fn item(id: MovieId) -> CandidateItem {
        CandidateItem {
            id,
            title: format!("Movie {}", id),
            genres: vec!["Drama".to_string()],
            cast: vec![],
            franchise_id: None,
            avg_rating: 7.0,
            rating_count: 100,
        }
    }

    fn small_set() -> HoldoutSet {
        let mut set = HoldoutSet::new();
        set.insert_profile(UserProfile::new(1));
        set.insert_item(item(10));
        set.push_example(LabeledExample {
            user_id: 1,
            item_id: 10,
            label: 0.8,
            weight: 1.0,
        });
        set
    }

    #[test]
    fn test_validate_accepts_consistent_set() {
        assert!(small_set().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_item() {
        let mut set = small_set();
        set.push_example(LabeledExample {
            user_id: 1,
            item_id: 99,
            label: 0.5,
            weight: 1.0,
        });
        assert!(matches!(set.validate(), Err(TuningError::MissingReference { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_label() {
        let mut set = small_set();
        set.push_example(LabeledExample {
            user_id: 1,
            item_id: 10,
            label: 1.5,
            weight: 1.0,
        });
        assert!(matches!(set.validate(), Err(TuningError::Validation(_))));
    }

    fn negative(user_id: UserId, item_id: MovieId) -> NegativeTrainingExample {
        NegativeTrainingExample {
            example_id: item_id as u64,
            dislike_id: item_id as u64,
            user_id,
            item_id,
            reason: DislikeReason::PoorQuality,
            actual: 0.0,
            predicted: 0.6,
            error: 0.6,
            weight: 0.8,
            used: false,
            created_at: Utc::now(),
            item: DislikedItem {
                title: format!("Movie {}", item_id),
                genres: vec!["Horror".to_string()],
                cast: vec!["Lead".to_string()],
            },
        }
    }

    #[test]
    fn test_with_negatives_appends_zero_labels() {
        let set = small_set();
        let extended = set.with_negatives(&[negative(1, 10)]);
        assert_eq!(extended.examples().len(), 2);
        assert_eq!(extended.examples()[1].label, 0.0);
        assert_eq!(extended.examples()[1].weight, 0.8);
        // Known item keeps its catalog features
        assert_eq!(extended.get_item(10).unwrap().genres, vec!["Drama"]);
        // The original snapshot is untouched
        assert_eq!(set.examples().len(), 1);
    }

    #[test]
    fn test_with_negatives_builds_items_outside_holdout() {
        let set = small_set();
        let extended = set.with_negatives(&[negative(1, 42), negative(7, 43)]);

        assert_eq!(extended.examples().len(), 3);
        let built = extended.get_item(42).unwrap();
        assert_eq!(built.genres, vec!["Horror"]);
        assert_eq!(built.cast, vec!["Lead"]);
        assert_eq!(built.rating_count, 0);
        assert!(extended.get_profile(7).unwrap().genre_preferences.is_empty());
        assert!(extended.validate().is_ok());
        assert!(set.get_item(42).is_none());
    }

    #[test]
    fn test_document_weight_defaults_to_one() {
        let doc: HoldoutDocument = serde_json::from_str(
            r#"{"examples":[{"user_id":1,"item_id":2,"label":0.5}]}"#,
        )
        .unwrap();
        assert_eq!(doc.examples[0].weight, 1.0);
    }
}
