//! Runtime settings, read from `TUNER_*` environment variables.
//!
//! An optional `.env` file is loaded first. Every knob has a default, so an
//! empty environment gives a working setup.
//!
//! | Variable                      | Default                  |
//! |-------------------------------|--------------------------|
//! | `TUNER_STATE_PATH`            | `data/tuner-state.json`  |
//! | `TUNER_HOLDOUT_PATH`          | `data/holdout.json`      |
//! | `TUNER_FEEDBACK_THRESHOLD`    | 20                       |
//! | `TUNER_BATCH_CAP`             | 100                      |
//! | `TUNER_ACCURACY_TRIGGER`      | true                     |
//! | `TUNER_ACCURACY_THRESHOLD`    | 0.65                     |
//! | `TUNER_MIN_IMPROVEMENT`       | 0.05                     |
//! | `TUNER_GRID_RADIUS`           | 0.10                     |
//! | `TUNER_GRID_STEPS`            | 3                        |
//! | `TUNER_SIGMA_FRACTION`        | 0.05                     |
//! | `TUNER_SEARCH_METHOD`         | `random`                 |
//! | `TUNER_SEARCH_BATCH_SIZE`     | 10                       |
//! | `TUNER_SEED`                  | unset (OS entropy)       |
//! | `TUNER_PATTERN_WINDOW_DAYS`   | 30                       |

use domain::SearchMethod;
use feedback::{AccuracyTrigger, FeedbackVolumeTrigger, TriggerSet, MAX_BATCH_SIZE, PATTERN_WINDOW_DAYS};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tuning::{ParamSpace, SearchSettings, MIN_IMPROVEMENT};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read TUNER_ environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    #[serde(default = "default_holdout_path")]
    pub holdout_path: PathBuf,

    /// Unused negative examples that start a retraining cycle
    #[serde(default = "default_feedback_threshold")]
    pub feedback_threshold: usize,

    /// Negative examples consumed per cycle
    #[serde(default = "default_batch_cap")]
    pub batch_cap: usize,

    #[serde(default = "default_accuracy_trigger")]
    pub accuracy_trigger: bool,

    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f64,

    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,

    #[serde(default = "default_grid_radius")]
    pub grid_radius: f64,

    #[serde(default = "default_grid_steps")]
    pub grid_steps: usize,

    #[serde(default = "default_sigma_fraction")]
    pub sigma_fraction: f64,

    #[serde(default = "default_search_method")]
    pub search_method: SearchMethod,

    #[serde(default = "default_search_batch_size")]
    pub search_batch_size: usize,

    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_pattern_window_days")]
    pub pattern_window_days: i64,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/tuner-state.json")
}

fn default_holdout_path() -> PathBuf {
    PathBuf::from("data/holdout.json")
}

fn default_feedback_threshold() -> usize {
    FeedbackVolumeTrigger::default().threshold()
}

fn default_batch_cap() -> usize {
    MAX_BATCH_SIZE
}

fn default_accuracy_trigger() -> bool {
    true
}

fn default_accuracy_threshold() -> f64 {
    AccuracyTrigger::default().threshold()
}

fn default_min_improvement() -> f64 {
    MIN_IMPROVEMENT
}

fn default_grid_radius() -> f64 {
    SearchSettings::default().grid_radius
}

fn default_grid_steps() -> usize {
    SearchSettings::default().grid_steps
}

fn default_sigma_fraction() -> f64 {
    SearchSettings::default().sigma_fraction
}

fn default_search_method() -> SearchMethod {
    SearchMethod::Random
}

fn default_search_batch_size() -> usize {
    10
}

fn default_pattern_window_days() -> i64 {
    PATTERN_WINDOW_DAYS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            holdout_path: default_holdout_path(),
            feedback_threshold: default_feedback_threshold(),
            batch_cap: default_batch_cap(),
            accuracy_trigger: default_accuracy_trigger(),
            accuracy_threshold: default_accuracy_threshold(),
            min_improvement: default_min_improvement(),
            grid_radius: default_grid_radius(),
            grid_steps: default_grid_steps(),
            sigma_fraction: default_sigma_fraction(),
            search_method: default_search_method(),
            search_batch_size: default_search_batch_size(),
            seed: None,
            pattern_window_days: default_pattern_window_days(),
        }
    }
}

impl Settings {
    /// Load `.env` (if any), then read `TUNER_*` variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();
        let settings = envy::prefixed("TUNER_").from_env::<Settings>()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |name: &'static str, reason: &str| SettingsError::Invalid {
            name,
            reason: reason.to_string(),
        };

        if self.batch_cap == 0 || self.batch_cap > MAX_BATCH_SIZE {
            return Err(invalid("batch_cap", "must lie in 1..=100"));
        }
        if !(0.0..=1.0).contains(&self.accuracy_threshold) {
            return Err(invalid("accuracy_threshold", "must lie in [0, 1]"));
        }
        if !(0.0..1.0).contains(&self.min_improvement) {
            return Err(invalid("min_improvement", "must lie in [0, 1)"));
        }
        if !(self.grid_radius > 0.0 && self.grid_radius < 1.0) {
            return Err(invalid("grid_radius", "must lie in (0, 1)"));
        }
        if self.grid_steps == 0 {
            return Err(invalid("grid_steps", "must be positive"));
        }
        if !(self.sigma_fraction > 0.0 && self.sigma_fraction <= 1.0) {
            return Err(invalid("sigma_fraction", "must lie in (0, 1]"));
        }
        if self.pattern_window_days <= 0 {
            return Err(invalid("pattern_window_days", "must be positive"));
        }
        Ok(())
    }

    pub fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            grid_radius: self.grid_radius,
            grid_steps: self.grid_steps,
            sigma_fraction: self.sigma_fraction,
            seed: self.seed,
            space: ParamSpace::default(),
        }
    }

    /// Volume trigger always; accuracy trigger when enabled
    pub fn triggers(&self) -> TriggerSet {
        let set = TriggerSet::new().add_trigger(FeedbackVolumeTrigger::new(self.feedback_threshold));
        if self.accuracy_trigger {
            set.add_trigger(AccuracyTrigger::new(self.accuracy_threshold))
        } else {
            set
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.feedback_threshold, 20);
        assert_eq!(settings.batch_cap, 100);
        assert_eq!(settings.min_improvement, 0.05);
        assert_eq!(settings.pattern_window_days, 30);
        assert_eq!(settings.triggers().len(), 2);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let settings = Settings {
            batch_cap: 500,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { name: "batch_cap", .. })
        ));

        let settings = Settings {
            grid_radius: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_accuracy_trigger_can_be_disabled() {
        let settings = Settings {
            accuracy_trigger: false,
            ..Default::default()
        };
        assert_eq!(settings.triggers().len(), 1);
    }
}
