//! Retraining triggers.
//!
//! Each trigger looks at the same snapshot (`TriggerInputs`) and answers one
//! question: does the accumulated evidence justify a retraining cycle? A
//! `TriggerSet` evaluates all registered triggers independently; any one
//! firing moves the loop from WAITING to READY.
//!
//! Evaluation is a pure read: calling it again without new feedback gives the
//! same decision.

pub mod accuracy;
pub mod feedback_volume;

pub use accuracy::AccuracyTrigger;
pub use feedback_volume::FeedbackVolumeTrigger;

use serde::Serialize;

/// What the triggers get to look at
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriggerInputs {
    /// Negative training examples not yet consumed by a retraining batch
    pub unused_examples: usize,
    /// Accuracy of the active configuration on the current holdout, if known
    pub active_accuracy: Option<f64>,
}

/// Core trait for retraining triggers.
///
/// `Send + Sync` so a set of triggers can sit inside shared services.
pub trait RetrainTrigger: Send + Sync {
    /// Returns the name of this trigger (for logging and reports)
    fn name(&self) -> &str;

    fn should_fire(&self, inputs: &TriggerInputs) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    Waiting,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerDecision {
    pub state: TriggerState,
    /// Names of every trigger that fired
    pub fired_by: Vec<String>,
    pub unused_examples: usize,
}

impl TriggerDecision {
    pub fn is_ready(&self) -> bool {
        self.state == TriggerState::Ready
    }
}

/// Independent triggers feeding the same retraining cycle.
///
/// ## Usage
/// ```ignore
/// let triggers = TriggerSet::new()
///     .add_trigger(FeedbackVolumeTrigger::new(20))
///     .add_trigger(AccuracyTrigger::new(0.65));
///
/// let decision = triggers.evaluate(&inputs);
/// ```
pub struct TriggerSet {
    triggers: Vec<Box<dyn RetrainTrigger>>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self {
            triggers: Vec::new(),
        }
    }

    /// Add a trigger to the set (builder pattern).
    pub fn add_trigger(mut self, trigger: impl RetrainTrigger + 'static) -> Self {
        self.triggers.push(Box::new(trigger));
        self
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn evaluate(&self, inputs: &TriggerInputs) -> TriggerDecision {
        let fired_by: Vec<String> = self
            .triggers
            .iter()
            .filter(|t| t.should_fire(inputs))
            .map(|t| t.name().to_string())
            .collect();

        let state = if fired_by.is_empty() {
            TriggerState::Waiting
        } else {
            TriggerState::Ready
        };

        tracing::debug!(
            "Retraining triggers evaluated: {:?} (unused examples: {}, fired: {:?})",
            state,
            inputs.unused_examples,
            fired_by
        );

        TriggerDecision {
            state,
            fired_by,
            unused_examples: inputs.unused_examples,
        }
    }
}

impl Default for TriggerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_always_waits() {
        let set = TriggerSet::new();
        let decision = set.evaluate(&TriggerInputs {
            unused_examples: 1000,
            active_accuracy: Some(0.0),
        });
        assert_eq!(decision.state, TriggerState::Waiting);
        assert!(decision.fired_by.is_empty());
    }

    #[test]
    fn test_triggers_fire_independently() {
        let set = TriggerSet::new()
            .add_trigger(FeedbackVolumeTrigger::new(20))
            .add_trigger(AccuracyTrigger::new(0.65));

        let volume_only = set.evaluate(&TriggerInputs {
            unused_examples: 25,
            active_accuracy: Some(0.9),
        });
        assert!(volume_only.is_ready());
        assert_eq!(volume_only.fired_by, vec!["feedback_volume"]);

        let accuracy_only = set.evaluate(&TriggerInputs {
            unused_examples: 3,
            active_accuracy: Some(0.5),
        });
        assert_eq!(accuracy_only.fired_by, vec!["accuracy"]);

        let both = set.evaluate(&TriggerInputs {
            unused_examples: 20,
            active_accuracy: Some(0.5),
        });
        assert_eq!(both.fired_by.len(), 2);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let set = TriggerSet::new().add_trigger(FeedbackVolumeTrigger::default());
        let inputs = TriggerInputs {
            unused_examples: 19,
            active_accuracy: None,
        };
        assert_eq!(set.evaluate(&inputs), set.evaluate(&inputs));
    }
}
