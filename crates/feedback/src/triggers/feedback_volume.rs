//! Trigger on accumulated negative feedback.

use super::{RetrainTrigger, TriggerInputs};

/// Unused negative examples needed before retraining
pub const DEFAULT_FEEDBACK_THRESHOLD: usize = 20;

/// Fires once `unused_examples >= threshold`.
pub struct FeedbackVolumeTrigger {
    threshold: usize,
}

impl FeedbackVolumeTrigger {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for FeedbackVolumeTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_FEEDBACK_THRESHOLD)
    }
}

impl RetrainTrigger for FeedbackVolumeTrigger {
    fn name(&self) -> &str {
        "feedback_volume"
    }

    fn should_fire(&self, inputs: &TriggerInputs) -> bool {
        inputs.unused_examples >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(unused_examples: usize) -> TriggerInputs {
        TriggerInputs {
            unused_examples,
            active_accuracy: None,
        }
    }

    #[test]
    fn test_fires_at_threshold() {
        let trigger = FeedbackVolumeTrigger::default();
        assert!(!trigger.should_fire(&inputs(19)));
        assert!(trigger.should_fire(&inputs(20)));
        assert!(trigger.should_fire(&inputs(150)));
    }
}
