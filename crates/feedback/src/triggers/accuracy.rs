//! Trigger on degraded accuracy of the active configuration.

use super::{RetrainTrigger, TriggerInputs};

pub const DEFAULT_ACCURACY_THRESHOLD: f64 = 0.65;

/// Fires when the active configuration's measured accuracy drops below the
/// threshold. Without a measurement it stays quiet.
pub struct AccuracyTrigger {
    threshold: f64,
}

impl AccuracyTrigger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for AccuracyTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_ACCURACY_THRESHOLD)
    }
}

impl RetrainTrigger for AccuracyTrigger {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn should_fire(&self, inputs: &TriggerInputs) -> bool {
        matches!(inputs.active_accuracy, Some(accuracy) if accuracy < self.threshold)
    }
}
