// Decision engine - maps a classification outcome to a moderation status.
//
// Pure and synchronous: no classifier, no store. The batch consumer feeds it
// whatever the classifier returned (or the error) and persists the result.

use super::moderation_models::{Decision, FailurePolicy, ModerationPolicy, ToxicityVerdict};
use super::toxicity_classifier::ClassificationError;

pub struct DecisionEngine {
    policy: ModerationPolicy,
}

impl DecisionEngine {
    pub fn new(policy: ModerationPolicy) -> Self {
        Self { policy }
    }

    /// Decide the status for one record.
    ///
    /// * classifier failed -> the configured failure status, no labels
    /// * `score >= threshold` -> `detected` with the labels as received
    /// * otherwise -> `none`, no labels
    pub fn decide(&self, outcome: Result<&ToxicityVerdict, &ClassificationError>) -> Decision {
        match outcome {
            Err(_) => match self.policy.on_classification_failure {
                FailurePolicy::ReviewRequired => Decision::review_required(),
                FailurePolicy::None => Decision::clean(),
            },
            Ok(verdict) if verdict.score >= self.policy.toxicity_threshold => {
                Decision::detected(verdict.labels.clone())
            }
            Ok(_) => Decision::clean(),
        }
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(ModerationPolicy::default())
    }
}
