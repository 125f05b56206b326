// Moderation domain models - the content record and the values that flow
// through the moderation pipeline.
//
// These are pure domain types with no transport or storage dependencies.
// The infra layer converts them to rows, HTTP bodies and queue messages.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Final moderation outcome for a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    /// Classified and found clean.
    None,
    /// Classified as toxic; `toxic_labels` says why.
    Detected,
    /// Could not be classified automatically, a human has to look at it.
    ReviewRequired,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::None => "none",
            ModerationStatus::Detected => "detected",
            ModerationStatus::ReviewRequired => "review_required",
        }
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ModerationStatus::None),
            "detected" => Ok(ModerationStatus::Detected),
            "review_required" => Ok(ModerationStatus::ReviewRequired),
            other => Err(format!("unknown moderation status '{}'", other)),
        }
    }
}

/// The unit of moderation.
///
/// Created at ingress with only `id` and `text`, then finalized exactly once
/// by the batch consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    /// Unset until moderation completes. An empty string on the wire also means unset.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_status"
    )]
    pub status: Option<ModerationStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toxic_labels: Vec<String>,
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<Option<ModerationStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<ModerationStatus>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl Content {
    /// A fresh, unmoderated record.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            status: None,
            toxic_labels: Vec::new(),
        }
    }

    /// Consume the record and return it with the decision applied.
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.status = Some(decision.status);
        self.toxic_labels = decision.toxic_labels;
        self
    }
}

/// Classifier output for a single text.
#[derive(Debug, Clone, PartialEq)]
pub struct ToxicityVerdict {
    /// Toxicity in [0.0, 1.0].
    pub score: f64,
    /// Category names in the order the classifier returned them.
    pub labels: Vec<String>,
}

/// What the decision engine concluded for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub status: ModerationStatus,
    pub toxic_labels: Vec<String>,
}

impl Decision {
    pub fn clean() -> Self {
        Self {
            status: ModerationStatus::None,
            toxic_labels: Vec::new(),
        }
    }

    pub fn review_required() -> Self {
        Self {
            status: ModerationStatus::ReviewRequired,
            toxic_labels: Vec::new(),
        }
    }

    pub fn detected(labels: Vec<String>) -> Self {
        Self {
            status: ModerationStatus::Detected,
            toxic_labels: labels,
        }
    }
}

/// Status assigned when the classifier cannot be reached or answers garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Route to manual review.
    ReviewRequired,
    /// Let the content through as clean.
    None,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "review_required" => Ok(FailurePolicy::ReviewRequired),
            "none" => Ok(FailurePolicy::None),
            other => Err(format!(
                "expected 'review_required' or 'none', got '{}'",
                other
            )),
        }
    }
}

/// Tunables for the decision engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationPolicy {
    /// Scores at or above this are `detected`.
    pub toxicity_threshold: f64,
    pub on_classification_failure: FailurePolicy,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            toxicity_threshold: 0.3,
            on_classification_failure: FailurePolicy::ReviewRequired,
        }
    }
}

/// One message as delivered by the transport. `body` is the raw envelope text.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message_id: String,
    pub body: String,
}

impl InboundMessage {
    #[allow(dead_code)]
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmoderated_content_omits_status_and_labels() {
        let content = Content::new("abc", "hello");
        let json = serde_json::to_value(&content).unwrap();

        assert_eq!(json, serde_json::json!({ "id": "abc", "text": "hello" }));
    }

    #[test]
    fn test_empty_status_string_is_unset() {
        let content: Content =
            serde_json::from_str(r#"{"id":"abc","text":"hi","status":""}"#).unwrap();

        assert_eq!(content.status, None);
        assert!(content.toxic_labels.is_empty());
    }

    #[test]
    fn test_detected_content_serializes_camel_case_labels() {
        let content = Content::new("abc", "I hate you")
            .with_decision(Decision::detected(vec!["INSULT".to_string()]));
        let json = serde_json::to_value(&content).unwrap();

        assert_eq!(json["status"], "detected");
        assert_eq!(json["toxicLabels"], serde_json::json!(["INSULT"]));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = serde_json::from_str::<Content>(r#"{"id":"a","text":"b","status":"maybe"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!(
            "review_required".parse::<FailurePolicy>(),
            Ok(FailurePolicy::ReviewRequired)
        );
        assert_eq!(" NONE ".parse::<FailurePolicy>(), Ok(FailurePolicy::None));
        assert!("detected".parse::<FailurePolicy>().is_err());
    }
}
