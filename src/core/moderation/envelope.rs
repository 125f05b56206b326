// Message envelope codec.
//
// Content travels through the queue double-encoded: the transport envelope is a
// JSON object whose `Message` field is itself a JSON-encoded `Content`.
// Decoding is split into the two layers so each has its own error kind.

use super::moderation_models::Content;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed message envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("Malformed content payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("Invalid content: {0}")]
    Validation(String),
}

/// Outer transport wrapper, notification style.
#[allow(dead_code)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "MessageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(rename = "TopicArn", default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(rename = "Timestamp", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "Message")]
    pub message: String,
}

/// Step 1: pull the embedded payload string out of the envelope.
pub fn decode_envelope(body: &str) -> Result<String, DecodeError> {
    let envelope: Envelope = serde_json::from_str(body).map_err(DecodeError::Envelope)?;
    Ok(envelope.message)
}

/// Step 2: parse the payload string into a content record.
pub fn decode_payload(payload: &str) -> Result<Content, DecodeError> {
    serde_json::from_str(payload).map_err(DecodeError::Payload)
}

/// Step 3: make sure the record can go through moderation.
pub fn validate(content: &Content) -> Result<(), DecodeError> {
    if content.id.is_empty() {
        return Err(DecodeError::Validation("field 'id' is empty".to_string()));
    }
    if content.text.is_empty() {
        return Err(DecodeError::Validation("field 'text' is empty".to_string()));
    }
    if let Some(status) = content.status {
        return Err(DecodeError::Validation(format!(
            "content {} is already moderated (status '{}')",
            content.id, status
        )));
    }
    Ok(())
}

/// Decode one raw message body into a validated, unmoderated record.
pub fn decode_message(body: &str) -> Result<Content, DecodeError> {
    let payload = decode_envelope(body)?;
    let content = decode_payload(&payload)?;
    validate(&content)?;
    Ok(content)
}

/// Wrap a record into an envelope body ready to publish.
pub fn encode_message(
    content: &Content,
    message_id: &str,
    topic: &str,
) -> Result<String, serde_json::Error> {
    let envelope = Envelope {
        kind: Some("Notification".to_string()),
        message_id: Some(message_id.to_string()),
        topic: Some(topic.to_string()),
        timestamp: Some(Utc::now().to_rfc3339()),
        message: serde_json::to_string(content)?,
    };
    serde_json::to_string(&envelope)
}
