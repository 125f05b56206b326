// Ingest service - accepts submitted text, assigns it an id and hands it to
// the moderation queue. Also serves lookups of finished records.

use crate::core::moderation::envelope;
use crate::core::moderation::{Content, ContentStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Publish failed: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Field 'text' cannot be empty.")]
    EmptyText,

    #[error("Failed to encode content: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// PUBLISHER TRAIT (PORT)
// ============================================================================

/// Outbound side of the moderation queue.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Topic messages end up on. Stamped into the envelope.
    fn topic(&self) -> &str;

    async fn publish(&self, message_id: &str, body: &str) -> Result<(), PublishError>;
}

#[async_trait]
impl<T: MessagePublisher + ?Sized> MessagePublisher for Arc<T> {
    fn topic(&self) -> &str {
        (**self).topic()
    }

    async fn publish(&self, message_id: &str, body: &str) -> Result<(), PublishError> {
        (**self).publish(message_id, body).await
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// What the caller gets back after a successful submission.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    pub id: String,
    pub message_id: String,
}

pub struct IngestService<P: MessagePublisher, S: ContentStore> {
    publisher: P,
    store: S,
}

impl<P: MessagePublisher, S: ContentStore> IngestService<P, S> {
    pub fn new(publisher: P, store: S) -> Self {
        Self { publisher, store }
    }

    /// Queue a text for moderation and return its freshly assigned id.
    pub async fn submit(&self, text: String) -> Result<SubmitReceipt, IngestError> {
        if text.is_empty() {
            return Err(IngestError::EmptyText);
        }

        let content = Content::new(Uuid::new_v4().to_string(), text);
        let message_id = Uuid::new_v4().to_string();
        let body = envelope::encode_message(&content, &message_id, self.publisher.topic())?;

        self.publisher.publish(&message_id, &body).await?;

        tracing::info!(content_id = %content.id, message_id = %message_id, "Content queued for moderation");

        Ok(SubmitReceipt {
            id: content.id,
            message_id,
        })
    }

    /// Look up a record by id.
    pub async fn get(&self, id: &str) -> Result<Option<Content>, IngestError> {
        Ok(self.store.get(id).await?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
