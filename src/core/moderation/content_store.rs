use super::moderation_models::Content;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Durable persistence for moderation records, keyed by content id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or replace the record with the same id.
    async fn put(&self, content: &Content) -> Result<(), StoreError>;

    /// Fetch a record. `None` if the id was never stored.
    async fn get(&self, id: &str) -> Result<Option<Content>, StoreError>;
}

// Lets the consumer and the ingress API share one store instance.
#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn put(&self, content: &Content) -> Result<(), StoreError> {
        (**self).put(content).await
    }

    async fn get(&self, id: &str) -> Result<Option<Content>, StoreError> {
        (**self).get(id).await
    }
}
