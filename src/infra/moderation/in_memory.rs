// This is the infra layer - it implements the ContentStore trait from core.
// This file provides an IN-MEMORY implementation.
//
// **When to use it?**
// - Local runs without a database file (CONTENT_STORE_BACKEND=memory)
// - Exercising the ingress API and the consumer together in tests
//
// Nothing survives a restart. The SQLite store is the durable one and
// honours the same contract, so the core never knows which it is talking to.

use crate::core::moderation::{Content, ContentStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory implementation of ContentStore.
///
/// **Why DashMap?**
/// The batch consumer writes every message of a batch concurrently, while
/// the HTTP handlers read records at the same time. DashMap shards its locks
/// internally, so none of them has to wait on a single Mutex around the map.
pub struct InMemoryContentStore {
    /// Maps content id -> latest version of the record
    records: DashMap<String, Content>,
}

impl InMemoryContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, content: &Content) -> Result<(), StoreError> {
        // insert() replaces whatever was there, which is exactly upsert-by-id
        self.records.insert(content.id.clone(), content.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Content>, StoreError> {
        Ok(self.records.get(id).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::Decision;

    #[tokio::test]
    async fn test_put_then_get() {
        let store = InMemoryContentStore::new();

        assert_eq!(store.get("c-1").await.unwrap(), None);

        store.put(&Content::new("c-1", "hello")).await.unwrap();
        assert_eq!(
            store.get("c-1").await.unwrap(),
            Some(Content::new("c-1", "hello"))
        );
    }

    #[tokio::test]
    async fn test_put_is_an_upsert() {
        let store = InMemoryContentStore::new();
        let moderated = Content::new("c-1", "I hate you")
            .with_decision(Decision::detected(vec!["INSULT".to_string()]));

        store.put(&moderated).await.unwrap();
        store.put(&moderated).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("c-1").await.unwrap(), Some(moderated));
    }
}
