// Batch consumer - fans a batch of inbound messages out to concurrent
// per-message moderation and waits for all of them.
//
// Per message: decode -> classify -> decide -> persist.
// A failure in one message never cancels or corrupts its siblings, and the
// batch call itself never fails. Failures are logged and returned in the
// report; the transport's redelivery is the retry mechanism.
//
// **Why return failures instead of an error?**
// A batch is a bag of unrelated records. Failing the whole call because one
// record could not be stored would throw away the work done for the others.
// The caller (the queue poll loop) looks at the report to decide which
// messages to acknowledge and which to leave for redelivery.
//
// **Why FuturesUnordered?**
// Every message spends nearly all its time waiting on the classifier and
// the store, so they are driven concurrently on the same task. No spawning
// means no 'static bounds on the ports, and the loop below doubles as the
// join barrier: it only ends once every future has finished.

use super::content_store::{ContentStore, StoreError};
use super::decision_engine::DecisionEngine;
use super::envelope::{self, DecodeError};
use super::moderation_models::{Content, InboundMessage, ModerationPolicy};
use super::toxicity_classifier::{ClassificationError, ToxicityClassifier};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for each classifier and store call.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ERRORS
// ============================================================================

/// Why a single message did not end up persisted.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Failed to persist content {id}: {source}")]
    Persistence {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl ModerationError {
    /// Whether a later delivery of the same message could succeed.
    ///
    /// Store failures are usually transient. A message that does not decode
    /// or validate never will, so redelivering it only burns capacity.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModerationError::Persistence { .. })
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug)]
pub struct MessageFailure {
    /// Transport id of the message, not the content id.
    pub message_id: String,
    pub error: ModerationError,
}

/// Aggregate outcome of one batch. Failures are in completion order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub received: usize,
    pub persisted: usize,
    /// Persisted with the fallback status because the classifier failed.
    pub degraded: usize,
    pub failures: Vec<MessageFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Message ids that should stay on the queue so they get delivered again.
    pub fn retry_ids(&self) -> HashSet<&str> {
        self.failures
            .iter()
            .filter(|f| f.error.is_retryable())
            .map(|f| f.message_id.as_str())
            .collect()
    }
}

struct Moderated {
    content: Content,
    classified: bool,
}

// ============================================================================
// CONSUMER
// ============================================================================

/// Moderates batches of inbound messages.
///
/// Generic over its ports so tests can plug in scripted fakes and `main`
/// can plug in the HTTP classifier and whichever store is configured.
pub struct BatchConsumer<C: ToxicityClassifier, S: ContentStore> {
    /// Scores each text. Shared by every message in flight.
    classifier: C,
    /// Where finished records end up, upserted by content id.
    store: S,
    engine: DecisionEngine,
    /// Applied separately to the classify call and to the store write.
    io_timeout: Duration,
}

impl<C: ToxicityClassifier, S: ContentStore> BatchConsumer<C, S> {
    pub fn new(classifier: C, store: S, policy: ModerationPolicy) -> Self {
        Self {
            classifier,
            store,
            engine: DecisionEngine::new(policy),
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Moderate every message in the batch concurrently.
    ///
    /// Returns once every message has either been persisted or failed.
    pub async fn process_batch(&self, messages: &[InboundMessage]) -> BatchReport {
        let mut report = BatchReport {
            received: messages.len(),
            ..Default::default()
        };

        if messages.is_empty() {
            tracing::warn!("Received an empty batch, nothing to moderate");
            return report;
        }

        tracing::debug!(length = messages.len(), "Got message batch");

        let mut in_flight: FuturesUnordered<_> = messages
            .iter()
            .map(|message| async move { (message, self.process_message(message).await) })
            .collect();

        while let Some((message, outcome)) = in_flight.next().await {
            match outcome {
                Ok(moderated) => {
                    report.persisted += 1;
                    if !moderated.classified {
                        report.degraded += 1;
                    }
                    tracing::info!(
                        message_id = %message.message_id,
                        content_id = %moderated.content.id,
                        status = ?moderated.content.status,
                        labels = ?moderated.content.toxic_labels,
                        "Content moderated"
                    );
                }
                Err(error) => {
                    match &error {
                        ModerationError::Decode(_) => tracing::error!(
                            message_id = %message.message_id,
                            body = %message.body,
                            error = %error,
                            "Failed to decode message"
                        ),
                        ModerationError::Persistence { .. } => tracing::error!(
                            message_id = %message.message_id,
                            error = %error,
                            "Failed to persist content"
                        ),
                    }
                    report.failures.push(MessageFailure {
                        message_id: message.message_id.clone(),
                        error,
                    });
                }
            }
        }

        tracing::debug!(
            received = report.received,
            persisted = report.persisted,
            degraded = report.degraded,
            failed = report.failures.len(),
            "Batch done"
        );

        report
    }

    async fn process_message(&self, message: &InboundMessage) -> Result<Moderated, ModerationError> {
        tracing::debug!(message_id = %message.message_id, "Processing message");

        let content = envelope::decode_message(&message.body)?;

        let outcome =
            match tokio::time::timeout(self.io_timeout, self.classifier.classify(&content.text))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ClassificationError::Timeout(self.io_timeout)),
            };

        if let Err(e) = &outcome {
            tracing::warn!(
                content_id = %content.id,
                error = %e,
                "Failed to classify content, applying fallback status"
            );
        }

        let classified = outcome.is_ok();
        let decision = self.engine.decide(outcome.as_ref());
        let content = content.with_decision(decision);

        let stored = match tokio::time::timeout(self.io_timeout, self.store.put(&content)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.io_timeout)),
        };

        stored.map_err(|source| ModerationError::Persistence {
            id: content.id.clone(),
            source,
        })?;

        Ok(Moderated {
            content,
            classified,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{FailurePolicy, ModerationStatus, ToxicityVerdict};
    use async_trait::async_trait;
    use dashmap::{DashMap, DashSet};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Barrier;

    #[derive(Clone)]
    enum Script {
        Verdict(f64, Vec<&'static str>),
        Fail,
        Hang,
    }

    /// Classifier answering by text, counting calls.
    struct MockClassifier {
        scripts: DashMap<String, Script>,
        calls: AtomicUsize,
        barrier: Option<Arc<Barrier>>,
    }

    impl MockClassifier {
        fn new() -> Self {
            Self {
                scripts: DashMap::new(),
                calls: AtomicUsize::new(0),
                barrier: None,
            }
        }

        fn script(self, text: &str, script: Script) -> Self {
            self.scripts.insert(text.to_string(), script);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToxicityClassifier for MockClassifier {
        async fn classify(&self, text: &str) -> Result<ToxicityVerdict, ClassificationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            let script = self
                .scripts
                .get(text)
                .map(|s| s.clone())
                .unwrap_or(Script::Verdict(0.0, vec![]));
            match script {
                Script::Verdict(score, labels) => Ok(ToxicityVerdict {
                    score,
                    labels: labels.into_iter().map(String::from).collect(),
                }),
                Script::Fail => Err(ClassificationError::Api {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(ClassificationError::EmptyResult)
                }
            }
        }
    }

    /// In-memory store that can be told to reject specific ids.
    struct MockStore {
        records: DashMap<String, Content>,
        failing_ids: DashSet<String>,
        puts: AtomicUsize,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                records: DashMap::new(),
                failing_ids: DashSet::new(),
                puts: AtomicUsize::new(0),
            }
        }

        fn puts(&self) -> usize {
            self.puts.load(Ordering::SeqCst)
        }

        fn record(&self, id: &str) -> Option<Content> {
            self.records.get(id).map(|c| c.clone())
        }
    }

    #[async_trait]
    impl ContentStore for MockStore {
        async fn put(&self, content: &Content) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.failing_ids.contains(&content.id) {
                return Err(StoreError::Storage("disk full".to_string()));
            }
            self.records.insert(content.id.clone(), content.clone());
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<Content>, StoreError> {
            Ok(self.record(id))
        }
    }

    fn message(message_id: &str, id: &str, text: &str) -> InboundMessage {
        let payload = json!({ "id": id, "text": text }).to_string();
        InboundMessage::new(message_id, json!({ "Message": payload }).to_string())
    }

    fn consumer(
        classifier: MockClassifier,
    ) -> BatchConsumer<Arc<MockClassifier>, Arc<MockStore>> {
        BatchConsumer::new(
            Arc::new(classifier),
            Arc::new(MockStore::new()),
            ModerationPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_toxic_text_is_detected_and_stored() {
        let classifier =
            MockClassifier::new().script("I hate you", Script::Verdict(0.42, vec!["INSULT"]));
        let consumer = consumer(classifier);

        let report = consumer
            .process_batch(&[message("m-1", "c-1", "I hate you")])
            .await;

        assert!(report.is_clean());
        assert_eq!(report.persisted, 1);
        assert_eq!(
            consumer.store.record("c-1"),
            Some(Content {
                id: "c-1".to_string(),
                text: "I hate you".to_string(),
                status: Some(ModerationStatus::Detected),
                toxic_labels: vec!["INSULT".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_clean_text_is_stored_without_labels() {
        let classifier =
            MockClassifier::new().script("nice weather", Script::Verdict(0.05, vec!["PROFANITY"]));
        let consumer = consumer(classifier);

        consumer
            .process_batch(&[message("m-1", "c-1", "nice weather")])
            .await;

        let stored = consumer.store.record("c-1").unwrap();
        assert_eq!(stored.status, Some(ModerationStatus::None));
        assert!(stored.toxic_labels.is_empty());
        assert_eq!(
            serde_json::to_value(&stored).unwrap(),
            json!({ "id": "c-1", "text": "nice weather", "status": "none" })
        );
    }

    #[tokio::test]
    async fn test_classifier_failure_still_persists_for_review() {
        let classifier = MockClassifier::new().script("who knows", Script::Fail);
        let consumer = consumer(classifier);

        let report = consumer
            .process_batch(&[message("m-1", "c-1", "who knows")])
            .await;

        assert!(report.is_clean());
        assert_eq!(report.degraded, 1);
        let stored = consumer.store.record("c-1").unwrap();
        assert_eq!(stored.status, Some(ModerationStatus::ReviewRequired));
        assert!(stored.toxic_labels.is_empty());
    }

    #[tokio::test]
    async fn test_failure_policy_none_marks_unclassified_content_clean() {
        let consumer = BatchConsumer::new(
            Arc::new(MockClassifier::new().script("who knows", Script::Fail)),
            Arc::new(MockStore::new()),
            ModerationPolicy {
                on_classification_failure: FailurePolicy::None,
                ..Default::default()
            },
        );

        consumer
            .process_batch(&[message("m-1", "c-1", "who knows")])
            .await;

        assert_eq!(
            consumer.store.record("c-1").unwrap().status,
            Some(ModerationStatus::None)
        );
    }

    #[tokio::test]
    async fn test_slow_classifier_times_out_to_review() {
        let classifier = MockClassifier::new().script("slow", Script::Hang);
        let consumer = consumer(classifier).with_io_timeout(Duration::from_millis(50));

        let report = consumer.process_batch(&[message("m-1", "c-1", "slow")]).await;

        assert_eq!(report.persisted, 1);
        assert_eq!(report.degraded, 1);
        assert_eq!(
            consumer.store.record("c-1").unwrap().status,
            Some(ModerationStatus::ReviewRequired)
        );
    }

    #[tokio::test]
    async fn test_invalid_messages_never_reach_classifier_or_store() {
        let consumer = consumer(MockClassifier::new());

        let report = consumer
            .process_batch(&[
                message("m-1", "", "text without id"),
                message("m-2", "c-2", ""),
                message("m-3", "c-3", "fine"),
            ])
            .await;

        assert_eq!(report.received, 3);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .iter()
            .all(|f| matches!(f.error, ModerationError::Decode(DecodeError::Validation(_)))));
        assert_eq!(consumer.classifier.calls(), 1);
        assert_eq!(consumer.store.puts(), 1);
        assert!(consumer.store.record("c-3").is_some());
    }

    #[tokio::test]
    async fn test_one_undecodable_message_does_not_block_the_rest() {
        let consumer = consumer(MockClassifier::new());
        let mut batch: Vec<InboundMessage> = (0..4)
            .map(|i| message(&format!("m-{i}"), &format!("c-{i}"), "hello"))
            .collect();
        batch.insert(2, InboundMessage::new("m-bad", "{not an envelope"));

        let report = consumer.process_batch(&batch).await;

        assert_eq!(report.received, 5);
        assert_eq!(report.persisted, 4);
        assert_eq!(consumer.store.puts(), 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].message_id, "m-bad");
        assert!(matches!(
            report.failures[0].error,
            ModerationError::Decode(DecodeError::Envelope(_))
        ));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported_per_message() {
        let store = MockStore::new();
        store.failing_ids.insert("c-1".to_string());
        let consumer = BatchConsumer::new(
            Arc::new(MockClassifier::new()),
            Arc::new(store),
            ModerationPolicy::default(),
        );

        let report = consumer
            .process_batch(&[message("m-1", "c-1", "a"), message("m-2", "c-2", "b")])
            .await;

        assert_eq!(report.persisted, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0].error,
            ModerationError::Persistence { id, .. } if id == "c-1"
        ));
        assert!(consumer.store.record("c-2").is_some());
    }

    #[tokio::test]
    async fn test_only_store_failures_are_marked_for_retry() {
        let store = MockStore::new();
        store.failing_ids.insert("c-1".to_string());
        let consumer = BatchConsumer::new(
            Arc::new(MockClassifier::new()),
            Arc::new(store),
            ModerationPolicy::default(),
        );

        let report = consumer
            .process_batch(&[
                message("m-1", "c-1", "a"),
                message("m-2", "c-2", "b"),
                InboundMessage::new("m-bad", "{not an envelope"),
            ])
            .await;

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.retry_ids(), HashSet::from(["m-1"]));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let consumer = consumer(MockClassifier::new());

        let report = consumer.process_batch(&[]).await;

        assert_eq!(report.received, 0);
        assert!(report.is_clean());
        assert_eq!(consumer.classifier.calls(), 0);
        assert_eq!(consumer.store.puts(), 0);
    }

    #[tokio::test]
    async fn test_messages_are_processed_concurrently() {
        // Every classify call parks on the barrier, so the batch only finishes
        // if all three calls are in flight at once.
        let mut classifier = MockClassifier::new();
        classifier.barrier = Some(Arc::new(Barrier::new(3)));
        let consumer = consumer(classifier);
        let batch = [
            message("m-1", "c-1", "one"),
            message("m-2", "c-2", "two"),
            message("m-3", "c-3", "three"),
        ];

        let report = tokio::time::timeout(Duration::from_secs(5), consumer.process_batch(&batch))
            .await
            .expect("batch deadlocked, messages were not processed concurrently");

        assert_eq!(report.persisted, 3);
    }

    #[tokio::test]
    async fn test_redelivered_message_upserts_same_record() {
        let classifier =
            MockClassifier::new().script("I hate you", Script::Verdict(0.42, vec!["INSULT"]));
        let consumer = consumer(classifier);
        let msg = message("m-1", "c-1", "I hate you");

        consumer.process_batch(&[msg.clone()]).await;
        let first = consumer.store.record("c-1");
        consumer.process_batch(&[msg]).await;

        assert_eq!(consumer.store.records.len(), 1);
        assert_eq!(consumer.store.record("c-1"), first);
    }
}
