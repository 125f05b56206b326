// SQLite-backed message queue.
//
// Stands in for the notification topic + queue pair between the ingress API
// and the batch consumer. Delivery is at-least-once: received messages are
// leased for a visibility timeout and come back if they are not acknowledged
// before it runs out.
//
// Tables:
// - message_queue: one row per published message, scoped by topic

use crate::core::ingest::{MessagePublisher, PublishError};
use crate::core::moderation::InboundMessage;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub struct SqliteMessageQueue {
    pool: Pool<Sqlite>,
    topic: String,
    visibility_timeout: Duration,
}

impl SqliteMessageQueue {
    pub fn new(pool: Pool<Sqlite>, topic: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            pool,
            topic: topic.into(),
            visibility_timeout,
        }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS message_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL UNIQUE,
                topic TEXT NOT NULL,
                body TEXT NOT NULL,
                receive_count INTEGER NOT NULL DEFAULT 0,
                visible_at INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_message_queue_topic_visible
                ON message_queue(topic, visible_at);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Lease up to `max` visible messages, oldest first.
    pub async fn receive_batch(&self, max: usize) -> Result<Vec<InboundMessage>, QueueError> {
        let now = Utc::now().timestamp_millis();
        let lease_ms = i64::try_from(self.visibility_timeout.as_millis()).unwrap_or(i64::MAX);
        let lease_until = now.saturating_add(lease_ms);

        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT message_id, body
            FROM message_queue
            WHERE topic = ? AND visible_at <= ?
            ORDER BY seq
            LIMIT ?
            "#,
        )
        .bind(&self.topic)
        .bind(now)
        .bind(max as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let message_id: String = row.get("message_id");
            sqlx::query(
                r#"
                UPDATE message_queue
                SET visible_at = ?, receive_count = receive_count + 1
                WHERE message_id = ?
                "#,
            )
            .bind(lease_until)
            .bind(&message_id)
            .execute(&mut *tx)
            .await?;

            messages.push(InboundMessage {
                message_id,
                body: row.get("body"),
            });
        }

        tx.commit().await?;
        Ok(messages)
    }

    /// Remove messages for good once the consumer is done with them.
    pub async fn acknowledge(&self, message_ids: &[String]) -> Result<u64, QueueError> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for message_id in message_ids {
            let result = sqlx::query("DELETE FROM message_queue WHERE message_id = ?")
                .bind(message_id)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }
}

#[async_trait]
impl MessagePublisher for SqliteMessageQueue {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, message_id: &str, body: &str) -> Result<(), PublishError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO message_queue (message_id, topic, body, visible_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(message_id)
        .bind(&self.topic)
        .bind(body)
        .bind(now.timestamp_millis())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(())
    }
}
