// SQLite-backed content store.
//
// One row per content id. The table name comes from configuration and is
// validated as a plain identifier before it gets here.
//
// Columns:
// - id: content id (primary key)
// - text: submitted text
// - status: moderation status, NULL until moderated
// - toxic_labels: JSON array of labels, NULL when there are none

use crate::core::moderation::{Content, ContentStore, ModerationStatus, StoreError};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteContentStore {
    pool: Pool<Sqlite>,
    table: String,
}

impl SqliteContentStore {
    pub fn new(pool: Pool<Sqlite>, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// Create the content table if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                status TEXT,
                toxic_labels TEXT
            );
            "#,
            self.table
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn put(&self, content: &Content) -> Result<(), StoreError> {
        let labels = if content.toxic_labels.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&content.toxic_labels)
                    .map_err(|e| StoreError::Storage(e.to_string()))?,
            )
        };

        let sql = format!(
            r#"
            INSERT INTO "{}" (id, text, status, toxic_labels)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                status = excluded.status,
                toxic_labels = excluded.toxic_labels
            "#,
            self.table
        );
        sqlx::query(&sql)
            .bind(&content.id)
            .bind(&content.text)
            .bind(content.status.map(|s| s.as_str()))
            .bind(labels)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Content>, StoreError> {
        let sql = format!(
            r#"SELECT id, text, status, toxic_labels FROM "{}" WHERE id = ?"#,
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let corrupt = |reason: String| StoreError::Corrupt {
            id: id.to_string(),
            reason,
        };

        let status = row
            .get::<Option<String>, _>("status")
            .map(|s| s.parse::<ModerationStatus>())
            .transpose()
            .map_err(corrupt)?;

        let toxic_labels = match row.get::<Option<String>, _>("toxic_labels") {
            Some(raw) => serde_json::from_str::<Vec<String>>(&raw)
                .map_err(|e| corrupt(format!("bad toxic_labels: {}", e)))?,
            None => Vec::new(),
        };

        Ok(Some(Content {
            id: row.get("id"),
            text: row.get("text"),
            status,
            toxic_labels,
        }))
    }
}
