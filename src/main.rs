// This is the entry point of the content moderation service.
//
// **Architecture Overview:**
// - `core/` = Business logic (moderation pipeline, ingest), no I/O details
// - `infra/` = Implementations of core traits (SQLite, classifier API, queue, config)
// - `api/` = HTTP adapter (routes)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the background batch consumer
// 4. Serve the ingress API

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with a handful of mod.rs files that all look the same.
#[path = "api/api_layer.rs"]
mod api;
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::api::AppState;
use crate::core::ingest::{IngestService, MessagePublisher};
use crate::core::moderation::{BatchConsumer, ContentStore, ToxicityClassifier};
use crate::infra::config::{AppConfig, StoreBackend};
use crate::infra::moderation::{HttpToxicityClassifier, InMemoryContentStore, SqliteContentStore};
use crate::infra::queue::{QueueError, SqliteMessageQueue};
use anyhow::Context;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

/// One receive -> moderate -> acknowledge round.
///
/// Returns how many messages were received, so the caller knows whether to
/// back off. Messages whose record could not be stored are left unacknowledged:
/// their lease runs out and the queue delivers them again. Everything else,
/// including messages that will never decode, is acknowledged.
async fn consume_batch<C, S>(
    queue: &SqliteMessageQueue,
    consumer: &BatchConsumer<C, S>,
    batch_size: usize,
) -> Result<usize, QueueError>
where
    C: ToxicityClassifier,
    S: ContentStore,
{
    let batch = queue.receive_batch(batch_size).await?;
    if batch.is_empty() {
        return Ok(0);
    }
    let received = batch.len();

    let report = consumer.process_batch(&batch).await;
    let retry = report.retry_ids();
    if !report.is_clean() {
        tracing::warn!(
            failed = report.failures.len(),
            retrying = retry.len(),
            received = report.received,
            "Batch finished with failures"
        );
    }

    let ids: Vec<String> = batch
        .into_iter()
        .map(|m| m.message_id)
        .filter(|id| !retry.contains(id.as_str()))
        .collect();
    queue.acknowledge(&ids).await?;

    Ok(received)
}

/// Pull batches off the queue and moderate them until the process exits.
fn spawn_consumer_loop<C, S>(
    queue: Arc<SqliteMessageQueue>,
    consumer: Arc<BatchConsumer<C, S>>,
    batch_size: usize,
    poll_interval: std::time::Duration,
) -> tokio::task::JoinHandle<()>
where
    C: ToxicityClassifier + 'static,
    S: ContentStore + 'static,
{
    tokio::spawn(async move {
        use tokio::time::sleep;

        loop {
            match consume_batch(&queue, &consumer, batch_size).await {
                Ok(0) => sleep(poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Queue round failed: {}", e);
                    sleep(poll_interval).await;
                }
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Missing table or topic is fatal, nothing gets served without them.
    let config = AppConfig::from_env().context("Invalid configuration")?;

    if let Some(dir) = config
        .database_url
        .strip_prefix("sqlite://")
        .and_then(|path| std::path::Path::new(path.split('?').next()?).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir).context("Failed to create data directory")?;
    }

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Every client is built once here and shared by reference.

    let pool = SqlitePoolOptions::new()
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let content_store: Arc<dyn ContentStore> = match config.store_backend {
        StoreBackend::Sqlite => {
            let store = SqliteContentStore::new(pool.clone(), config.table_name.clone());
            store
                .migrate()
                .await
                .context("Failed to migrate content table")?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory content store, records will not survive a restart");
            Arc::new(InMemoryContentStore::new())
        }
    };

    let queue = Arc::new(SqliteMessageQueue::new(
        pool,
        config.topic.clone(),
        config.visibility_timeout,
    ));
    queue
        .migrate()
        .await
        .context("Failed to migrate message queue")?;

    let classifier = HttpToxicityClassifier::new(
        config.classifier_url.clone(),
        config.classifier_api_key.clone(),
        config.io_timeout,
    )
    .context("Failed to create classifier client")?;

    let consumer = Arc::new(
        BatchConsumer::new(classifier, Arc::clone(&content_store), config.policy.clone())
            .with_io_timeout(config.io_timeout),
    );

    let ingest = IngestService::new(
        Arc::clone(&queue) as Arc<dyn MessagePublisher>,
        Arc::clone(&content_store),
    );

    // ========================================================================
    // BACKGROUND CONSUMER
    // ========================================================================

    let consumer_task = spawn_consumer_loop(
        Arc::clone(&queue),
        consumer,
        config.batch_size,
        config.poll_interval,
    );

    // ========================================================================
    // INGRESS API
    // ========================================================================

    let app = api::build_router(AppState {
        ingest: Arc::new(ingest),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %config.bind_addr,
        topic = %config.topic,
        table = %config.table_name,
        threshold = config.policy.toxicity_threshold,
        "Content moderation service is ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await
        .context("Server error")?;

    consumer_task.abort();
    Ok(())
}
