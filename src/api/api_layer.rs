// HTTP ingress - accepts text for moderation and serves moderation results.
// Handlers only translate between HTTP and the core ingest service.

#[path = "routes/mod.rs"]
pub mod routes;

use crate::core::ingest::{IngestService, MessagePublisher};
use crate::core::moderation::ContentStore;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub type SharedIngestService =
    Arc<IngestService<Arc<dyn MessagePublisher>, Arc<dyn ContentStore>>>;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub ingest: SharedIngestService,
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::content::router())
        .with_state(state)
}
