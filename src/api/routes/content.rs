//! Content submission and lookup endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::AppState;
use crate::core::ingest::IngestError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/content", post(submit_content))
        .route("/content/:id", get(get_content))
}

#[derive(Debug, Deserialize)]
pub struct SubmitContentRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitContentResponse {
    pub id: String,
    pub message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Accept a text for moderation. Moderation itself happens asynchronously.
pub async fn submit_content(
    State(state): State<AppState>,
    payload: Result<Json<SubmitContentRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::error!(error = %rejection.body_text(), "Failed to bind body json");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match state.ingest.submit(request.text).await {
        Ok(receipt) => Json(SubmitContentResponse {
            id: receipt.id,
            message: "Message processing...".to_string(),
        })
        .into_response(),
        Err(IngestError::EmptyText) => {
            tracing::error!("Text is empty");
            error_response(StatusCode::BAD_REQUEST, IngestError::EmptyText.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to publish the text");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process text")
        }
    }
}

/// Fetch a content record, moderated or not.
pub async fn get_content(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.ingest.get(&id).await {
        Ok(Some(content)) => Json(content).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("Content with id {} not found.", id) })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(id = %id, error = %e, "Failed to get content");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get content.")
        }
    }
}
