//! Health check endpoints
//!
//! Reports whether a model was loaded at startup and the loader metadata.
//! A service without a model still answers here with `model_loaded: false`.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::model::{ModelKind, ModelMetadata};
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "online" while the process answers
    pub status: String,
    pub model_loaded: bool,
    /// "classifier" or "regressor", null without a model
    pub model_type: Option<ModelKind>,
    pub model_metadata: ModelMetadata,
    pub timestamp: String,
}

/// GET / and GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let context = state.service.context();

    Json(HealthResponse {
        status: "online".to_string(),
        model_loaded: context.is_loaded(),
        model_type: context.model_type(),
        model_metadata: context.metadata().clone(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
}
