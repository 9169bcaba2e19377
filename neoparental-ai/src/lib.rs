//! neoparental-ai library interface
//!
//! Infant cry prediction: decode an uploaded clip, extract a fixed-length
//! feature vector and run the model loaded at startup. Exposed as a library
//! so the binary and the integration tests share one router.

pub mod api;
pub mod audio;
pub mod error;
pub mod features;
pub mod model;
pub mod prediction;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::prediction::PredictionService;

/// Transport body limit, above the upload cap so oversize clips reach
/// validation and get a proper `FILE_TOO_LARGE` response
pub const BODY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Prediction pipeline with the startup model context
    pub service: Arc<PredictionService>,
}

impl AppState {
    pub fn new(service: PredictionService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    // Keep headroom for multipart framing over a raised upload cap
    let body_limit = BODY_LIMIT_BYTES.max(state.service.max_upload_bytes() + 1024 * 1024);

    Router::new()
        .merge(api::health_routes())
        .merge(api::predict_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
