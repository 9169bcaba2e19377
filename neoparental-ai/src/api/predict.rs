//! Prediction endpoint
//!
//! `POST /predict` takes a multipart form with the clip in field `file`.
//! The CPU-bound pipeline runs on the blocking thread pool.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use std::time::Instant;
use tracing::{debug, error};

use crate::audio::AudioClip;
use crate::error::{ApiError, ApiResult, InferenceError, PredictError};
use crate::prediction::PredictionReport;
use crate::AppState;

/// Multipart field carrying the clip
pub const FILE_FIELD: &str = "file";

/// POST /predict
pub async fn predict_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<PredictionReport>> {
    let started = Instant::now();

    // Fail fast without reading the body
    if !state.service.context().is_loaded() {
        return Err(PredictError::ModelUnavailable.into());
    }

    let clip = read_clip(multipart).await?;
    debug!(filename = %clip.filename(), bytes = clip.len(), "Received clip");

    let service = state.service.clone();
    let report = tokio::task::spawn_blocking(move || service.predict_clip(clip, started))
        .await
        .map_err(|e| {
            error!("Prediction task failed: {}", e);
            PredictError::Inference(InferenceError::Failed(e.to_string()))
        })??;

    Ok(Json(report))
}

/// Pull the `file` field out of the form
async fn read_clip(mut multipart: Multipart) -> ApiResult<AudioClip> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        return Ok(AudioClip::new(bytes.to_vec(), filename));
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{}'",
        FILE_FIELD
    )))
}

/// Build prediction routes
pub fn predict_routes() -> Router<AppState> {
    Router::new().route("/predict", post(predict_audio))
}
