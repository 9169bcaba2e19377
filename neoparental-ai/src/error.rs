//! Error types for neoparental-ai
//!
//! The prediction pipeline reports one of five error kinds
//! ([`PredictError`]). The HTTP layer maps each kind to a status code in
//! [`ApiError`]; the pipeline itself knows nothing about HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Decode or transform failure while turning audio into features
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Clip decoded to zero samples (or was empty to begin with)
    #[error("audio contains no samples")]
    EmptyAudio,

    /// Waveform too short for the framed analysis
    #[error("waveform of {samples} samples yields no analysis frames")]
    NoFrames { samples: usize },

    /// Waveform is not at the rate the analysis constants assume
    #[error("expected {expected} Hz audio, got {actual} Hz")]
    SampleRate { expected: u32, actual: u32 },

    /// Container probe, track lookup or packet decode failed
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// Sample rate conversion failed
    #[error("failed to resample audio: {0}")]
    Resample(String),

    /// Assembled vector does not have the layout's length
    #[error("'{layout}' layout needs {expected} values, got {actual}")]
    Length {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A feature family produced NaN or infinity
    #[error("{family} features contain non-finite values")]
    NonFinite { family: &'static str },
}

/// Unrecognised `model.feature_layout` value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feature layout '{0}' (expected standard, with_mfcc_std or compact)")]
pub struct UnknownLayout(pub String);

/// Model inference failure
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Feature vector width differs from the model input width
    #[error("model expects {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    /// Classifier returned an unusable probability distribution
    #[error("invalid probability distribution: {0}")]
    InvalidDistribution(String),

    /// Regressor returned NaN or infinity
    #[error("model produced a non-finite prediction")]
    NonFinite,

    /// Any other failure, message preserved for diagnostics
    #[error("{0}")]
    Failed(String),
}

/// Model artifact could not be loaded at startup
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// No file at the configured path
    #[error("Model file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// File exists but could not be read
    #[error("Failed to read model file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not a valid artifact document
    #[error("Failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    /// Artifact parsed but is internally inconsistent
    #[error("Invalid model artifact: {0}")]
    Invalid(String),

    /// Artifact input width does not match the configured feature layout
    #[error("Model expects {artifact} features but the '{layout}' layout produces {expected}")]
    LayoutMismatch {
        layout: &'static str,
        expected: usize,
        artifact: usize,
    },
}

/// Prediction pipeline error kinds
#[derive(Debug, Error)]
pub enum PredictError {
    /// Declared filename has a disallowed extension
    #[error("Invalid audio format '{filename}'. Allowed: wav, mp3, m4a, flac, ogg, aac")]
    InvalidFormat { filename: String },

    /// Clip exceeds the upload size cap
    #[error("File exceeds {limit} byte limit ({size} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    /// Decode or feature transform failed
    #[error("Feature extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// No model was loaded at startup
    #[error("Model not loaded")]
    ModelUnavailable,

    /// Underlying model call failed
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Pipeline error kind
    #[error(transparent)]
    Predict(#[from] PredictError),

    /// Malformed request (400) - e.g., missing multipart field
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Status code and machine-readable error code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Predict(err) => match err {
                PredictError::InvalidFormat { .. } => (StatusCode::BAD_REQUEST, "INVALID_FORMAT"),
                PredictError::FileTooLarge { .. } => (StatusCode::BAD_REQUEST, "FILE_TOO_LARGE"),
                PredictError::Extraction(_) => (StatusCode::BAD_REQUEST, "EXTRACTION_ERROR"),
                PredictError::ModelUnavailable => {
                    (StatusCode::SERVICE_UNAVAILABLE, "MODEL_UNAVAILABLE")
                }
                PredictError::Inference(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INFERENCE_ERROR")
                }
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code = error_code, "Prediction error: {}", self);
        } else {
            tracing::warn!(code = error_code, "Rejected request: {}", self);
        }

        let body = Json(json!({
            "error": error_code,
            "detail": self.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
