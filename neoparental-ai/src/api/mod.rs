//! HTTP API handlers for neoparental-ai
//!
//! Thin transport layer: handlers unpack requests, hand them to the
//! [`PredictionService`](crate::prediction::PredictionService) and map its
//! error kinds to status codes via [`ApiError`](crate::ApiError).

pub mod health;
pub mod predict;

pub use health::health_routes;
pub use predict::predict_routes;
