//! neoparental-ai - Infant cry prediction service
//!
//! Loads the exported model once at startup and serves:
//! - `GET /`, `GET /health`: service and model status
//! - `POST /predict`: multipart upload (field `file`) → prediction report
//!
//! A missing or broken model does not stop the service; it starts degraded
//! and `/predict` answers 503 until restarted with a valid artifact.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use neoparental_ai::audio::AudioDecoder;
use neoparental_ai::features::{FeatureExtractor, FeatureLayout};
use neoparental_ai::model::load_model;
use neoparental_ai::prediction::PredictionService;
use neoparental_ai::AppState;
use neoparental_common::ServiceConfig;

/// Command-line arguments for neoparental-ai
#[derive(Parser, Debug)]
#[command(name = "neoparental-ai")]
#[command(about = "Infant cry prediction service")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "NEOPARENTAL_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "NEOPARENTAL_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "NEOPARENTAL_PORT")]
    port: Option<u16>,

    /// Exported model artifact
    #[arg(short, long, env = "NEOPARENTAL_MODEL_PATH")]
    model: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(model) = args.model {
        config.model.path = model;
    }

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("neoparental_ai={0},tower_http={0}", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting neoparental-ai v{}", env!("CARGO_PKG_VERSION"));

    let layout: FeatureLayout = config
        .model
        .feature_layout
        .parse()
        .context("Invalid model.feature_layout")?;
    info!(layout = %layout, features = layout.len(), "Feature layout");

    let context = Arc::new(load_model(&config.model.path, layout));
    if !context.is_loaded() {
        error!("No model available, /predict will answer 503");
    }

    let service = PredictionService::new(
        context,
        AudioDecoder::new(config.audio.max_duration_secs),
        FeatureExtractor::new(layout),
        config.audio.max_upload_bytes,
    );
    let app = neoparental_ai::build_router(AppState::new(service));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
