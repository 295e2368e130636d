//! Gesture Camera API Server
//!
//! HTTP surface over the gesture pipeline:
//! - `GET /capture`: capture, classify, and return the frame as JPEG
//! - `GET /gesture_name`: label of the last detected gesture
//! - `GET /health`: engine state and arena usage
//! - `GET /metrics`: Prometheus exposition

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use camera_capture::{open_device_camera, DeviceCamera, FrameSource};
use gesture::{GesturePipeline, ImageEncoder, PipelineError};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tokio::task::JoinError;
use tower_http::trace::TraceLayer;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

pub mod config;
mod routes;

pub use config::ServiceConfig;

/// Application state shared across handlers
pub struct AppState<S: FrameSource = DeviceCamera> {
    /// Capture pipeline over the device camera and the loaded model
    pub pipeline: GesturePipeline<'static, S>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Prometheus handle, when the recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl<S: FrameSource> AppState<S> {
    pub fn new(pipeline: GesturePipeline<'static, S>) -> Self {
        Self {
            pipeline,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Handler error; always answered with a bare 500
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Request task failed: {0}")]
    Task(#[from] JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Create the application router
pub fn create_router<S: FrameSource + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/capture", get(routes::capture::capture::<S>))
        .route("/gesture_name", get(routes::gesture::gesture_name::<S>))
        .route("/health", get(routes::health::health::<S>))
        .route("/metrics", get(routes::metrics::metrics::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Install the global Prometheus recorder and keep its histograms trimmed
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let upkeep = handle.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            upkeep.run_upkeep();
        }
    });

    Ok(handle)
}

/// Read the model blob once and keep it for the life of the process.
///
/// A missing or unreadable file yields an empty blob: the engine then fails
/// to initialize and every request is answered with 500.
pub fn load_model(path: &str) -> &'static [u8] {
    match std::fs::read(path) {
        Ok(bytes) => {
            info!("Loaded model {} ({} bytes)", path, bytes.len());
            Box::leak(bytes.into_boxed_slice())
        }
        Err(e) => {
            error!("Failed to read model {}: {}", path, e);
            &[]
        }
    }
}

/// Run the server
pub async fn run_server(config: ServiceConfig) -> anyhow::Result<()> {
    let camera = open_device_camera().context("Failed to open camera")?;
    let model = load_model(&config.model_path);
    let pipeline = GesturePipeline::new(camera, model, ImageEncoder::new(config.jpeg_quality));

    let metrics = init_metrics().context("Failed to install metrics recorder")?;
    let state = Arc::new(AppState::new(pipeline).with_metrics(metrics));
    let app = create_router(state);

    info!("Starting API server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
