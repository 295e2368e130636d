//! Health Route

use axum::{extract::State, Json};
use camera_capture::FrameSource;
use gesture::PipelineStatus;
use inference_engine::EngineState;
use serde::Serialize;
use std::sync::Arc;

use crate::{ApiError, AppState};

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_seconds: u64,
    pub pipeline: PipelineStatus,
}

/// Health check handler
pub async fn health<S: FrameSource + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let version = state.version.clone();
    let uptime_seconds = state.start_time.elapsed().as_secs();
    let pipeline = tokio::task::spawn_blocking(move || state.pipeline.status()).await?;

    let status = match pipeline.engine_state {
        EngineState::Ready | EngineState::Invoking => "healthy",
        _ => "degraded",
    };

    Ok(Json(HealthResponse {
        status,
        version,
        uptime_seconds,
        pipeline,
    }))
}
