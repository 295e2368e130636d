//! Metrics Route

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use camera_capture::FrameSource;
use std::sync::Arc;

use crate::AppState;

/// Prometheus text exposition
pub async fn metrics<S: FrameSource + 'static>(State(state): State<Arc<AppState<S>>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
