//! Capture Route

use axum::{extract::State, http::header, response::IntoResponse};
use camera_capture::FrameSource;
use std::sync::Arc;

use crate::{ApiError, AppState};

/// Capture one frame, classify it, and answer with the JPEG.
///
/// The pipeline is synchronous and serialized, so it runs on the blocking pool.
pub async fn capture<S: FrameSource + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = tokio::task::spawn_blocking(move || state.pipeline.capture()).await??;

    let content_type = outcome.image.format().content_type();
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, "inline; filename=capture.jpg"),
        ],
        outcome.image.into_bytes(),
    ))
}
