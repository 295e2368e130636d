//! Gesture Name Route

use axum::extract::State;
use camera_capture::FrameSource;
use std::sync::Arc;

use crate::{ApiError, AppState};

/// Last detected gesture as plain text
pub async fn gesture_name<S: FrameSource + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<&'static str, ApiError> {
    // waits behind an in-flight capture
    let name = tokio::task::spawn_blocking(move || state.pipeline.gesture_name()).await??;
    Ok(name)
}
