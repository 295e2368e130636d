//! HTTP scenarios over the mock camera

use std::sync::Arc;

use api::{create_router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use camera_capture::MockCamera;
use gesture::{GesturePipeline, ImageEncoder};
use inference_engine::builder::fixed_logits_model;
use inference_engine::InferenceEngine;
use tower::ServiceExt;

fn leaked_model(logits: &[f32]) -> &'static [u8] {
    let model = fixed_logits_model(32, 32, logits).unwrap();
    Box::leak(model.into_boxed_slice())
}

fn ready_state() -> Arc<AppState<MockCamera>> {
    let mut logits = vec![0.0; 14];
    logits[..3].copy_from_slice(&[0.1, 0.9, 0.3]);
    let pipeline = GesturePipeline::new(MockCamera::mid_gray(), leaked_model(&logits), ImageEncoder::default());
    Arc::new(AppState::new(pipeline))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

#[tokio::test]
async fn test_capture_then_gesture_name() {
    let state = ready_state();
    let app = create_router(state.clone());

    let (status, _, body) = get(&app, "/gesture_name").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"none");

    let (status, content_type, body) = get(&app, "/capture").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(&body[..2], &[0xFF, 0xD8]);

    let (status, content_type, body) = get(&app, "/gesture_name").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    assert_eq!(body, b"1 finger");

    assert_eq!(state.pipeline.source().acquired_count(), 1);
    assert_eq!(state.pipeline.source().outstanding(), 0);
}

#[tokio::test]
async fn test_capture_without_frame_is_500() {
    let state = ready_state();
    state.pipeline.source().set_available(false);
    let app = create_router(state.clone());

    let (status, _, body) = get(&app, "/capture").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
    assert_eq!(state.pipeline.source().acquired_count(), 0);

    // still serving after the failure
    state.pipeline.source().set_available(true);
    let (status, _, _) = get(&app, "/capture").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_uninitialized_engine_is_500() {
    let engine = InferenceEngine::new(leaked_model(&[0.0; 14]));
    let pipeline = GesturePipeline::from_engine(MockCamera::mid_gray(), engine, ImageEncoder::default());
    let state = Arc::new(AppState::new(pipeline));
    let app = create_router(state.clone());

    let (status, _, _) = get(&app, "/gesture_name").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _, _) = get(&app, "/capture").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(state.pipeline.source().acquired_count(), 1);
    assert_eq!(state.pipeline.source().released_count(), 1);
}

#[tokio::test]
async fn test_health_reports_engine() {
    let app = create_router(ready_state());
    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["pipeline"]["engine_state"], "ready");
    assert_eq!(health["pipeline"]["last_gesture"], "none");
    assert_eq!(health["pipeline"]["jpeg_quality"], 80);
    assert!(health["pipeline"]["arena_used_bytes"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_missing_model_degrades() {
    let pipeline = GesturePipeline::new(MockCamera::mid_gray(), &[], ImageEncoder::default());
    let state = Arc::new(AppState::new(pipeline));
    let app = create_router(state);

    let (_, _, body) = get(&app, "/health").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["pipeline"]["engine_state"], "failed");

    let (status, _, _) = get(&app, "/capture").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let app = create_router(ready_state());
    let (status, _, _) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_router(ready_state());
    let (status, _, _) = get(&app, "/stream").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
