//! Gesture Recognition Pipeline
//!
//! Per-request orchestration of the on-device classifier:
//! - Resampling camera frames into the model's input tensor
//! - Arg-max decoding of the output logits into a gesture label
//! - JPEG re-encoding of the captured frame for transport
//! - `GesturePipeline`, which serializes access to the engine and
//!   guarantees every acquired frame is released exactly once

pub mod decoder;
pub mod encode;
pub mod labels;
pub mod pipeline;
pub mod preprocess;

pub use decoder::{argmax, ClassIndex, ResultDecoder};
pub use encode::{EncodeError, ImageEncoder, DEFAULT_JPEG_QUALITY};
pub use labels::{label, GESTURES, GESTURE_COUNT, NO_GESTURE};
pub use pipeline::{CaptureOutcome, GesturePipeline, PipelineStatus};
pub use preprocess::{resample_frame, resample_normalize, PreprocessError};

use camera_capture::CameraError;
use inference_engine::{EngineState, InferenceError};
use thiserror::Error;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No frame available: {0}")]
    NoFrame(#[source] CameraError),

    #[error("Model not ready (engine {})", .0.as_str())]
    ModelNotReady(EngineState),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    /// Logged and counted only: the request still returns its image
    #[error("Inference failed: {0}")]
    InferenceFailed(#[source] InferenceError),

    #[error("Encode failed: {0}")]
    EncodeFailed(#[from] EncodeError),
}

impl PipelineError {
    /// Short label for metrics and logs
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::NoFrame(_) => "no_frame",
            PipelineError::ModelNotReady(_) => "model_not_ready",
            PipelineError::ShapeMismatch(_) => "shape_mismatch",
            PipelineError::Preprocess(_) => "preprocess",
            PipelineError::InferenceFailed(_) => "inference_failed",
            PipelineError::EncodeFailed(_) => "encode_failed",
        }
    }
}
