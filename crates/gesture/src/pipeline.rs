//! Capture request orchestration

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use camera_capture::{Frame, FrameSource};
use inference_engine::{DType, EngineState, ImageGeometry, InferenceEngine, InferenceError, Layout, TensorView};
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::decoder::{check_output, ClassIndex, ResultDecoder};
use crate::encode::ImageEncoder;
use crate::preprocess::resample_frame;
use crate::PipelineError;

/// Result of one capture request
#[derive(Debug)]
pub struct CaptureOutcome {
    /// JPEG re-encoding of the captured frame
    pub image: Frame,
    /// Gesture detected by this request; `None` when inference failed
    pub gesture: Option<ClassIndex>,
}

/// Snapshot of the pipeline for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub engine_state: EngineState,
    pub arena_used_bytes: usize,
    pub arena_capacity: usize,
    pub last_gesture: &'static str,
    pub jpeg_quality: u8,
}

/// Engine plus the last decoded class. Only ever touched under one lock.
struct InferenceState<'m> {
    engine: InferenceEngine<'m>,
    decoder: ResultDecoder,
}

impl InferenceState<'_> {
    /// Resample into the input tensor, invoke, and decode.
    ///
    /// A failed invoke is logged and yields `Ok(None)`: the request still
    /// returns its image, only the label stays stale.
    fn infer(&mut self, frame: &Frame) -> Result<Option<ClassIndex>, PipelineError> {
        if !self.engine.is_ready() {
            error!("Model not ready (engine {})", self.engine.state().as_str());
            return Err(PipelineError::ModelNotReady(self.engine.state()));
        }

        // the engine is ready, so an accessor can only fail on state
        let state = self.engine.state();
        let not_ready = move |_: InferenceError| PipelineError::ModelNotReady(state);

        let layout = self.engine.input_layout().map_err(not_ready)?;
        let geometry = input_geometry(&self.engine.input().map_err(not_ready)?, layout)?;
        check_output(&self.engine.output().map_err(not_ready)?)?;

        let input = self
            .engine
            .input_mut()
            .map_err(not_ready)?
            .into_f32_mut()
            .map_err(|e| PipelineError::ShapeMismatch(e.to_string()))?;
        resample_frame(frame, input, geometry.width, geometry.height)?;

        let start = Instant::now();
        if let Err(e) = self.engine.invoke() {
            let err = PipelineError::InferenceFailed(e);
            warn!("{}, keeping previous gesture", err);
            counter!("gesture_inference_failures_total").increment(1);
            return Ok(None);
        }
        histogram!("gesture_inference_duration_seconds").record(start.elapsed().as_secs_f64());

        let class = self.decoder.decode(&self.engine.output().map_err(not_ready)?)?;
        Ok(Some(class))
    }
}

/// Input must be a float32, batch-1, single-channel image under `layout`
fn input_geometry(input: &TensorView<'_>, layout: Layout) -> Result<ImageGeometry, PipelineError> {
    if input.dtype() != DType::F32 {
        return Err(PipelineError::ShapeMismatch(format!(
            "input {} is {:?}, expected F32",
            input.info().name,
            input.dtype()
        )));
    }
    match input.info().image_geometry(layout) {
        Some(geometry) if geometry.channels == 1 => Ok(geometry),
        _ => Err(PipelineError::ShapeMismatch(format!(
            "input {} has shape {:?}, expected a single-channel {:?} image",
            input.info().name,
            input.shape(),
            layout
        ))),
    }
}

/// Serializes capture requests over one frame source and one engine
pub struct GesturePipeline<'m, S: FrameSource> {
    source: S,
    encoder: ImageEncoder,
    state: Mutex<InferenceState<'m>>,
}

impl<'m, S: FrameSource> GesturePipeline<'m, S> {
    /// Create a pipeline and initialize the engine over `model`.
    ///
    /// A model that fails to initialize is logged and leaves the engine
    /// `Failed`; the pipeline keeps serving and reports `ModelNotReady`.
    pub fn new(source: S, model: &'m [u8], encoder: ImageEncoder) -> Self {
        let mut engine = InferenceEngine::new(model);
        if let Err(e) = engine.init() {
            error!("Model init failed: {}", e);
        }
        Self::from_engine(source, engine, encoder)
    }

    /// Wrap an engine in whatever state it is in
    pub fn from_engine(source: S, engine: InferenceEngine<'m>, encoder: ImageEncoder) -> Self {
        info!(
            "Creating gesture pipeline (engine {}, JPEG quality {})",
            engine.state().as_str(),
            encoder.quality()
        );
        Self {
            source,
            encoder,
            state: Mutex::new(InferenceState {
                engine,
                decoder: ResultDecoder::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InferenceState<'m>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run one capture request: acquire, infer, encode, release.
    ///
    /// The frame is released exactly once on every path.
    pub fn capture(&self) -> Result<CaptureOutcome, PipelineError> {
        counter!("gesture_capture_requests_total").increment(1);
        let result = self.run_capture();
        if let Err(e) = &result {
            counter!("gesture_capture_failures_total", "reason" => e.reason()).increment(1);
        }
        result
    }

    fn run_capture(&self) -> Result<CaptureOutcome, PipelineError> {
        // one request at a time from acquisition to decode
        let mut state = self.lock();
        let frame = self.source.capture().map_err(|e| {
            warn!("Frame acquisition failed: {}", e);
            PipelineError::NoFrame(e)
        })?;

        let gesture = state.infer(&frame)?;
        drop(state);

        let image = self.encoder.encode(&frame).map_err(|e| {
            error!("Failed to convert frame to JPEG: {}", e);
            PipelineError::from(e)
        })?;
        frame.release();

        info!("Handled capture request ({} byte JPEG)", image.len());
        Ok(CaptureOutcome { image, gesture })
    }

    /// Label of the last detected gesture, or `none` before the first one
    pub fn gesture_name(&self) -> Result<&'static str, PipelineError> {
        let state = self.lock();
        if !state.engine.is_ready() {
            error!("Gesture requested but model not ready");
            return Err(PipelineError::ModelNotReady(state.engine.state()));
        }
        Ok(state.decoder.last_label())
    }

    /// Run `f` against the engine while holding the pipeline lock
    pub fn inspect_engine<R>(&self, f: impl FnOnce(&InferenceEngine<'m>) -> R) -> R {
        f(&self.lock().engine)
    }

    pub fn status(&self) -> PipelineStatus {
        let state = self.lock();
        PipelineStatus {
            engine_state: state.engine.state(),
            arena_used_bytes: state.engine.arena_used_bytes(),
            arena_capacity: state.engine.arena_capacity(),
            last_gesture: state.decoder.last_label(),
            jpeg_quality: self.encoder.quality(),
        }
    }
}
