//! Fixed-Arena Inference Engine
//!
//! Runs small quantized classification networks inside a single tensor
//! arena that is allocated once at `init()` and never resized. Models are
//! read from a borrowed blob; weights stay in the blob and are never copied.

mod arena;
mod engine;
mod error;
mod interpreter;
pub mod model;
mod ops;
mod planner;
mod resolver;
mod tensor;

#[cfg(feature = "builder")]
pub mod builder;

pub use arena::ARENA_ALIGNMENT;
pub use engine::{EngineState, InferenceEngine};
pub use error::InferenceError;
pub use model::{ModelDef, OpCode};
pub use planner::{plan, MemoryPlan, Placement};
pub use resolver::{OpResolver, GESTURE_OP_COUNT};
pub use tensor::{DType, ImageGeometry, Layout, QuantParams, TensorInfo, TensorView, TensorViewMut};

/// Default tensor arena size in bytes
pub const TENSOR_ARENA_SIZE: usize = 37 * 1024;
