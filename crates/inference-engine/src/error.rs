//! Inference Error Types

use thiserror::Error;

use crate::model::OpCode;
use crate::tensor::DType;
use crate::EngineState;

/// Errors raised while loading a model or running it
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Model blob is empty or shorter than its header
    #[error("Model blob truncated: {len} bytes")]
    TruncatedModel { len: usize },

    /// Header magic does not identify a gesture model
    #[error("Model blob has bad magic {found:02X?}")]
    BadMagic { found: [u8; 4] },

    /// Schema version tag mismatch
    #[error("Model schema version {found} not supported (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    /// Payload could not be decoded or encoded
    #[error("Model payload codec error: {0}")]
    Codec(#[from] postcard::Error),

    /// Structurally invalid graph
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Operator not linked into this build
    #[error("Operator {0:?} is not registered")]
    UnsupportedOperator(OpCode),

    /// Resolver already holds its maximum number of kernels
    #[error("Op resolver full: capacity {capacity}")]
    ResolverFull { capacity: usize },

    /// Arena backing storage could not be allocated
    #[error("Arena allocation of {capacity} bytes failed")]
    ArenaAllocation { capacity: usize },

    /// Planned tensors do not fit in the arena
    #[error("Arena exhausted: {required} bytes required, capacity {capacity}")]
    ArenaExhausted { required: usize, capacity: usize },

    /// Tensor shape does not match what the operator or caller expects
    #[error("Shape mismatch for {tensor}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        tensor: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Tensor element type does not match what the operator or caller expects
    #[error("Type mismatch for {tensor}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        tensor: String,
        expected: DType,
        actual: DType,
    },

    /// Tensor memory is not aligned for its element type
    #[error("Tensor {0} is misaligned for its element type")]
    Misaligned(String),

    /// Engine used outside the `Ready` state
    #[error("Engine not ready (state: {0:?})")]
    NotReady(EngineState),

    /// A kernel failed while running
    #[error("Operator {index} ({opcode:?}) failed: {reason}")]
    Kernel {
        index: usize,
        opcode: OpCode,
        reason: &'static str,
    },
}
