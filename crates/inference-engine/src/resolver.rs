//! Operator resolver
//!
//! Maps operator codes to kernel implementations. Only registered operators
//! can run; a model using anything else fails at `init()`.

use tracing::debug;

use crate::model::OpCode;
use crate::ops::{conv, elementwise, fully_connected, opcode_name, pool, shape, PrepareFn};
use crate::InferenceError;

/// Number of operators linked for the gesture model
pub const GESTURE_OP_COUNT: usize = 9;

#[derive(Clone, Copy)]
struct Registration {
    opcode: OpCode,
    prepare: PrepareFn,
}

/// Fixed-capacity opcode table holding at most `N` registrations
pub struct OpResolver<const N: usize> {
    registrations: [Option<Registration>; N],
    len: usize,
}

impl<const N: usize> Default for OpResolver<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> OpResolver<N> {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self {
            registrations: [None; N],
            len: 0,
        }
    }

    fn add(&mut self, opcode: OpCode, prepare: PrepareFn) -> Result<&mut Self, InferenceError> {
        if self.find(opcode).is_some() {
            return Ok(self);
        }
        let slot = self
            .registrations
            .get_mut(self.len)
            .ok_or(InferenceError::ResolverFull { capacity: N })?;
        *slot = Some(Registration { opcode, prepare });
        self.len += 1;
        debug!("Registered operator {}", opcode_name(opcode));
        Ok(self)
    }

    pub fn add_conv_2d(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::Conv2D, conv::prepare_conv)
    }

    pub fn add_depthwise_conv_2d(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::DepthwiseConv2D, conv::prepare_depthwise)
    }

    pub fn add_relu(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::Relu, elementwise::prepare_relu)
    }

    pub fn add_max_pool_2d(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::MaxPool2D, pool::prepare_max_pool)
    }

    pub fn add_reshape(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::Reshape, shape::prepare_reshape)
    }

    pub fn add_fully_connected(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::FullyConnected, fully_connected::prepare_fully_connected)
    }

    pub fn add_transpose(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::Transpose, shape::prepare_transpose)
    }

    pub fn add_quantize(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::Quantize, elementwise::prepare_quantize)
    }

    pub fn add_dequantize(&mut self) -> Result<&mut Self, InferenceError> {
        self.add(OpCode::Dequantize, elementwise::prepare_dequantize)
    }

    /// Number of registered operators
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, opcode: OpCode) -> bool {
        self.find(opcode).is_some()
    }

    pub(crate) fn find(&self, opcode: OpCode) -> Option<PrepareFn> {
        self.registrations[..self.len]
            .iter()
            .flatten()
            .find(|r| r.opcode == opcode)
            .map(|r| r.prepare)
    }
}

impl OpResolver<GESTURE_OP_COUNT> {
    /// Resolver with exactly the operators the gesture model uses
    pub fn gesture() -> Result<Self, InferenceError> {
        let mut resolver = Self::new();
        resolver
            .add_conv_2d()?
            .add_depthwise_conv_2d()?
            .add_relu()?
            .add_max_pool_2d()?
            .add_reshape()?
            .add_fully_connected()?
            .add_transpose()?
            .add_quantize()?
            .add_dequantize()?;
        Ok(resolver)
    }
}
