//! Operator kernels
//!
//! Every kernel is split in two: `prepare` runs once during `init()` and
//! resolves shapes, quantization multipliers, and constant buffers; `eval`
//! runs on every `invoke()` and touches only arena memory and those
//! prepared values.

pub mod conv;
pub mod elementwise;
pub mod fully_connected;
pub mod pool;
pub mod shape;

use crate::model::{Activation, ConstBuffer, OpCode, OperatorDef, Padding, TensorDef};
use crate::planner::Placement;
use crate::tensor::{DType, TensorInfo};
use crate::InferenceError;

pub use conv::ConvKernel;
pub use elementwise::{DequantizeKernel, QuantizeKernel, ReluKernel};
pub use fully_connected::FullyConnectedKernel;
pub use pool::MaxPoolKernel;
pub use shape::{ReshapeKernel, TransposeKernel};

/// Builds a kernel from an operator declaration
pub type PrepareFn = for<'p, 'm> fn(&OperatorDef, &PrepareContext<'p, 'm>) -> Result<Kernel<'m>, InferenceError>;

/// A prepared operator, ready to run
#[derive(Debug)]
pub enum Kernel<'m> {
    Conv(ConvKernel<'m>),
    FullyConnected(FullyConnectedKernel<'m>),
    MaxPool(MaxPoolKernel),
    Relu(ReluKernel),
    Reshape(ReshapeKernel),
    Transpose(TransposeKernel),
    Quantize(QuantizeKernel),
    Dequantize(DequantizeKernel),
}

impl Kernel<'_> {
    /// Run the kernel over arena memory
    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        match self {
            Kernel::Conv(k) => k.eval(ctx),
            Kernel::FullyConnected(k) => k.eval(ctx),
            Kernel::MaxPool(k) => k.eval(ctx),
            Kernel::Relu(k) => k.eval(ctx),
            Kernel::Reshape(k) => k.eval(ctx),
            Kernel::Transpose(k) => k.eval(ctx),
            Kernel::Quantize(k) => k.eval(ctx),
            Kernel::Dequantize(k) => k.eval(ctx),
        }
    }
}

/// Model view handed to `prepare`
pub struct PrepareContext<'p, 'm> {
    pub tensors: &'p [TensorDef<'m>],
    pub infos: &'p [TensorInfo],
}

impl<'p, 'm> PrepareContext<'p, 'm> {
    pub fn info(&self, id: usize) -> &'p TensorInfo {
        &self.infos[id]
    }

    /// Constant contents of tensor `id`
    pub fn constant(&self, id: usize) -> Result<ConstBuffer<'m>, InferenceError> {
        self.tensors[id].buffer.ok_or_else(|| {
            InferenceError::InvalidModel(format!("tensor {} must be constant", self.infos[id].name))
        })
    }

    /// Tensor `id`, which must live in the arena
    pub fn activation(&self, id: usize) -> Result<usize, InferenceError> {
        if self.tensors[id].is_constant() {
            return Err(InferenceError::InvalidModel(format!(
                "tensor {} must not be constant",
                self.infos[id].name
            )));
        }
        Ok(id)
    }
}

/// Check operator arity and return its input and output ids
pub(crate) fn arity(
    op: &OperatorDef,
    inputs: std::ops::RangeInclusive<usize>,
    outputs: usize,
) -> Result<(Vec<usize>, Vec<usize>), InferenceError> {
    if !inputs.contains(&op.inputs.len()) || op.outputs.len() != outputs {
        return Err(InferenceError::InvalidModel(format!(
            "{:?} expects {:?} inputs and {} outputs, got {} and {}",
            op.opcode,
            inputs,
            outputs,
            op.inputs.len(),
            op.outputs.len()
        )));
    }
    Ok((
        op.inputs.iter().map(|&id| id as usize).collect(),
        op.outputs.iter().map(|&id| id as usize).collect(),
    ))
}

/// Arena memory handed to `eval`
pub struct EvalContext<'a> {
    pub arena: &'a mut [u8],
    pub placements: &'a [Option<Placement>],
}

impl EvalContext<'_> {
    fn range(&self, id: usize) -> Result<std::ops::Range<usize>, &'static str> {
        self.placements
            .get(id)
            .copied()
            .flatten()
            .map(|p| p.range())
            .ok_or("tensor has no arena placement")
    }

    /// Borrow an input region and a disjoint output region
    pub fn io(&mut self, input: usize, output: usize) -> Result<(&[u8], &mut [u8]), &'static str> {
        let input = self.range(input)?;
        let output = self.range(output)?;

        if input.end <= output.start {
            let (lo, hi) = self.arena.split_at_mut(output.start);
            Ok((&lo[input], &mut hi[..output.end - output.start]))
        } else if output.end <= input.start {
            let (lo, hi) = self.arena.split_at_mut(input.start);
            Ok((&hi[..input.end - input.start], &mut lo[output]))
        } else {
            Err("input and output regions overlap")
        }
    }

    pub fn io_f32(&mut self, input: usize, output: usize) -> Result<(&[f32], &mut [f32]), &'static str> {
        let (x, y) = self.io(input, output)?;
        let x = bytemuck::try_cast_slice(x).map_err(|_| "misaligned f32 input")?;
        let y = bytemuck::try_cast_slice_mut(y).map_err(|_| "misaligned f32 output")?;
        Ok((x, y))
    }

    pub fn io_i8(&mut self, input: usize, output: usize) -> Result<(&[i8], &mut [i8]), &'static str> {
        let (x, y) = self.io(input, output)?;
        Ok((bytemuck::cast_slice(x), bytemuck::cast_slice_mut(y)))
    }
}

/// Output extent and leading padding of one spatial axis
pub(crate) fn window(input: usize, filter: usize, stride: usize, padding: Padding) -> Result<(usize, usize), InferenceError> {
    if stride == 0 || filter == 0 {
        return Err(InferenceError::InvalidModel("stride and filter size must be positive".into()));
    }
    if input == 0 {
        return Err(InferenceError::InvalidModel("spatial input extent must be positive".into()));
    }
    match padding {
        Padding::Valid => {
            if filter > input {
                return Err(InferenceError::InvalidModel(format!(
                    "filter {} larger than input {} with valid padding",
                    filter, input
                )));
            }
            Ok(((input - filter) / stride + 1, 0))
        }
        Padding::Same => {
            let out = input.div_ceil(stride);
            let needed = ((out - 1) * stride + filter).saturating_sub(input);
            Ok((out, needed / 2))
        }
    }
}

/// Element types a computing kernel runs in
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Precision {
    Float,
    /// int8 activations and weights, int32 bias
    Int8(QuantizedParams),
}

/// Zero points and requantization multiplier of an int8 kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedParams {
    pub input_zero_point: i32,
    pub weight_zero_point: i32,
    pub output_zero_point: i32,
    /// `input_scale * weight_scale / output_scale`
    pub multiplier: f32,
}

/// Resolve the precision of a weighted kernel and check every dtype matches it
pub(crate) fn weighted_precision(
    input: &TensorInfo,
    weights: &TensorInfo,
    bias: Option<&TensorInfo>,
    output: &TensorInfo,
) -> Result<Precision, InferenceError> {
    match input.dtype {
        DType::F32 => {
            weights.expect_dtype(DType::F32)?;
            output.expect_dtype(DType::F32)?;
            if let Some(bias) = bias {
                bias.expect_dtype(DType::F32)?;
            }
            Ok(Precision::Float)
        }
        DType::I8 => {
            weights.expect_dtype(DType::I8)?;
            output.expect_dtype(DType::I8)?;
            if let Some(bias) = bias {
                bias.expect_dtype(DType::I32)?;
            }
            let (iq, wq, oq) = (input.quant()?, weights.quant()?, output.quant()?);
            Ok(Precision::Int8(QuantizedParams {
                input_zero_point: iq.zero_point,
                weight_zero_point: wq.zero_point,
                output_zero_point: oq.zero_point,
                multiplier: iq.scale * wq.scale / oq.scale,
            }))
        }
        DType::I32 => Err(InferenceError::TypeMismatch {
            tensor: input.name.clone(),
            expected: DType::F32,
            actual: DType::I32,
        }),
    }
}

#[inline]
pub(crate) fn activate_f32(value: f32, activation: Activation) -> f32 {
    match activation {
        Activation::None => value,
        Activation::Relu => value.max(0.0),
    }
}

/// Scale an int32 accumulator into the int8 output domain
#[inline]
pub(crate) fn requantize(acc: i32, params: &QuantizedParams, activation: Activation) -> i8 {
    let value = (acc as f32 * params.multiplier).round() as i32 + params.output_zero_point;
    let low = match activation {
        Activation::None => i8::MIN as i32,
        Activation::Relu => params.output_zero_point.max(i8::MIN as i32),
    };
    value.clamp(low, i8::MAX as i32) as i8
}

pub(crate) fn opcode_name(opcode: OpCode) -> &'static str {
    match opcode {
        OpCode::Conv2D => "CONV_2D",
        OpCode::DepthwiseConv2D => "DEPTHWISE_CONV_2D",
        OpCode::Relu => "RELU",
        OpCode::MaxPool2D => "MAX_POOL_2D",
        OpCode::Reshape => "RESHAPE",
        OpCode::FullyConnected => "FULLY_CONNECTED",
        OpCode::Transpose => "TRANSPOSE",
        OpCode::Quantize => "QUANTIZE",
        OpCode::Dequantize => "DEQUANTIZE",
        OpCode::AveragePool2D => "AVERAGE_POOL_2D",
        OpCode::Softmax => "SOFTMAX",
        OpCode::Add => "ADD",
    }
}
