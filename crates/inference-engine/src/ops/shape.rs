//! RESHAPE and TRANSPOSE

use super::{arity, EvalContext, Kernel, PrepareContext};
use crate::model::OperatorDef;
use crate::tensor::DType;
use crate::InferenceError;

/// Highest rank TRANSPOSE handles
const MAX_RANK: usize = 4;

#[derive(Debug)]
pub struct ReshapeKernel {
    input: usize,
    output: usize,
}

/// The optional second input (target shape) is informational; the output
/// tensor's declared shape is authoritative.
pub fn prepare_reshape<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>) -> Result<Kernel<'m>, InferenceError> {
    let (inputs, outputs) = arity(op, 1..=2, 1)?;
    let input = ctx.activation(inputs[0])?;
    let output = ctx.activation(outputs[0])?;
    let (x, y) = (ctx.info(input), ctx.info(output));

    y.expect_dtype(x.dtype)?;
    if x.element_count() != y.element_count() {
        return Err(InferenceError::ShapeMismatch {
            tensor: y.name.clone(),
            expected: x.shape.clone(),
            actual: y.shape.clone(),
        });
    }
    if x.quant != y.quant {
        return Err(InferenceError::InvalidModel(format!("reshape {} must keep quantization", y.name)));
    }

    Ok(Kernel::Reshape(ReshapeKernel { input, output }))
}

impl ReshapeKernel {
    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        let (x, y) = ctx.io(self.input, self.output)?;
        if x.len() != y.len() {
            return Err("reshape size changed");
        }
        y.copy_from_slice(x);
        Ok(())
    }
}

#[derive(Debug)]
pub struct TransposeKernel {
    input: usize,
    output: usize,
    element_size: usize,
    /// Output extents, left-padded to rank 4
    out_shape: [usize; MAX_RANK],
    /// Input stride of each output axis, in elements
    strides: [usize; MAX_RANK],
}

/// Inputs: data, constant int32 permutation
pub fn prepare_transpose<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>) -> Result<Kernel<'m>, InferenceError> {
    let (inputs, outputs) = arity(op, 2..=2, 1)?;
    let input = ctx.activation(inputs[0])?;
    let output = ctx.activation(outputs[0])?;
    let perm_buffer = ctx.constant(inputs[1])?;
    let (x, y) = (ctx.info(input), ctx.info(output));
    let perm_info = ctx.info(inputs[1]);

    perm_info.expect_dtype(DType::I32)?;
    y.expect_dtype(x.dtype)?;

    let rank = x.shape.len();
    if rank == 0 || rank > MAX_RANK || perm_info.element_count() != rank {
        return Err(InferenceError::InvalidModel(format!(
            "transpose of rank {} with {} permutation entries",
            rank,
            perm_info.element_count()
        )));
    }

    let mut perm = [0usize; MAX_RANK];
    let mut seen = [false; MAX_RANK];
    for (axis, slot) in perm.iter_mut().enumerate().take(rank) {
        let value = perm_buffer.i32_at(axis);
        let Some(value) = usize::try_from(value).ok().filter(|&v| v < rank && !seen[v]) else {
            return Err(InferenceError::InvalidModel(format!("invalid transpose permutation entry {}", value)));
        };
        seen[value] = true;
        *slot = value;
    }

    let expected: Vec<usize> = perm[..rank].iter().map(|&axis| x.shape[axis]).collect();
    y.expect_shape(&expected)?;

    // left-pad to rank 4 with unit axes that map to themselves
    let pad = MAX_RANK - rank;
    let mut in_shape = [1usize; MAX_RANK];
    in_shape[pad..].copy_from_slice(&x.shape);
    let mut full_perm = [0, 1, 2, 3];
    for axis in 0..rank {
        full_perm[pad + axis] = pad + perm[axis];
    }

    let mut in_strides = [1usize; MAX_RANK];
    for axis in (0..MAX_RANK - 1).rev() {
        in_strides[axis] = in_strides[axis + 1] * in_shape[axis + 1];
    }

    let mut out_shape = [1usize; MAX_RANK];
    let mut strides = [0usize; MAX_RANK];
    for axis in 0..MAX_RANK {
        out_shape[axis] = in_shape[full_perm[axis]];
        strides[axis] = in_strides[full_perm[axis]];
    }

    Ok(Kernel::Transpose(TransposeKernel {
        input,
        output,
        element_size: x.dtype.size(),
        out_shape,
        strides,
    }))
}

impl TransposeKernel {
    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        let (x, y) = ctx.io(self.input, self.output)?;
        let size = self.element_size;
        let [d0, d1, d2, d3] = self.out_shape;
        let [s0, s1, s2, s3] = self.strides;

        let mut out = 0;
        for i0 in 0..d0 {
            for i1 in 0..d1 {
                for i2 in 0..d2 {
                    for i3 in 0..d3 {
                        let src = (i0 * s0 + i1 * s1 + i2 * s2 + i3 * s3) * size;
                        let dst = out * size;
                        y[dst..dst + size].copy_from_slice(&x[src..src + size]);
                        out += 1;
                    }
                }
            }
        }
        Ok(())
    }
}
