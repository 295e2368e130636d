//! CONV_2D and DEPTHWISE_CONV_2D over NHWC activations
//!
//! Filter layouts:
//! - regular: `[out_c, kh, kw, in_c]`
//! - depthwise: `[1, kh, kw, in_c * depth_multiplier]`

use super::{activate_f32, arity, requantize, weighted_precision, window, EvalContext, Kernel, PrepareContext, Precision};
use crate::model::{Activation, ConstBuffer, OperatorDef};
use crate::InferenceError;

#[derive(Debug)]
pub struct ConvKernel<'m> {
    input: usize,
    output: usize,
    filter: ConstBuffer<'m>,
    bias: Option<ConstBuffer<'m>>,
    depthwise: bool,
    depth_multiplier: usize,
    in_h: usize,
    in_w: usize,
    in_c: usize,
    out_h: usize,
    out_w: usize,
    out_c: usize,
    k_h: usize,
    k_w: usize,
    stride_h: usize,
    stride_w: usize,
    pad_top: usize,
    pad_left: usize,
    activation: Activation,
    precision: Precision,
}

pub fn prepare_conv<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>) -> Result<Kernel<'m>, InferenceError> {
    prepare(op, ctx, false)
}

pub fn prepare_depthwise<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>) -> Result<Kernel<'m>, InferenceError> {
    prepare(op, ctx, true)
}

fn prepare<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>, depthwise: bool) -> Result<Kernel<'m>, InferenceError> {
    let (inputs, outputs) = arity(op, 2..=3, 1)?;
    let input = ctx.activation(inputs[0])?;
    let output = ctx.activation(outputs[0])?;
    let filter = ctx.constant(inputs[1])?;
    let bias = match inputs.get(2) {
        Some(&id) => Some(ctx.constant(id)?),
        None => None,
    };

    let x = ctx.info(input);
    let w = ctx.info(inputs[1]);
    let y = ctx.info(output);

    let [1, in_h, in_w, in_c] = x.shape[..] else {
        return Err(InferenceError::InvalidModel(format!(
            "{:?} input {} must be [1, h, w, c]",
            op.opcode, x.name
        )));
    };
    let [w0, k_h, k_w, w3] = w.shape[..] else {
        return Err(InferenceError::InvalidModel(format!("{:?} filter {} must be rank 4", op.opcode, w.name)));
    };

    let depth_multiplier = op.options.depth_multiplier as usize;
    let out_c = if depthwise {
        if w0 != 1 || depth_multiplier == 0 || w3 != in_c * depth_multiplier {
            return Err(InferenceError::ShapeMismatch {
                tensor: w.name.clone(),
                expected: vec![1, k_h, k_w, in_c * depth_multiplier],
                actual: w.shape.clone(),
            });
        }
        w3
    } else {
        if w3 != in_c {
            return Err(InferenceError::ShapeMismatch {
                tensor: w.name.clone(),
                expected: vec![w0, k_h, k_w, in_c],
                actual: w.shape.clone(),
            });
        }
        w0
    };

    if let Some(&id) = inputs.get(2) {
        ctx.info(id).expect_shape(&[out_c])?;
    }

    let stride_h = op.options.stride_h as usize;
    let stride_w = op.options.stride_w as usize;
    let (out_h, pad_top) = window(in_h, k_h, stride_h, op.options.padding)?;
    let (out_w, pad_left) = window(in_w, k_w, stride_w, op.options.padding)?;
    y.expect_shape(&[1, out_h, out_w, out_c])?;

    let precision = weighted_precision(x, w, inputs.get(2).map(|&id| ctx.info(id)), y)?;

    Ok(Kernel::Conv(ConvKernel {
        input,
        output,
        filter,
        bias,
        depthwise,
        depth_multiplier,
        in_h,
        in_w,
        in_c,
        out_h,
        out_w,
        out_c,
        k_h,
        k_w,
        stride_h,
        stride_w,
        pad_top,
        pad_left,
        activation: op.options.activation,
        precision,
    }))
}

impl ConvKernel<'_> {
    /// Visit every (input index, filter index) tap contributing to one output
    #[inline]
    fn taps(&self, oy: usize, ox: usize, oc: usize, mut visit: impl FnMut(usize, usize)) {
        for ky in 0..self.k_h {
            let Some(iy) = (oy * self.stride_h + ky).checked_sub(self.pad_top) else {
                continue;
            };
            if iy >= self.in_h {
                continue;
            }
            for kx in 0..self.k_w {
                let Some(ix) = (ox * self.stride_w + kx).checked_sub(self.pad_left) else {
                    continue;
                };
                if ix >= self.in_w {
                    continue;
                }
                let pixel = (iy * self.in_w + ix) * self.in_c;
                if self.depthwise {
                    let ic = oc / self.depth_multiplier;
                    visit(pixel + ic, (ky * self.k_w + kx) * self.out_c + oc);
                } else {
                    let tap = ((oc * self.k_h + ky) * self.k_w + kx) * self.in_c;
                    for ic in 0..self.in_c {
                        visit(pixel + ic, tap + ic);
                    }
                }
            }
        }
    }

    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        match self.precision {
            Precision::Float => {
                let (x, y) = ctx.io_f32(self.input, self.output)?;
                for oy in 0..self.out_h {
                    for ox in 0..self.out_w {
                        let base = (oy * self.out_w + ox) * self.out_c;
                        for oc in 0..self.out_c {
                            let mut acc = self.bias.map_or(0.0, |b| b.f32_at(oc));
                            self.taps(oy, ox, oc, |i, w| acc += x[i] * self.filter.f32_at(w));
                            y[base + oc] = activate_f32(acc, self.activation);
                        }
                    }
                }
            }
            Precision::Int8(params) => {
                let (x, y) = ctx.io_i8(self.input, self.output)?;
                for oy in 0..self.out_h {
                    for ox in 0..self.out_w {
                        let base = (oy * self.out_w + ox) * self.out_c;
                        for oc in 0..self.out_c {
                            let mut acc = self.bias.map_or(0, |b| b.i32_at(oc));
                            self.taps(oy, ox, oc, |i, w| {
                                acc += (x[i] as i32 - params.input_zero_point)
                                    * (self.filter.i8_at(w) as i32 - params.weight_zero_point)
                            });
                            y[base + oc] = requantize(acc, &params, self.activation);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
