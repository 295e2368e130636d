//! MAX_POOL_2D over NHWC activations

use super::{activate_f32, arity, window, EvalContext, Kernel, PrepareContext};
use crate::model::{Activation, OperatorDef};
use crate::tensor::DType;
use crate::InferenceError;

#[derive(Debug)]
pub struct MaxPoolKernel {
    input: usize,
    output: usize,
    dtype: DType,
    in_h: usize,
    in_w: usize,
    channels: usize,
    out_h: usize,
    out_w: usize,
    k_h: usize,
    k_w: usize,
    stride_h: usize,
    stride_w: usize,
    pad_top: usize,
    pad_left: usize,
    activation: Activation,
    /// Floor applied by a fused relu on int8 data
    floor_i8: i8,
}

pub fn prepare_max_pool<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>) -> Result<Kernel<'m>, InferenceError> {
    let (inputs, outputs) = arity(op, 1..=1, 1)?;
    let input = ctx.activation(inputs[0])?;
    let output = ctx.activation(outputs[0])?;
    let x = ctx.info(input);
    let y = ctx.info(output);

    let [1, in_h, in_w, channels] = x.shape[..] else {
        return Err(InferenceError::InvalidModel(format!("max pool input {} must be [1, h, w, c]", x.name)));
    };
    let k_h = op.options.filter_h as usize;
    let k_w = op.options.filter_w as usize;
    let stride_h = op.options.stride_h as usize;
    let stride_w = op.options.stride_w as usize;
    let (out_h, pad_top) = window(in_h, k_h, stride_h, op.options.padding)?;
    let (out_w, pad_left) = window(in_w, k_w, stride_w, op.options.padding)?;
    y.expect_shape(&[1, out_h, out_w, channels])?;
    y.expect_dtype(x.dtype)?;

    // max commutes with a shared affine map, so int8 needs matching quantization
    let floor_i8 = match x.dtype {
        DType::F32 => i8::MIN,
        DType::I8 => {
            let (iq, oq) = (x.quant()?, y.quant()?);
            if iq != oq {
                return Err(InferenceError::InvalidModel(format!(
                    "max pool {} -> {} must keep quantization",
                    x.name, y.name
                )));
            }
            oq.zero_point.clamp(i8::MIN as i32, i8::MAX as i32) as i8
        }
        DType::I32 => {
            return Err(InferenceError::TypeMismatch {
                tensor: x.name.clone(),
                expected: DType::F32,
                actual: DType::I32,
            })
        }
    };

    Ok(Kernel::MaxPool(MaxPoolKernel {
        input,
        output,
        dtype: x.dtype,
        in_h,
        in_w,
        channels,
        out_h,
        out_w,
        k_h,
        k_w,
        stride_h,
        stride_w,
        pad_top,
        pad_left,
        activation: op.options.activation,
        floor_i8,
    }))
}

impl MaxPoolKernel {
    /// Input pixel indices covered by output `(oy, ox)`, padding excluded
    fn window_pixels(&self, oy: usize, ox: usize) -> impl Iterator<Item = usize> + '_ {
        let rows = (0..self.k_h).filter_map(move |ky| {
            (oy * self.stride_h + ky)
                .checked_sub(self.pad_top)
                .filter(|&iy| iy < self.in_h)
        });
        rows.flat_map(move |iy| {
            (0..self.k_w).filter_map(move |kx| {
                (ox * self.stride_w + kx)
                    .checked_sub(self.pad_left)
                    .filter(|&ix| ix < self.in_w)
                    .map(|ix| (iy * self.in_w + ix) * self.channels)
            })
        })
    }

    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        match self.dtype {
            DType::F32 => {
                let (x, y) = ctx.io_f32(self.input, self.output)?;
                for oy in 0..self.out_h {
                    for ox in 0..self.out_w {
                        let base = (oy * self.out_w + ox) * self.channels;
                        for c in 0..self.channels {
                            let max = self
                                .window_pixels(oy, ox)
                                .map(|p| x[p + c])
                                .fold(f32::NEG_INFINITY, f32::max);
                            y[base + c] = activate_f32(max, self.activation);
                        }
                    }
                }
            }
            DType::I8 => {
                let (x, y) = ctx.io_i8(self.input, self.output)?;
                let floor = match self.activation {
                    Activation::None => i8::MIN,
                    Activation::Relu => self.floor_i8,
                };
                for oy in 0..self.out_h {
                    for ox in 0..self.out_w {
                        let base = (oy * self.out_w + ox) * self.channels;
                        for c in 0..self.channels {
                            let max = self.window_pixels(oy, ox).map(|p| x[p + c]).fold(floor, i8::max);
                            y[base + c] = max;
                        }
                    }
                }
            }
            DType::I32 => return Err("unsupported max pool dtype"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OpCode, OpOptions, Padding};
    use crate::ops::test_support::*;
    use crate::tensor::QuantParams;

    #[test]
    fn test_max_pool_2x2_stride_2() {
        let tensors = [f32_tensor("x", &[1, 4, 4, 1]), f32_tensor("y", &[1, 2, 2, 1])];
        #[rustfmt::skip]
        let x = f32_bytes(&[
            1.0, 2.0, 5.0, 6.0,
            3.0, 4.0, 7.0, 8.0,
            -1.0, -2.0, 0.0, 0.5,
            -3.0, -4.0, 0.25, 0.0,
        ]);
        let out = run(
            prepare_max_pool,
            OpCode::MaxPool2D,
            OpOptions::pool(2, 2, Padding::Valid),
            &tensors,
            &x,
        )
        .unwrap();
        assert_eq!(bytes_f32(&out), vec![4.0, 8.0, -1.0, 0.5]);
    }

    #[test]
    fn test_max_pool_keeps_channels_apart() {
        let tensors = [f32_tensor("x", &[1, 1, 2, 2]), f32_tensor("y", &[1, 1, 1, 2])];
        let out = run(
            prepare_max_pool,
            OpCode::MaxPool2D,
            OpOptions {
                filter_h: 1,
                filter_w: 2,
                ..OpOptions::default()
            },
            &tensors,
            &f32_bytes(&[1.0, 10.0, 2.0, -10.0]),
        )
        .unwrap();
        assert_eq!(bytes_f32(&out), vec![2.0, 10.0]);
    }

    #[test]
    fn test_max_pool_same_padding_ignores_border() {
        let tensors = [f32_tensor("x", &[1, 3, 3, 1]), f32_tensor("y", &[1, 2, 2, 1])];
        let x = f32_bytes(&[-9.0, -8.0, -7.0, -6.0, -5.0, -4.0, -3.0, -2.0, -1.0]);
        let out = run(
            prepare_max_pool,
            OpCode::MaxPool2D,
            OpOptions::pool(2, 2, Padding::Same),
            &tensors,
            &x,
        )
        .unwrap();
        assert_eq!(bytes_f32(&out), vec![-5.0, -4.0, -2.0, -1.0]);
    }

    #[test]
    fn test_max_pool_int8() {
        let q = QuantParams::new(0.1, 3);
        let tensors = [i8_tensor("x", &[1, 2, 2, 1], q), i8_tensor("y", &[1, 1, 1, 1], q)];
        let out = run(
            prepare_max_pool,
            OpCode::MaxPool2D,
            OpOptions::pool(2, 2, Padding::Valid),
            &tensors,
            &i8_bytes(&[-100, 20, -5, 7]),
        )
        .unwrap();
        assert_eq!(bytes_i8(&out), vec![20]);
    }

    #[test]
    fn test_max_pool_int8_requires_matching_quantization() {
        let tensors = [
            i8_tensor("x", &[1, 2, 2, 1], QuantParams::new(0.1, 0)),
            i8_tensor("y", &[1, 1, 1, 1], QuantParams::new(0.2, 0)),
        ];
        let err = run(
            prepare_max_pool,
            OpCode::MaxPool2D,
            OpOptions::pool(2, 2, Padding::Valid),
            &tensors,
            &[0; 4],
        )
        .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidModel(_)));
    }
}
