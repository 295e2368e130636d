//! RELU, QUANTIZE, and DEQUANTIZE

use super::{arity, EvalContext, Kernel, PrepareContext};
use crate::model::OperatorDef;
use crate::tensor::{DType, QuantParams, TensorInfo};
use crate::InferenceError;

fn same_elements(x: &TensorInfo, y: &TensorInfo) -> Result<(), InferenceError> {
    if x.element_count() != y.element_count() {
        return Err(InferenceError::ShapeMismatch {
            tensor: y.name.clone(),
            expected: x.shape.clone(),
            actual: y.shape.clone(),
        });
    }
    Ok(())
}

#[derive(Debug)]
pub struct ReluKernel {
    input: usize,
    output: usize,
    /// `None` for float data; the int8 zero point otherwise
    zero_point: Option<i8>,
}

pub fn prepare_relu<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>) -> Result<Kernel<'m>, InferenceError> {
    let (inputs, outputs) = arity(op, 1..=1, 1)?;
    let input = ctx.activation(inputs[0])?;
    let output = ctx.activation(outputs[0])?;
    let (x, y) = (ctx.info(input), ctx.info(output));
    same_elements(x, y)?;
    y.expect_dtype(x.dtype)?;

    let zero_point = match x.dtype {
        DType::F32 => None,
        DType::I8 => {
            let q = x.quant()?;
            if y.quant()? != q {
                return Err(InferenceError::InvalidModel(format!("relu {} must keep quantization", y.name)));
            }
            Some(q.zero_point.clamp(i8::MIN as i32, i8::MAX as i32) as i8)
        }
        DType::I32 => {
            return Err(InferenceError::TypeMismatch {
                tensor: x.name.clone(),
                expected: DType::F32,
                actual: DType::I32,
            })
        }
    };

    Ok(Kernel::Relu(ReluKernel {
        input,
        output,
        zero_point,
    }))
}

impl ReluKernel {
    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        match self.zero_point {
            None => {
                let (x, y) = ctx.io_f32(self.input, self.output)?;
                for (out, &value) in y.iter_mut().zip(x) {
                    *out = value.max(0.0);
                }
            }
            Some(zero) => {
                let (x, y) = ctx.io_i8(self.input, self.output)?;
                for (out, &value) in y.iter_mut().zip(x) {
                    *out = value.max(zero);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct QuantizeKernel {
    input: usize,
    output: usize,
    params: QuantParams,
}

pub fn prepare_quantize<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>) -> Result<Kernel<'m>, InferenceError> {
    let (inputs, outputs) = arity(op, 1..=1, 1)?;
    let input = ctx.activation(inputs[0])?;
    let output = ctx.activation(outputs[0])?;
    let (x, y) = (ctx.info(input), ctx.info(output));
    same_elements(x, y)?;
    x.expect_dtype(DType::F32)?;
    y.expect_dtype(DType::I8)?;

    Ok(Kernel::Quantize(QuantizeKernel {
        input,
        output,
        params: y.quant()?,
    }))
}

impl QuantizeKernel {
    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        let (x, y) = ctx.io(self.input, self.output)?;
        let x: &[f32] = bytemuck::try_cast_slice(x).map_err(|_| "misaligned f32 input")?;
        let y: &mut [i8] = bytemuck::cast_slice_mut(y);
        for (out, &value) in y.iter_mut().zip(x) {
            *out = self.params.quantize(value);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DequantizeKernel {
    input: usize,
    output: usize,
    params: QuantParams,
}

pub fn prepare_dequantize<'m>(op: &OperatorDef, ctx: &PrepareContext<'_, 'm>) -> Result<Kernel<'m>, InferenceError> {
    let (inputs, outputs) = arity(op, 1..=1, 1)?;
    let input = ctx.activation(inputs[0])?;
    let output = ctx.activation(outputs[0])?;
    let (x, y) = (ctx.info(input), ctx.info(output));
    same_elements(x, y)?;
    x.expect_dtype(DType::I8)?;
    y.expect_dtype(DType::F32)?;

    Ok(Kernel::Dequantize(DequantizeKernel {
        input,
        output,
        params: x.quant()?,
    }))
}

impl DequantizeKernel {
    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        let (x, y) = ctx.io(self.input, self.output)?;
        let x: &[i8] = bytemuck::cast_slice(x);
        let y: &mut [f32] = bytemuck::try_cast_slice_mut(y).map_err(|_| "misaligned f32 output")?;
        for (out, &value) in y.iter_mut().zip(x) {
            *out = self.params.dequantize(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OpCode, OpOptions};
    use crate::ops::test_support::*;

    #[test]
    fn test_relu_f32() {
        let tensors = [f32_tensor("x", &[4]), f32_tensor("y", &[4])];
        let out = run(
            prepare_relu,
            OpCode::Relu,
            OpOptions::default(),
            &tensors,
            &f32_bytes(&[-1.0, 0.0, 2.5, -0.1]),
        )
        .unwrap();
        assert_eq!(bytes_f32(&out), vec![0.0, 0.0, 2.5, 0.0]);
    }

    #[test]
    fn test_relu_int8_clamps_at_zero_point() {
        let q = QuantParams::new(0.5, -20);
        let tensors = [i8_tensor("x", &[3], q), i8_tensor("y", &[3], q)];
        let out = run(prepare_relu, OpCode::Relu, OpOptions::default(), &tensors, &i8_bytes(&[-100, -20, 15])).unwrap();
        assert_eq!(bytes_i8(&out), vec![-20, -20, 15]);
    }

    #[test]
    fn test_quantize() {
        let tensors = [f32_tensor("x", &[3]), i8_tensor("y", &[3], QuantParams::new(0.5, 10))];
        let out = run(
            prepare_quantize,
            OpCode::Quantize,
            OpOptions::default(),
            &tensors,
            &f32_bytes(&[1.0, -3.0, 500.0]),
        )
        .unwrap();
        assert_eq!(bytes_i8(&out), vec![12, 4, 127]);
    }

    #[test]
    fn test_dequantize() {
        let tensors = [i8_tensor("x", &[2], QuantParams::new(0.25, -4)), f32_tensor("y", &[2])];
        let out = run(
            prepare_dequantize,
            OpCode::Dequantize,
            OpOptions::default(),
            &tensors,
            &i8_bytes(&[0, -8]),
        )
        .unwrap();
        assert_eq!(bytes_f32(&out), vec![1.0, -1.0]);
    }

    #[test]
    fn test_quantize_requires_float_input() {
        let q = QuantParams::new(1.0, 0);
        let tensors = [i8_tensor("x", &[2], q), i8_tensor("y", &[2], q)];
        let err = run(prepare_quantize, OpCode::Quantize, OpOptions::default(), &tensors, &[0; 2]).unwrap_err();
        assert!(matches!(err, InferenceError::TypeMismatch { .. }));
    }

    #[test]
    fn test_relu_rejects_element_count_change() {
        let tensors = [f32_tensor("x", &[4]), f32_tensor("y", &[2])];
        let err = run(prepare_relu, OpCode::Relu, OpOptions::default(), &tensors, &[0; 16]).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
    }
}
