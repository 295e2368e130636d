//! FULLY_CONNECTED: `y = W x + b` with weights laid out `[units, depth]`

use super::{activate_f32, arity, requantize, weighted_precision, EvalContext, Kernel, PrepareContext, Precision};
use crate::model::{Activation, ConstBuffer, OperatorDef};
use crate::InferenceError;

#[derive(Debug)]
pub struct FullyConnectedKernel<'m> {
    input: usize,
    output: usize,
    weights: ConstBuffer<'m>,
    bias: Option<ConstBuffer<'m>>,
    depth: usize,
    units: usize,
    activation: Activation,
    precision: Precision,
}

pub fn prepare_fully_connected<'m>(
    op: &OperatorDef,
    ctx: &PrepareContext<'_, 'm>,
) -> Result<Kernel<'m>, InferenceError> {
    let (inputs, outputs) = arity(op, 2..=3, 1)?;
    let input = ctx.activation(inputs[0])?;
    let output = ctx.activation(outputs[0])?;
    let weights = ctx.constant(inputs[1])?;
    let bias = match inputs.get(2) {
        Some(&id) => Some(ctx.constant(id)?),
        None => None,
    };

    let x = ctx.info(input);
    let w = ctx.info(inputs[1]);
    let y = ctx.info(output);

    let [units, depth] = w.shape[..] else {
        return Err(InferenceError::InvalidModel(format!(
            "fully connected weights {} must be [units, depth]",
            w.name
        )));
    };
    // single batch: the whole input is one row
    if x.element_count() != depth {
        return Err(InferenceError::ShapeMismatch {
            tensor: x.name.clone(),
            expected: vec![1, depth],
            actual: x.shape.clone(),
        });
    }
    if y.element_count() != units {
        return Err(InferenceError::ShapeMismatch {
            tensor: y.name.clone(),
            expected: vec![1, units],
            actual: y.shape.clone(),
        });
    }
    if let Some(&id) = inputs.get(2) {
        ctx.info(id).expect_shape(&[units])?;
    }

    let precision = weighted_precision(x, w, inputs.get(2).map(|&id| ctx.info(id)), y)?;

    Ok(Kernel::FullyConnected(FullyConnectedKernel {
        input,
        output,
        weights,
        bias,
        depth,
        units,
        activation: op.options.activation,
        precision,
    }))
}

impl FullyConnectedKernel<'_> {
    pub fn eval(&self, ctx: &mut EvalContext<'_>) -> Result<(), &'static str> {
        match self.precision {
            Precision::Float => {
                let (x, y) = ctx.io_f32(self.input, self.output)?;
                for (unit, out) in y.iter_mut().enumerate().take(self.units) {
                    let row = unit * self.depth;
                    let mut acc = self.bias.map_or(0.0, |b| b.f32_at(unit));
                    for (i, &value) in x.iter().enumerate().take(self.depth) {
                        acc += value * self.weights.f32_at(row + i);
                    }
                    *out = activate_f32(acc, self.activation);
                }
            }
            Precision::Int8(params) => {
                let (x, y) = ctx.io_i8(self.input, self.output)?;
                for (unit, out) in y.iter_mut().enumerate().take(self.units) {
                    let row = unit * self.depth;
                    let mut acc = self.bias.map_or(0, |b| b.i32_at(unit));
                    for (i, &value) in x.iter().enumerate().take(self.depth) {
                        acc += (value as i32 - params.input_zero_point)
                            * (self.weights.i8_at(row + i) as i32 - params.weight_zero_point);
                    }
                    *out = requantize(acc, &params, self.activation);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OpCode, OpOptions};
    use crate::ops::test_support::*;
    use crate::tensor::QuantParams;

    #[test]
    fn test_fully_connected_f32() {
        let tensors = [
            f32_tensor("x", &[1, 3]),
            f32_const("w", &[2, 3], &[1.0, 0.0, -1.0, 0.5, 0.5, 0.5]),
            f32_const("b", &[2], &[0.25, -1.0]),
            f32_tensor("y", &[1, 2]),
        ];
        let out = run(
            prepare_fully_connected,
            OpCode::FullyConnected,
            OpOptions::default(),
            &tensors,
            &f32_bytes(&[2.0, 4.0, 6.0]),
        )
        .unwrap();
        assert_eq!(bytes_f32(&out), vec![-3.75, 5.0]);
    }

    #[test]
    fn test_fully_connected_fused_relu() {
        let tensors = [
            f32_tensor("x", &[1, 2]),
            f32_const("w", &[2, 2], &[1.0, 1.0, -1.0, -1.0]),
            f32_tensor("y", &[1, 2]),
        ];
        let out = run(
            prepare_fully_connected,
            OpCode::FullyConnected,
            OpOptions::fully_connected(Activation::Relu),
            &tensors,
            &f32_bytes(&[1.0, 2.0]),
        )
        .unwrap();
        assert_eq!(bytes_f32(&out), vec![3.0, 0.0]);
    }

    #[test]
    fn test_fully_connected_accepts_flat_input() {
        // [1, 2, 2, 1] feeds four inputs per unit
        let tensors = [
            f32_tensor("x", &[1, 2, 2, 1]),
            f32_const("w", &[1, 4], &[1.0, 2.0, 3.0, 4.0]),
            f32_tensor("y", &[1, 1]),
        ];
        let out = run(
            prepare_fully_connected,
            OpCode::FullyConnected,
            OpOptions::default(),
            &tensors,
            &f32_bytes(&[1.0, 1.0, 1.0, 1.0]),
        )
        .unwrap();
        assert_eq!(bytes_f32(&out), vec![10.0]);
    }

    #[test]
    fn test_fully_connected_int8() {
        let tensors = [
            i8_tensor("x", &[1, 2], QuantParams::new(1.0, 0)),
            i8_const("w", &[1, 2], &[3, -2], QuantParams::new(0.5, 0)),
            i32_const("b", &[1], &[4]),
            i8_tensor("y", &[1, 1], QuantParams::new(1.0, 0)),
        ];
        // (10 * 3 + 5 * -2 + 4) * 0.5 = 12
        let out = run(
            prepare_fully_connected,
            OpCode::FullyConnected,
            OpOptions::default(),
            &tensors,
            &i8_bytes(&[10, 5]),
        )
        .unwrap();
        assert_eq!(bytes_i8(&out), vec![12]);
    }

    #[test]
    fn test_fully_connected_rejects_depth_mismatch() {
        let tensors = [
            f32_tensor("x", &[1, 3]),
            f32_const("w", &[1, 2], &[1.0, 1.0]),
            f32_tensor("y", &[1, 1]),
        ];
        let err = run(
            prepare_fully_connected,
            OpCode::FullyConnected,
            OpOptions::default(),
            &tensors,
            &[0; 12],
        )
        .unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_fully_connected_requires_constant_weights() {
        let tensors = [f32_tensor("x", &[1, 2]), f32_tensor("w", &[1, 2]), f32_tensor("y", &[1, 1])];
        let err = run(
            prepare_fully_connected,
            OpCode::FullyConnected,
            OpOptions::default(),
            &tensors,
            &[0; 8],
        )
        .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidModel(_)));
    }
}
