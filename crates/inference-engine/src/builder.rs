//! Model blob builder
//!
//! Assembles graphs in code and serializes them to the blob format read by
//! [`ModelDef::parse`]. Test and bench fixtures only; shipped models come
//! from the offline toolchain.

use crate::model::{
    Activation, ConstBuffer, ModelDef, OpCode, OpOptions, OperatorDef, Padding, TensorDef, TensorId, HEADER_LEN,
    MODEL_MAGIC, SCHEMA_VERSION,
};
use crate::tensor::{DType, Layout, QuantParams};
use crate::InferenceError;

struct TensorEntry {
    name: String,
    dtype: DType,
    shape: Vec<u32>,
    quant: Option<QuantParams>,
    buffer: Option<Vec<u8>>,
}

/// Incremental graph builder
#[derive(Default)]
pub struct ModelBuilder {
    tensors: Vec<TensorEntry>,
    operators: Vec<OperatorDef>,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,
    input_layout: Layout,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_layout(&mut self, layout: Layout) -> &mut Self {
        self.input_layout = layout;
        self
    }

    fn push(&mut self, entry: TensorEntry) -> TensorId {
        self.tensors.push(entry);
        (self.tensors.len() - 1) as TensorId
    }

    /// Arena-resident float tensor
    pub fn activation(&mut self, name: &str, shape: &[u32]) -> TensorId {
        self.push(TensorEntry {
            name: name.to_string(),
            dtype: DType::F32,
            shape: shape.to_vec(),
            quant: None,
            buffer: None,
        })
    }

    /// Arena-resident int8 tensor
    pub fn quantized_activation(&mut self, name: &str, shape: &[u32], quant: QuantParams) -> TensorId {
        self.push(TensorEntry {
            name: name.to_string(),
            dtype: DType::I8,
            shape: shape.to_vec(),
            quant: Some(quant),
            buffer: None,
        })
    }

    pub fn constant_f32(&mut self, name: &str, shape: &[u32], values: &[f32]) -> TensorId {
        self.push(TensorEntry {
            name: name.to_string(),
            dtype: DType::F32,
            shape: shape.to_vec(),
            quant: None,
            buffer: Some(values.iter().flat_map(|v| v.to_le_bytes()).collect()),
        })
    }

    pub fn constant_i8(&mut self, name: &str, shape: &[u32], values: &[i8], quant: QuantParams) -> TensorId {
        self.push(TensorEntry {
            name: name.to_string(),
            dtype: DType::I8,
            shape: shape.to_vec(),
            quant: Some(quant),
            buffer: Some(values.iter().map(|&v| v as u8).collect()),
        })
    }

    pub fn constant_i32(&mut self, name: &str, shape: &[u32], values: &[i32]) -> TensorId {
        self.push(TensorEntry {
            name: name.to_string(),
            dtype: DType::I32,
            shape: shape.to_vec(),
            quant: None,
            buffer: Some(values.iter().flat_map(|v| v.to_le_bytes()).collect()),
        })
    }

    pub fn operator(&mut self, opcode: OpCode, inputs: &[TensorId], outputs: &[TensorId], options: OpOptions) -> &mut Self {
        self.operators.push(OperatorDef {
            opcode,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            options,
        });
        self
    }

    pub fn graph_input(&mut self, id: TensorId) -> &mut Self {
        self.inputs.push(id);
        self
    }

    pub fn graph_output(&mut self, id: TensorId) -> &mut Self {
        self.outputs.push(id);
        self
    }

    /// Serialize to a model blob. The result is not validated; parse it to check.
    pub fn build(&self) -> Result<Vec<u8>, InferenceError> {
        let model = ModelDef {
            tensors: self
                .tensors
                .iter()
                .map(|t| TensorDef {
                    name: &t.name,
                    dtype: t.dtype,
                    shape: t.shape.clone(),
                    quant: t.quant,
                    buffer: t.buffer.as_deref().map(ConstBuffer),
                })
                .collect(),
            operators: self.operators.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            input_layout: self.input_layout,
        };

        let mut blob = Vec::with_capacity(HEADER_LEN);
        blob.extend_from_slice(&MODEL_MAGIC);
        blob.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
        blob.extend_from_slice(&postcard::to_allocvec(&model)?);
        Ok(blob)
    }
}

/// Float model that ignores its `[1, height, width, 1]` input and always
/// outputs `logits` as `[1, logits.len()]`.
///
/// Reshape to a row, then a fully connected layer with zero weights whose
/// bias carries the logits.
pub fn fixed_logits_model(height: u32, width: u32, logits: &[f32]) -> Result<Vec<u8>, InferenceError> {
    let units = logits.len() as u32;
    let depth = height * width;

    let mut b = ModelBuilder::new();
    let input = b.activation("input", &[1, height, width, 1]);
    let flat = b.activation("flat", &[1, depth]);
    let weights = b.constant_f32("fc/weights", &[units, depth], &vec![0.0; (units * depth) as usize]);
    let bias = b.constant_f32("fc/bias", &[units], logits);
    let output = b.activation("logits", &[1, units]);

    b.operator(OpCode::Reshape, &[input], &[flat], OpOptions::default())
        .operator(
            OpCode::FullyConnected,
            &[flat, weights, bias],
            &[output],
            OpOptions::fully_connected(Activation::None),
        )
        .graph_input(input)
        .graph_output(output);
    b.build()
}

/// Deterministic pseudo-random int8 weights
struct WeightStream(u32);

impl WeightStream {
    fn next_weight(&mut self) -> i8 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        ((self.0 >> 24) as i8) / 4
    }

    fn take(&mut self, count: usize) -> Vec<i8> {
        (0..count).map(|_| self.next_weight()).collect()
    }
}

/// Quantized gesture CNN over a `[1, 1, 32, 32]` channels-first float input.
///
/// ```text
/// transpose NCHW->NHWC, quantize, conv 3x3x8 + relu, max pool 2x2,
/// depthwise 3x3, relu, reshape, fully connected 14, dequantize
/// ```
///
/// Weights are pseudo-random from `seed`; the graph exercises every linked
/// operator at the shipped input size.
pub fn gesture_cnn_model(seed: u32, classes: u32) -> Result<Vec<u8>, InferenceError> {
    const SIDE: u32 = 32;
    const FILTERS: u32 = 8;
    let conv_side = SIDE - 2;
    let pool_side = conv_side / 2;
    let dw_side = pool_side - 2;
    let depth = dw_side * dw_side * FILTERS;

    let input_q = QuantParams::new(1.0 / 255.0, -128);
    let weight_q = QuantParams::new(0.02, 0);
    let act_q = QuantParams::new(0.05, -128);
    let logit_q = QuantParams::new(0.1, 0);
    let mut weights = WeightStream(seed);

    let mut b = ModelBuilder::new();
    b.input_layout(Layout::Nchw);
    let input = b.activation("image", &[1, 1, SIDE, SIDE]);
    let perm = b.constant_i32("transpose/perm", &[4], &[0, 2, 3, 1]);
    let nhwc = b.activation("image_nhwc", &[1, SIDE, SIDE, 1]);
    let quantized = b.quantized_activation("image_q", &[1, SIDE, SIDE, 1], input_q);

    let conv_w = b.constant_i8(
        "conv/weights",
        &[FILTERS, 3, 3, 1],
        &weights.take((FILTERS * 9) as usize),
        weight_q,
    );
    let conv_b = b.constant_i32("conv/bias", &[FILTERS], &vec![0; FILTERS as usize]);
    let conv = b.quantized_activation("conv", &[1, conv_side, conv_side, FILTERS], act_q);
    let pool = b.quantized_activation("pool", &[1, pool_side, pool_side, FILTERS], act_q);

    let dw_w = b.constant_i8(
        "depthwise/weights",
        &[1, 3, 3, FILTERS],
        &weights.take((FILTERS * 9) as usize),
        weight_q,
    );
    let dw = b.quantized_activation("depthwise", &[1, dw_side, dw_side, FILTERS], act_q);
    let relu = b.quantized_activation("relu", &[1, dw_side, dw_side, FILTERS], act_q);
    let flat = b.quantized_activation("flat", &[1, depth], act_q);

    let fc_w = b.constant_i8(
        "fc/weights",
        &[classes, depth],
        &weights.take((classes * depth) as usize),
        weight_q,
    );
    let fc_b = b.constant_i32("fc/bias", &[classes], &vec![0; classes as usize]);
    let logits_q = b.quantized_activation("logits_q", &[1, classes], logit_q);
    let logits = b.activation("logits", &[1, classes]);

    b.operator(OpCode::Transpose, &[input, perm], &[nhwc], OpOptions::default())
        .operator(OpCode::Quantize, &[nhwc], &[quantized], OpOptions::default())
        .operator(
            OpCode::Conv2D,
            &[quantized, conv_w, conv_b],
            &[conv],
            OpOptions::conv(1, Padding::Valid, Activation::Relu),
        )
        .operator(OpCode::MaxPool2D, &[conv], &[pool], OpOptions::pool(2, 2, Padding::Valid))
        .operator(
            OpCode::DepthwiseConv2D,
            &[pool, dw_w],
            &[dw],
            OpOptions::depthwise(1, Padding::Valid, Activation::None, 1),
        )
        .operator(OpCode::Relu, &[dw], &[relu], OpOptions::default())
        .operator(OpCode::Reshape, &[relu], &[flat], OpOptions::default())
        .operator(
            OpCode::FullyConnected,
            &[flat, fc_w, fc_b],
            &[logits_q],
            OpOptions::fully_connected(Activation::None),
        )
        .operator(OpCode::Dequantize, &[logits_q], &[logits], OpOptions::default())
        .graph_input(input)
        .graph_output(logits);
    b.build()
}
