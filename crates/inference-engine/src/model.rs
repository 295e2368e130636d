//! Model blob format
//!
//! ```text
//! +--------+----------------+-----------------------------+
//! | "GSTM" | schema u32 LE  | postcard-encoded ModelDef   |
//! +--------+----------------+-----------------------------+
//! ```
//!
//! Constant buffers inside the payload are borrowed straight from the blob.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::tensor::{DType, Layout, QuantParams, TensorInfo};
use crate::InferenceError;

/// Magic bytes at the start of every model blob
pub const MODEL_MAGIC: [u8; 4] = *b"GSTM";

/// Schema version this build understands
pub const SCHEMA_VERSION: u32 = 1;

/// Header length (magic + version)
pub const HEADER_LEN: usize = 8;

/// Index into `ModelDef::tensors`
pub type TensorId = u16;

/// Builtin operator codes known to the blob format.
///
/// Only a subset is linked into a given build; see [`crate::OpResolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    Conv2D,
    DepthwiseConv2D,
    Relu,
    MaxPool2D,
    Reshape,
    FullyConnected,
    Transpose,
    Quantize,
    Dequantize,
    AveragePool2D,
    Softmax,
    Add,
}

/// Spatial padding scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

/// Activation fused into the producing operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    None,
    Relu,
}

/// Operator options. Fields irrelevant to an opcode are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpOptions {
    pub stride_h: u16,
    pub stride_w: u16,
    pub filter_h: u16,
    pub filter_w: u16,
    pub padding: Padding,
    pub activation: Activation,
    pub depth_multiplier: u16,
}

impl Default for OpOptions {
    fn default() -> Self {
        Self {
            stride_h: 1,
            stride_w: 1,
            filter_h: 1,
            filter_w: 1,
            padding: Padding::Valid,
            activation: Activation::None,
            depth_multiplier: 1,
        }
    }
}

impl OpOptions {
    /// Convolution options
    pub fn conv(stride: u16, padding: Padding, activation: Activation) -> Self {
        Self {
            stride_h: stride,
            stride_w: stride,
            padding,
            activation,
            ..Default::default()
        }
    }

    /// Depthwise convolution options
    pub fn depthwise(stride: u16, padding: Padding, activation: Activation, depth_multiplier: u16) -> Self {
        Self {
            depth_multiplier,
            ..Self::conv(stride, padding, activation)
        }
    }

    /// Pooling options
    pub fn pool(filter: u16, stride: u16, padding: Padding) -> Self {
        Self {
            stride_h: stride,
            stride_w: stride,
            filter_h: filter,
            filter_w: filter,
            padding,
            ..Default::default()
        }
    }

    /// Fully-connected options
    pub fn fully_connected(activation: Activation) -> Self {
        Self {
            activation,
            ..Default::default()
        }
    }
}

/// Little-endian constant data borrowed from the blob
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ConstBuffer<'a>(pub &'a [u8]);

impl fmt::Debug for ConstBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstBuffer({} bytes)", self.0.len())
    }
}

impl Serialize for ConstBuffer<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

impl<'de: 'a, 'a> Deserialize<'de> for ConstBuffer<'a> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <&'a [u8]>::deserialize(deserializer).map(ConstBuffer)
    }
}

/// Tensor declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorDef<'a> {
    pub name: &'a str,
    pub dtype: DType,
    pub shape: Vec<u32>,
    pub quant: Option<QuantParams>,
    /// Constant contents; `None` for arena-resident activations
    #[serde(borrow)]
    pub buffer: Option<ConstBuffer<'a>>,
}

impl TensorDef<'_> {
    /// Owned metadata for this tensor
    pub fn info(&self) -> TensorInfo {
        TensorInfo {
            name: self.name.to_string(),
            dtype: self.dtype,
            shape: self.shape.iter().map(|&d| d as usize).collect(),
            quant: self.quant,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.buffer.is_some()
    }

    /// Storage size in bytes; `None` when the shape overflows `usize`
    pub fn byte_len(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(self.dtype.size(), |len, &d| len.checked_mul(d as usize))
    }
}

/// Operator declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorDef {
    pub opcode: OpCode,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub options: OpOptions,
}

/// Decoded model graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDef<'a> {
    #[serde(borrow)]
    pub tensors: Vec<TensorDef<'a>>,
    pub operators: Vec<OperatorDef>,
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub input_layout: Layout,
}

impl<'a> ModelDef<'a> {
    /// Validate the header and decode the payload of a model blob
    pub fn parse(blob: &'a [u8]) -> Result<Self, InferenceError> {
        if blob.len() < HEADER_LEN {
            return Err(InferenceError::TruncatedModel { len: blob.len() });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&blob[..4]);
        if magic != MODEL_MAGIC {
            return Err(InferenceError::BadMagic { found: magic });
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&blob[4..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != SCHEMA_VERSION {
            return Err(InferenceError::SchemaVersion {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        let model: ModelDef<'a> = postcard::from_bytes(&blob[HEADER_LEN..])?;
        model.validate()?;
        Ok(model)
    }

    /// Structural checks that do not depend on operator semantics
    fn validate(&self) -> Result<(), InferenceError> {
        let count = self.tensors.len();
        let in_range = |id: &TensorId| (*id as usize) < count;

        for (index, op) in self.operators.iter().enumerate() {
            if !op.inputs.iter().chain(op.outputs.iter()).all(in_range) {
                return Err(InferenceError::InvalidModel(format!(
                    "operator {} references a tensor out of range",
                    index
                )));
            }
        }

        if self.inputs.len() != 1 || self.outputs.len() != 1 {
            return Err(InferenceError::InvalidModel(format!(
                "expected one graph input and one output, got {} and {}",
                self.inputs.len(),
                self.outputs.len()
            )));
        }
        if !self.inputs.iter().chain(self.outputs.iter()).all(in_range) {
            return Err(InferenceError::InvalidModel("graph input/output out of range".into()));
        }

        for tensor in &self.tensors {
            if tensor.shape.contains(&0) {
                return Err(InferenceError::InvalidModel(format!(
                    "tensor {} has a zero-sized dimension {:?}",
                    tensor.name, tensor.shape
                )));
            }
            let expected = tensor.byte_len().ok_or_else(|| {
                InferenceError::InvalidModel(format!("tensor {} shape {:?} overflows", tensor.name, tensor.shape))
            })?;
            if let Some(buffer) = tensor.buffer {
                if buffer.0.len() != expected {
                    return Err(InferenceError::InvalidModel(format!(
                        "constant {} holds {} bytes, shape needs {}",
                        tensor.name,
                        buffer.0.len(),
                        expected
                    )));
                }
            }
        }

        for id in self.inputs.iter().chain(self.outputs.iter()) {
            if self.tensors[*id as usize].is_constant() {
                return Err(InferenceError::InvalidModel(format!(
                    "graph input/output {} must not be constant",
                    self.tensors[*id as usize].name
                )));
            }
        }

        Ok(())
    }

    pub fn input(&self) -> TensorId {
        self.inputs[0]
    }

    pub fn output(&self) -> TensorId {
        self.outputs[0]
    }
}

/// Element accessors over little-endian constant data
impl<'a> ConstBuffer<'a> {
    #[inline]
    pub fn f32_at(&self, index: usize) -> f32 {
        let at = index * 4;
        f32::from_le_bytes([self.0[at], self.0[at + 1], self.0[at + 2], self.0[at + 3]])
    }

    #[inline]
    pub fn i32_at(&self, index: usize) -> i32 {
        let at = index * 4;
        i32::from_le_bytes([self.0[at], self.0[at + 1], self.0[at + 2], self.0[at + 3]])
    }

    #[inline]
    pub fn i8_at(&self, index: usize) -> i8 {
        self.0[index] as i8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_blob() {
        assert!(matches!(ModelDef::parse(b"GST"), Err(InferenceError::TruncatedModel { len: 3 })));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let blob = b"TFL3\x01\x00\x00\x00";
        assert!(matches!(ModelDef::parse(blob), Err(InferenceError::BadMagic { .. })));
    }

    #[test]
    fn test_rejects_schema_version() {
        let blob = b"GSTM\x02\x00\x00\x00";
        assert!(matches!(
            ModelDef::parse(blob),
            Err(InferenceError::SchemaVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_rejects_garbage_payload() {
        let blob = b"GSTM\x01\x00\x00\x00\xff\xff\xff";
        assert!(matches!(ModelDef::parse(blob), Err(InferenceError::Codec(_))));
    }

    #[test]
    fn test_const_buffer_accessors() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-7i32).to_le_bytes());
        let buffer = ConstBuffer(&bytes);
        assert_eq!(buffer.f32_at(0), 1.5);
        assert_eq!(buffer.i32_at(1), -7);
        assert_eq!(buffer.i8_at(4), -7);
    }
}
