//! Tensor metadata and non-owning views into arena memory

use serde::{Deserialize, Serialize};

use crate::InferenceError;

/// Element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    F32,
    I8,
    I32,
}

impl DType {
    /// Size of one element in bytes
    pub fn size(&self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::I8 => 1,
        }
    }
}

/// Per-tensor affine quantization: `real = scale * (q - zero_point)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    /// Quantize a real value to int8, saturating
    pub fn quantize(&self, value: f32) -> i8 {
        let q = (value / self.scale).round() as i32 + self.zero_point;
        q.clamp(i8::MIN as i32, i8::MAX as i32) as i8
    }

    /// Map an int8 value back to the real line
    pub fn dequantize(&self, value: i8) -> f32 {
        (value as i32 - self.zero_point) as f32 * self.scale
    }
}

/// Memory layout of the graph input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Layout {
    /// batch, height, width, channels
    #[default]
    Nhwc,
    /// batch, channels, height, width
    Nchw,
}

/// Spatial geometry of a single-image tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

/// Name, element type, shape, and quantization of one tensor
#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub quant: Option<QuantParams>,
}

impl TensorInfo {
    /// Number of elements
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Number of bytes
    pub fn byte_len(&self) -> usize {
        self.element_count() * self.dtype.size()
    }

    /// Interpret a rank-4, batch-1 shape as an image under `layout`
    pub fn image_geometry(&self, layout: Layout) -> Option<ImageGeometry> {
        match (self.shape.as_slice(), layout) {
            ([1, h, w, c], Layout::Nhwc) => Some(ImageGeometry {
                height: *h,
                width: *w,
                channels: *c,
            }),
            ([1, c, h, w], Layout::Nchw) => Some(ImageGeometry {
                height: *h,
                width: *w,
                channels: *c,
            }),
            _ => None,
        }
    }

    pub(crate) fn expect_dtype(&self, expected: DType) -> Result<(), InferenceError> {
        if self.dtype != expected {
            return Err(InferenceError::TypeMismatch {
                tensor: self.name.clone(),
                expected,
                actual: self.dtype,
            });
        }
        Ok(())
    }

    pub(crate) fn expect_shape(&self, expected: &[usize]) -> Result<(), InferenceError> {
        if self.shape != expected {
            return Err(InferenceError::ShapeMismatch {
                tensor: self.name.clone(),
                expected: expected.to_vec(),
                actual: self.shape.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn quant(&self) -> Result<QuantParams, InferenceError> {
        self.quant
            .ok_or_else(|| InferenceError::InvalidModel(format!("tensor {} has no quantization", self.name)))
    }
}

/// Read-only view of a tensor living in the engine's arena.
///
/// Borrowed from the engine, so it cannot outlive it or coexist with `invoke`.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    info: &'a TensorInfo,
    data: &'a [u8],
}

impl<'a> TensorView<'a> {
    pub(crate) fn new(info: &'a TensorInfo, data: &'a [u8]) -> Self {
        Self { info, data }
    }

    pub fn info(&self) -> &'a TensorInfo {
        self.info
    }

    pub fn dtype(&self) -> DType {
        self.info.dtype
    }

    pub fn shape(&self) -> &'a [usize] {
        &self.info.shape
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Elements as `f32`; fails unless the tensor is float32
    pub fn as_f32(&self) -> Result<&'a [f32], InferenceError> {
        self.info.expect_dtype(DType::F32)?;
        bytemuck::try_cast_slice(self.data).map_err(|_| InferenceError::Misaligned(self.info.name.clone()))
    }

    /// Elements as `i8`; fails unless the tensor is int8
    pub fn as_i8(&self) -> Result<&'a [i8], InferenceError> {
        self.info.expect_dtype(DType::I8)?;
        Ok(bytemuck::cast_slice(self.data))
    }
}

/// Writable view of a tensor living in the engine's arena
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    info: &'a TensorInfo,
    data: &'a mut [u8],
}

impl<'a> TensorViewMut<'a> {
    pub(crate) fn new(info: &'a TensorInfo, data: &'a mut [u8]) -> Self {
        Self { info, data }
    }

    pub fn info(&self) -> &'a TensorInfo {
        self.info
    }

    pub fn dtype(&self) -> DType {
        self.info.dtype
    }

    pub fn shape(&self) -> &'a [usize] {
        &self.info.shape
    }

    /// Mutable elements as `f32`; fails unless the tensor is float32
    pub fn as_f32_mut(&mut self) -> Result<&mut [f32], InferenceError> {
        let info = self.info;
        info.expect_dtype(DType::F32)?;
        bytemuck::try_cast_slice_mut(&mut *self.data).map_err(|_| InferenceError::Misaligned(info.name.clone()))
    }

    /// Consume the view into mutable `f32` elements tied to the engine borrow
    pub fn into_f32_mut(self) -> Result<&'a mut [f32], InferenceError> {
        let info = self.info;
        info.expect_dtype(DType::F32)?;
        bytemuck::try_cast_slice_mut(self.data).map_err(|_| InferenceError::Misaligned(info.name.clone()))
    }

    /// Mutable elements as `i8`; fails unless the tensor is int8
    pub fn as_i8_mut(&mut self) -> Result<&mut [i8], InferenceError> {
        self.info.expect_dtype(DType::I8)?;
        Ok(bytemuck::cast_slice_mut(&mut *self.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(shape: &[usize]) -> TensorInfo {
        TensorInfo {
            name: "t".into(),
            dtype: DType::F32,
            shape: shape.to_vec(),
            quant: None,
        }
    }

    #[test]
    fn test_quantize_round_trip_and_saturation() {
        let q = QuantParams::new(0.5, -3);
        assert_eq!(q.quantize(1.0), -1);
        assert_eq!(q.dequantize(-1), 1.0);
        assert_eq!(q.quantize(1000.0), 127);
        assert_eq!(q.quantize(-1000.0), -128);
    }

    #[test]
    fn test_image_geometry_follows_layout() {
        let nhwc = info(&[1, 32, 24, 1]);
        assert_eq!(
            nhwc.image_geometry(Layout::Nhwc),
            Some(ImageGeometry { height: 32, width: 24, channels: 1 })
        );
        let nchw = info(&[1, 1, 32, 24]);
        assert_eq!(
            nchw.image_geometry(Layout::Nchw),
            Some(ImageGeometry { height: 32, width: 24, channels: 1 })
        );
        assert_eq!(info(&[2, 32, 24, 1]).image_geometry(Layout::Nhwc), None);
        assert_eq!(info(&[32, 24]).image_geometry(Layout::Nhwc), None);
    }

    #[test]
    fn test_view_rejects_wrong_dtype() {
        let info = TensorInfo {
            name: "q".into(),
            dtype: DType::I8,
            shape: vec![4],
            quant: Some(QuantParams::new(1.0, 0)),
        };
        let data = [0u8; 4];
        let view = TensorView::new(&info, &data);
        assert!(matches!(view.as_f32(), Err(InferenceError::TypeMismatch { .. })));
        assert_eq!(view.as_i8().unwrap().len(), 4);
    }
}
