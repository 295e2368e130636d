//! Frame types

use std::fmt;
use std::sync::Arc;

use crate::CameraError;

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One luminance byte per pixel
    Grayscale,
    /// JPEG-compressed stream
    Jpeg,
}

impl PixelFormat {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Grayscale => "grayscale",
            PixelFormat::Jpeg => "jpeg",
        }
    }

    /// MIME type used when the frame is served over HTTP
    pub fn content_type(&self) -> &'static str {
        match self {
            PixelFormat::Grayscale => "application/octet-stream",
            PixelFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Storage behind a frame. Each variant is returned to its producer when dropped.
pub(crate) enum FrameBuffer {
    /// Heap buffer owned by the frame (encoder output, ad-hoc frames)
    Owned(Vec<u8>),
    /// Fixed content shared with the producing source
    Shared(Arc<[u8]>),
    /// Content linked into the binary
    Static(&'static [u8]),
    /// Driver frame buffer, handed back to the driver on drop
    #[cfg(feature = "hardware")]
    Driver(crate::ffi::DriverBuffer),
}

impl FrameBuffer {
    fn as_slice(&self) -> &[u8] {
        match self {
            FrameBuffer::Owned(data) => data,
            FrameBuffer::Shared(data) => data,
            FrameBuffer::Static(data) => data,
            #[cfg(feature = "hardware")]
            FrameBuffer::Driver(buffer) => buffer.data(),
        }
    }
}

/// One captured image plus its metadata
pub struct Frame {
    buffer: FrameBuffer,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u32,
}

impl Frame {
    /// Create a grayscale frame owning `data` (`width * height` bytes)
    pub fn grayscale(data: Vec<u8>, width: u32, height: u32) -> Result<Self, CameraError> {
        check_grayscale_len(data.len(), width, height)?;
        Ok(Self::from_buffer(FrameBuffer::Owned(data), width, height, PixelFormat::Grayscale))
    }

    /// Create a grayscale frame over pixels linked into the binary
    pub fn grayscale_static(data: &'static [u8], width: u32, height: u32) -> Result<Self, CameraError> {
        check_grayscale_len(data.len(), width, height)?;
        Ok(Self::from_buffer(FrameBuffer::Static(data), width, height, PixelFormat::Grayscale))
    }

    /// Wrap a compressed JPEG stream. Dimensions describe the encoded image.
    pub fn jpeg(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self::from_buffer(FrameBuffer::Owned(data), width, height, PixelFormat::Jpeg)
    }

    pub(crate) fn from_buffer(buffer: FrameBuffer, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            buffer,
            width,
            height,
            format,
            sequence: 0,
        }
    }

    pub(crate) fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Raw bytes in the frame's pixel format
    pub fn data(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Byte length of the buffer
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel format tag
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Sequence number assigned by the producing source
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Get the luminance at (x, y) of a grayscale frame
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<u8> {
        if self.format != PixelFormat::Grayscale || x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.data().get(idx).copied()
    }

    /// Whether both frames are backed by the same memory
    pub fn shares_buffer_with(&self, other: &Frame) -> bool {
        std::ptr::eq(self.data().as_ptr(), other.data().as_ptr()) && self.len() == other.len()
    }

    /// Consume the frame and return its bytes, copying only if the buffer is not owned
    pub fn into_bytes(self) -> Vec<u8> {
        match self.buffer {
            FrameBuffer::Owned(data) => data,
            other => other.as_slice().to_vec(),
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("len", &self.len())
            .field("sequence", &self.sequence)
            .finish()
    }
}

fn check_grayscale_len(actual: usize, width: u32, height: u32) -> Result<(), CameraError> {
    let expected = width as usize * height as usize;
    if actual != expected {
        return Err(CameraError::BufferLength {
            width,
            height,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grayscale_length_checked() {
        assert!(Frame::grayscale(vec![0; 12], 4, 3).is_ok());
        let err = Frame::grayscale(vec![0; 11], 4, 3).unwrap_err();
        assert!(matches!(err, CameraError::BufferLength { expected: 12, actual: 11, .. }));
    }

    #[test]
    fn test_get_pixel() {
        let frame = Frame::grayscale((0..12).collect(), 4, 3).unwrap();
        assert_eq!(frame.get_pixel(0, 0), Some(0));
        assert_eq!(frame.get_pixel(3, 2), Some(11));
        assert_eq!(frame.get_pixel(4, 0), None);
        assert_eq!(frame.get_pixel(0, 3), None);
    }

    #[test]
    fn test_jpeg_has_no_pixels() {
        let frame = Frame::jpeg(vec![0xFF, 0xD8, 0xFF], 2, 2);
        assert_eq!(frame.format(), PixelFormat::Jpeg);
        assert_eq!(frame.get_pixel(0, 0), None);
        assert_eq!(frame.format().content_type(), "image/jpeg");
    }

    #[test]
    fn test_into_bytes_copies_static() {
        static PIXELS: [u8; 4] = [1, 2, 3, 4];
        let frame = Frame::grayscale_static(&PIXELS, 2, 2).unwrap();
        assert_eq!(frame.into_bytes(), vec![1, 2, 3, 4]);
    }
}
