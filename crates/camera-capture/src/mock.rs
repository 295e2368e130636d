//! Deterministic frame source for host-side runs and tests

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::frame::FrameBuffer;
use crate::{CameraError, Frame, FrameSource, PixelFormat};

/// Side length of the built-in mock frame (matches the sensor's 96x96 mode)
pub const MOCK_FRAME_SIZE: u32 = 96;

/// Luminance of every pixel in the built-in mock frame
pub const MOCK_FRAME_LEVEL: u8 = 128;

static MID_GRAY: [u8; (MOCK_FRAME_SIZE * MOCK_FRAME_SIZE) as usize] =
    [MOCK_FRAME_LEVEL; (MOCK_FRAME_SIZE * MOCK_FRAME_SIZE) as usize];

enum MockPixels {
    Static(&'static [u8]),
    Shared(Arc<[u8]>),
}

/// Fixed-content camera: every `acquire` returns byte-identical pixels.
pub struct MockCamera {
    pixels: MockPixels,
    width: u32,
    height: u32,
    available: AtomicBool,
    sequence: AtomicU32,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl MockCamera {
    /// Built-in 96x96 frame where every pixel is mid-gray
    pub fn mid_gray() -> Self {
        info!("Creating mock camera ({}x{} mid-gray)", MOCK_FRAME_SIZE, MOCK_FRAME_SIZE);
        Self::with_pixels(MockPixels::Static(&MID_GRAY), MOCK_FRAME_SIZE, MOCK_FRAME_SIZE)
    }

    /// Serve the given grayscale pixels on every acquisition
    pub fn from_pixels(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self, CameraError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(CameraError::BufferLength {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        info!("Creating mock camera ({}x{} fixed frame)", width, height);
        Ok(Self::with_pixels(MockPixels::Shared(pixels.into()), width, height))
    }

    fn with_pixels(pixels: MockPixels, width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            available: AtomicBool::new(true),
            sequence: AtomicU32::new(0),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Simulate a sensor with no frame ready
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Frames successfully acquired so far
    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    /// Frames released so far
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }

    /// Frames acquired but not yet released
    pub fn outstanding(&self) -> usize {
        self.acquired_count().saturating_sub(self.released_count())
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::mid_gray()
    }
}

impl FrameSource for MockCamera {
    fn acquire(&self) -> Result<Frame, CameraError> {
        if !self.available.load(Ordering::Acquire) {
            debug!("Mock camera: no frame available");
            return Err(CameraError::NoFrame);
        }

        let buffer = match &self.pixels {
            MockPixels::Static(pixels) => FrameBuffer::Static(*pixels),
            MockPixels::Shared(pixels) => FrameBuffer::Shared(Arc::clone(pixels)),
        };
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.acquired.fetch_add(1, Ordering::AcqRel);

        Ok(Frame::from_buffer(buffer, self.width, self.height, PixelFormat::Grayscale).with_sequence(sequence))
    }

    fn release(&self, frame: Frame) {
        debug!("Mock camera: releasing frame {}", frame.sequence());
        self.released.fetch_add(1, Ordering::AcqRel);
        drop(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_gray_content() {
        let camera = MockCamera::mid_gray();
        let frame = camera.acquire().unwrap();
        assert_eq!(frame.format(), PixelFormat::Grayscale);
        assert_eq!(frame.len(), 96 * 96);
        assert!(frame.data().iter().all(|&p| p == MOCK_FRAME_LEVEL));
        camera.release(frame);
    }

    #[test]
    fn test_repeated_acquire_is_byte_identical() {
        let camera = MockCamera::from_pixels((0..=255).cycle().take(64 * 48).collect(), 64, 48).unwrap();
        let first = camera.acquire().unwrap();
        let first_bytes = first.data().to_vec();
        camera.release(first);

        let second = camera.acquire().unwrap();
        assert_eq!(second.data(), first_bytes.as_slice());
        assert_eq!(second.sequence(), 1);
        camera.release(second);
        assert_eq!(camera.outstanding(), 0);
    }

    #[test]
    fn test_unavailable() {
        let camera = MockCamera::mid_gray();
        camera.set_available(false);
        assert!(matches!(camera.acquire(), Err(CameraError::NoFrame)));
        camera.set_available(true);
        assert!(camera.acquire().is_ok());
    }

    #[test]
    fn test_from_pixels_rejects_wrong_length() {
        assert!(MockCamera::from_pixels(vec![0; 10], 4, 4).is_err());
    }
}
