//! FFI bindings for the on-board camera driver
//!
//! The driver is brought up by the firmware bootstrap before any source is
//! created; this module only borrows frame buffers from it and hands them back.

use std::os::raw::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, info, warn};

use crate::frame::FrameBuffer;
use crate::{CameraError, Frame, FrameSource, PixelFormat};

/// C pixel format enum (matches `pixformat_t`)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CPixelFormat {
    Rgb565 = 0,
    Yuv422 = 1,
    Yuv420 = 2,
    Grayscale = 3,
    Jpeg = 4,
    Rgb888 = 5,
    Raw = 6,
    Rgb444 = 7,
    Rgb555 = 8,
}

/// C frame buffer structure (matches `camera_fb_t`)
#[repr(C)]
pub struct CCameraFb {
    pub buf: *mut u8,
    pub len: usize,
    pub width: usize,
    pub height: usize,
    pub format: CPixelFormat,
    pub timestamp: libc::timeval,
}

extern "C" {
    fn esp_camera_fb_get() -> *mut CCameraFb;
    fn esp_camera_fb_return(fb: *mut CCameraFb);
    fn esp_camera_sensor_get() -> *mut c_void;
}

/// Driver frame buffer, returned to the driver exactly once when dropped
pub(crate) struct DriverBuffer {
    ptr: NonNull<CCameraFb>,
}

impl DriverBuffer {
    pub(crate) fn data(&self) -> &[u8] {
        unsafe {
            let fb = self.ptr.as_ref();
            if fb.buf.is_null() {
                return &[];
            }
            std::slice::from_raw_parts(fb.buf, fb.len)
        }
    }

    fn header(&self) -> &CCameraFb {
        unsafe { self.ptr.as_ref() }
    }
}

impl Drop for DriverBuffer {
    fn drop(&mut self) {
        unsafe { esp_camera_fb_return(self.ptr.as_ptr()) }
    }
}

// The driver hands out heap buffers that may be returned from any task.
unsafe impl Send for DriverBuffer {}
unsafe impl Sync for DriverBuffer {}

/// Hardware-backed frame source
pub struct SensorCamera {
    sequence: AtomicU32,
}

impl SensorCamera {
    /// Attach to an already initialized camera driver
    pub fn attach() -> Result<Self, CameraError> {
        let sensor = unsafe { esp_camera_sensor_get() };
        if sensor.is_null() {
            return Err(CameraError::NotInitialized);
        }
        info!("Attached to camera driver");
        Ok(Self {
            sequence: AtomicU32::new(0),
        })
    }
}

impl FrameSource for SensorCamera {
    fn acquire(&self) -> Result<Frame, CameraError> {
        let ptr = NonNull::new(unsafe { esp_camera_fb_get() }).ok_or(CameraError::NoFrame)?;
        let buffer = DriverBuffer { ptr };

        let header = buffer.header();
        let format = match header.format {
            CPixelFormat::Grayscale => PixelFormat::Grayscale,
            CPixelFormat::Jpeg => PixelFormat::Jpeg,
            other => {
                warn!("Camera returned unsupported pixel format {:?}", other);
                // `buffer` goes back to the driver here
                return Err(CameraError::Format(format!("{:?}", other)));
            }
        };
        let width = header.width as u32;
        let height = header.height as u32;

        if format == PixelFormat::Grayscale && buffer.data().len() != width as usize * height as usize {
            return Err(CameraError::BufferLength {
                width,
                height,
                expected: width as usize * height as usize,
                actual: buffer.data().len(),
            });
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        debug!("Captured frame {} ({}x{} {})", sequence, width, height, format.as_str());
        Ok(Frame::from_buffer(FrameBuffer::Driver(buffer), width, height, format).with_sequence(sequence))
    }

    fn release(&self, frame: Frame) {
        debug!("Returning frame {} to driver", frame.sequence());
        drop(frame);
    }
}
