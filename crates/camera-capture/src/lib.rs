//! Camera Capture Library for the Gesture Camera
//!
//! Provides the frame acquisition side of the gesture pipeline:
//! - `Frame`: one captured image plus its metadata
//! - `FrameSource`: acquire/release contract shared by every source
//! - `MockCamera`: deterministic, fixed-content source for host-side runs
//! - `SensorCamera`: FFI bindings to the on-board camera driver (`hardware` feature)

#[cfg(feature = "hardware")]
pub mod ffi;
pub mod frame;
pub mod mock;
pub mod source;

pub use frame::{Frame, PixelFormat};
pub use mock::MockCamera;
pub use source::{CapturedFrame, FrameSource};

#[cfg(feature = "hardware")]
pub use ffi::SensorCamera;

use thiserror::Error;

/// Frame source selected at build time.
#[cfg(feature = "hardware")]
pub type DeviceCamera = SensorCamera;

/// Frame source selected at build time.
#[cfg(not(feature = "hardware"))]
pub type DeviceCamera = MockCamera;

/// Attach to the on-board camera driver
#[cfg(feature = "hardware")]
pub fn open_device_camera() -> Result<DeviceCamera, CameraError> {
    SensorCamera::attach()
}

/// Host builds serve the built-in mid-gray frame
#[cfg(not(feature = "hardware"))]
pub fn open_device_camera() -> Result<DeviceCamera, CameraError> {
    Ok(MockCamera::mid_gray())
}

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("No frame available")]
    NoFrame,

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Buffer length {actual} does not match {width}x{height} ({expected} bytes)")]
    BufferLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Camera not initialized")]
    NotInitialized,
}
