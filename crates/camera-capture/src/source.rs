//! Frame source contract and the scoped capture guard

use std::fmt;
use std::ops::Deref;

use crate::{CameraError, Frame};

/// Anything that can hand out camera frames.
///
/// `acquire` must fail fast with [`CameraError::NoFrame`] when nothing is ready;
/// retry policy belongs to the caller. Every frame returned by `acquire` has to
/// go back through `release` exactly once, which [`FrameSource::capture`]
/// enforces by wrapping the frame in a [`CapturedFrame`].
pub trait FrameSource: Send + Sync {
    /// Acquire one frame
    fn acquire(&self) -> Result<Frame, CameraError>;

    /// Return a frame's backing storage to the allocator that produced it
    fn release(&self, frame: Frame);

    /// Acquire a frame that is released when the guard goes out of scope
    fn capture(&self) -> Result<CapturedFrame<'_, Self>, CameraError> {
        let frame = self.acquire()?;
        Ok(CapturedFrame {
            source: self,
            frame: Some(frame),
        })
    }
}

/// Captured frame with RAII release
pub struct CapturedFrame<'a, S: FrameSource + ?Sized> {
    source: &'a S,
    frame: Option<Frame>,
}

impl<S: FrameSource + ?Sized> CapturedFrame<'_, S> {
    /// Release the frame now instead of at end of scope
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(frame) = self.frame.take() {
            self.source.release(frame);
        }
    }
}

impl<S: FrameSource + ?Sized> Deref for CapturedFrame<'_, S> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        // Only `release_inner` empties the slot, and it runs on consumption or drop.
        match &self.frame {
            Some(frame) => frame,
            None => unreachable!("captured frame accessed after release"),
        }
    }
}

impl<S: FrameSource + ?Sized> Drop for CapturedFrame<'_, S> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl<S: FrameSource + ?Sized> fmt::Debug for CapturedFrame<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFrame").field("frame", &self.frame).finish()
    }
}
