//! Latest-wins frame slot
//!
//! One writer (the frame delivery thread) and occasional readers (tap handler,
//! live classification). A write never waits: if the slot is busy the new frame
//! is dropped, there is no queue.

use parking_lot::Mutex;

use super::frame::{CapturedFrame, FrameBuffer};

/// Single-slot overwritable frame cell
#[derive(Debug, Default)]
pub struct LatestFrame {
    buffer: Mutex<FrameBuffer>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(FrameBuffer::new()),
        }
    }

    /// Offer a frame to the slot.
    ///
    /// Returns false when the frame was dropped because the slot was busy.
    pub fn offer(&self, frame: &CapturedFrame) -> bool {
        match self.buffer.try_lock() {
            Some(mut buffer) => {
                buffer.overwrite(frame);
                true
            }
            None => false,
        }
    }

    /// Copy of the most recent frame
    pub fn snapshot(&self) -> Option<CapturedFrame> {
        self.buffer.lock().current().cloned()
    }

    pub fn has_frame(&self) -> bool {
        !self.buffer.lock().is_empty()
    }
}
