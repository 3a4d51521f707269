//! Frame data structures for captured camera content

use std::time::Instant;

/// A captured frame from the frame source
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Clockwise rotation (degrees) needed to show the frame upright
    pub rotation_degrees: i32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(data: Vec<u8>, width: u32, height: u32, rotation_degrees: i32) -> Self {
        Self {
            data,
            width,
            height,
            rotation_degrees,
            timestamp: Instant::now(),
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the pixel buffer holds exactly width * height RGBA pixels
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }

    /// View the frame as an `image` RGBA buffer
    pub fn to_rgba_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Single reusable frame buffer, overwritten in place by every capture.
///
/// The pixel allocation is kept across frames of the same size so the
/// delivery thread does not allocate per frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    frame: Option<CapturedFrame>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self { frame: None }
    }

    /// Copy `src` into the buffer, replacing whatever it held
    pub fn overwrite(&mut self, src: &CapturedFrame) {
        match &mut self.frame {
            Some(dst) => {
                dst.data.clear();
                dst.data.extend_from_slice(&src.data);
                dst.width = src.width;
                dst.height = src.height;
                dst.rotation_degrees = src.rotation_degrees;
                dst.timestamp = src.timestamp;
            }
            None => self.frame = Some(src.clone()),
        }
    }

    /// The most recent frame, if any has been captured
    pub fn current(&self) -> Option<&CapturedFrame> {
        self.frame.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }
}
