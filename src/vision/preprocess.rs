//! Image preprocessing for the classification model
//!
//! Fixed pipeline applied to every frame before inference:
//! crop to a centered square, nearest-neighbor resize, counter-rotate the
//! sensor orientation, normalize [0, 255] to [-1, 1].

use image::{imageops, imageops::FilterType, RgbImage, RgbaImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::frame::CapturedFrame;

/// Normalization mean and std (MobileNetV2: (v - 127.5) / 127.5)
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

/// Memory layout of the model input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// [batch, height, width, channels]
    #[default]
    Nhwc,
    /// [batch, channels, height, width]
    Nchw,
}

/// Preprocessing configuration
#[derive(Debug, Clone, Copy)]
pub struct PreprocessConfig {
    /// Model input width
    pub target_width: u32,
    /// Model input height
    pub target_height: u32,
    /// Tensor layout expected by the model
    pub layout: TensorLayout,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_width: 224,
            target_height: 224,
            layout: TensorLayout::Nhwc,
        }
    }
}

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    MalformedFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame has zero area")]
    EmptyFrame,
}

/// Crop (centered) to a square using the shorter side
pub fn crop_to_square(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let side = w.min(h);
    let x = (w - side) / 2;
    let y = (h - side) / 2;
    imageops::crop_imm(image, x, y, side, side).to_image()
}

/// Nearest-neighbor resize to the model input size
pub fn resize_nearest(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Nearest)
}

/// Counter-clockwise quarter turns that undo a sensor rotation.
///
/// Equals `-rotation_degrees / 90` reduced mod 4. Rotations that are not a
/// multiple of 90 are truncated toward zero.
pub fn counter_rotation_turns(rotation_degrees: i32) -> u32 {
    (-(rotation_degrees / 90)).rem_euclid(4) as u32
}

/// Rotate counter-clockwise by `turns` quarter turns
pub fn rotate_ccw(image: &RgbaImage, turns: u32) -> RgbaImage {
    match turns % 4 {
        0 => image.clone(),
        1 => imageops::rotate270(image),
        2 => imageops::rotate180(image),
        _ => imageops::rotate90(image),
    }
}

/// Normalize RGB channels into a batch-of-one tensor (alpha is dropped)
pub fn normalize_to_tensor(image: &RgbaImage, layout: TensorLayout) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);

    let mut tensor = match layout {
        TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
        TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
    };

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            let value = (pixel[c] as f32 - NORM_MEAN) / NORM_STD;
            match layout {
                TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
            }
        }
    }

    tensor
}

/// Full preprocessing pipeline for classification
pub fn preprocess_frame(
    frame: &CapturedFrame,
    config: &PreprocessConfig,
) -> Result<Array4<f32>, PreprocessError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(PreprocessError::EmptyFrame);
    }

    let expected = frame.width as usize * frame.height as usize * 4;
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or(
        PreprocessError::MalformedFrame {
            width: frame.width,
            height: frame.height,
            expected,
            actual: frame.data.len(),
        },
    )?;

    // 1. Center square crop
    let square = crop_to_square(&image);

    // 2. Resize to model input
    let resized = resize_nearest(&square, config.target_width, config.target_height);

    // 3. Undo sensor rotation
    let rotated = rotate_ccw(&resized, counter_rotation_turns(frame.rotation_degrees));

    // 4. Normalize into the input tensor
    Ok(normalize_to_tensor(&rotated, config.layout))
}

/// Turn a normalized input tensor back into a viewable RGB image
pub fn tensor_to_image(tensor: &Array4<f32>, layout: TensorLayout) -> RgbImage {
    let (_, d1, d2, d3) = tensor.dim();
    let (h, w) = match layout {
        TensorLayout::Nhwc => (d1, d2),
        TensorLayout::Nchw => (d2, d3),
    };

    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let mut rgb = [0u8; 3];
        for (c, channel) in rgb.iter_mut().enumerate() {
            let value = match layout {
                TensorLayout::Nhwc => tensor[[0, y, x, c]],
                TensorLayout::Nchw => tensor[[0, c, y, x]],
            };
            *channel = (((value + 1.0) / 2.0) * 255.0).clamp(0.0, 255.0) as u8;
        }
        image::Rgb(rgb)
    })
}

/// Rotate a raw frame clockwise by its rotation metadata so it displays upright
pub fn orient_frame(frame: &CapturedFrame) -> Option<RgbaImage> {
    let image = frame.to_rgba_image()?;
    let turns = (frame.rotation_degrees / 90).rem_euclid(4);
    Some(match turns {
        0 => image,
        1 => imageops::rotate90(&image),
        2 => imageops::rotate180(&image),
        _ => imageops::rotate270(&image),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gray(v: u8) -> Rgba<u8> {
        Rgba([v, v, v, 255])
    }

    #[test]
    fn test_crop_to_square_uses_shorter_side() {
        // 4x2 image, columns 0..4 marked by value
        let image = RgbaImage::from_fn(4, 2, |x, _| gray(x as u8 * 10));
        let square = crop_to_square(&image);

        assert_eq!(square.dimensions(), (2, 2));
        assert_eq!(square.get_pixel(0, 0), &gray(10));
        assert_eq!(square.get_pixel(1, 0), &gray(20));
    }

    #[test]
    fn test_counter_rotation_turns() {
        assert_eq!(counter_rotation_turns(0), 0);
        assert_eq!(counter_rotation_turns(90), 3);
        assert_eq!(counter_rotation_turns(180), 2);
        assert_eq!(counter_rotation_turns(270), 1);
        assert_eq!(counter_rotation_turns(-90), 1);
        // Not a multiple of 90: truncated
        assert_eq!(counter_rotation_turns(135), 3);
    }

    #[test]
    fn test_rotation_undoes_sensor_orientation() {
        // a b
        // c d
        let image = RgbaImage::from_fn(2, 2, |x, y| gray((y * 2 + x) as u8));

        // Sensor rotated 90: one clockwise turn
        let rotated = rotate_ccw(&image, counter_rotation_turns(90));
        // c a
        // d b
        assert_eq!(rotated.get_pixel(0, 0), &gray(2));
        assert_eq!(rotated.get_pixel(1, 0), &gray(0));
        assert_eq!(rotated.get_pixel(0, 1), &gray(3));
        assert_eq!(rotated.get_pixel(1, 1), &gray(1));
    }

    #[test]
    fn test_normalize_range() {
        let image = RgbaImage::from_fn(2, 1, |x, _| if x == 0 { gray(0) } else { gray(255) });
        let tensor = normalize_to_tensor(&image, TensorLayout::Nhwc);

        assert_eq!(tensor.dim(), (1, 1, 2, 3));
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 1, 2]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_frame_shapes() {
        let frame = CapturedFrame::new(vec![128; 64 * 48 * 4], 64, 48, 90);
        let config = PreprocessConfig {
            target_width: 16,
            target_height: 16,
            layout: TensorLayout::Nhwc,
        };
        let tensor = preprocess_frame(&frame, &config).unwrap();
        assert_eq!(tensor.dim(), (1, 16, 16, 3));

        let nchw = preprocess_frame(
            &frame,
            &PreprocessConfig {
                layout: TensorLayout::Nchw,
                ..config
            },
        )
        .unwrap();
        assert_eq!(nchw.dim(), (1, 3, 16, 16));
        assert!((nchw[[0, 1, 3, 3]] - (128.0 - 127.5) / 127.5).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_rejects_malformed_frame() {
        let frame = CapturedFrame::new(vec![0; 10], 4, 4, 0);
        let result = preprocess_frame(&frame, &PreprocessConfig::default());
        assert!(matches!(result, Err(PreprocessError::MalformedFrame { .. })));

        let empty = CapturedFrame::new(vec![], 0, 0, 0);
        assert!(matches!(
            preprocess_frame(&empty, &PreprocessConfig::default()),
            Err(PreprocessError::EmptyFrame)
        ));
    }

    #[test]
    fn test_tensor_to_image_roundtrip_values() {
        let image = RgbaImage::from_fn(3, 3, |x, y| gray((x * 40 + y * 80) as u8));
        let tensor = normalize_to_tensor(&image, TensorLayout::Nchw);
        let back = tensor_to_image(&tensor, TensorLayout::Nchw);

        assert_eq!(back.dimensions(), (3, 3));
        let original = image.get_pixel(2, 1)[0] as i32;
        let restored = back.get_pixel(2, 1)[0] as i32;
        assert!((original - restored).abs() <= 1);
    }

    #[test]
    fn test_orient_frame_rotates_clockwise() {
        let frame = CapturedFrame::new(vec![0; 4 * 2 * 4], 4, 2, 90);
        let upright = orient_frame(&frame).unwrap();
        assert_eq!(upright.dimensions(), (2, 4));
    }
}
