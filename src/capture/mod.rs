//! Frame Capture Layer
//!
//! Frame sources deliver RGBA frames on a dedicated background thread. The
//! camera stack itself is external; `ReplaySource` plays still images from disk
//! at a fixed rate so the pipeline can run against recorded shelf photos.

pub mod frame;
pub mod slot;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use self::frame::CapturedFrame;

/// Errors raised while opening a frame source
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("frame source {0:?} is not accessible: {1}")]
    Unavailable(PathBuf, String),
    #[error("frame source {0:?} contains no decodable images")]
    NoFrames(PathBuf),
    #[error("failed to start frame delivery thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Requested frame aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "4:3")]
    Ratio4x3,
    #[serde(rename = "16:9")]
    Ratio16x9,
}

impl AspectRatio {
    /// Long side over short side
    pub fn long_over_short(&self) -> f32 {
        match self {
            AspectRatio::Ratio4x3 => 4.0 / 3.0,
            AspectRatio::Ratio16x9 => 16.0 / 9.0,
        }
    }
}

/// Parameters of a frame subscription
#[derive(Debug, Clone, Copy)]
pub struct StreamRequest {
    /// Aspect ratio of delivered frames
    pub aspect_ratio: AspectRatio,
    /// Rotation metadata attached to every frame
    pub rotation_degrees: i32,
}

/// Callback invoked on the delivery thread for every frame.
/// The frame is released when the callback drops it.
pub type FrameCallback = Box<dyn FnMut(CapturedFrame) + Send + 'static>;

/// Something that can stream frames to a callback
pub trait FrameSource {
    fn subscribe(
        &mut self,
        request: StreamRequest,
        on_frame: FrameCallback,
    ) -> Result<Subscription, CaptureError>;
}

/// Handle to a running frame delivery thread
pub struct Subscription {
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop delivery and wait up to `timeout` for the thread to drain.
    ///
    /// Returns false if the thread did not finish in time; it is then
    /// detached and exits on its own after the in-flight callback.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::SeqCst);

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                info!("Frame delivery stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Frame delivery did not drain within {:?}, detaching thread",
                    timeout
                );
                self.handle.take();
                false
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Without an explicit stop the thread is told to exit and left detached
        if !self.stop.swap(true, Ordering::SeqCst) {
            debug!("Subscription dropped, frame delivery signalled to stop");
        }
    }
}

/// Plays still images from a file or directory in a loop
pub struct ReplaySource {
    path: PathBuf,
    max_fps: u32,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, max_fps: u32) -> Self {
        Self {
            path: path.into(),
            max_fps: max_fps.max(1),
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.max_fps as u64)
    }
}

impl FrameSource for ReplaySource {
    fn subscribe(
        &mut self,
        request: StreamRequest,
        mut on_frame: FrameCallback,
    ) -> Result<Subscription, CaptureError> {
        let images = load_images(&self.path)?
            .into_iter()
            .map(|image| crop_to_aspect(&image, request.aspect_ratio))
            .collect::<Vec<_>>();

        info!(
            "Replaying {} image(s) from {:?} at {} fps",
            images.len(),
            self.path,
            self.max_fps
        );

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded::<()>(1);
        let interval = self.frame_interval();
        let thread_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name("frame-delivery".to_string())
            .spawn(move || {
                let mut frame_count: u64 = 0;
                for image in images.iter().cycle() {
                    if thread_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let frame = CapturedFrame::new(
                        image.as_raw().clone(),
                        image.width(),
                        image.height(),
                        request.rotation_degrees,
                    );
                    on_frame(frame);
                    frame_count += 1;
                    std::thread::sleep(interval);
                }
                debug!("Frame delivery thread exiting after {} frames", frame_count);
                let _ = done_tx.send(());
            })?;

        Ok(Subscription {
            stop,
            done: done_rx,
            handle: Some(handle),
        })
    }
}

/// Load a single image or every decodable image in a directory (sorted by name)
pub fn load_images(path: &Path) -> Result<Vec<RgbaImage>, CaptureError> {
    let unavailable = |e: std::io::Error| CaptureError::Unavailable(path.to_path_buf(), e.to_string());

    let mut files = if path.is_dir() {
        std::fs::read_dir(path)
            .map_err(unavailable)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect::<Vec<_>>()
    } else {
        std::fs::metadata(path).map_err(unavailable)?;
        vec![path.to_path_buf()]
    };
    files.sort();

    let images: Vec<RgbaImage> = files
        .iter()
        .filter_map(|file| match image::open(file) {
            Ok(img) => Some(img.to_rgba8()),
            Err(e) => {
                debug!("Skipping {:?}: {}", file, e);
                None
            }
        })
        .collect();

    if images.is_empty() {
        return Err(CaptureError::NoFrames(path.to_path_buf()));
    }
    Ok(images)
}

/// Center-crop an image to the requested aspect ratio, keeping its orientation
pub fn crop_to_aspect(image: &RgbaImage, ratio: AspectRatio) -> RgbaImage {
    let (w, h) = image.dimensions();
    let r = ratio.long_over_short();

    let (crop_w, crop_h) = if w >= h {
        let target_w = (h as f32 * r).round() as u32;
        if target_w <= w {
            (target_w, h)
        } else {
            (w, (w as f32 / r).round() as u32)
        }
    } else {
        let target_h = (w as f32 * r).round() as u32;
        if target_h <= h {
            (w, target_h)
        } else {
            ((h as f32 / r).round() as u32, h)
        }
    };

    let crop_w = crop_w.clamp(1, w.max(1));
    let crop_h = crop_h.clamp(1, h.max(1));
    let x = (w - crop_w) / 2;
    let y = (h - crop_h) / 2;
    imageops::crop_imm(image, x, y, crop_w, crop_h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use image::Rgba;

    #[test]
    fn test_crop_to_aspect_landscape() {
        let image = RgbaImage::from_pixel(800, 400, Rgba([1, 2, 3, 255]));
        let cropped = crop_to_aspect(&image, AspectRatio::Ratio4x3);
        assert_eq!(cropped.dimensions(), (533, 400));
    }

    #[test]
    fn test_crop_to_aspect_portrait() {
        let image = RgbaImage::from_pixel(300, 600, Rgba([1, 2, 3, 255]));
        let cropped = crop_to_aspect(&image, AspectRatio::Ratio4x3);
        assert_eq!(cropped.dimensions(), (300, 400));
    }

    #[test]
    fn test_load_images_missing_path() {
        let result = load_images(Path::new("/nonexistent/frames"));
        assert!(matches!(result, Err(CaptureError::Unavailable(_, _))));
    }

    #[test]
    fn test_load_images_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        let result = load_images(dir.path());
        assert!(matches!(result, Err(CaptureError::NoFrames(_))));
    }

    #[test]
    fn test_replay_source_delivers_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();

        let (tx, rx) = unbounded();
        let mut source = ReplaySource::new(dir.path(), 200);
        let subscription = source
            .subscribe(
                StreamRequest {
                    aspect_ratio: AspectRatio::Ratio4x3,
                    rotation_degrees: 90,
                },
                Box::new(move |frame| {
                    let _ = tx.send(frame);
                }),
            )
            .unwrap();

        let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.dimensions(), (8, 6));
        assert_eq!(frame.rotation_degrees, 90);
        assert!(frame.is_well_formed());

        assert!(subscription.stop(Duration::from_secs(2)));
    }

    #[test]
    fn test_dropped_subscription_stops_delivery() {
        use std::sync::atomic::AtomicUsize;

        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();

        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        let mut source = ReplaySource::new(dir.path(), 200);
        let subscription = source
            .subscribe(
                StreamRequest {
                    aspect_ratio: AspectRatio::Ratio4x3,
                    rotation_degrees: 0,
                },
                Box::new(move |_frame| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        while delivered.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(1));
        }
        drop(subscription);

        // Let the in-flight frame finish, then delivery must be quiet
        std::thread::sleep(Duration::from_millis(50));
        let after_drop = delivered.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(delivered.load(Ordering::SeqCst), after_drop);
    }
}
