//! Overlay Presentation Layer
//!
//! The screen has two regions driven by the analysis session: a text overlay
//! with the recognized product and a frozen-image region shown while paused.
//! `ConsoleOverlay` is the headless rendering: it logs overlay changes and
//! writes the frozen image to disk.

use image::DynamicImage;
use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A surface that can render the overlay regions
pub trait Presenter: Send + Sync {
    /// Show text in the overlay region
    fn show_label(&self, text: &str);

    /// Hide the overlay text
    fn hide_label(&self);

    /// Show the frozen frame
    fn show_frozen_image(&self, image: &DynamicImage);

    /// Hide the frozen frame
    fn hide_frozen_image(&self);
}

/// What is currently on screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayState {
    /// Overlay text, if visible
    pub label: Option<String>,
    /// Whether the frozen-image region is visible
    pub frozen_visible: bool,
}

/// Headless presenter
pub struct ConsoleOverlay {
    state: RwLock<OverlayState>,
    snapshot_path: Option<PathBuf>,
}

impl ConsoleOverlay {
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            state: RwLock::new(OverlayState::default()),
            snapshot_path,
        }
    }
}

impl Presenter for ConsoleOverlay {
    fn show_label(&self, text: &str) {
        let mut state = self.state.write();
        // Continuous mode re-renders every frame; only log changes
        if state.label.as_deref() != Some(text) {
            info!("Overlay: {}", text);
            state.label = Some(text.to_string());
        }
    }

    fn hide_label(&self) {
        let mut state = self.state.write();
        if state.label.take().is_some() {
            debug!("Overlay text hidden");
        }
    }

    fn show_frozen_image(&self, image: &DynamicImage) {
        self.state.write().frozen_visible = true;

        let Some(path) = &self.snapshot_path else {
            debug!("Frozen image {}x{} (no snapshot path)", image.width(), image.height());
            return;
        };
        match image.save(path) {
            Ok(()) => info!("Frozen image written to {:?}", path),
            Err(e) => warn!("Failed to write frozen image to {:?}: {}", path, e),
        }
    }

    fn hide_frozen_image(&self) {
        self.state.write().frozen_visible = false;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Arc;

    impl ConsoleOverlay {
        pub fn state(&self) -> OverlayState {
            self.state.read().clone()
        }
    }

    /// Presenter that records screen state and the last frozen image size
    #[derive(Debug, Default, Clone)]
    pub struct RecordingPresenter {
        pub state: Arc<RwLock<OverlayState>>,
        pub frozen_size: Arc<RwLock<Option<(u32, u32)>>>,
    }

    impl RecordingPresenter {
        pub fn label(&self) -> Option<String> {
            self.state.read().label.clone()
        }

        pub fn frozen_visible(&self) -> bool {
            self.state.read().frozen_visible
        }
    }

    impl Presenter for RecordingPresenter {
        fn show_label(&self, text: &str) {
            self.state.write().label = Some(text.to_string());
        }

        fn hide_label(&self) {
            self.state.write().label = None;
        }

        fn show_frozen_image(&self, image: &DynamicImage) {
            self.state.write().frozen_visible = true;
            *self.frozen_size.write() = Some((image.width(), image.height()));
        }

        fn hide_frozen_image(&self) {
            self.state.write().frozen_visible = false;
        }
    }
}
