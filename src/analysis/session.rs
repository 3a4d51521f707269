//! Analysis session: the live/frozen state machine
//!
//! Owns everything whose lifetime is the running screen: the latest-frame
//! slot, the pause state, the cached prediction and the tap guard. The frame
//! delivery thread calls [`AnalysisSession::on_frame`]; the UI-event thread
//! calls [`AnalysisSession::on_tap`] and [`AnalysisSession::on_swipe`].
//!
//! Lock order is always state -> frame slot. The engine lock lives inside the
//! classifier and is never taken while holding the state lock.

use image::DynamicImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::gesture::Swipe;
use crate::capture::frame::CapturedFrame;
use crate::capture::slot::LatestFrame;
use crate::config::{AppConfig, Phrases, ReportMode};
use crate::overlay::Presenter;
use crate::speech::SpeechSink;
use crate::vision::preprocess::{orient_frame, tensor_to_image};
use crate::vision::{Classifier, FrameAnalysis, Prediction};

/// Pause state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisMode {
    /// Frames are buffered (and classified in continuous mode)
    #[default]
    Live,
    /// Frames are dropped; the last prediction can be queried by swipes
    Frozen,
}

/// Behaviour knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub acceptance_threshold: f32,
    pub report_mode: ReportMode,
    pub show_processed_image: bool,
    pub uppercase_labels: bool,
    pub phrases: Phrases,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            acceptance_threshold: config.analysis.acceptance_threshold,
            report_mode: config.analysis.report_mode,
            show_processed_image: config.analysis.show_processed_image,
            uppercase_labels: config.overlay.uppercase_labels,
            phrases: config.speech.phrases.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What happened to a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Copied into the frame slot
    Buffered,
    /// Copied and classified (continuous mode)
    Classified,
    /// Dropped because analysis is frozen
    DroppedFrozen,
    /// Dropped because the slot was busy
    DroppedBusy,
}

/// What a tap did
#[derive(Debug, Clone, PartialEq)]
pub enum TapOutcome {
    /// Live -> frozen, with the top prediction (if any)
    Frozen(Option<Prediction>),
    /// Frozen -> live
    Resumed,
    /// A previous tap is still being handled
    Ignored,
}

#[derive(Debug, Default)]
struct SessionState {
    mode: AnalysisMode,
    last_prediction: Option<Prediction>,
}

/// Re-enables the tap trigger when the handler returns
struct TapGuard<'a>(&'a AtomicBool);

impl Drop for TapGuard<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Context object for one running analysis screen
pub struct AnalysisSession {
    classifier: Classifier,
    frames: LatestFrame,
    state: Mutex<SessionState>,
    tap_enabled: AtomicBool,
    presenter: Box<dyn Presenter>,
    speech: Box<dyn SpeechSink>,
    settings: SessionSettings,
}

impl AnalysisSession {
    pub fn new(
        classifier: Classifier,
        presenter: Box<dyn Presenter>,
        speech: Box<dyn SpeechSink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            classifier,
            frames: LatestFrame::new(),
            state: Mutex::new(SessionState::default()),
            tap_enabled: AtomicBool::new(true),
            presenter,
            speech,
            settings,
        }
    }

    pub fn mode(&self) -> AnalysisMode {
        self.state.lock().mode
    }

    /// Prediction cached by the last freeze
    pub fn last_prediction(&self) -> Option<Prediction> {
        self.state.lock().last_prediction.clone()
    }

    pub fn has_frame(&self) -> bool {
        self.frames.has_frame()
    }

    pub fn speech(&self) -> &dyn SpeechSink {
        self.speech.as_ref()
    }

    /// Handle a frame from the delivery thread
    pub fn on_frame(&self, frame: CapturedFrame) -> FrameOutcome {
        {
            let state = self.state.lock();
            if state.mode == AnalysisMode::Frozen {
                return FrameOutcome::DroppedFrozen;
            }
            if !self.frames.offer(&frame) {
                return FrameOutcome::DroppedBusy;
            }
        }

        if self.settings.report_mode == ReportMode::OnDemand {
            return FrameOutcome::Buffered;
        }

        let analysis = self.classifier.classify(&frame);
        let state = self.state.lock();
        // A tap may have frozen the screen while we were classifying
        if state.mode == AnalysisMode::Live {
            self.report_prediction(analysis.ranking.top());
        }
        FrameOutcome::Classified
    }

    /// Handle a tap: toggle between live and frozen
    pub fn on_tap(&self) -> TapOutcome {
        if self
            .tap_enabled
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Tap ignored, previous tap still in progress");
            return TapOutcome::Ignored;
        }
        let _guard = TapGuard(&self.tap_enabled);

        match self.mode() {
            AnalysisMode::Frozen => {
                self.resume();
                TapOutcome::Resumed
            }
            AnalysisMode::Live => TapOutcome::Frozen(self.freeze()),
        }
    }

    /// Handle a swipe: speak weight (left) or description (right) while frozen.
    /// Returns the spoken text, or `None` when live.
    pub fn on_swipe(&self, swipe: Swipe) -> Option<String> {
        let prediction = {
            let state = self.state.lock();
            if state.mode == AnalysisMode::Live {
                return None;
            }
            state.last_prediction.clone()
        };

        let accepted = prediction
            .as_ref()
            .filter(|p| p.is_accepted(self.settings.acceptance_threshold));

        let phrases = &self.settings.phrases;
        let text = match swipe {
            Swipe::Left => accepted
                .and_then(|p| p.weight.clone())
                .unwrap_or_else(|| phrases.weight_unavailable.clone()),
            Swipe::Right => accepted
                .and_then(|p| p.description.clone())
                .unwrap_or_else(|| phrases.description_unavailable.clone()),
        };

        info!("Swipe {:?}: {}", swipe, text);
        self.speech.speak(&text);
        Some(text)
    }

    /// Release the inference engine
    pub fn close(&self) -> bool {
        self.classifier.close()
    }

    fn freeze(&self) -> Option<Prediction> {
        // Stop accepting frames before reading the slot
        {
            let mut state = self.state.lock();
            state.mode = AnalysisMode::Frozen;
            state.last_prediction = None;
        }

        let frame = self.frames.snapshot();
        let analysis = match &frame {
            Some(frame) => self.classifier.classify(frame),
            None => {
                info!("Tap before any frame was captured");
                FrameAnalysis::default()
            }
        };

        let best = analysis.ranking.top().cloned();
        self.state.lock().last_prediction = best.clone();

        match &best {
            Some(p) => info!(
                "Frozen on {} ({:.1}%) in {} ms",
                p.label,
                p.score * 100.0,
                analysis.processing_time_ms
            ),
            None => info!("Frozen with no prediction"),
        }

        self.report_prediction(best.as_ref());
        self.speak_prediction(best.as_ref());
        if let Some(image) = self.frozen_image(frame.as_ref(), &analysis) {
            self.presenter.show_frozen_image(&image);
        }

        best
    }

    fn resume(&self) {
        {
            let mut state = self.state.lock();
            state.mode = AnalysisMode::Live;
            state.last_prediction = None;
        }
        info!("Resuming live analysis");
        self.speech.speak(&self.settings.phrases.resume);
        self.presenter.hide_frozen_image();
        self.presenter.hide_label();
    }

    fn report_prediction(&self, prediction: Option<&Prediction>) {
        match prediction.filter(|p| p.is_accepted(self.settings.acceptance_threshold)) {
            Some(p) if self.settings.uppercase_labels => {
                self.presenter.show_label(&p.label.to_uppercase())
            }
            Some(p) => self.presenter.show_label(&p.label),
            None => self.presenter.hide_label(),
        }
    }

    fn speak_prediction(&self, prediction: Option<&Prediction>) {
        match prediction.filter(|p| p.is_accepted(self.settings.acceptance_threshold)) {
            Some(p) => self.speech.speak(&p.label),
            None => self.speech.speak(&self.settings.phrases.unknown),
        }
    }

    fn frozen_image(
        &self,
        frame: Option<&CapturedFrame>,
        analysis: &FrameAnalysis,
    ) -> Option<DynamicImage> {
        if self.settings.show_processed_image {
            if let Some(input) = &analysis.input {
                let layout = self.classifier.preprocess_config().layout;
                return Some(DynamicImage::ImageRgb8(tensor_to_image(input, layout)));
            }
        }
        frame.and_then(orient_frame).map(DynamicImage::ImageRgba8)
    }
}
