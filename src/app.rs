//! Application Coordinator
//!
//! Wires the frame source, the analysis session and the UI-event loop
//! together, and tears them down in order.

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisSession, SessionSettings, SwipeDetector, TapOutcome};
use crate::capture::{FrameSource, StreamRequest, Subscription};
use crate::config::AppConfig;
use crate::overlay::{ConsoleOverlay, Presenter};
use crate::shared::UiEvent;
use crate::speech::{init_speech, SpeechSink};
use crate::vision::{Classifier, LabelTable, MetadataTable, ModelOptions, OnnxEngine};

/// Main application coordinator
pub struct BlindShopApp {
    session: Arc<AnalysisSession>,
    detector: SwipeDetector,
    config: AppConfig,
}

impl BlindShopApp {
    /// Load the model and assets and start speech.
    /// Fails if the model cannot be loaded or its outputs do not match the labels.
    pub fn new(config: AppConfig) -> Result<Self> {
        let model = &config.model;
        let engine = OnnxEngine::load(&ModelOptions {
            model_path: model.model_path.clone(),
            layout: model.layout,
            use_accelerator: model.use_accelerator,
            intra_threads: model.intra_threads,
            sha256: model.sha256.clone(),
        })
        .context("Failed to load classification model")?;

        let labels = LabelTable::load_or_empty(&model.labels_path);
        let metadata = MetadataTable::load_or_empty(&model.metadata_path);
        let classifier = Classifier::new(Box::new(engine), labels, metadata, model.layout)
            .context("Model does not match the label table")?;

        let presenter = ConsoleOverlay::new(config.overlay.snapshot_path.clone());
        let speech = init_speech(&config.speech);

        Ok(Self::with_parts(config, classifier, Box::new(presenter), speech))
    }

    /// Assemble the app from already-built parts
    pub fn with_parts(
        config: AppConfig,
        classifier: Classifier,
        presenter: Box<dyn Presenter>,
        speech: Box<dyn SpeechSink>,
    ) -> Self {
        let session = AnalysisSession::new(
            classifier,
            presenter,
            speech,
            SessionSettings::from_config(&config),
        );
        Self {
            session: Arc::new(session),
            detector: SwipeDetector::new(&config.gesture),
            config,
        }
    }

    pub fn session(&self) -> &Arc<AnalysisSession> {
        &self.session
    }

    /// Subscribe to the frame source, feeding frames into the session
    pub fn start_capture(&self, source: &mut dyn FrameSource) -> Result<Subscription> {
        let request = StreamRequest {
            aspect_ratio: self.config.capture.aspect_ratio,
            rotation_degrees: self.config.capture.rotation_degrees,
        };
        let session = self.session.clone();
        let subscription = source
            .subscribe(
                request,
                Box::new(move |frame| {
                    session.on_frame(frame);
                }),
            )
            .context("Failed to start camera")?;

        info!(
            "Camera started ({:?}, rotation {} degrees)",
            request.aspect_ratio, request.rotation_degrees
        );
        Ok(subscription)
    }

    /// Dispatch one UI event. Returns false when the app should exit.
    pub fn handle_event(&self, event: UiEvent) -> bool {
        match event {
            UiEvent::Tap => {
                if let TapOutcome::Ignored = self.session.on_tap() {
                    debug!("Tap dropped");
                }
            }
            UiEvent::Swipe(swipe) => {
                self.session.on_swipe(swipe);
            }
            UiEvent::Fling(fling) => match self.detector.classify(&fling) {
                Some(swipe) => {
                    self.session.on_swipe(swipe);
                }
                None => debug!("Fling not recognized as a swipe: {:?}", fling),
            },
            UiEvent::Quit => return false,
        }
        true
    }

    /// Run the UI-event loop until quit or the sender goes away
    pub fn run_event_loop(&self, events: &Receiver<UiEvent>) {
        info!("Ready. Events: tap, left, right, fling x1 y1 x2 y2 vx vy, quit");
        for event in events.iter() {
            if !self.handle_event(event) {
                break;
            }
        }
    }

    /// Stop frames, release the engine, then silence and release speech
    pub fn shutdown(&self, subscription: Option<Subscription>) {
        info!("Shutting down...");

        if let Some(subscription) = subscription {
            let timeout = Duration::from_millis(self.config.shutdown.drain_timeout_ms);
            if !subscription.stop(timeout) {
                warn!("Continuing shutdown with frame delivery still draining");
            }
        }

        if self.session.close() {
            info!("Inference engine released");
        }

        let speech = self.session.speech();
        speech.stop();
        speech.shutdown();
    }

    /// Run until the event stream ends, then tear everything down
    pub fn run(&self, source: &mut dyn FrameSource, events: &Receiver<UiEvent>) -> Result<()> {
        let subscription = match self.start_capture(source) {
            Ok(subscription) => subscription,
            Err(e) => {
                self.shutdown(None);
                return Err(e);
            }
        };

        self.run_event_loop(events);
        self.shutdown(Some(subscription));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisMode, Fling};
    use crate::capture::ReplaySource;
    use crate::overlay::testing::RecordingPresenter;
    use crate::speech::testing::RecordingSpeaker;
    use crate::vision::engine::testing::{EngineProbe, FakeEngine};
    use crate::vision::TensorLayout;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    fn app(scores: Vec<f32>) -> (BlindShopApp, RecordingSpeaker, RecordingPresenter, Arc<EngineProbe>) {
        let engine = FakeEngine::new(scores);
        let probe = engine.probe.clone();
        let classifier = Classifier::new(
            Box::new(engine),
            LabelTable::parse("apple\nbanana\ncarrot"),
            MetadataTable::parse("fruit/200g/Red apple\nfruit/1.2kg/Yellow curved fruit\nveg/1kg/Orange root"),
            TensorLayout::Nhwc,
        )
        .unwrap();
        let speaker = RecordingSpeaker::default();
        let presenter = RecordingPresenter::default();
        let app = BlindShopApp::with_parts(
            AppConfig::default(),
            classifier,
            Box::new(presenter.clone()),
            Box::new(speaker.clone()),
        );
        (app, speaker, presenter, probe)
    }

    fn wait_for_frame(app: &BlindShopApp) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !app.session().has_frame() {
            assert!(Instant::now() < deadline, "no frame delivered");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_fling_routed_through_detector() {
        let (app, speaker, _, _) = app(vec![0.2, 0.9, 0.1]);
        app.handle_event(UiEvent::Tap);
        speaker.spoken.lock().clear();

        // Vertical fling is ignored
        app.handle_event(UiEvent::Fling(Fling {
            start: (0.0, 0.0),
            end: (10.0, 300.0),
            velocity: (0.0, 900.0),
        }));
        assert!(speaker.utterances().is_empty());

        // Left-to-right fling is a right swipe
        app.handle_event(UiEvent::Fling(Fling {
            start: (0.0, 0.0),
            end: (300.0, 10.0),
            velocity: (900.0, 0.0),
        }));
        assert_eq!(speaker.utterances(), vec!["Descrizione non disponibile".to_string()]);
    }

    #[test]
    fn test_quit_ends_loop() {
        let (app, _, _, _) = app(vec![0.2, 0.9, 0.1]);
        assert!(app.handle_event(UiEvent::Tap));
        assert!(!app.handle_event(UiEvent::Quit));
    }

    #[test]
    fn test_full_run_with_replay_source() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(40, 30, Rgba([10, 200, 10, 255]))
            .save(dir.path().join("shelf.png"))
            .unwrap();

        let (app, speaker, presenter, probe) = app(vec![0.2, 0.9, 0.1]);
        let mut source = ReplaySource::new(dir.path(), 100);
        let subscription = app.start_capture(&mut source).unwrap();
        wait_for_frame(&app);

        let (tx, rx) = crossbeam_channel::unbounded();
        for event in [
            UiEvent::Tap,
            UiEvent::Swipe(crate::analysis::Swipe::Left),
            UiEvent::Swipe(crate::analysis::Swipe::Right),
            UiEvent::Quit,
        ] {
            tx.send(event).unwrap();
        }
        app.run_event_loop(&rx);

        assert_eq!(app.session().mode(), AnalysisMode::Frozen);
        assert_eq!(presenter.label().as_deref(), Some("BANANA"));
        assert_eq!(
            speaker.utterances(),
            vec![
                "banana".to_string(),
                "1.2kg".to_string(),
                "Yellow curved fruit".to_string()
            ]
        );

        app.shutdown(Some(subscription));
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);

        // Second shutdown does not close the engine again
        app.shutdown(None);
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_source_fails_and_releases_engine() {
        let (app, _, _, probe) = app(vec![0.2, 0.9, 0.1]);
        let mut source = ReplaySource::new("/nonexistent/frames", 30);
        let (_tx, rx) = crossbeam_channel::unbounded();

        assert!(app.run(&mut source, &rx).is_err());
        assert_eq!(probe.closes.load(Ordering::SeqCst), 1);
    }
}
