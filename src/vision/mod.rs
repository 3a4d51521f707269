//! Vision Layer
//!
//! Turns captured frames into ranked product predictions:
//! preprocess -> guarded inference -> ranking against the label table.
//! Inference failures never leave this module; they become an empty ranking.

pub mod engine;
pub mod labels;
pub mod models;
pub mod preprocess;
pub mod ranking;

use ndarray::Array4;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::capture::frame::CapturedFrame;

pub use engine::{EngineError, GuardedEngine, InferenceEngine, InputShape};
pub use labels::{LabelTable, MetadataTable, ProductInfo};
pub use models::{ModelOptions, OnnxEngine};
pub use preprocess::{PreprocessConfig, TensorLayout};
pub use ranking::{Prediction, Ranking};

/// Result of classifying one frame
#[derive(Debug, Clone, Default)]
pub struct FrameAnalysis {
    /// Ranked predictions (empty on failure)
    pub ranking: Ranking,
    /// Preprocessed model input, when preprocessing succeeded
    pub input: Option<Array4<f32>>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Classification pipeline shared by the frame and UI threads
pub struct Classifier {
    engine: GuardedEngine,
    labels: LabelTable,
    metadata: MetadataTable,
    preprocess: PreprocessConfig,
}

impl Classifier {
    /// Build a classifier around a loaded engine.
    ///
    /// Fails when the model declares an output length that differs from the
    /// label table, so labels can never be misaligned with scores.
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        labels: LabelTable,
        metadata: MetadataTable,
        layout: TensorLayout,
    ) -> Result<Self, EngineError> {
        let engine = GuardedEngine::new(engine);

        if let Some(outputs) = engine.output_len() {
            if outputs != labels.len() {
                engine.close();
                return Err(EngineError::LabelMismatch {
                    labels: labels.len(),
                    outputs,
                });
            }
        }
        metadata.check_alignment(&labels);

        let shape = engine.input_shape();
        let preprocess = PreprocessConfig {
            target_width: shape.width as u32,
            target_height: shape.height as u32,
            layout,
        };
        info!(
            "Classifier ready: {} labels, input {}x{} ({:?})",
            labels.len(),
            shape.width,
            shape.height,
            layout
        );

        Ok(Self {
            engine,
            labels,
            metadata,
            preprocess,
        })
    }

    pub fn preprocess_config(&self) -> &PreprocessConfig {
        &self.preprocess
    }

    /// Preprocess and classify a frame
    pub fn classify(&self, frame: &CapturedFrame) -> FrameAnalysis {
        let start = Instant::now();

        let input = match preprocess::preprocess_frame(frame, &self.preprocess) {
            Ok(input) => input,
            Err(e) => {
                error!("Error preprocessing frame: {}", e);
                return FrameAnalysis::default();
            }
        };

        let ranking = self.predict(&input);
        FrameAnalysis {
            ranking,
            input: Some(input),
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Run inference on a preprocessed tensor and rank the scores.
    /// Any failure is logged and yields an empty ranking.
    pub fn predict(&self, input: &Array4<f32>) -> Ranking {
        let result = self
            .engine
            .run(input)
            .and_then(|scores| Ranking::from_scores(&scores, &self.labels, &self.metadata));

        match result {
            Ok(ranking) => {
                debug!("Sorted predictions:\n{}", ranking.describe());
                ranking
            }
            Err(e) => {
                error!("Error during prediction: {}", e);
                Ranking::empty()
            }
        }
    }

    /// Release the engine. Safe to call more than once; only the first call closes.
    pub fn close(&self) -> bool {
        self.engine.close()
    }
}

#[cfg(test)]
mod tests {
    use super::engine::testing::FakeEngine;
    use super::*;

    fn labels() -> LabelTable {
        LabelTable::parse("apple\nbanana\ncarrot")
    }

    fn frame() -> CapturedFrame {
        CapturedFrame::new(vec![200; 12 * 10 * 4], 12, 10, 90)
    }

    #[test]
    fn test_classify_frame() {
        let engine = FakeEngine::new(vec![0.2, 0.9, 0.1]);
        let classifier =
            Classifier::new(Box::new(engine), labels(), MetadataTable::default(), TensorLayout::Nhwc)
                .unwrap();

        let analysis = classifier.classify(&frame());
        assert_eq!(analysis.ranking.best(0.5).unwrap().label, "banana");
        assert_eq!(analysis.input.unwrap().dim(), (1, 8, 8, 3));
    }

    #[test]
    fn test_engine_failure_yields_empty_ranking() {
        let mut engine = FakeEngine::new(vec![0.2, 0.9, 0.1]);
        engine.fail = true;
        let classifier =
            Classifier::new(Box::new(engine), labels(), MetadataTable::default(), TensorLayout::Nhwc)
                .unwrap();

        let analysis = classifier.classify(&frame());
        assert!(analysis.ranking.is_empty());
        assert!(analysis.input.is_some());
    }

    #[test]
    fn test_malformed_frame_yields_empty_ranking() {
        let engine = FakeEngine::new(vec![0.2, 0.9, 0.1]);
        let probe = engine.probe.clone();
        let classifier =
            Classifier::new(Box::new(engine), labels(), MetadataTable::default(), TensorLayout::Nhwc)
                .unwrap();

        let analysis = classifier.classify(&CapturedFrame::new(vec![0; 3], 4, 4, 0));
        assert!(analysis.ranking.is_empty());
        assert!(analysis.input.is_none());
        assert_eq!(probe.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_label_mismatch_fails_fast() {
        let engine = FakeEngine::new(vec![0.5; 4]);
        let probe = engine.probe.clone();
        let result =
            Classifier::new(Box::new(engine), labels(), MetadataTable::default(), TensorLayout::Nhwc);

        assert!(matches!(
            result,
            Err(EngineError::LabelMismatch {
                labels: 3,
                outputs: 4
            })
        ));
        assert_eq!(probe.closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_predict_after_close_is_empty() {
        let engine = FakeEngine::new(vec![0.2, 0.9, 0.1]);
        let classifier =
            Classifier::new(Box::new(engine), labels(), MetadataTable::default(), TensorLayout::Nhwc)
                .unwrap();

        assert!(classifier.close());
        assert!(!classifier.close());
        assert!(classifier.classify(&frame()).ranking.is_empty());
    }
}
