//! Inference engine boundary
//!
//! The network itself runs in an external runtime. Everything above this module
//! talks to it through [`GuardedEngine`], which serializes calls and enforces
//! that the engine is closed exactly once.

use ndarray::Array4;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised at the engine boundary
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("model integrity check failed: expected sha256 {expected}, got {actual}")]
    Integrity { expected: String, actual: String },
    #[error("unexpected tensor shape: {0}")]
    Shape(String),
    #[error("inference failed: {0}")]
    Run(String),
    #[error("label table has {labels} entries but the model outputs {outputs} scores")]
    LabelMismatch { labels: usize, outputs: usize },
    #[error("inference engine is closed")]
    Closed,
}

/// Model input shape, always reported as (batch, height, width, channels)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Default for InputShape {
    fn default() -> Self {
        Self {
            batch: 1,
            height: 224,
            width: 224,
            channels: 3,
        }
    }
}

/// A loaded network that maps one input tensor to one score vector
pub trait InferenceEngine: Send {
    /// Shape of the single input tensor
    fn input_shape(&self) -> InputShape;

    /// Length of the output score vector, when the model declares it
    fn output_len(&self) -> Option<usize>;

    /// Run the network synchronously
    fn run(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, EngineError>;

    /// Release native resources. Called once, after which the engine is dropped.
    fn close(&mut self) {}
}

/// Mutex-guarded engine handle shared by the frame and UI threads
pub struct GuardedEngine {
    inner: Mutex<Option<Box<dyn InferenceEngine>>>,
    input_shape: InputShape,
    output_len: Option<usize>,
}

impl GuardedEngine {
    pub fn new(engine: Box<dyn InferenceEngine>) -> Self {
        let input_shape = engine.input_shape();
        let output_len = engine.output_len();
        Self {
            inner: Mutex::new(Some(engine)),
            input_shape,
            output_len,
        }
    }

    pub fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    pub fn output_len(&self) -> Option<usize> {
        self.output_len
    }

    /// Run one inference call; the lock is held for load, run and readback
    pub fn run(&self, input: &Array4<f32>) -> Result<Vec<f32>, EngineError> {
        let mut guard = self.inner.lock();
        let engine = guard.as_mut().ok_or(EngineError::Closed)?;
        engine.run(input)
    }

    /// Close the engine. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        let engine = self.inner.lock().take();
        match engine {
            Some(mut engine) => {
                engine.close();
                info!("Inference engine closed");
                true
            }
            None => {
                warn!("Inference engine close requested twice");
                false
            }
        }
    }
}
