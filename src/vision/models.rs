//! Model loading for ONNX Runtime
//!
//! Wraps an `ort` session as an [`InferenceEngine`]. The classifier is a
//! MobileNetV2 exported to ONNX with one image input and one score output.

use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::engine::{EngineError, InferenceEngine, InputShape};
use super::preprocess::TensorLayout;

/// Options for loading a model
#[derive(Debug, Clone)]
pub struct ModelOptions {
    /// Path to the .onnx file
    pub model_path: PathBuf,
    /// Input tensor layout
    pub layout: TensorLayout,
    /// Try a hardware execution provider before falling back to CPU
    pub use_accelerator: bool,
    /// Intra-op thread count
    pub intra_threads: usize,
    /// Expected SHA256 of the model file (hex), if verification is wanted
    pub sha256: Option<String>,
}

/// Verify a model file against an expected SHA256 checksum
pub fn verify_sha256(path: &Path, expected: &str) -> Result<(), EngineError> {
    let data = std::fs::read(path)
        .map_err(|e| EngineError::Load(format!("cannot read {:?}: {}", path, e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    let actual = format!("{:x}", hasher.finalize());

    if actual.eq_ignore_ascii_case(expected.trim()) {
        info!("Checksum verified for {:?}", path);
        Ok(())
    } else {
        Err(EngineError::Integrity {
            expected: expected.trim().to_lowercase(),
            actual,
        })
    }
}

/// ONNX Runtime classifier session
pub struct OnnxEngine {
    session: Session,
    input_shape: InputShape,
    output_len: Option<usize>,
    layout: TensorLayout,
}

impl OnnxEngine {
    /// Load a model, optionally with hardware acceleration
    pub fn load(options: &ModelOptions) -> Result<Self, EngineError> {
        if let Some(expected) = &options.sha256 {
            verify_sha256(&options.model_path, expected)?;
        }

        info!("Loading ONNX model from {:?}", options.model_path);

        let session = if options.use_accelerator {
            build_accelerated(&options.model_path, options.intra_threads)?
        } else {
            base_builder(options.intra_threads)?
                .commit_from_file(&options.model_path)
                .map_err(load_error)?
        };

        let input_dims = session
            .inputs
            .first()
            .map(|input| extract_shape(&input.input_type))
            .ok_or_else(|| EngineError::Shape("model has no inputs".to_string()))?;
        let output_dims = session
            .outputs
            .first()
            .map(|output| extract_shape(&output.output_type))
            .ok_or_else(|| EngineError::Shape("model has no outputs".to_string()))?;

        let input_shape = input_shape_from_dims(&input_dims, options.layout)?;
        let output_len = output_dims.last().copied().filter(|&d| d > 0).map(|d| d as usize);

        info!(
            "Model loaded. Input: {:?} ({:?}), output length: {:?}",
            input_dims, options.layout, output_len
        );

        Ok(Self {
            session,
            input_shape,
            output_len,
            layout: options.layout,
        })
    }
}

impl InferenceEngine for OnnxEngine {
    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn output_len(&self) -> Option<usize> {
        self.output_len
    }

    fn run(&mut self, input: &Array4<f32>) -> Result<Vec<f32>, EngineError> {
        let tensor = Tensor::from_array(input.clone())
            .map_err(|e| EngineError::Run(format!("failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| EngineError::Run(e.to_string()))?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EngineError::Run(format!("failed to extract output: {}", e)))?;

        debug!("Inference produced {} scores ({:?})", scores.len(), self.layout);
        Ok(scores.to_vec())
    }

    fn close(&mut self) {
        debug!("Releasing ONNX session");
    }
}

fn load_error(e: ort::Error) -> EngineError {
    EngineError::Load(e.to_string())
}

fn base_builder(intra_threads: usize) -> Result<ort::session::builder::SessionBuilder, EngineError> {
    Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.with_intra_threads(intra_threads))
        .map_err(load_error)
}

/// Try DirectML on Windows, fall back to CPU
fn build_accelerated(model_path: &Path, intra_threads: usize) -> Result<Session, EngineError> {
    #[cfg(target_os = "windows")]
    let builder = {
        use ort::execution_providers::DirectMLExecutionProvider;
        match base_builder(intra_threads)?
            .with_execution_providers([DirectMLExecutionProvider::default().build()])
        {
            Ok(builder) => {
                info!("DirectML acceleration enabled");
                builder
            }
            Err(e) => {
                warn!("DirectML not available, using CPU: {}", e);
                base_builder(intra_threads)?
            }
        }
    };

    #[cfg(not(target_os = "windows"))]
    let builder = {
        warn!("No accelerator available on this platform, using CPU");
        base_builder(intra_threads)?
    };

    builder.commit_from_file(model_path).map_err(load_error)
}

/// Map raw input dims to (batch, height, width, channels).
/// Dynamic dimensions fall back to the MobileNetV2 defaults.
fn input_shape_from_dims(dims: &[i64], layout: TensorLayout) -> Result<InputShape, EngineError> {
    if dims.len() != 4 {
        return Err(EngineError::Shape(format!(
            "expected a 4-D image input, got {:?}",
            dims
        )));
    }

    let defaults = InputShape::default();
    let dim = |i: usize, fallback: usize| if dims[i] > 0 { dims[i] as usize } else { fallback };

    let shape = match layout {
        TensorLayout::Nhwc => InputShape {
            batch: dim(0, 1),
            height: dim(1, defaults.height),
            width: dim(2, defaults.width),
            channels: dim(3, defaults.channels),
        },
        TensorLayout::Nchw => InputShape {
            batch: dim(0, 1),
            channels: dim(1, defaults.channels),
            height: dim(2, defaults.height),
            width: dim(3, defaults.width),
        },
    };

    if shape.channels != 3 {
        return Err(EngineError::Shape(format!(
            "expected 3 channels for {:?} layout, got {:?}",
            layout, dims
        )));
    }
    Ok(shape)
}

/// Extract shape from ONNX value type
fn extract_shape(value_type: &ort::value::ValueType) -> Vec<i64> {
    if let Some(shape) = value_type.tensor_shape() {
        shape.iter().map(|&d| d).collect()
    } else {
        vec![]
    }
}
