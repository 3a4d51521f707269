//! Application Configuration
//!
//! User settings stored in TOML format. Every section has defaults, so a
//! partial file only needs to name what it changes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::capture::AspectRatio;
use crate::vision::TensorLayout;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model and asset settings
    pub model: ModelSettings,
    /// Classification behaviour
    pub analysis: AnalysisSettings,
    /// Frame source settings
    pub capture: CaptureSettings,
    /// Swipe recognition thresholds
    pub gesture: GestureSettings,
    /// Speech output settings
    pub speech: SpeechSettings,
    /// Overlay presentation settings
    pub overlay: OverlaySettings,
    /// Teardown settings
    pub shutdown: ShutdownSettings,
}

/// Model and bundled asset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// ONNX model file
    pub model_path: PathBuf,
    /// One label per line, index-aligned with the model output
    pub labels_path: PathBuf,
    /// `category/weight/description` lines, index-aligned with the labels
    pub metadata_path: PathBuf,
    /// Expected SHA256 of the model file
    pub sha256: Option<String>,
    /// Input tensor layout
    pub layout: TensorLayout,
    /// Try hardware acceleration first
    pub use_accelerator: bool,
    /// Inference threads
    pub intra_threads: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("assets/MobileNetV2.onnx"),
            labels_path: PathBuf::from("assets/MobileNetV2_labels.txt"),
            metadata_path: PathBuf::from("assets/MobileNetV2_descriptions.txt"),
            sha256: None,
            layout: TensorLayout::Nhwc,
            use_accelerator: true,
            intra_threads: 4,
        }
    }
}

/// When live frames are classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// Classify only when the user taps
    #[default]
    OnDemand,
    /// Classify and render every live frame
    Continuous,
}

/// Classification behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Minimum score for a prediction to be reported (0.0 - 1.0)
    pub acceptance_threshold: f32,
    /// Live reporting mode
    pub report_mode: ReportMode,
    /// Show the model input instead of the upright camera frame when frozen
    pub show_processed_image: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.5,
            report_mode: ReportMode::OnDemand,
            show_processed_image: false,
        }
    }
}

/// Frame source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Image file or directory to replay
    pub source: PathBuf,
    /// Maximum frames per second
    pub max_fps: u32,
    /// Sensor rotation attached to every frame
    pub rotation_degrees: i32,
    /// Requested aspect ratio
    pub aspect_ratio: AspectRatio,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            source: PathBuf::from("frames"),
            max_fps: 30,
            rotation_degrees: 0,
            aspect_ratio: AspectRatio::Ratio4x3,
        }
    }
}

/// Swipe recognition thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureSettings {
    /// Minimum horizontal travel in pixels
    pub distance_threshold: f32,
    /// Minimum horizontal velocity in pixels per second
    pub velocity_threshold: f32,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            distance_threshold: 100.0,
            velocity_threshold: 100.0,
        }
    }
}

/// Fixed phrases spoken by the app
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Phrases {
    /// Nothing recognized above threshold
    pub unknown: String,
    /// Live analysis resumed
    pub resume: String,
    /// No weight for the frozen prediction
    pub weight_unavailable: String,
    /// No description for the frozen prediction
    pub description_unavailable: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            unknown: "Sconosciuto".to_string(),
            resume: "Analizzo".to_string(),
            weight_unavailable: "Peso non disponibile".to_string(),
            description_unavailable: "Descrizione non disponibile".to_string(),
        }
    }
}

/// Speech output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSettings {
    /// Speak at all
    pub enabled: bool,
    /// Synthesizer program
    pub program: String,
    /// Arguments before the text; `{locale}` is substituted
    pub args: Vec<String>,
    /// Voice language
    pub locale: String,
    /// Fixed phrases
    pub phrases: Phrases,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "espeak-ng".to_string(),
            args: vec!["-v".to_string(), "{locale}".to_string()],
            locale: "it".to_string(),
            phrases: Phrases::default(),
        }
    }
}

/// Overlay presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Where to write the frozen image (PNG)
    pub snapshot_path: Option<PathBuf>,
    /// Render labels in upper case
    pub uppercase_labels: bool,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            uppercase_labels: true,
        }
    }
}

/// Teardown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// How long to wait for the frame delivery thread to drain
    pub drain_timeout_ms: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 1000,
        }
    }
}

impl AnalysisSettings {
    /// Set the acceptance threshold, clamped to 0.0 - 1.0.
    /// A non-finite value keeps the default.
    pub fn set_threshold(&mut self, value: f32) {
        self.acceptance_threshold = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            warn!("Ignoring non-finite acceptance threshold {}", value);
            Self::default().acceptance_threshold
        };
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;
    let threshold = config.analysis.acceptance_threshold;
    config.analysis.set_threshold(threshold);
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert!((config.analysis.acceptance_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.analysis.report_mode, ReportMode::OnDemand);
        assert!(!config.analysis.show_processed_image);

        assert_eq!(config.capture.max_fps, 30);
        assert_eq!(config.capture.aspect_ratio, AspectRatio::Ratio4x3);

        assert!((config.gesture.distance_threshold - 100.0).abs() < f32::EPSILON);
        assert!((config.gesture.velocity_threshold - 100.0).abs() < f32::EPSILON);

        assert_eq!(config.model.layout, TensorLayout::Nhwc);
        assert_eq!(config.speech.locale, "it");
        assert_eq!(config.shutdown.drain_timeout_ms, 1000);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.analysis.acceptance_threshold = 0.7;
        config.analysis.report_mode = ReportMode::Continuous;
        config.overlay.snapshot_path = Some(PathBuf::from("/tmp/frozen.png"));

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert!((parsed.analysis.acceptance_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(parsed.analysis.report_mode, ReportMode::Continuous);
        assert_eq!(parsed.overlay.snapshot_path, Some(PathBuf::from("/tmp/frozen.png")));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            "[analysis]\nacceptance_threshold = 0.7\nreport_mode = \"continuous\"\n\n[capture]\naspect_ratio = \"16:9\"\n\n[model]\nlayout = \"nchw\""
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert!((config.analysis.acceptance_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.analysis.report_mode, ReportMode::Continuous);
        assert_eq!(config.capture.aspect_ratio, AspectRatio::Ratio16x9);
        assert_eq!(config.capture.max_fps, 30);
        assert_eq!(config.model.layout, TensorLayout::Nchw);
        assert_eq!(config.speech.program, "espeak-ng");
    }

    #[test]
    fn test_loaded_threshold_is_validated() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[analysis]\nacceptance_threshold = 1.5").unwrap();
        let config = load_config(temp_file.path()).unwrap();
        assert!((config.analysis.acceptance_threshold - 1.0).abs() < f32::EPSILON);

        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[analysis]\nacceptance_threshold = nan").unwrap();
        let config = load_config(temp_file.path()).unwrap();
        assert!((config.analysis.acceptance_threshold - 0.5).abs() < f32::EPSILON);

        let mut analysis = AnalysisSettings::default();
        analysis.set_threshold(-0.2);
        assert_eq!(analysis.acceptance_threshold, 0.0);
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        save_config(&AppConfig::default(), &path).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded.capture.max_fps, 30);
        assert_eq!(loaded.speech.phrases.unknown, "Sconosciuto");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
