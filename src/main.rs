//! BlindShop - spoken product recognition for blind shoppers
//!
//! Classifies camera frames with an image classification model and speaks
//! the recognized product. A tap freezes or resumes analysis; left and right
//! swipes while frozen read the product weight and description.

mod analysis;
mod app;
mod capture;
mod config;
mod input;
mod overlay;
mod shared;
mod speech;
mod storage;
mod vision;

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::BlindShopApp;
use crate::capture::ReplaySource;
use crate::config::{AppConfig, ReportMode};

/// BlindShop - spoken product recognition
#[derive(Parser, Debug)]
#[command(name = "blindshop")]
#[command(about = "Recognizes products from camera frames and speaks them aloud")]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image file or directory to replay as camera frames
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// ONNX model file
    #[arg(long)]
    model: Option<PathBuf>,

    /// Label file, one label per line
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Product metadata file (category/weight/description per line)
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Acceptance threshold (0.0 - 1.0)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Classify every live frame instead of only on tap
    #[arg(long)]
    continuous: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => Some(path.clone()),
        None => storage::default_config_path()
            .map_err(|e| warn!("No config directory: {}", e))
            .ok(),
    };

    if args.write_default_config {
        let path = config_path.ok_or_else(|| anyhow::anyhow!("No config path available"))?;
        config::save_config(&AppConfig::default(), &path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    info!("BlindShop starting...");

    let mut config = load_or_create_config(config_path.as_deref());
    apply_overrides(&mut config, &args);

    let app = BlindShopApp::new(config.clone())?;
    let mut source = ReplaySource::new(&config.capture.source, config.capture.max_fps);

    let (tx, rx) = crossbeam_channel::unbounded();
    // Blocked on stdin, so it is not joined
    input::spawn_stdin_reader(tx)?;

    app.run(&mut source, &rx)?;

    info!("BlindShop shutdown complete");
    Ok(())
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config(path: Option<&Path>) -> AppConfig {
    if let Some(path) = path {
        if path.exists() {
            match config::load_config(path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    return config;
                }
                Err(e) => warn!("Invalid configuration {:?}: {}", path, e),
            }
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(source) = &args.source {
        config.capture.source = source.clone();
    }
    if let Some(model) = &args.model {
        config.model.model_path = model.clone();
    }
    if let Some(labels) = &args.labels {
        config.model.labels_path = labels.clone();
    }
    if let Some(metadata) = &args.metadata {
        config.model.metadata_path = metadata.clone();
    }
    if let Some(threshold) = args.threshold {
        config.analysis.set_threshold(threshold);
    }
    if args.continuous {
        config.analysis.report_mode = ReportMode::Continuous;
    }
}
