//! Command-line arguments and configuration loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tuner_core::TunerConfig;

/// Real-time instrument tuner for the terminal.
///
/// Press Enter to start or stop the microphone, `n` + Enter to switch
/// between C-D-E and Do-Re-Mi names, `q` + Enter to quit.
#[derive(Parser, Debug, Default)]
#[command(name = "tuner", version, about)]
pub struct Cli {
    /// JSON configuration file; missing fields keep their defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Capture sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Samples per analysis block
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Pitch detection tolerance in (0, 1]
    #[arg(long)]
    pub tolerance: Option<f32>,

    /// Confidence needed before a note is shown
    #[arg(long)]
    pub confidence_threshold: Option<f32>,

    /// Input device name (see --list-devices)
    #[arg(long)]
    pub device: Option<String>,

    /// Print the available input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Analyse a generated sine at this frequency instead of the microphone
    #[arg(long, value_name = "HZ")]
    pub simulate: Option<f32>,

    /// Start with Do-Re-Mi note names
    #[arg(long)]
    pub latin: bool,

    /// Quit after this many seconds
    #[arg(long, value_name = "SECS")]
    pub duration: Option<f64>,
}

impl Cli {
    /// Builds the engine configuration: file first, then flags on top.
    pub fn tuner_config(&self) -> Result<TunerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => TunerConfig::default(),
        };
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(tolerance) = self.tolerance {
            config.tolerance = tolerance;
        }
        if let Some(threshold) = self.confidence_threshold {
            config.confidence_threshold = threshold;
        }
        if let Some(device) = &self.device {
            config.device = Some(device.clone());
        }
        config.validate().context("invalid tuner configuration")?;
        Ok(config)
    }
}

/// Reads a [`TunerConfig`] from a JSON file.
pub fn load_config(path: &Path) -> Result<TunerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}
