//! # Configuration Module
//!
//! [`TunerConfig`] is fixed at engine construction. Every field has a default
//! so a partial JSON document (or none at all) yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::channel::BacklogPolicy;
use crate::error::TunerError;
use crate::fft::SpectrumWindow;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// Default block size in samples (~46ms at 44.1 kHz).
pub const DEFAULT_BLOCK_SIZE: usize = 2048;
/// Default YIN tolerance. Higher values accept noisier dips.
pub const DEFAULT_TOLERANCE: f32 = 0.8;
/// Default confidence above which the consumer treats an estimate as a note.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.75;
/// Default silence gate in dBFS.
pub const DEFAULT_SILENCE_THRESHOLD_DB: f32 = -90.0;
/// Default concert pitch for A4 in Hz.
pub const DEFAULT_REFERENCE_PITCH: f32 = 440.0;

const MIN_BLOCK_SIZE: usize = 64;
const MAX_BLOCK_SIZE: usize = 1 << 16;

/// Settings for capture, analysis and result hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per analysis block.
    pub block_size: usize,
    /// YIN acceptance threshold on the normalized difference function.
    pub tolerance: f32,
    /// Confidence above which an estimate counts as a note. Applied by the consumer.
    pub confidence_threshold: f32,
    /// Blocks whose AC level (dBFS, mean removed) is below this report silence.
    /// Measured on the newest block only, not the whole analysis window.
    pub silence_threshold_db: f32,
    /// Window applied before the spectrum transform.
    pub spectrum_window: SpectrumWindow,
    /// How the result channel handles a slow consumer.
    pub backlog: BacklogPolicy,
    /// Input device name; `None` selects the host default.
    pub device: Option<String>,
    /// Frequency of A4 used for note naming. Applied by the consumer.
    pub reference_pitch: f32,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            tolerance: DEFAULT_TOLERANCE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            silence_threshold_db: DEFAULT_SILENCE_THRESHOLD_DB,
            spectrum_window: SpectrumWindow::default(),
            backlog: BacklogPolicy::default(),
            device: None,
            reference_pitch: DEFAULT_REFERENCE_PITCH,
        }
    }
}

impl TunerConfig {
    /// Checks every field against its valid range.
    pub fn validate(&self) -> Result<(), TunerError> {
        if self.sample_rate == 0 {
            return Err(TunerError::invalid_config("sample_rate", "must be positive"));
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(TunerError::invalid_config(
                "block_size",
                format!("must be between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE}"),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance <= 1.0) {
            return Err(TunerError::invalid_config("tolerance", "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(TunerError::invalid_config(
                "confidence_threshold",
                "must be in [0, 1]",
            ));
        }
        if !self.silence_threshold_db.is_finite() || self.silence_threshold_db > 0.0 {
            return Err(TunerError::invalid_config(
                "silence_threshold_db",
                "must be a finite level at or below 0 dBFS",
            ));
        }
        if !(self.reference_pitch.is_finite() && self.reference_pitch > 0.0) {
            return Err(TunerError::invalid_config(
                "reference_pitch",
                "must be a positive frequency",
            ));
        }
        if let Some(capacity) = self.backlog.capacity() {
            if capacity == 0 {
                return Err(TunerError::invalid_config("backlog", "capacity must be positive"));
            }
        }
        Ok(())
    }

    /// Real-time budget of one block.
    pub fn block_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }

    /// Number of bins in every spectrum produced with this configuration.
    pub fn spectrum_len(&self) -> usize {
        self.block_size / 2 + 1
    }
}
