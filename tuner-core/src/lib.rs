// tuner-core/src/lib.rs

//! The core logic for the real-time instrument tuner.
//! This crate is responsible for audio capture, pitch detection,
//! spectrum analysis and handing results to a consumer. It is completely
//! headless and contains no GUI code.

pub mod analysis;
pub mod audio;
pub mod channel;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod fft;
pub mod pitch;
pub mod source;
pub mod synthetic;
pub mod tuning;

pub use channel::{BacklogPolicy, ResultReceiver};
pub use config::TunerConfig;
pub use engine::{EngineEvent, EngineState, EngineStats, TunerEngine};
pub use error::TunerError;
pub use fft::{Spectrum, SpectrumWindow};
pub use pitch::PitchEstimate;

/// Represents the result of analysing one audio block.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Index of the block this result was computed from.
    pub block_index: u64,
    /// Estimated fundamental and its confidence.
    pub pitch: PitchEstimate,
    /// Magnitude spectrum for visualization.
    pub spectrum: Spectrum,
}
