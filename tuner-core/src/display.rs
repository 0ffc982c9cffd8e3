//! # Display State Module
//!
//! Presentation state for a tuner front-end, kept free of any rendering
//! toolkit. [`TunerDisplay`] folds each [`AnalysisResult`] into what a
//! tuner face shows: note name, tuning status, needle position and
//! spectrum bars.
//!
//! ## Conventions
//! - Readings below the confidence threshold count as silence
//! - Within ±5 cents of the target is in tune
//! - The needle spans -50..+50 cents, mapped to -1.0..1.0
//! - Spectrum bars are log-scaled and normalized to the loudest bin

use crate::AnalysisResult;
use crate::config::TunerConfig;
use crate::tuning::{self, Notation, NoteReading};

/// Deviation in cents still considered in tune.
pub const IN_TUNE_CENTS: f32 = 5.0;

/// Deviation in cents at which the needle hits its end stop.
pub const NEEDLE_RANGE_CENTS: f32 = 50.0;

/// Number of bars in the default spectrum view.
pub const SPECTRUM_BARS: usize = 100;

/// Placeholder shown instead of a note name while silent.
pub const NO_NOTE: &str = "--";

/// Where the current pitch sits relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TuningStatus {
    /// No reliable pitch.
    #[default]
    Silent,
    InTune,
    Flat,
    Sharp,
}

impl TuningStatus {
    /// Classifies a deviation: under 5 cents either way is in tune.
    ///
    /// The boundary is symmetric: exactly -5 cents is flat and exactly +5 is
    /// sharp. Testing only `cents < -5` for flat would send -5 to sharp.
    pub fn from_cents(cents: f32) -> Self {
        if cents.abs() < IN_TUNE_CENTS {
            TuningStatus::InTune
        } else if cents < 0.0 {
            TuningStatus::Flat
        } else {
            TuningStatus::Sharp
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TuningStatus::Silent => "",
            TuningStatus::InTune => "in tune",
            TuningStatus::Flat => "flat",
            TuningStatus::Sharp => "sharp",
        }
    }
}

/// A confident pitch reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub frequency_hz: f32,
    pub confidence: f32,
    pub note: NoteReading,
}

/// Everything a tuner face needs to draw one frame.
#[derive(Debug, Clone)]
pub struct TunerDisplay {
    notation: Notation,
    confidence_threshold: f32,
    reference_pitch: f32,
    reading: Option<Reading>,
    bars: Vec<f32>,
}

impl TunerDisplay {
    pub fn new(config: &TunerConfig) -> Self {
        Self {
            notation: Notation::default(),
            confidence_threshold: config.confidence_threshold,
            reference_pitch: config.reference_pitch,
            reading: None,
            bars: Vec::new(),
        }
    }

    pub fn with_notation(mut self, notation: Notation) -> Self {
        self.notation = notation;
        self
    }

    /// Folds in the latest analysis result.
    pub fn update(&mut self, result: &AnalysisResult) {
        let pitch = result.pitch;
        self.reading = if pitch.is_note(self.confidence_threshold) {
            tuning::nearest_note(pitch.frequency_hz, self.reference_pitch).map(|note| Reading {
                frequency_hz: pitch.frequency_hz,
                confidence: pitch.confidence,
                note,
            })
        } else {
            None
        };
        self.bars = spectrum_bars(result.spectrum.magnitudes(), SPECTRUM_BARS);
    }

    /// Returns to the idle face, e.g. after the engine stopped.
    pub fn clear(&mut self) {
        self.reading = None;
        self.bars.clear();
    }

    pub fn notation(&self) -> Notation {
        self.notation
    }

    pub fn toggle_notation(&mut self) {
        self.notation = self.notation.toggled();
    }

    pub fn reading(&self) -> Option<&Reading> {
        self.reading.as_ref()
    }

    /// Note name in the current notation, or [`NO_NOTE`].
    pub fn note_name(&self) -> &'static str {
        match &self.reading {
            Some(reading) => reading.note.name(self.notation),
            None => NO_NOTE,
        }
    }

    pub fn cents(&self) -> Option<f32> {
        self.reading.map(|r| r.note.cents)
    }

    pub fn status(&self) -> TuningStatus {
        self.cents()
            .map(TuningStatus::from_cents)
            .unwrap_or(TuningStatus::Silent)
    }

    /// Needle position in [-1, 1]; centered while silent.
    pub fn needle(&self) -> f32 {
        self.cents().map(needle_offset).unwrap_or(0.0)
    }

    /// Heights in [0, 1]; empty until a non-silent spectrum arrives.
    pub fn bars(&self) -> &[f32] {
        &self.bars
    }
}

/// Maps a cent deviation onto the needle range [-1, 1].
pub fn needle_offset(cents: f32) -> f32 {
    if !cents.is_finite() {
        return 0.0;
    }
    cents.clamp(-NEEDLE_RANGE_CENTS, NEEDLE_RANGE_CENTS) / NEEDLE_RANGE_CENTS
}

/// Reduces a magnitude spectrum to `count` bar heights in [0, 1].
///
/// Magnitudes are compressed with `ln(1 + m)` and normalized by the
/// largest value; each bar is the mean over its share of the bins. Bars
/// that cover no bin are 0. An all-zero spectrum yields no bars.
pub fn spectrum_bars(magnitudes: &[f32], count: usize) -> Vec<f32> {
    let scaled: Vec<f32> = magnitudes.iter().map(|m| m.max(0.0).ln_1p()).collect();
    let max = scaled.iter().copied().fold(0.0_f32, f32::max);
    if count == 0 || !(max > 0.0) || !max.is_finite() {
        return Vec::new();
    }

    let len = scaled.len();
    (0..count)
        .map(|i| {
            let start = len * i / count;
            let end = len * (i + 1) / count;
            if start >= end {
                return 0.0;
            }
            let sum: f32 = scaled[start..end].iter().sum();
            sum / (end - start) as f32 / max
        })
        .collect()
}
