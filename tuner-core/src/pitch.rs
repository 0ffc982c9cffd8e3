//! # Pitch Detection Module
//!
//! A streaming implementation of the YIN pitch detection algorithm
//! (de Cheveigné & Kawahara, 2002) tuned for live instrument input.
//!
//! ## Features
//! - Rolling analysis window of two blocks, carried across calls
//! - FFT-based difference function, O(n log n) per block
//! - First-dip lag selection under a tolerance, to avoid octave errors
//! - Parabolic interpolation for sub-sample accuracy
//! - Silence gate on the newest block's AC level, so quiet or constant
//!   input reports zero confidence

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::source::AudioBlock;

/// Result of pitch estimation for one block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchEstimate {
    /// Estimated fundamental in Hz, 0.0 when nothing periodic was found.
    pub frequency_hz: f32,
    /// Reliability of the estimate in `[0, 1]`.
    pub confidence: f32,
}

impl PitchEstimate {
    /// The estimate reported for silence and non-periodic input.
    pub const SILENT: Self = Self {
        frequency_hz: 0.0,
        confidence: 0.0,
    };

    /// True when the estimate is reliable enough to be shown as a note.
    pub fn is_note(&self, confidence_threshold: f32) -> bool {
        self.frequency_hz > 0.0 && self.confidence > confidence_threshold
    }
}

/// Stateful YIN pitch estimator.
///
/// Each call to [`estimate`](Self::estimate) slides one block into a window
/// of `2 * block_size` samples and analyses the whole window. Until the
/// window has filled, only the samples seen so far are analysed, so the
/// very first block already yields an estimate.
pub struct PitchEstimator {
    sample_rate: u32,
    tolerance: f32,
    silence_threshold_db: f32,

    // Rolling window; the newest samples are at the end.
    window: Vec<f32>,
    filled: usize,

    // Transforms planned once at the full window size
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,

    // Pre-allocated buffers, reused for every block
    signal_spectrum: Vec<Complex<f64>>,
    kernel_spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    energy: Vec<f64>,
    yin: Vec<f64>,
}

impl PitchEstimator {
    /// Minimum lag searched. Lags 0 and 1 carry no pitch information.
    const MIN_LAG: usize = 2;

    /// Differences below this fraction of the frame energy are FFT round-off.
    const ROUND_OFF: f64 = 1e-9;

    /// Creates an estimator for blocks of `block_size` samples.
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `block_size` - Samples per block; the window holds two blocks
    /// * `tolerance` - Acceptance threshold on the normalized difference
    /// * `silence_threshold_db` - Blocks whose AC level is below this report silence
    pub fn new(sample_rate: u32, block_size: usize, tolerance: f32, silence_threshold_db: f32) -> Self {
        let window_size = block_size * 2;
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(window_size);
        let inverse = planner.plan_fft_inverse(window_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            sample_rate,
            tolerance,
            silence_threshold_db,
            window: vec![0.0; window_size],
            filled: 0,
            forward,
            inverse,
            signal_spectrum: vec![Complex::default(); window_size],
            kernel_spectrum: vec![Complex::default(); window_size],
            scratch: vec![Complex::default(); scratch_len],
            energy: vec![0.0; window_size + 1],
            yin: vec![0.0; block_size],
        }
    }

    /// Samples analysed per estimate once the window is full.
    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Forgets all history, as if no block had been seen.
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.filled = 0;
    }

    /// Slides `block` into the window and estimates the pitch of the window.
    ///
    /// Reports [`PitchEstimate::SILENT`] when the newest block is below the
    /// silence gate or when no lag dips under the tolerance.
    pub fn estimate(&mut self, block: &AudioBlock) -> PitchEstimate {
        self.push_block(block.samples());

        if ac_level_db(block.samples()) < self.silence_threshold_db {
            return PitchEstimate::SILENT;
        }

        // Even length so the lag range is exactly half the frame
        let frame_len = self.filled & !1;
        if frame_len < 2 * (Self::MIN_LAG + 2) {
            return PitchEstimate::SILENT;
        }
        let half = frame_len / 2;

        self.difference(frame_len);
        self.cumulative_mean_normalized(half);

        let Some(lag) = self.select_lag(half) else {
            return PitchEstimate::SILENT;
        };
        let confidence = (1.0 - self.yin[lag]).clamp(0.0, 1.0) as f32;
        let period = self.interpolate(lag, half);

        let frequency = self.sample_rate as f64 / period;
        if !frequency.is_finite() || frequency <= 0.0 {
            return PitchEstimate::SILENT;
        }

        PitchEstimate {
            frequency_hz: frequency as f32,
            confidence,
        }
    }

    fn push_block(&mut self, samples: &[f32]) {
        let size = self.window.len();
        if samples.len() >= size {
            self.window.copy_from_slice(&samples[samples.len() - size..]);
        } else {
            self.window.copy_within(samples.len().., 0);
            self.window[size - samples.len()..].copy_from_slice(samples);
        }
        self.filled = (self.filled + samples.len()).min(size);
    }

    /// Squared difference function d(τ) = Σ_{j<W} (x[j] - x[j+τ])² for τ in 0..W.
    ///
    /// Expanded as energy(0, W) + energy(τ, W) - 2·r(τ), where the cross
    /// term r(τ) = Σ x[j]·x[j+τ] comes from one forward/inverse FFT pair.
    /// Frames shorter than the window are zero-padded; since j + τ < 2W the
    /// circular correlation never wraps. Results are left in `self.yin[..W]`.
    fn difference(&mut self, frame_len: usize) {
        let half = frame_len / 2;
        let size = self.window.len();
        let frame = &self.window[size - frame_len..];

        self.energy[0] = 0.0;
        for (i, &sample) in frame.iter().enumerate() {
            let s = sample as f64;
            self.energy[i + 1] = self.energy[i] + s * s;
        }

        self.signal_spectrum.fill(Complex::default());
        self.kernel_spectrum.fill(Complex::default());
        for (i, &sample) in frame.iter().enumerate() {
            self.signal_spectrum[i] = Complex::new(sample as f64, 0.0);
            if i < half {
                self.kernel_spectrum[i] = Complex::new(sample as f64, 0.0);
            }
        }

        self.forward
            .process_with_scratch(&mut self.signal_spectrum, &mut self.scratch);
        self.forward
            .process_with_scratch(&mut self.kernel_spectrum, &mut self.scratch);
        for (s, k) in self.signal_spectrum.iter_mut().zip(&self.kernel_spectrum) {
            *s *= k.conj();
        }
        self.inverse
            .process_with_scratch(&mut self.signal_spectrum, &mut self.scratch);

        // rustfft does not normalize the inverse transform
        let norm = 1.0 / size as f64;
        let base_energy = self.energy[half] - self.energy[0];
        let floor = Self::ROUND_OFF * self.energy[frame_len];
        for tau in 0..half {
            let correlation = self.signal_spectrum[tau].re * norm;
            let shifted_energy = self.energy[tau + half] - self.energy[tau];
            let d = base_energy + shifted_energy - 2.0 * correlation;
            self.yin[tau] = if d > floor { d } else { 0.0 };
        }
    }

    /// Cumulative mean normalized difference, in place over `self.yin[..W]`.
    ///
    /// d'(0) = 1, d'(τ) = d(τ)·τ / Σ_{k=1..τ} d(k).
    fn cumulative_mean_normalized(&mut self, half: usize) {
        self.yin[0] = 1.0;
        let mut running_sum = 0.0;
        for tau in 1..half {
            running_sum += self.yin[tau];
            if running_sum > 0.0 {
                self.yin[tau] *= tau as f64 / running_sum;
            } else {
                self.yin[tau] = 1.0;
            }
        }
    }

    /// Picks the bottom of the first dip under the tolerance.
    ///
    /// `None` when no lag qualifies: the window is not periodic within the
    /// searchable range.
    fn select_lag(&self, half: usize) -> Option<usize> {
        let yin = &self.yin[..half];
        let tolerance = self.tolerance as f64;

        (Self::MIN_LAG..half - 1).find(|&tau| yin[tau] < tolerance && yin[tau] <= yin[tau + 1])
    }

    /// Parabolic interpolation around `lag` for a sub-sample period.
    fn interpolate(&self, lag: usize, half: usize) -> f64 {
        if lag < 1 || lag + 1 >= half {
            return lag as f64;
        }

        let y1 = self.yin[lag - 1];
        let y2 = self.yin[lag];
        let y3 = self.yin[lag + 1];

        let denominator = y1 - 2.0 * y2 + y3;
        if denominator.abs() < 1e-12 {
            return lag as f64;
        }
        let shift = (y1 - y3) / (2.0 * denominator);
        lag as f64 + shift.clamp(-1.0, 1.0)
    }
}

/// Power of `samples` with the mean removed, in dBFS.
///
/// `-inf` for digital silence and for any constant signal.
fn ac_level_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let len = samples.len() as f64;
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / len;
    let power = samples
        .iter()
        .map(|&s| {
            let ac = s as f64 - mean;
            ac * ac
        })
        .sum::<f64>()
        / len;
    (10.0 * power.log10()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44_100;
    const BLOCK: usize = 2048;

    fn sine_block(freq: f32, amplitude: f32, start: usize, len: usize) -> AudioBlock {
        let samples = (start..start + len)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect();
        AudioBlock::new(samples, SAMPLE_RATE)
    }

    fn estimator() -> PitchEstimator {
        PitchEstimator::new(SAMPLE_RATE, BLOCK, 0.8, -90.0)
    }

    #[test]
    fn detects_a440_from_first_block() {
        let mut estimator = estimator();
        let estimate = estimator.estimate(&sine_block(440.0, 0.5, 0, BLOCK));

        assert!(
            (estimate.frequency_hz - 440.0).abs() < 4.4,
            "Expected ~440 Hz, got {} Hz",
            estimate.frequency_hz
        );
        assert!(estimate.confidence >= 0.75, "confidence {}", estimate.confidence);
        assert!(estimate.is_note(0.75));
    }

    #[test]
    fn detects_representative_range_within_one_percent() {
        let test_freqs = [80.0, 110.0, 196.0, 261.63, 440.0, 659.25, 880.0, 1000.0];

        for &freq in &test_freqs {
            let mut estimator = estimator();
            // Two contiguous blocks fill the window
            estimator.estimate(&sine_block(freq, 0.5, 0, BLOCK));
            let estimate = estimator.estimate(&sine_block(freq, 0.5, BLOCK, BLOCK));

            let error_percent = ((estimate.frequency_hz - freq) / freq).abs() * 100.0;
            assert!(
                error_percent < 1.0,
                "Expected {freq} Hz, got {} Hz ({error_percent}% error)",
                estimate.frequency_hz
            );
            assert!(
                estimate.confidence >= 0.75,
                "{freq} Hz: confidence {}",
                estimate.confidence
            );
        }
    }

    #[test]
    fn silence_reports_zero_confidence() {
        let mut estimator = estimator();
        for _ in 0..3 {
            let estimate = estimator.estimate(&AudioBlock::new(vec![0.0; BLOCK], SAMPLE_RATE));
            assert_eq!(estimate, PitchEstimate::SILENT);
        }
    }

    #[test]
    fn silence_after_a_note_is_gated() {
        let mut estimator = estimator();
        estimator.estimate(&sine_block(440.0, 0.5, 0, BLOCK));
        let estimate = estimator.estimate(&AudioBlock::new(vec![0.0; BLOCK], SAMPLE_RATE));
        assert_eq!(estimate.confidence, 0.0);
        assert_eq!(estimate.frequency_hz, 0.0);
    }

    #[test]
    fn confidence_stays_in_unit_interval_for_noise() {
        let mut estimator = estimator();
        let mut seed: u32 = 12345;
        for _ in 0..4 {
            let samples = (0..BLOCK)
                .map(|_| {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    ((seed >> 16) as f32 / 32768.0) - 1.0
                })
                .collect();
            let estimate = estimator.estimate(&AudioBlock::new(samples, SAMPLE_RATE));
            assert!((0.0..=1.0).contains(&estimate.confidence));
            assert_eq!(estimate, PitchEstimate::SILENT, "noise looked pitched");
        }
    }

    #[test]
    fn constant_input_is_silent() {
        let mut estimator = estimator();
        for _ in 0..3 {
            let estimate = estimator.estimate(&AudioBlock::new(vec![0.5; BLOCK], SAMPLE_RATE));
            assert_eq!(estimate, PitchEstimate::SILENT);
        }
    }

    #[test]
    fn dc_offset_does_not_hide_a_note() {
        let mut estimator = estimator();
        let shifted = |block: AudioBlock| {
            AudioBlock::new(block.samples().iter().map(|s| s + 0.3).collect(), SAMPLE_RATE)
        };
        estimator.estimate(&shifted(sine_block(440.0, 0.4, 0, BLOCK)));
        let estimate = estimator.estimate(&shifted(sine_block(440.0, 0.4, BLOCK, BLOCK)));
        assert!((estimate.frequency_hz - 440.0).abs() < 4.4, "{estimate:?}");
        assert!(estimate.is_note(0.75));
    }

    #[test]
    fn period_longer_than_lag_range_is_silent() {
        // 30 Hz needs a lag of 1470 samples; one block only searches 1024
        let mut estimator = estimator();
        let estimate = estimator.estimate(&sine_block(30.0, 0.5, 0, BLOCK));
        assert_eq!(estimate, PitchEstimate::SILENT);
    }

    #[test]
    fn follows_a_pitch_change() {
        let mut estimator = estimator();
        estimator.estimate(&sine_block(220.0, 0.5, 0, BLOCK));
        estimator.estimate(&sine_block(220.0, 0.5, BLOCK, BLOCK));
        estimator.estimate(&sine_block(330.0, 0.5, 0, BLOCK));
        let estimate = estimator.estimate(&sine_block(330.0, 0.5, BLOCK, BLOCK));
        assert!((estimate.frequency_hz - 330.0).abs() < 3.3, "got {}", estimate.frequency_hz);
    }

    #[test]
    fn reset_clears_history() {
        let mut estimator = estimator();
        estimator.estimate(&sine_block(440.0, 0.5, 0, BLOCK));
        estimator.reset();
        assert_eq!(estimator.filled, 0);
        assert!(estimator.window.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn quiet_block_below_gate_is_silent() {
        let mut estimator = PitchEstimator::new(SAMPLE_RATE, BLOCK, 0.8, -40.0);
        // amplitude 0.001 is about -63 dBFS
        let estimate = estimator.estimate(&sine_block(440.0, 0.001, 0, BLOCK));
        assert_eq!(estimate, PitchEstimate::SILENT);
    }
}
