//! Per-block analysis handler run inside the capture callback.

use crate::AnalysisResult;
use crate::config::TunerConfig;
use crate::fft::SpectralAnalyzer;
use crate::pitch::PitchEstimator;
use crate::source::AudioBlock;

/// Owns the mutable analysis state of one capture session.
///
/// Lives on the capture side only; the consumer never sees it.
pub struct Analyzer {
    estimator: PitchEstimator,
    spectral: SpectralAnalyzer,
}

impl Analyzer {
    pub fn new(config: &TunerConfig) -> Self {
        Self {
            estimator: PitchEstimator::new(
                config.sample_rate,
                config.block_size,
                config.tolerance,
                config.silence_threshold_db,
            ),
            spectral: SpectralAnalyzer::new(
                config.sample_rate,
                config.block_size,
                config.spectrum_window,
            ),
        }
    }

    /// Runs both analyses on `block` and assembles the complete result.
    pub fn process(&mut self, block: &AudioBlock) -> AnalysisResult {
        let pitch = self.estimator.estimate(block);
        let spectrum = self.spectral.analyze(block);
        AnalysisResult {
            block_index: block.index(),
            pitch,
            spectrum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a440_round_trip() {
        let config = TunerConfig::default();
        let samples = (0..config.block_size)
            .map(|i| {
                let t = i as f32 / config.sample_rate as f32;
                0.8 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            })
            .collect();
        let block = AudioBlock::with_index(samples, config.sample_rate, 7);

        let result = Analyzer::new(&config).process(&block);

        assert_eq!(result.block_index, 7);
        assert!((result.pitch.frequency_hz - 440.0).abs() < 4.4, "{:?}", result.pitch);
        assert!(result.pitch.is_note(config.confidence_threshold));
        assert_eq!(result.spectrum.len(), config.spectrum_len());

        let expected_bin =
            (440.0 * config.block_size as f32 / config.sample_rate as f32).round() as usize;
        let peak = result.spectrum.peak_bin().expect("peak");
        assert!(peak.abs_diff(expected_bin) <= 1, "peak {peak}, expected {expected_bin}");
    }
}
