//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for the spectrum display. The transform is planned once
//! per analyzer and reused for every block, so the per-block cost is a single
//! O(n log n) FFT.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - Plain real DFT by default; optional Hann or Hamming window
//! - Non-negative frequency bins only (`n / 2 + 1` of them)

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};

use crate::source::AudioBlock;

/// Window applied to a block before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumWindow {
    /// No window: the magnitudes of the plain DFT.
    #[default]
    Rectangular,
    /// Hann window with DC offset removal, for less spectral leakage.
    Hann,
    /// Hamming window with DC offset removal.
    Hamming,
}

impl SpectrumWindow {
    fn coefficients(self, len: usize) -> Option<Vec<f32>> {
        if len < 2 {
            return None;
        }
        let n_minus_1 = (len - 1) as f32;
        let (a0, a1) = match self {
            SpectrumWindow::Rectangular => return None,
            SpectrumWindow::Hann => (0.5, 0.5),
            SpectrumWindow::Hamming => (0.54, 0.46),
        };
        Some(
            (0..len)
                .map(|i| a0 - a1 * (2.0 * PI * i as f32 / n_minus_1).cos())
                .collect(),
        )
    }
}

/// Magnitudes of the non-negative frequency bins of one block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spectrum {
    magnitudes: Vec<f32>,
    bin_width_hz: f32,
}

impl Spectrum {
    pub fn new(magnitudes: Vec<f32>, bin_width_hz: f32) -> Self {
        Self {
            magnitudes,
            bin_width_hz,
        }
    }

    /// Magnitudes indexed by increasing frequency.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Frequency spacing between adjacent bins.
    pub fn bin_width_hz(&self) -> f32 {
        self.bin_width_hz
    }

    /// Centre frequency of bin `index`.
    pub fn bin_frequency(&self, index: usize) -> f32 {
        index as f32 * self.bin_width_hz
    }

    /// Index of the strongest bin, ignoring DC.
    pub fn peak_bin(&self) -> Option<usize> {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
    }
}

/// Computes magnitude spectra for blocks of one fixed size.
pub struct SpectralAnalyzer {
    block_size: usize,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Option<Vec<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralAnalyzer {
    /// Plans the transform for `block_size` samples.
    pub fn new(sample_rate: u32, block_size: usize, window: SpectrumWindow) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(block_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            block_size,
            sample_rate,
            fft,
            window: window.coefficients(block_size),
            buffer: vec![Complex::default(); block_size],
            scratch,
        }
    }

    /// Number of bins in every spectrum this analyzer returns.
    pub fn spectrum_len(&self) -> usize {
        self.block_size / 2 + 1
    }

    /// Transforms one block.
    ///
    /// Blocks shorter than the planned size are zero-padded and longer ones
    /// truncated, so the output length never changes.
    pub fn analyze(&mut self, block: &AudioBlock) -> Spectrum {
        let samples = block.samples();
        let used = samples.len().min(self.block_size);

        let dc = if self.window.is_some() && used > 0 {
            samples[..used].iter().sum::<f32>() / used as f32
        } else {
            0.0
        };

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let mut sample = if i < used { samples[i] - dc } else { 0.0 };
            if let Some(window) = &self.window {
                sample *= window[i];
            }
            *slot = Complex::new(sample, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let magnitudes = self
            .buffer
            .iter()
            .take(self.spectrum_len())
            .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
            .collect();

        Spectrum::new(
            magnitudes,
            self.sample_rate as f32 / self.block_size as f32,
        )
    }
}
