//! One-line text rendering of the tuner face.

use tuner_core::display::{TunerDisplay, TuningStatus};

const NEEDLE_HALF_WIDTH: usize = 20;
const SPECTRUM_WIDTH: usize = 24;
const LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Renders note, needle, status and a small spectrum strip.
pub fn render(display: &TunerDisplay) -> String {
    let reading = match display.reading() {
        Some(r) => format!("{:7.2} Hz {:+6.1}c", r.frequency_hz, r.note.cents),
        None => format!("{:>20}", ""),
    };
    format!(
        "{:<4} [{}] {:<7} {} {}",
        display.note_name(),
        needle(display),
        display.status().label(),
        reading,
        spectrum_strip(display.bars()),
    )
}

fn needle(display: &TunerDisplay) -> String {
    let width = NEEDLE_HALF_WIDTH * 2 + 1;
    let mut cells = vec!['-'; width];
    cells[NEEDLE_HALF_WIDTH] = '|';
    if display.status() != TuningStatus::Silent {
        let offset = (display.needle() * NEEDLE_HALF_WIDTH as f32).round() as isize;
        let position = (NEEDLE_HALF_WIDTH as isize + offset).clamp(0, width as isize - 1);
        cells[position as usize] = '#';
    }
    cells.into_iter().collect()
}

fn spectrum_strip(bars: &[f32]) -> String {
    if bars.is_empty() {
        return " ".repeat(SPECTRUM_WIDTH);
    }
    (0..SPECTRUM_WIDTH)
        .map(|i| {
            let start = bars.len() * i / SPECTRUM_WIDTH;
            let end = (bars.len() * (i + 1) / SPECTRUM_WIDTH).max(start + 1).min(bars.len());
            let peak = bars[start..end].iter().copied().fold(0.0_f32, f32::max);
            let level = (peak.clamp(0.0, 1.0) * (LEVELS.len() - 1) as f32).round() as usize;
            LEVELS[level]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuner_core::fft::Spectrum;
    use tuner_core::{AnalysisResult, PitchEstimate, TunerConfig};

    fn display_for(frequency_hz: f32, confidence: f32) -> TunerDisplay {
        let mut display = TunerDisplay::new(&TunerConfig::default());
        display.update(&AnalysisResult {
            block_index: 0,
            pitch: PitchEstimate {
                frequency_hz,
                confidence,
            },
            spectrum: Spectrum::new(vec![0.0, 4.0, 1.0, 0.0], 21.5),
        });
        display
    }

    #[test]
    fn silent_face_has_centered_marker_only() {
        let line = render(&display_for(0.0, 0.0));
        assert!(line.starts_with("--"));
        assert!(line.contains('|'));
        assert!(!line.contains('#'));
    }

    #[test]
    fn in_tune_needle_covers_center() {
        let line = render(&display_for(440.0, 0.95));
        assert!(line.starts_with("A "));
        assert!(line.contains("in tune"));
        assert!(line.contains("440.00 Hz"));
        assert!(!line.contains('|'));
    }

    #[test]
    fn sharp_needle_sits_right_of_center() {
        let display = display_for(452.0, 0.95);
        let bar = needle(&display);
        let marker = bar.find('#').expect("marker");
        let center = bar.find('|').expect("center");
        assert!(marker > center);
    }

    #[test]
    fn strip_has_fixed_width() {
        let strip = spectrum_strip(&[0.0, 1.0, 0.5]);
        assert_eq!(strip.chars().count(), SPECTRUM_WIDTH);
        assert!(strip.contains('█'));
    }
}
