//! # Musical Tuning Module
//!
//! Note naming and cent deviation in twelve-tone equal temperament.
//!
//! Frequencies map onto MIDI note numbers relative to a reference pitch
//! for A4 (normally 440 Hz):
//!
//! `note = 12 * log2(f / reference) + 69`
//!
//! The nearest integer note is the target and the detune is the distance
//! to it in cents (100 cents = 1 semitone, positive = sharp).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// MIDI note number of A4.
pub const A4_MIDI: i32 = 69;

const ANGLO_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const LATIN_NAMES: [&str; 12] = [
    "Do", "Do#", "Re", "Re#", "Mi", "Fa", "Fa#", "Sol", "Sol#", "La", "La#", "Si",
];

/// Labels with octave ("A4", "La4") for the full MIDI range, built once.
static LABELS: Lazy<[Vec<String>; 2]> = Lazy::new(|| {
    let build = |names: &[&str; 12]| {
        (0..128)
            .map(|midi: i32| format!("{}{}", names[midi.rem_euclid(12) as usize], midi / 12 - 1))
            .collect::<Vec<_>>()
    };
    [build(&ANGLO_NAMES), build(&LATIN_NAMES)]
});

/// Note naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notation {
    /// C, C#, D, ...
    #[default]
    Anglo,
    /// Do, Do#, Re, ...
    Latin,
}

impl Notation {
    pub fn toggled(self) -> Self {
        match self {
            Notation::Anglo => Notation::Latin,
            Notation::Latin => Notation::Anglo,
        }
    }

    /// Name of a pitch class (0 = C).
    pub fn name(self, pitch_class: usize) -> &'static str {
        self.names()[pitch_class % 12]
    }

    fn names(self) -> &'static [&'static str; 12] {
        match self {
            Notation::Anglo => &ANGLO_NAMES,
            Notation::Latin => &LATIN_NAMES,
        }
    }

    fn table(self) -> usize {
        match self {
            Notation::Anglo => 0,
            Notation::Latin => 1,
        }
    }
}

/// The note nearest to a measured frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteReading {
    /// MIDI note number of the target note.
    pub midi: i32,
    /// Equal-tempered frequency of the target note in Hz.
    pub target_hz: f32,
    /// Deviation from the target (positive = sharp, negative = flat).
    pub cents: f32,
}

impl NoteReading {
    /// 0 = C through 11 = B.
    pub fn pitch_class(&self) -> usize {
        self.midi.rem_euclid(12) as usize
    }

    pub fn octave(&self) -> i32 {
        self.midi.div_euclid(12) - 1
    }

    /// Note name without octave, e.g. "A" or "La".
    pub fn name(&self, notation: Notation) -> &'static str {
        notation.name(self.pitch_class())
    }

    /// Note name with octave, e.g. "A4" or "La4", for notes in the MIDI range.
    pub fn label(&self, notation: Notation) -> Option<&'static str> {
        let index = usize::try_from(self.midi).ok()?;
        LABELS[notation.table()].get(index).map(String::as_str)
    }
}

/// Finds the equal-tempered note closest to `frequency`.
///
/// Returns `None` for frequencies that cannot be a pitch (zero, negative,
/// or non-finite), or when `reference` is not positive.
pub fn nearest_note(frequency: f32, reference: f32) -> Option<NoteReading> {
    if !(frequency.is_finite() && frequency > 0.0 && reference.is_finite() && reference > 0.0) {
        return None;
    }
    let note_number = 12.0 * (frequency / reference).log2() + A4_MIDI as f32;
    let midi = note_number.round() as i32;
    let target_hz = note_frequency(midi, reference);
    Some(NoteReading {
        midi,
        target_hz,
        cents: cents_between(frequency, target_hz),
    })
}

/// Equal-tempered frequency of a MIDI note.
pub fn note_frequency(midi: i32, reference: f32) -> f32 {
    reference * 2.0_f32.powf((midi - A4_MIDI) as f32 / 12.0)
}

/// Calculates the deviation of `frequency` from `target` in cents.
///
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
pub fn cents_between(frequency: f32, target: f32) -> f32 {
    1200.0 * (frequency / target).log2()
}
