//! # Musical Tuning Module
//!
//! Equal-tempered pitch arithmetic and the pitch-class to digit mapping.
//!
//! ## Features
//! - Frequency to MIDI note conversion for any A4 reference
//! - Cent deviation and the linear cents-to-confidence falloff
//! - Note names in sharp spelling ("C#4")
//! - Fixed 12 → 9 pitch-class to digit table

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sharp spellings of the twelve pitch classes, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Pitch class (C = 0) to digit. A, A# and B wrap back onto 1, 2 and 3.
pub const PITCH_CLASS_TO_DIGIT: [u8; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 1, 2, 3];

/// MIDI note number of A4.
const A4_MIDI: i32 = 69;

/// A digit in `1..=9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Digit(u8);

impl Digit {
    /// All nine digits in ascending order.
    pub const ALL: [Digit; 9] = [
        Digit(1),
        Digit(2),
        Digit(3),
        Digit(4),
        Digit(5),
        Digit(6),
        Digit(7),
        Digit(8),
        Digit(9),
    ];

    pub fn new(value: u8) -> Option<Self> {
        (1..=9).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Zero-based slot used by fixed-size count arrays.
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<u8> for Digit {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Digit::new(value).ok_or_else(|| format!("digit out of range: {value}"))
    }
}

impl From<Digit> for u8 {
    fn from(digit: Digit) -> u8 {
        digit.0
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A frequency snapped to its nearest equal-tempered note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    pub midi: i32,
    /// Deviation from the note in cents (positive = sharp).
    pub cents: f32,
}

impl Snap {
    pub fn pitch_class(&self) -> u8 {
        pitch_class(self.midi)
    }

    pub fn digit(&self) -> Digit {
        digit_for_pitch_class(self.pitch_class())
    }

    pub fn confidence(&self) -> f32 {
        snap_confidence(self.cents)
    }
}

/// Fractional MIDI note number of a frequency.
pub fn midi_from_frequency(freq: f32, a4: f32) -> f32 {
    A4_MIDI as f32 + 12.0 * (freq / a4).log2()
}

/// Equal-tempered frequency of a MIDI note.
pub fn frequency_from_midi(midi: i32, a4: f32) -> f32 {
    a4 * 2.0_f32.powf((midi - A4_MIDI) as f32 / 12.0)
}

/// Calculates the deviation from a target frequency in cents.
///
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Snaps a frequency to the nearest note.
///
/// # Returns
/// * `Some(snap)` - Nearest MIDI note and the cent offset from it
/// * `None` - The frequency or the reference is zero, negative or not finite
pub fn snap_frequency(freq: f32, a4: f32) -> Option<Snap> {
    if !(freq.is_finite() && freq > 0.0 && a4.is_finite() && a4 > 0.0) {
        return None;
    }
    let midi = midi_from_frequency(freq, a4).round() as i32;
    let cents = calculate_cents_deviation(freq, frequency_from_midi(midi, a4));
    cents.is_finite().then_some(Snap { midi, cents })
}

/// Linear falloff from 1 at 0 cents to 0 at 100 cents.
pub fn snap_confidence(cents: f32) -> f32 {
    if !cents.is_finite() {
        return 0.0;
    }
    (1.0 - cents.abs().min(100.0) / 100.0).max(0.0)
}

/// Octave-independent pitch class, 0 = C.
pub fn pitch_class(midi: i32) -> u8 {
    midi.rem_euclid(12) as u8
}

pub fn digit_for_pitch_class(pc: u8) -> Digit {
    Digit(PITCH_CLASS_TO_DIGIT[pc as usize % 12])
}

/// Note name with octave, e.g. "A4" for MIDI 69.
pub fn note_name(midi: i32) -> String {
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[pitch_class(midi) as usize], octave)
}

pub fn pitch_class_name(pc: u8) -> &'static str {
    NOTE_NAMES[pc as usize % 12]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a4_snaps_to_69() {
        let snap = snap_frequency(440.0, 440.0).unwrap();
        assert_eq!(snap.midi, 69);
        assert!(snap.cents.abs() < 1e-3);
        assert_eq!(snap.digit().value(), 1);
        assert_eq!(note_name(snap.midi), "A4");
    }

    #[test]
    fn test_alternate_tuning_reference() {
        let snap = snap_frequency(432.0, 432.0).unwrap();
        assert_eq!(snap.midi, 69);
        // 432 Hz against A440 is about 32 cents flat of A4
        let snap = snap_frequency(432.0, 440.0).unwrap();
        assert_eq!(snap.midi, 69);
        assert!((snap.cents + 31.77).abs() < 0.1);
    }

    #[test]
    fn test_digit_table_wraps_last_three_classes() {
        let digits: Vec<u8> = (0..12).map(|pc| digit_for_pitch_class(pc).value()).collect();
        assert_eq!(digits, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 1, 2, 3]);
    }

    #[test]
    fn test_octave_invariance() {
        for &freq in &[65.41_f32, 110.0, 277.18, 440.0, 1046.5] {
            let base = snap_frequency(freq, 440.0).unwrap().digit();
            assert_eq!(snap_frequency(freq * 2.0, 440.0).unwrap().digit(), base);
            assert_eq!(snap_frequency(freq / 2.0, 440.0).unwrap().digit(), base);
        }
    }

    #[test]
    fn test_snap_confidence_falloff() {
        assert_eq!(snap_confidence(0.0), 1.0);
        assert!((snap_confidence(50.0) - 0.5).abs() < 1e-6);
        assert!((snap_confidence(-50.0) - 0.5).abs() < 1e-6);
        assert_eq!(snap_confidence(100.0), 0.0);
        assert_eq!(snap_confidence(250.0), 0.0);
        assert_eq!(snap_confidence(f32::NAN), 0.0);

        let mut last = 1.0;
        for step in 0..=120 {
            let c = snap_confidence(step as f32);
            assert!(c <= last);
            last = c;
        }
    }

    #[test]
    fn test_negative_midi_pitch_class() {
        assert_eq!(pitch_class(-1), 11);
        assert_eq!(pitch_class(-12), 0);
        assert_eq!(note_name(0), "C-1");
    }

    #[test]
    fn test_invalid_frequency_has_no_snap() {
        assert!(snap_frequency(0.0, 440.0).is_none());
        assert!(snap_frequency(-10.0, 440.0).is_none());
        assert!(snap_frequency(f32::NAN, 440.0).is_none());
        assert!(snap_frequency(440.0, 0.0).is_none());
    }

    #[test]
    fn test_digit_range() {
        assert!(Digit::new(0).is_none());
        assert!(Digit::new(10).is_none());
        assert_eq!(Digit::new(9).unwrap().index(), 8);
    }
}
