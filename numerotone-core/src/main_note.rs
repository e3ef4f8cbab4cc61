//! # Main Note Module
//!
//! Picks the dominant harmonic pitch class from the most recent band log
//! entries. This module provides different strategies for tallying the
//! window, optionally anchored to the estimated key.

use serde::{Deserialize, Serialize};

use crate::key::KeyEstimate;
use crate::tuning;

/// Key confidence (percent) above which tonic-relative tallying is used.
const TONIC_CONFIDENCE_GATE: f32 = 5.0;

/// Different tallying strategies for the main-note window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainNoteStrategy {
    /// Most frequent pitch class, ties to the lowest class (C first)
    Absolute,
    /// Count intervals above the estimated tonic, ties to the tonic side
    #[default]
    RelativeToTonic,
}

/// Dominant pitch class of the recent harmonic window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainNote {
    pub pitch_class: u8,
    pub note_name: String,
    /// Share of the window held by the winning pitch class.
    pub confidence_percent: f32,
}

/// Tallies `pitch_classes` using the specified strategy.
///
/// Tonic-relative tallying falls back to absolute tallying when the key
/// estimate is too weak to anchor on.
///
/// # Returns
/// * `Option<MainNote>` - The winning pitch class, or `None` for an empty window
pub fn find_main_note(
    pitch_classes: &[u8],
    strategy: MainNoteStrategy,
    key: &KeyEstimate,
) -> Option<MainNote> {
    let anchored = strategy == MainNoteStrategy::RelativeToTonic
        && key.confidence > TONIC_CONFIDENCE_GATE;
    let shift = if anchored { key.tonic_pitch_class % 12 } else { 0 };
    tally(pitch_classes, shift)
}

/// Counts classes rotated by `shift`, then rotates the winner back.
fn tally(pitch_classes: &[u8], shift: u8) -> Option<MainNote> {
    if pitch_classes.is_empty() {
        return None;
    }

    let mut counts = [0usize; 12];
    for &pc in pitch_classes {
        counts[(pc as usize + 12 - shift as usize) % 12] += 1;
    }

    // max_by_key keeps the last maximum; iterate in reverse so the lowest
    // interval wins ties
    let (relative, &count) = counts
        .iter()
        .enumerate()
        .rev()
        .max_by_key(|&(_, c)| *c)?;

    let pitch_class = ((relative + shift as usize) % 12) as u8;
    Some(MainNote {
        pitch_class,
        note_name: tuning::pitch_class_name(pitch_class).to_string(),
        confidence_percent: count as f32 / pitch_classes.len() as f32 * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Mode;

    fn key(tonic: u8, confidence: f32) -> KeyEstimate {
        KeyEstimate {
            tonic_pitch_class: tonic,
            mode: Mode::Major,
            confidence,
        }
    }

    #[test]
    fn test_empty_window() {
        assert!(find_main_note(&[], MainNoteStrategy::Absolute, &key(0, 0.0)).is_none());
    }

    #[test]
    fn test_absolute_majority() {
        let note = find_main_note(&[9, 9, 9, 1], MainNoteStrategy::Absolute, &key(0, 0.0)).unwrap();
        assert_eq!(note.pitch_class, 9);
        assert_eq!(note.note_name, "A");
        assert!((note.confidence_percent - 75.0).abs() < 1e-4);
    }

    #[test]
    fn test_absolute_tie_goes_to_lowest_class() {
        let note = find_main_note(&[9, 2], MainNoteStrategy::Absolute, &key(7, 80.0)).unwrap();
        assert_eq!(note.pitch_class, 2);
    }

    #[test]
    fn test_relative_tie_goes_toward_tonic() {
        // tonic G (7): A is 2 above, D is 7 above
        let note =
            find_main_note(&[9, 2], MainNoteStrategy::RelativeToTonic, &key(7, 80.0)).unwrap();
        assert_eq!(note.pitch_class, 9);
    }

    #[test]
    fn test_weak_key_falls_back_to_absolute() {
        let note =
            find_main_note(&[9, 2], MainNoteStrategy::RelativeToTonic, &key(7, 2.0)).unwrap();
        assert_eq!(note.pitch_class, 2);
    }
}
