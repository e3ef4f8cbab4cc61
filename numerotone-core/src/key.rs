//! # Key Estimation Module
//!
//! Krumhansl-Schmuckler style key finding over a sliding window of recent
//! harmonic pitch classes:
//! 1. Accumulate a 12-bin pitch-class histogram from the window
//! 2. Correlate it with all 24 rotated major/minor profiles
//! 3. Return the best tonic and mode with a 0-100 confidence

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::tuning;

/// Krumhansl-Kessler major key profile. Index 0 = tonic.
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile. Index 0 = tonic.
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

/// How each windowed observation contributes to the histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyWeighting {
    /// Every observation counts once.
    #[default]
    Count,
    /// Observations count by their confidence.
    Confidence,
}

/// Estimated key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyEstimate {
    /// Tonic pitch class, 0 = C.
    pub tonic_pitch_class: u8,
    pub mode: Mode,
    /// Winning correlation rescaled from [-1, 1] to [0, 100].
    pub confidence: f32,
}

impl Default for KeyEstimate {
    fn default() -> Self {
        Self {
            tonic_pitch_class: 0,
            mode: Mode::Major,
            confidence: 0.0,
        }
    }
}

impl KeyEstimate {
    /// Human readable name, e.g. "A major".
    pub fn name(&self) -> String {
        let mode = match self.mode {
            Mode::Major => "major",
            Mode::Minor => "minor",
        };
        format!("{} {}", tuning::pitch_class_name(self.tonic_pitch_class), mode)
    }
}

/// A rotated, unit-length key profile.
struct KeyTemplate {
    tonic: u8,
    mode: Mode,
    profile: [f32; 12],
}

/// All 24 templates, tonic C..B, major before minor for each tonic.
static KEY_TEMPLATES: Lazy<Vec<KeyTemplate>> = Lazy::new(|| {
    let mut templates = Vec::with_capacity(24);
    for tonic in 0..12u8 {
        for (mode, base) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
            let mut profile = [0.0f32; 12];
            for (pc, slot) in profile.iter_mut().enumerate() {
                // the profile's tonic entry moves to `tonic`
                *slot = base[(pc + 12 - tonic as usize) % 12];
            }
            let norm = profile.iter().map(|v| v * v).sum::<f32>().sqrt();
            for v in &mut profile {
                *v /= norm;
            }
            templates.push(KeyTemplate {
                tonic,
                mode,
                profile,
            });
        }
    }
    templates
});

/// Correlates a pitch-class histogram with every key template.
///
/// Correlation is the normalized dot product. An empty or all-zero histogram
/// yields the default estimate (C major, confidence 0).
pub fn estimate_key(histogram: &[f32; 12]) -> KeyEstimate {
    let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
    if !(norm.is_finite() && norm > 0.0) {
        return KeyEstimate::default();
    }

    let mut best: Option<(&KeyTemplate, f32)> = None;
    for template in KEY_TEMPLATES.iter() {
        let score = histogram
            .iter()
            .zip(&template.profile)
            .map(|(h, p)| h * p)
            .sum::<f32>()
            / norm;
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((template, score));
        }
    }

    match best {
        Some((template, score)) if score.is_finite() => KeyEstimate {
            tonic_pitch_class: template.tonic,
            mode: template.mode,
            confidence: ((score + 1.0) / 2.0).clamp(0.0, 1.0) * 100.0,
        },
        _ => KeyEstimate::default(),
    }
}

/// Sliding window of harmonic pitch-class evidence.
#[derive(Debug, Clone)]
pub struct KeyEstimator {
    window: VecDeque<(u8, f32)>,
    capacity: usize,
    weighting: KeyWeighting,
}

impl KeyEstimator {
    pub fn new(capacity: usize, weighting: KeyWeighting) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            weighting,
        }
    }

    /// Records one observation, dropping the oldest once the window is full.
    pub fn push(&mut self, pitch_class: u8, confidence: f32) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        let confidence = if confidence.is_finite() { confidence.max(0.0) } else { 0.0 };
        self.window.push_back((pitch_class % 12, confidence));
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn histogram(&self) -> [f32; 12] {
        let mut histogram = [0.0f32; 12];
        for &(pc, confidence) in &self.window {
            histogram[pc as usize] += match self.weighting {
                KeyWeighting::Count => 1.0,
                KeyWeighting::Confidence => confidence,
            };
        }
        histogram
    }

    pub fn estimate(&self) -> KeyEstimate {
        estimate_key(&self.histogram())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_unit_length() {
        assert_eq!(KEY_TEMPLATES.len(), 24);
        for template in KEY_TEMPLATES.iter() {
            let norm: f32 = template.profile.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rotation_moves_tonic() {
        let g_major = KEY_TEMPLATES
            .iter()
            .find(|t| t.tonic == 7 && t.mode == Mode::Major)
            .unwrap();
        let max_idx = g_major
            .profile
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert_eq!(max_idx, 7);
    }

    #[test]
    fn test_empty_histogram_defaults() {
        let key = estimate_key(&[0.0; 12]);
        assert_eq!(key, KeyEstimate::default());
        assert_eq!(KeyEstimator::new(600, KeyWeighting::Count).estimate().confidence, 0.0);
    }

    #[test]
    fn test_profile_itself_is_recognized() {
        // feed the D minor profile as a histogram
        let mut histogram = [0.0f32; 12];
        for (i, &v) in MINOR_PROFILE.iter().enumerate() {
            histogram[(i + 2) % 12] = v;
        }
        let key = estimate_key(&histogram);
        assert_eq!(key.tonic_pitch_class, 2);
        assert_eq!(key.mode, Mode::Minor);
        assert!(key.confidence > 99.0);
        assert_eq!(key.name(), "D minor");
    }

    #[test]
    fn test_c_major_triad() {
        let mut estimator = KeyEstimator::new(600, KeyWeighting::Count);
        for _ in 0..10 {
            estimator.push(0, 1.0);
            estimator.push(4, 1.0);
            estimator.push(7, 1.0);
        }
        let key = estimator.estimate();
        assert_eq!(key.tonic_pitch_class, 0);
        assert_eq!(key.mode, Mode::Major);
    }

    #[test]
    fn test_window_is_capped() {
        let mut estimator = KeyEstimator::new(4, KeyWeighting::Count);
        for pc in 0..10u8 {
            estimator.push(pc, 1.0);
        }
        assert_eq!(estimator.len(), 4);
        let histogram = estimator.histogram();
        assert_eq!(histogram[..6].iter().sum::<f32>(), 0.0);
        assert_eq!(histogram[6..10].iter().sum::<f32>(), 4.0);
    }

    #[test]
    fn test_confidence_weighting() {
        let mut estimator = KeyEstimator::new(10, KeyWeighting::Confidence);
        estimator.push(9, 0.5);
        estimator.push(9, 0.25);
        assert!((estimator.histogram()[9] - 0.75).abs() < 1e-6);
    }
}
