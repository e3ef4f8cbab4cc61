//! # Band Module
//!
//! The four analysis bands and the per-band settings that travel with them.
//! Bands are fixed for the lifetime of a session; only their fusion weights
//! may change while analysis is running.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an analysis band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    /// Fundamental of the bass line, estimated with YIN.
    Bass,
    /// Lower harmonic band (body).
    Low,
    /// Middle harmonic band (voice).
    Mid,
    /// Upper harmonic band (air).
    High,
}

impl Band {
    /// All bands in processing order.
    pub const ALL: [Band; 4] = [Band::Bass, Band::Low, Band::Mid, Band::High];

    /// Bands read with the spectral peak picker.
    pub const HARMONIC: [Band; 3] = [Band::Low, Band::Mid, Band::High];

    pub fn index(self) -> usize {
        match self {
            Band::Bass => 0,
            Band::Low => 1,
            Band::Mid => 2,
            Band::High => 3,
        }
    }

    pub fn is_harmonic(self) -> bool {
        !matches!(self, Band::Bass)
    }

    pub fn name(self) -> &'static str {
        match self {
            Band::Bass => "bass",
            Band::Low => "low",
            Band::Mid => "mid",
            Band::High => "high",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A frequency range `[low_hz, high_hz)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRange {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl BandRange {
    pub const fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }

    pub fn contains(&self, freq: f32) -> bool {
        freq >= self.low_hz && freq < self.high_hz
    }

    /// The range grown by `below_hz` at the bottom and `above_hz` at the top.
    pub fn widened(&self, below_hz: f32, above_hz: f32) -> Self {
        Self::new(self.low_hz - below_hz, self.high_hz + above_hz)
    }

    pub fn is_valid(&self) -> bool {
        self.low_hz.is_finite()
            && self.high_hz.is_finite()
            && self.low_hz > 0.0
            && self.high_hz > self.low_hz
    }
}

/// Frequency ranges of all four bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandRanges {
    pub bass: BandRange,
    pub low: BandRange,
    pub mid: BandRange,
    pub high: BandRange,
}

impl Default for BandRanges {
    fn default() -> Self {
        Self {
            bass: BandRange::new(60.0, 300.0),
            low: BandRange::new(200.0, 500.0),
            mid: BandRange::new(500.0, 1500.0),
            high: BandRange::new(1500.0, 6000.0),
        }
    }
}

impl BandRanges {
    pub fn get(&self, band: Band) -> BandRange {
        match band {
            Band::Bass => self.bass,
            Band::Low => self.low,
            Band::Mid => self.mid,
            Band::High => self.high,
        }
    }
}

/// User-adjustable fusion weights, one per band. They do not need to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandWeights {
    pub bass: f32,
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl Default for BandWeights {
    fn default() -> Self {
        Self {
            bass: 0.25,
            low: 0.35,
            mid: 0.45,
            high: 0.2,
        }
    }
}

impl BandWeights {
    pub fn get(&self, band: Band) -> f32 {
        match band {
            Band::Bass => self.bass,
            Band::Low => self.low,
            Band::Mid => self.mid,
            Band::High => self.high,
        }
    }

    pub fn is_valid(&self) -> bool {
        Band::ALL
            .iter()
            .map(|&b| self.get(b))
            .all(|w| w.is_finite() && w >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_indices_are_distinct() {
        let mut seen = [false; 4];
        for band in Band::ALL {
            assert!(!seen[band.index()]);
            seen[band.index()] = true;
        }
        assert!(Band::HARMONIC.iter().all(|b| b.is_harmonic()));
        assert!(!Band::Bass.is_harmonic());
    }

    #[test]
    fn test_range_is_half_open() {
        let range = BandRange::new(200.0, 500.0);
        assert!(range.contains(200.0));
        assert!(range.contains(499.9));
        assert!(!range.contains(500.0));
        assert!(!BandRange::new(500.0, 200.0).is_valid());
    }

    #[test]
    fn test_widened_range() {
        let range = BandRange::new(60.0, 300.0).widened(5.0, 20.0);
        assert_eq!(range, BandRange::new(55.0, 320.0));
        assert!(range.contains(57.0));
        assert!(range.contains(310.0));
        assert!(!range.contains(54.0));
        assert!(!range.contains(320.0));
    }

    #[test]
    fn test_weights_validation() {
        assert!(BandWeights::default().is_valid());
        let bad = BandWeights {
            mid: -0.1,
            ..BandWeights::default()
        };
        assert!(!bad.is_valid());
        let nan = BandWeights {
            high: f32::NAN,
            ..BandWeights::default()
        };
        assert!(!nan.is_valid());
    }
}
