//! # Configuration Module
//!
//! All tunable constants of the engine in one serde-friendly struct. Every
//! field has a default, so a config file only needs to name what it changes.

use serde::{Deserialize, Serialize};

use crate::band::{Band, BandRanges, BandWeights};
use crate::error::{Error, Result};
use crate::key::KeyWeighting;
use crate::main_note::MainNoteStrategy;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reference tuning for A4 in Hz (default: 440.0)
    pub a4_hz: f32,

    /// Analysis frame length in samples, power of two (default: 4096)
    pub frame_size: usize,
    /// Distance between frame starts in samples (default: 2048)
    pub hop_size: usize,

    pub band_ranges: BandRanges,
    pub band_weights: BandWeights,

    /// EMA factor for frequency smoothing before snapping (default: 0.22)
    pub smoothing_alpha: f32,

    // Peak picking
    /// Maximum number of spectral peaks considered per band (default: 7)
    pub max_peaks: usize,
    /// Minimum separation between picked peaks in bins (default: 2)
    pub min_peak_distance: usize,
    /// Peaks below this level are ignored (default: -90 dB)
    pub noise_floor_db: f32,
    /// Bottom of the display scale used to weight peaks (default: -100 dB)
    pub display_min_db: f32,
    /// Top of the display scale used to weight peaks (default: -10 dB)
    pub display_max_db: f32,

    // Percussive gate
    /// Band flatness above which the band counts as noise-like (default: 0.8)
    pub flatness_threshold: f32,
    /// Band flux, relative to the band's magnitude sum, above which the band
    /// counts as changing (default: 0.05)
    pub flux_threshold: f32,

    // Time-domain estimators
    /// YIN absolute threshold on the CMND curve (default: 0.10)
    pub yin_threshold: f32,
    /// Bass estimates with a YIN confidence below this are unvoiced (default: 0.5)
    pub min_bass_confidence: f32,
    /// Frequency range searched by the ACF booster (default: 200-1200 Hz)
    pub acf_range_hz: (f32, f32),
    /// RMS below which a frame counts as silence (default: 1e-3)
    pub amplitude_threshold: f32,

    /// Multiplier applied when the peak and chroma digits agree (default: 1.2)
    pub agreement_bonus: f32,

    // Recency windows
    pub key_window: usize,
    pub key_weighting: KeyWeighting,
    pub main_note_window: usize,
    pub main_note_strategy: MainNoteStrategy,
    /// Maximum entries kept in each band's sample log (default: 1000)
    pub log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            a4_hz: 440.0,
            frame_size: 4096,
            hop_size: 2048,
            band_ranges: BandRanges::default(),
            band_weights: BandWeights::default(),
            smoothing_alpha: 0.22,
            max_peaks: 7,
            min_peak_distance: 2,
            noise_floor_db: -90.0,
            display_min_db: -100.0,
            display_max_db: -10.0,
            flatness_threshold: 0.8,
            flux_threshold: 0.05,
            yin_threshold: 0.10,
            min_bass_confidence: 0.5,
            acf_range_hz: (200.0, 1200.0),
            amplitude_threshold: 1e-3,
            agreement_bonus: 1.2,
            key_window: 600,
            key_weighting: KeyWeighting::Count,
            main_note_window: 150,
            main_note_strategy: MainNoteStrategy::RelativeToTonic,
            log_capacity: 1000,
        }
    }
}

impl EngineConfig {
    /// Checks the invariants the analysis relies on.
    pub fn validate(&self) -> Result<()> {
        if !(self.a4_hz.is_finite() && self.a4_hz > 0.0) {
            return Err(invalid(format!("a4_hz must be positive, got {}", self.a4_hz)));
        }
        if self.frame_size < 64 || !self.frame_size.is_power_of_two() {
            return Err(invalid(format!(
                "frame_size must be a power of two >= 64, got {}",
                self.frame_size
            )));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(invalid(format!(
                "hop_size must be in 1..={}, got {}",
                self.frame_size, self.hop_size
            )));
        }
        for band in Band::ALL {
            if !self.band_ranges.get(band).is_valid() {
                return Err(invalid(format!("{band} band range is empty or not finite")));
            }
        }
        if !self.band_weights.is_valid() {
            return Err(invalid("band weights must be finite and non-negative".into()));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(invalid(format!(
                "smoothing_alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        if self.max_peaks == 0 {
            return Err(invalid("max_peaks must be at least 1".into()));
        }
        if self.display_max_db <= self.display_min_db {
            return Err(invalid("display_max_db must exceed display_min_db".into()));
        }
        if !(0.0..=1.0).contains(&self.min_bass_confidence) {
            return Err(invalid(format!(
                "min_bass_confidence must be in [0, 1], got {}",
                self.min_bass_confidence
            )));
        }
        let (acf_lo, acf_hi) = self.acf_range_hz;
        if !(acf_lo > 0.0 && acf_hi > acf_lo) {
            return Err(invalid("acf_range_hz must be an increasing positive range".into()));
        }
        if self.key_window == 0 || self.main_note_window == 0 || self.log_capacity == 0 {
            return Err(invalid("window sizes must be non-zero".into()));
        }
        Ok(())
    }
}

fn invalid(msg: String) -> Error {
    Error::InvalidConfig(msg)
}
