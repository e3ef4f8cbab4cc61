//! # Percussive Gate Module
//!
//! Rejects frames whose energy inside a band is broadband and transient
//! (drum hits, cymbals). Such frames would otherwise hand the peak picker a
//! loud but meaningless "fundamental".
//!
//! Both statistics are scale free: flatness is a ratio of means and flux is
//! taken relative to the band's magnitude sum, so the same noise is rejected
//! at any level.

use std::ops::RangeInclusive;

use crate::fft::{MAGNITUDE_FLOOR, Spectrum, spectral_flatness, spectral_flux};

/// Flatness and flux statistics of one band in one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateStats {
    pub flatness: f32,
    /// Positive flux divided by the band's current magnitude sum.
    pub flux: f32,
}

/// Flatness-and-flux percussive frame detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercussiveGate {
    pub flatness_threshold: f32,
    pub flux_threshold: f32,
}

impl Default for PercussiveGate {
    fn default() -> Self {
        Self {
            flatness_threshold: 0.8,
            flux_threshold: 0.05,
        }
    }
}

impl PercussiveGate {
    pub fn new(flatness_threshold: f32, flux_threshold: f32) -> Self {
        Self {
            flatness_threshold,
            flux_threshold,
        }
    }

    pub fn measure(
        &self,
        current: &Spectrum,
        previous: &Spectrum,
        range: RangeInclusive<usize>,
    ) -> GateStats {
        let energy: f32 = current
            .magnitudes()
            .get(range.clone())
            .map_or(0.0, |band| band.iter().sum());
        let flux = spectral_flux(previous.magnitudes(), current.magnitudes(), range.clone());
        GateStats {
            flatness: spectral_flatness(current.magnitudes(), range),
            flux: if energy > MAGNITUDE_FLOOR { flux / energy } else { 0.0 },
        }
    }

    /// True when the band is both noise-like and changing fast.
    pub fn is_percussive(&self, stats: GateStats) -> bool {
        stats.flatness > self.flatness_threshold && stats.flux > self.flux_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noise_magnitudes(rng: &mut StdRng, scale: f32) -> Vec<f32> {
        (0..64).map(|_| scale * rng.random_range(0.2f32..1.0)).collect()
    }

    #[test]
    fn test_noise_burst_is_percussive() {
        let gate = PercussiveGate::default();
        let previous = Spectrum::silent(64, 8000);
        let current = Spectrum::new(vec![0.01; 64], 8000);
        let stats = gate.measure(&current, &previous, 0..=63);
        assert!(stats.flatness > 0.99);
        assert!(gate.is_percussive(stats));
    }

    #[test]
    fn test_steady_noise_is_not_percussive() {
        let gate = PercussiveGate::default();
        let spectrum = Spectrum::new(vec![0.01; 64], 8000);
        let stats = gate.measure(&spectrum, &spectrum, 0..=63);
        assert_eq!(stats.flux, 0.0);
        assert!(!gate.is_percussive(stats));
    }

    #[test]
    fn test_tonal_onset_is_not_percussive() {
        let gate = PercussiveGate::default();
        let previous = Spectrum::silent(64, 8000);
        let mut mags = vec![1e-6; 64];
        mags[20] = 0.2;
        let current = Spectrum::new(mags, 8000);
        let stats = gate.measure(&current, &previous, 0..=63);
        assert!(stats.flux > gate.flux_threshold);
        assert!(!gate.is_percussive(stats));
    }

    #[test]
    fn test_verdict_does_not_depend_on_level() {
        let gate = PercussiveGate::default();
        let mut verdicts = Vec::new();
        for scale in [0.5, 1e-2, 1e-4] {
            let mut rng = StdRng::seed_from_u64(11);
            let previous = Spectrum::new(noise_magnitudes(&mut rng, scale), 8000);
            let current = Spectrum::new(noise_magnitudes(&mut rng, scale), 8000);
            let stats = gate.measure(&current, &previous, 0..=63);
            assert!(stats.flux > gate.flux_threshold, "flux {} at {scale}", stats.flux);
            verdicts.push((gate.is_percussive(stats), stats.flux));
        }
        assert!(verdicts.iter().all(|&(percussive, _)| percussive));
        let (_, reference) = verdicts[0];
        assert!(verdicts.iter().all(|&(_, flux)| (flux - reference).abs() < 1e-3));
    }

    #[test]
    fn test_silent_band_has_no_flux() {
        let gate = PercussiveGate::default();
        let silent = Spectrum::silent(64, 8000);
        let stats = gate.measure(&silent, &silent, 0..=63);
        assert_eq!(stats.flux, 0.0);
        assert!(!gate.is_percussive(stats));
    }
}
