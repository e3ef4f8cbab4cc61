//! # Band Reader Module
//!
//! Turns one analysis frame into a pitch estimate and a digit vote for a
//! single band.
//!
//! ## Features
//! - Harmonic reader (low/mid/high): percussive gate, peak snap, chroma vote,
//!   autocorrelation booster and an agreement bonus between the two votes
//! - Bass reader: YIN with a band tolerance check
//! - Exponential smoothing of the raw frequency before snapping

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::band::{Band, BandRange};
use crate::config::EngineConfig;
use crate::counts::DigitVote;
use crate::fft::{Spectrum, db_scale};
use crate::gate::PercussiveGate;
use crate::pitch::{self, AcfEstimate};
use crate::tuning::{self, Digit};

/// Accepted slack below the bass range, in Hz.
const BASS_LOW_TOLERANCE_HZ: f32 = 5.0;
/// Accepted slack above the bass range, in Hz.
const BASS_HIGH_TOLERANCE_HZ: f32 = 20.0;

/// One band's pitch estimate for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Smoothed fundamental in Hz (0 when nothing was found).
    pub frequency_hz: f32,
    /// Nearest MIDI note; `None` for silence, noise and percussive frames.
    pub midi_note: Option<i32>,
    pub cents: f32,
    /// Confidence in [0, 1].
    pub confidence: f32,
}

impl PitchEstimate {
    pub fn none() -> Self {
        Self {
            frequency_hz: 0.0,
            midi_note: None,
            cents: 0.0,
            confidence: 0.0,
        }
    }

    pub fn is_pitched(&self) -> bool {
        self.midi_note.is_some()
    }
}

/// Output of a band reader for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandReading {
    pub estimate: PitchEstimate,
    /// The vote cast this frame, if any.
    pub vote: Option<DigitVote>,
    /// The percussive gate suppressed this frame.
    pub percussive: bool,
}

impl BandReading {
    pub fn silent() -> Self {
        Self {
            estimate: PitchEstimate::none(),
            vote: None,
            percussive: false,
        }
    }

    fn percussive() -> Self {
        Self {
            percussive: true,
            ..Self::silent()
        }
    }

    /// Replaces any NaN/inf result with silence.
    fn sanitized(self) -> Self {
        let e = &self.estimate;
        let finite = e.frequency_hz.is_finite() && e.cents.is_finite() && e.confidence.is_finite();
        let vote_ok = self.vote.is_none_or(|v| v.weight.is_finite() && v.weight >= 0.0);
        if finite && vote_ok { self } else { Self::silent() }
    }
}

/// Exponential moving average, `prev + alpha * (next - prev)`.
///
/// The first value is taken as-is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ema {
    alpha: f32,
    value: Option<f32>,
}

impl Ema {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: None }
    }

    pub fn update(&mut self, next: f32) -> f32 {
        let smoothed = match self.value {
            Some(prev) => prev + self.alpha * (next - prev),
            None => next,
        };
        self.value = Some(smoothed);
        smoothed
    }

    pub fn value(&self) -> Option<f32> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Everything the readers share for one frame.
pub struct FrameContext<'a> {
    /// Raw (unwindowed) time-domain samples.
    pub samples: &'a [f32],
    pub spectrum: &'a Spectrum,
    pub previous: &'a Spectrum,
    pub sample_rate: u32,
    pub a4_hz: f32,
    /// Frame-wide autocorrelation estimate, if the frame was loud enough.
    pub acf: Option<AcfEstimate>,
}

/// Soft 12-bin chroma over a bin range of linear magnitudes.
///
/// Each bin feeds its own pitch class with `1 - frac` and the next class up
/// with `frac / 2`.
pub fn band_chroma(spectrum: &Spectrum, range: RangeInclusive<usize>, a4: f32) -> [f32; 12] {
    let mut chroma = [0.0f32; 12];
    let mags = spectrum.magnitudes();
    for bin in range {
        let Some(&weight) = mags.get(bin) else { break };
        let freq = spectrum.bin_to_hz(bin as f32);
        if freq <= 0.0 || weight <= 0.0 {
            continue;
        }
        let pc = tuning::midi_from_frequency(freq, a4).rem_euclid(12.0);
        let pc0 = pc.floor();
        let frac = pc - pc0;
        let pc0 = pc0 as usize % 12;
        chroma[pc0] += (1.0 - frac) * weight;
        chroma[(pc0 + 1) % 12] += frac * weight * 0.5;
    }
    chroma
}

/// Strongest chroma class and its share of the chroma vector's norm.
fn chroma_vote(chroma: &[f32; 12]) -> Option<(u8, f32)> {
    let norm = chroma.iter().map(|v| v * v).sum::<f32>().sqrt();
    if !(norm.is_finite() && norm > 0.0) {
        return None;
    }
    let (pc, &max) = chroma
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))?;
    Some((pc as u8, max / norm))
}

/// Reader for one of the harmonic bands.
#[derive(Debug, Clone)]
pub struct HarmonicReader {
    band: Band,
    range: BandRange,
    gate: PercussiveGate,
    ema: Ema,
}

impl HarmonicReader {
    pub fn new(band: Band, config: &EngineConfig) -> Self {
        Self {
            band,
            range: config.band_ranges.get(band),
            gate: PercussiveGate::new(config.flatness_threshold, config.flux_threshold),
            ema: Ema::new(config.smoothing_alpha),
        }
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn reset(&mut self) {
        self.ema.reset();
    }

    pub fn read(&mut self, ctx: &FrameContext<'_>, config: &EngineConfig) -> BandReading {
        self.read_inner(ctx, config).sanitized()
    }

    fn read_inner(&mut self, ctx: &FrameContext<'_>, config: &EngineConfig) -> BandReading {
        let spectrum = ctx.spectrum;
        let Some(bins) = spectrum.bin_range(self.range.low_hz, self.range.high_hz) else {
            return BandReading::silent();
        };

        let stats = self.gate.measure(spectrum, ctx.previous, bins.clone());
        if self.gate.is_percussive(stats) {
            return BandReading::percussive();
        }

        // --- Peak snap ---
        let floor = 10f32.powf(config.noise_floor_db / 20.0);
        let peaks = pitch::pick_peaks(
            spectrum.magnitudes(),
            bins.clone(),
            config.max_peaks,
            config.min_peak_distance,
            floor,
        );
        let Some(lead) = peaks
            .iter()
            .copied()
            .max_by(|&a, &b| {
                let wa = db_scale(spectrum.magnitudes()[a], config.display_min_db, config.display_max_db);
                let wb = db_scale(spectrum.magnitudes()[b], config.display_min_db, config.display_max_db);
                wa.total_cmp(&wb).then(b.cmp(&a))
            })
        else {
            return BandReading::silent();
        };

        let refined = lead as f32 + pitch::parabolic_offset(spectrum.magnitudes(), lead);
        let raw_freq = spectrum.bin_to_hz(refined);
        let tolerance = spectrum.bin_hz();
        if !self.range.widened(tolerance, tolerance).contains(raw_freq) {
            return BandReading::silent();
        }

        let smoothed = self.ema.update(raw_freq);
        let Some(snap) = tuning::snap_frequency(smoothed, ctx.a4_hz) else {
            return BandReading::silent();
        };
        let digit_snap = snap.digit();
        let mut w_snap = snap.confidence();

        // --- Chroma vote ---
        let chroma = band_chroma(spectrum, bins, ctx.a4_hz);
        let chroma = chroma_vote(&chroma);
        let digit_chroma = chroma.map(|(pc, _)| tuning::digit_for_pitch_class(pc));
        let mut w_chroma = chroma.map_or(0.0, |(_, conf)| conf);

        // --- ACF booster ---
        let conf_acf = ctx
            .acf
            .and_then(|acf| {
                tuning::snap_frequency(acf.frequency, ctx.a4_hz)
                    .map(|s| acf.confidence * s.confidence())
            })
            .unwrap_or(0.0);

        if digit_chroma == Some(digit_snap) {
            w_snap *= config.agreement_bonus;
            w_chroma *= config.agreement_bonus;
        }
        let boost = 1.0 + 0.5 * conf_acf;
        w_snap *= boost;
        w_chroma *= boost;

        let (digit, weight): (Digit, f32) = match digit_chroma {
            Some(dc) if w_chroma > w_snap => (dc, w_chroma),
            _ => (digit_snap, w_snap),
        };
        let confidence = weight.clamp(0.0, 1.0);

        BandReading {
            estimate: PitchEstimate {
                frequency_hz: smoothed,
                midi_note: Some(snap.midi),
                cents: snap.cents,
                confidence,
            },
            vote: (confidence > 0.0).then_some(DigitVote {
                digit,
                weight: confidence,
            }),
            percussive: false,
        }
    }
}

/// Reader for the bass band.
#[derive(Debug, Clone)]
pub struct BassReader {
    range: BandRange,
    ema: Ema,
}

impl BassReader {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            range: config.band_ranges.bass,
            ema: Ema::new(config.smoothing_alpha),
        }
    }

    pub fn reset(&mut self) {
        self.ema.reset();
    }

    pub fn read(&mut self, ctx: &FrameContext<'_>, config: &EngineConfig) -> BandReading {
        self.read_inner(ctx, config).sanitized()
    }

    fn read_inner(&mut self, ctx: &FrameContext<'_>, config: &EngineConfig) -> BandReading {
        if pitch::rms(ctx.samples) < config.amplitude_threshold {
            return BandReading::silent();
        }
        let Some(yin) = pitch::yin_f0(
            ctx.samples,
            ctx.sample_rate,
            self.range.low_hz,
            self.range.high_hz,
            config.yin_threshold,
        ) else {
            return BandReading::silent();
        };

        // no clear periodicity: noise or a dense mix
        if yin.confidence < config.min_bass_confidence {
            return BandReading::silent();
        }
        let accepted = self
            .range
            .widened(BASS_LOW_TOLERANCE_HZ, BASS_HIGH_TOLERANCE_HZ);
        if !accepted.contains(yin.frequency) {
            return BandReading::silent();
        }

        let smoothed = self.ema.update(yin.frequency);
        let Some(snap) = tuning::snap_frequency(smoothed, ctx.a4_hz) else {
            return BandReading::silent();
        };
        let weight = (snap.confidence() * (0.65 + 0.35 * yin.confidence)).clamp(0.0, 1.0);

        BandReading {
            estimate: PitchEstimate {
                frequency_hz: smoothed,
                midi_note: Some(snap.midi),
                cents: snap.cents,
                confidence: weight,
            },
            vote: (weight > 0.0).then_some(DigitVote {
                digit: snap.digit(),
                weight,
            }),
            percussive: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::SpectralFrontend;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SR: u32 = 44100;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn read_harmonic(band: Band, samples: &[f32]) -> BandReading {
        let config = EngineConfig::default();
        let mut frontend = SpectralFrontend::new(config.frame_size);
        let spectrum = frontend.analyze(samples, SR);
        let previous = spectrum.clone();
        let ctx = FrameContext {
            samples,
            spectrum: &spectrum,
            previous: &previous,
            sample_rate: SR,
            a4_hz: config.a4_hz,
            acf: pitch::autocorrelation_f0(samples, SR, 200.0, 1200.0),
        };
        HarmonicReader::new(band, &config).read(&ctx, &config)
    }

    #[test]
    fn test_ema_smoothing() {
        let mut ema = Ema::new(0.5);
        assert_eq!(ema.update(100.0), 100.0);
        assert_eq!(ema.update(200.0), 150.0);
        ema.reset();
        assert_eq!(ema.value(), None);
        assert_eq!(ema.update(10.0), 10.0);
    }

    #[test]
    fn test_chroma_concentrates_on_sine_class() {
        let config = EngineConfig::default();
        let mut frontend = SpectralFrontend::new(config.frame_size);
        let spectrum = frontend.analyze(&sine(440.0, 4096), SR);
        let range = spectrum.bin_range(200.0, 500.0).unwrap();
        let chroma = band_chroma(&spectrum, range, 440.0);
        let (pc, conf) = chroma_vote(&chroma).unwrap();
        assert_eq!(pc, 9);
        assert!(conf > 0.5);
    }

    #[test]
    fn test_harmonic_reader_on_a4() {
        let reading = read_harmonic(Band::Low, &sine(440.0, 4096));
        assert_eq!(reading.estimate.midi_note, Some(69));
        assert!(reading.estimate.cents.abs() < 5.0);
        let vote = reading.vote.unwrap();
        assert_eq!(vote.digit.value(), 1);
        assert!(vote.weight > 0.95);
    }

    #[test]
    fn test_harmonic_reader_ignores_other_band() {
        // 440 Hz is below the mid band; only leakage reaches it
        let reading = read_harmonic(Band::High, &sine(440.0, 4096));
        assert!(reading.vote.is_none());
        assert!(!reading.estimate.is_pitched());
    }

    #[test]
    fn test_harmonic_reader_silence() {
        let reading = read_harmonic(Band::Mid, &vec![0.0; 4096]);
        assert_eq!(reading, BandReading::silent());
    }

    #[test]
    fn test_bass_reader_on_a2() {
        let config = EngineConfig::default();
        let samples = sine(110.0, 4096);
        let spectrum = Spectrum::silent(2048, SR);
        let ctx = FrameContext {
            samples: &samples,
            spectrum: &spectrum,
            previous: &spectrum,
            sample_rate: SR,
            a4_hz: 440.0,
            acf: None,
        };
        let reading = BassReader::new(&config).read(&ctx, &config);
        assert_eq!(reading.estimate.midi_note, Some(45));
        let vote = reading.vote.unwrap();
        assert_eq!(vote.digit.value(), 1);
        assert!(vote.weight > 0.9);
    }

    fn noise(len: usize, amplitude: f32, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.random_range(-amplitude..amplitude)).collect()
    }

    #[test]
    fn test_bass_reader_ignores_noise() {
        let config = EngineConfig::default();
        let spectrum = Spectrum::silent(2048, SR);
        for amplitude in [0.5, 0.1, 0.02] {
            let samples = noise(4096, amplitude, 9);
            let ctx = FrameContext {
                samples: &samples,
                spectrum: &spectrum,
                previous: &spectrum,
                sample_rate: SR,
                a4_hz: 440.0,
                acf: None,
            };
            let reading = BassReader::new(&config).read(&ctx, &config);
            assert!(reading.vote.is_none(), "bass voted on noise at {amplitude}");
        }
    }

    #[test]
    fn test_harmonic_gate_is_level_independent() {
        let config = EngineConfig::default();
        let mut frontend = SpectralFrontend::new(config.frame_size);
        for amplitude in [0.5, 0.1, 0.02] {
            let samples = noise(2 * 4096, amplitude, 4);
            let previous = frontend.analyze(&samples[..4096], SR);
            let current = frontend.analyze(&samples[4096..], SR);
            let ctx = FrameContext {
                samples: &samples[4096..],
                spectrum: &current,
                previous: &previous,
                sample_rate: SR,
                a4_hz: 440.0,
                acf: None,
            };
            let reading = HarmonicReader::new(Band::High, &config).read(&ctx, &config);
            assert!(reading.percussive, "high band passed noise at {amplitude}");
            assert!(reading.vote.is_none());
        }
    }

    #[test]
    fn test_bass_reader_silence() {
        let config = EngineConfig::default();
        let samples = vec![0.0; 4096];
        let spectrum = Spectrum::silent(2048, SR);
        let ctx = FrameContext {
            samples: &samples,
            spectrum: &spectrum,
            previous: &spectrum,
            sample_rate: SR,
            a4_hz: 440.0,
            acf: None,
        };
        assert!(BassReader::new(&config).read(&ctx, &config).vote.is_none());
    }
}
