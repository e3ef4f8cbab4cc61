//! # Analysis Session Module
//!
//! The session owns every piece of mutable analysis state: per-band readers
//! and their smoothing, per-band digit counts, the weighted "embodiment"
//! counts, the bounded sample logs and the key window. It is driven one frame
//! at a time and read through cloned [`Snapshot`]s.
//!
//! ## State machine
//! - `Idle` -> `Running` on [`Session::start`] (always after a full reset)
//! - `Running` <-> `Paused` on [`Session::pause`] / [`Session::resume`]
//! - `Running`/`Paused` -> `Idle` on [`Session::stop`] or [`Session::reset`]

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

use crate::band::{Band, BandWeights};
use crate::config::EngineConfig;
use crate::counts::{DigitCounts, DigitShare};
use crate::error::{Error, Result};
use crate::fft::{SpectralFrontend, Spectrum};
use crate::key::{KeyEstimate, KeyEstimator};
use crate::main_note::{self, MainNote};
use crate::pitch;
use crate::reader::{BandReading, BassReader, FrameContext, HarmonicReader};
use crate::schedule::Frame;
use crate::tuning::{self, Digit};

/// Number of digits in a top-N summary.
pub const SUMMARY_DIGITS: usize = 3;

/// Highest sample rate a session accepts.
const MAX_SAMPLE_RATE: u32 = 384_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
}

/// One voting frame of a band, kept for display and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleLogEntry {
    pub timestamp_seconds: f64,
    pub frequency_hz: f32,
    pub midi_note: i32,
    pub digit: Digit,
    pub cents: f32,
}

/// Latest per-band readout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandReadout {
    pub band: Band,
    pub frequency_hz: f32,
    pub midi_note: Option<i32>,
    pub note_name: Option<String>,
    pub digit: Option<Digit>,
    pub cents: f32,
    pub confidence: f32,
}

impl BandReadout {
    fn empty(band: Band) -> Self {
        Self {
            band,
            frequency_hz: 0.0,
            midi_note: None,
            note_name: None,
            digit: None,
            cents: 0.0,
            confidence: 0.0,
        }
    }

    fn from_reading(band: Band, reading: &BandReading) -> Self {
        let estimate = &reading.estimate;
        let digit = reading.vote.map(|v| v.digit).or_else(|| {
            estimate
                .midi_note
                .map(|m| tuning::digit_for_pitch_class(tuning::pitch_class(m)))
        });
        Self {
            band,
            frequency_hz: estimate.frequency_hz,
            midi_note: estimate.midi_note,
            note_name: estimate.midi_note.map(tuning::note_name),
            digit,
            cents: estimate.cents,
            confidence: estimate.confidence,
        }
    }
}

/// What one processed frame produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub frame_index: u64,
    pub timestamp_seconds: f64,
    /// Readouts in [`Band::ALL`] order.
    pub readouts: Vec<BandReadout>,
}

/// Per-band section of a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSnapshot {
    pub readout: BandReadout,
    pub counts: DigitCounts,
    pub summary: Vec<DigitShare>,
    pub log_len: usize,
}

/// Point-in-time copy of the whole session, safe to hand to other threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: SessionState,
    pub sample_rate: u32,
    pub a4_hz: f32,
    pub band_weights: BandWeights,
    pub frames_processed: u64,
    /// Bands in [`Band::ALL`] order.
    pub bands: Vec<BandSnapshot>,
    pub embodiment: DigitCounts,
    pub embodiment_summary: Vec<DigitShare>,
    pub key: KeyEstimate,
    pub main_note: Option<MainNote>,
}

impl Snapshot {
    pub fn band(&self, band: Band) -> &BandSnapshot {
        &self.bands[band.index()]
    }
}

#[derive(Debug, Clone)]
struct BandState {
    readout: BandReadout,
    counts: DigitCounts,
    log: VecDeque<SampleLogEntry>,
}

impl BandState {
    fn new(band: Band) -> Self {
        Self {
            readout: BandReadout::empty(band),
            counts: DigitCounts::new(),
            log: VecDeque::new(),
        }
    }

    fn clear(&mut self) {
        self.readout = BandReadout::empty(self.readout.band);
        self.counts.clear();
        self.log.clear();
    }
}

/// A single analysis session.
pub struct Session {
    config: EngineConfig,
    state: SessionState,
    sample_rate: u32,
    frontend: SpectralFrontend,
    previous: Spectrum,
    bass: BassReader,
    harmonic: [HarmonicReader; 3],
    bands: [BandState; 4],
    embodiment: DigitCounts,
    key: KeyEstimator,
    recent_pitch_classes: VecDeque<u8>,
    frames_processed: u64,
}

impl Session {
    /// Creates an idle session. Fails if `config` is invalid.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let sample_rate = 44100;
        Ok(Self {
            frontend: SpectralFrontend::new(config.frame_size),
            previous: Spectrum::silent(config.frame_size / 2, sample_rate),
            bass: BassReader::new(&config),
            harmonic: Band::HARMONIC.map(|band| HarmonicReader::new(band, &config)),
            bands: Band::ALL.map(BandState::new),
            embodiment: DigitCounts::new(),
            key: KeyEstimator::new(config.key_window, config.key_weighting),
            recent_pitch_classes: VecDeque::with_capacity(config.main_note_window),
            frames_processed: 0,
            state: SessionState::Idle,
            sample_rate,
            config,
        })
    }

    // --- Commands ---

    /// Resets everything and starts a fresh run at `sample_rate`.
    ///
    /// On error the session is left exactly as it was.
    pub fn start(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 || sample_rate > MAX_SAMPLE_RATE {
            return Err(Error::InvalidConfig(format!(
                "sample rate must be in 1..={MAX_SAMPLE_RATE}, got {sample_rate}"
            )));
        }
        self.clear();
        self.sample_rate = sample_rate;
        self.previous = Spectrum::silent(self.config.frame_size / 2, sample_rate);
        self.state = SessionState::Running;
        debug!(sample_rate, "session started");
        Ok(())
    }

    /// Ends the run and clears counts and logs. No-op when idle.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.clear();
        self.state = SessionState::Idle;
        debug!("session stopped");
    }

    pub fn pause(&mut self) {
        if self.state == SessionState::Running {
            self.state = SessionState::Paused;
            self.previous = Spectrum::silent(self.config.frame_size / 2, self.sample_rate);
            debug!(frames = self.frames_processed, "session paused");
        }
    }

    pub fn resume(&mut self) {
        if self.state == SessionState::Paused {
            self.state = SessionState::Running;
            debug!("session resumed");
        }
    }

    /// Clears all accumulated state and returns to `Idle`.
    pub fn reset(&mut self) {
        self.clear();
        self.state = SessionState::Idle;
        debug!("session reset");
    }

    /// Changes the A4 reference. Accumulated counts are kept.
    pub fn set_tuning(&mut self, a4_hz: f32) -> Result<()> {
        if !(a4_hz.is_finite() && a4_hz > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "a4_hz must be positive, got {a4_hz}"
            )));
        }
        self.config.a4_hz = a4_hz;
        debug!(a4_hz, "tuning changed");
        Ok(())
    }

    /// Changes the embodiment weights. Accumulated counts are kept.
    pub fn set_band_weights(&mut self, weights: BandWeights) -> Result<()> {
        if !weights.is_valid() {
            return Err(Error::InvalidConfig(
                "band weights must be finite and non-negative".into(),
            ));
        }
        self.config.band_weights = weights;
        debug!(?weights, "band weights changed");
        Ok(())
    }

    // --- Frame loop ---

    /// Analyzes one frame. Does nothing unless the session is running.
    pub fn process_frame(&mut self, frame: &Frame) -> Option<TickReport> {
        if self.state != SessionState::Running {
            return None;
        }

        let sample_rate = self.sample_rate;
        let spectrum = self.frontend.analyze(&frame.samples, sample_rate);
        let (acf_lo, acf_hi) = self.config.acf_range_hz;
        let acf = if pitch::rms(&frame.samples) >= self.config.amplitude_threshold {
            pitch::autocorrelation_f0(&frame.samples, sample_rate, acf_lo, acf_hi)
        } else {
            None
        };

        let ctx = FrameContext {
            samples: &frame.samples,
            spectrum: &spectrum,
            previous: &self.previous,
            sample_rate,
            a4_hz: self.config.a4_hz,
            acf,
        };
        let config = &self.config;
        let mut readings = [BandReading::silent(); 4];
        readings[Band::Bass.index()] = self.bass.read(&ctx, config);
        for reader in &mut self.harmonic {
            readings[reader.band().index()] = reader.read(&ctx, config);
        }
        self.previous = spectrum;

        let timestamp_seconds = frame.start_sample as f64 / sample_rate as f64;
        for band in Band::ALL {
            self.record(band, &readings[band.index()], timestamp_seconds);
        }

        let frame_index = self.frames_processed;
        self.frames_processed += 1;
        trace!(
            frame_index,
            voted = readings.iter().filter(|r| r.vote.is_some()).count(),
            gated = readings.iter().filter(|r| r.percussive).count(),
            "frame analyzed"
        );

        Some(TickReport {
            frame_index,
            timestamp_seconds,
            readouts: Band::ALL
                .iter()
                .map(|&b| self.bands[b.index()].readout.clone())
                .collect(),
        })
    }

    fn record(&mut self, band: Band, reading: &BandReading, timestamp_seconds: f64) {
        let weight = self.config.band_weights.get(band);
        let capacity = self.config.log_capacity;
        let state = &mut self.bands[band.index()];
        state.readout = BandReadout::from_reading(band, reading);

        let (Some(vote), Some(midi)) = (reading.vote, reading.estimate.midi_note) else {
            return;
        };
        state.counts.add_vote(vote);
        self.embodiment.add(vote.digit, vote.weight * weight);

        if state.log.len() == capacity {
            state.log.pop_front();
        }
        state.log.push_back(SampleLogEntry {
            timestamp_seconds,
            frequency_hz: reading.estimate.frequency_hz,
            midi_note: midi,
            digit: vote.digit,
            cents: reading.estimate.cents,
        });

        if band.is_harmonic() {
            let pc = tuning::pitch_class(midi);
            self.key.push(pc, vote.weight);
            if self.recent_pitch_classes.len() == self.config.main_note_window {
                self.recent_pitch_classes.pop_front();
            }
            self.recent_pitch_classes.push_back(pc);
        }
    }

    fn clear(&mut self) {
        for band in &mut self.bands {
            band.clear();
        }
        self.bass.reset();
        for reader in &mut self.harmonic {
            reader.reset();
        }
        self.embodiment.clear();
        self.key.clear();
        self.recent_pitch_classes.clear();
        self.previous = Spectrum::silent(self.config.frame_size / 2, self.sample_rate);
        self.frames_processed = 0;
    }

    // --- Queries ---

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn readout(&self, band: Band) -> &BandReadout {
        &self.bands[band.index()].readout
    }

    pub fn counts(&self, band: Band) -> &DigitCounts {
        &self.bands[band.index()].counts
    }

    pub fn embodiment(&self) -> &DigitCounts {
        &self.embodiment
    }

    pub fn summary(&self, band: Band) -> Vec<DigitShare> {
        self.counts(band).top(SUMMARY_DIGITS)
    }

    pub fn embodiment_summary(&self) -> Vec<DigitShare> {
        self.embodiment.top(SUMMARY_DIGITS)
    }

    pub fn key_estimate(&self) -> KeyEstimate {
        self.key.estimate()
    }

    pub fn main_note(&self) -> Option<MainNote> {
        let window: Vec<u8> = self.recent_pitch_classes.iter().copied().collect();
        main_note::find_main_note(&window, self.config.main_note_strategy, &self.key_estimate())
    }

    /// Voting frames of `band`, oldest first.
    pub fn sample_log(&self, band: Band) -> impl Iterator<Item = &SampleLogEntry> + '_ {
        self.bands[band.index()].log.iter()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            sample_rate: self.sample_rate,
            a4_hz: self.config.a4_hz,
            band_weights: self.config.band_weights,
            frames_processed: self.frames_processed,
            bands: self
                .bands
                .iter()
                .map(|b| BandSnapshot {
                    readout: b.readout.clone(),
                    counts: b.counts,
                    summary: b.counts.top(SUMMARY_DIGITS),
                    log_len: b.log.len(),
                })
                .collect(),
            embodiment: self.embodiment,
            embodiment_summary: self.embodiment_summary(),
            key: self.key_estimate(),
            main_note: self.main_note(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn sine_frame(freq: f32, start: u64) -> Frame {
        let samples = (0..4096u64)
            .map(|i| {
                let t = (start + i) as f32 / SR as f32;
                0.5 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect();
        Frame {
            samples,
            start_sample: start,
        }
    }

    fn running() -> Session {
        let mut session = Session::new(EngineConfig::default()).unwrap();
        session.start(SR).unwrap();
        session
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = Session::new(EngineConfig::default()).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.embodiment().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            frame_size: 1000,
            ..EngineConfig::default()
        };
        assert!(Session::new(config).is_err());
    }

    #[test]
    fn test_idle_session_ignores_frames() {
        let mut session = Session::new(EngineConfig::default()).unwrap();
        assert!(session.process_frame(&sine_frame(440.0, 0)).is_none());
        assert_eq!(session.frames_processed(), 0);
    }

    #[test]
    fn test_start_with_bad_rate_leaves_state() {
        let mut session = running();
        session.process_frame(&sine_frame(440.0, 0));
        assert!(session.start(0).is_err());
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.frames_processed(), 1);
    }

    #[test]
    fn test_a4_votes_low_band() {
        let mut session = running();
        let report = session.process_frame(&sine_frame(440.0, 0)).unwrap();
        assert_eq!(report.frame_index, 0);
        let low = &report.readouts[Band::Low.index()];
        assert_eq!(low.midi_note, Some(69));
        assert_eq!(low.note_name.as_deref(), Some("A4"));
        assert_eq!(low.digit.map(Digit::value), Some(1));
        assert_eq!(session.counts(Band::Low).lead().map(Digit::value), Some(1));
        assert_eq!(session.sample_log(Band::Low).count(), 1);
        assert!(!session.embodiment().is_empty());
    }

    #[test]
    fn test_pause_blocks_accumulation_and_resume_continues() {
        let mut session = running();
        session.process_frame(&sine_frame(440.0, 0));
        let before = *session.counts(Band::Low);

        session.pause();
        session.pause();
        assert_eq!(session.state(), SessionState::Paused);
        assert!(session.process_frame(&sine_frame(440.0, 2048)).is_none());
        assert_eq!(*session.counts(Band::Low), before);

        session.resume();
        session.process_frame(&sine_frame(440.0, 2048));
        assert!(session.counts(Band::Low).total() > before.total());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut session = running();
        session.process_frame(&sine_frame(440.0, 0));
        session.stop();
        let first = session.snapshot();
        session.stop();
        assert_eq!(session.snapshot(), first);
        assert_eq!(first.state, SessionState::Idle);
        assert!(first.embodiment.is_empty());
        assert_eq!(first.frames_processed, 0);
    }

    #[test]
    fn test_settings_do_not_reset() {
        let mut session = running();
        session.process_frame(&sine_frame(440.0, 0));
        let total = session.embodiment().total();

        session.set_tuning(442.0).unwrap();
        session.set_band_weights(BandWeights::default()).unwrap();
        assert_eq!(session.embodiment().total(), total);
        assert!(session.set_tuning(f32::NAN).is_err());
        assert!(session.set_tuning(-1.0).is_err());
        let bad = BandWeights {
            bass: -0.1,
            ..BandWeights::default()
        };
        assert!(session.set_band_weights(bad).is_err());
        assert_eq!(session.config().a4_hz, 442.0);
    }

    #[test]
    fn test_zero_weight_band_skips_embodiment() {
        let mut session = running();
        session
            .set_band_weights(BandWeights {
                bass: 0.0,
                low: 0.0,
                mid: 0.0,
                high: 0.0,
            })
            .unwrap();
        session.process_frame(&sine_frame(440.0, 0));
        assert!(session.embodiment().is_empty());
        assert!(!session.counts(Band::Low).is_empty());
    }

    #[test]
    fn test_log_capacity() {
        let config = EngineConfig {
            log_capacity: 3,
            ..EngineConfig::default()
        };
        let mut session = Session::new(config).unwrap();
        session.start(SR).unwrap();
        for i in 0..6 {
            session.process_frame(&sine_frame(440.0, i * 2048));
        }
        let log: Vec<_> = session.sample_log(Band::Low).collect();
        assert_eq!(log.len(), 3);
        assert!(log[0].timestamp_seconds < log[2].timestamp_seconds);
    }

    #[test]
    fn test_main_note_follows_harmonic_votes() {
        let mut session = running();
        for i in 0..4 {
            session.process_frame(&sine_frame(440.0, i * 2048));
        }
        let note = session.main_note().unwrap();
        assert_eq!(note.pitch_class, 9);
        assert_eq!(note.note_name, "A");
    }
}
