//! # Spectral Frontend Module
//!
//! Turns time-domain frames into magnitude spectra and provides the spectral
//! statistics the band readers rely on.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per frame size
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal for accurate analysis
//! - Spectral flatness and spectral flux over a bin range

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Magnitudes are floored at this value before logs and ratios.
pub const MAGNITUDE_FLOOR: f32 = 1e-8;

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Symmetric Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Magnitude spectrum of one frame.
///
/// Holds `frame_size / 2` bins covering 0 Hz up to (but excluding) Nyquist.
/// Magnitudes are normalized by the frame length.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    magnitudes: Vec<f32>,
    sample_rate: u32,
}

impl Spectrum {
    pub fn new(magnitudes: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            magnitudes,
            sample_rate,
        }
    }

    /// An all-zero spectrum, used as the "previous frame" at session start.
    pub fn silent(num_bins: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; num_bins], sample_rate)
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Width of one bin in Hz (`nyquist / num_bins`).
    pub fn bin_hz(&self) -> f32 {
        if self.magnitudes.is_empty() {
            return 0.0;
        }
        (self.sample_rate as f32 / 2.0) / self.magnitudes.len() as f32
    }

    /// Converts a (possibly fractional) bin index to Hz.
    pub fn bin_to_hz(&self, bin: f32) -> f32 {
        bin * self.bin_hz()
    }

    /// Inclusive bin range covering `[low_hz, high_hz]`.
    ///
    /// Returns `None` when the range lies entirely above Nyquist.
    pub fn bin_range(&self, low_hz: f32, high_hz: f32) -> Option<RangeInclusive<usize>> {
        let bin_hz = self.bin_hz();
        if bin_hz <= 0.0 {
            return None;
        }
        let last = self.magnitudes.len() - 1;
        let start = (low_hz / bin_hz).floor().max(0.0) as usize;
        let end = ((high_hz / bin_hz).floor() as usize).min(last);
        (start <= end).then_some(start..=end)
    }
}

/// Reusable FFT state for one frame size.
pub struct SpectralFrontend {
    frame_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Pre-allocated buffers reused for every frame
    scratch: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl SpectralFrontend {
    pub fn new(frame_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        Self {
            frame_size,
            fft,
            window: hann_window(frame_size),
            scratch: vec![0.0; frame_size],
            buffer: vec![Complex::new(0.0, 0.0); frame_size],
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Computes the magnitude spectrum of a frame.
    ///
    /// The frame is DC-corrected and Hann-windowed before the transform.
    /// Frames shorter than the frame size are zero padded, longer ones are
    /// truncated.
    pub fn analyze(&mut self, frame: &[f32], sample_rate: u32) -> Spectrum {
        let n = self.frame_size;
        let used = frame.len().min(n);
        self.scratch[..used].copy_from_slice(&frame[..used]);
        self.scratch[used..].fill(0.0);
        remove_dc_offset(&mut self.scratch[..used]);

        for ((slot, &sample), &w) in self.buffer.iter_mut().zip(&self.scratch).zip(&self.window) {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let scale = 1.0 / n as f32;
        let magnitudes = self
            .buffer
            .iter()
            .take(n / 2)
            .map(|c| {
                let m = c.norm() * scale;
                if m.is_finite() { m } else { 0.0 }
            })
            .collect();
        Spectrum::new(magnitudes, sample_rate)
    }
}

/// Geometric mean over arithmetic mean of the magnitudes in `range`.
///
/// Values near 1.0 indicate a noise-like spectrum, values near 0 a tonal one.
pub fn spectral_flatness(magnitudes: &[f32], range: RangeInclusive<usize>) -> f32 {
    let Some(slice) = magnitudes.get(range) else {
        return 0.0;
    };
    if slice.is_empty() {
        return 0.0;
    }
    let n = slice.len() as f64;
    let (log_sum, sum) = slice.iter().fold((0.0f64, 0.0f64), |(l, s), &m| {
        let v = m.max(MAGNITUDE_FLOOR) as f64;
        (l + v.ln(), s + v)
    });
    let geometric = (log_sum / n).exp();
    let arithmetic = (sum / n).max(MAGNITUDE_FLOOR as f64);
    let flatness = (geometric / arithmetic) as f32;
    if flatness.is_finite() { flatness } else { 0.0 }
}

/// Sum of positive magnitude increases from `previous` to `current` in `range`.
pub fn spectral_flux(previous: &[f32], current: &[f32], range: RangeInclusive<usize>) -> f32 {
    if previous.len() != current.len() {
        return 0.0;
    }
    let (Some(prev), Some(cur)) = (previous.get(range.clone()), current.get(range)) else {
        return 0.0;
    };
    prev.iter()
        .zip(cur)
        .map(|(&p, &c)| (c - p).max(0.0))
        .sum()
}

/// Magnitude in dB, floored.
pub fn to_decibels(magnitude: f32) -> f32 {
    20.0 * magnitude.max(MAGNITUDE_FLOOR).log10()
}

/// Maps a magnitude onto 0..1 between `min_db` and `max_db`.
pub fn db_scale(magnitude: f32, min_db: f32, max_db: f32) -> f32 {
    ((to_decibels(magnitude) - min_db) / (max_db - min_db)).clamp(0.0, 1.0)
}
