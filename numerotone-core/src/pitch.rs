//! # Pitch Detection Module
//!
//! The three fundamental-frequency estimators used by the band readers.
//!
//! ## Features
//! - Band-limited spectral peak picking with parabolic interpolation
//! - Time-domain autocorrelation, used as a confidence booster
//! - YIN pitch detection for the bass band
//! - RMS amplitude gating to filter out silence

use std::ops::RangeInclusive;

use crate::fft::MAGNITUDE_FLOOR;

/// Guard for divisions in the correlation estimators.
const EPSILON: f32 = 1e-9;

/// Root mean square of a signal.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Finds up to `max_peaks` local maxima of `magnitudes` inside `range`.
///
/// Peaks must be strictly above `floor` and at least `min_distance` bins
/// apart. Neighbours outside `range` still count, so the skirt of a peak
/// just outside the band is not mistaken for one. The result is ordered
/// strongest first.
pub fn pick_peaks(
    magnitudes: &[f32],
    range: RangeInclusive<usize>,
    max_peaks: usize,
    min_distance: usize,
    floor: f32,
) -> Vec<usize> {
    let (start, end) = (*range.start(), *range.end());
    if magnitudes.is_empty() || start > end || start >= magnitudes.len() {
        return Vec::new();
    }
    let end = end.min(magnitudes.len() - 1);

    let mut candidates: Vec<usize> = (start..=end)
        .filter(|&i| {
            let m = magnitudes[i];
            if !(m > floor) {
                return false;
            }
            let left = if i > 0 { magnitudes[i - 1] } else { f32::MIN };
            let right = magnitudes.get(i + 1).copied().unwrap_or(f32::MIN);
            m >= left && m > right
        })
        .collect();
    candidates.sort_by(|&a, &b| magnitudes[b].total_cmp(&magnitudes[a]).then(a.cmp(&b)));

    let mut peaks: Vec<usize> = Vec::with_capacity(max_peaks);
    for bin in candidates {
        if peaks.iter().all(|&p| p.abs_diff(bin) >= min_distance) {
            peaks.push(bin);
            if peaks.len() >= max_peaks {
                break;
            }
        }
    }
    peaks
}

/// Sub-bin offset of a peak from a parabola through its log magnitudes.
///
/// The offset is clamped to ±1 bin; flat or edge peaks yield 0.
pub fn parabolic_offset(magnitudes: &[f32], bin: usize) -> f32 {
    if bin == 0 || bin + 1 >= magnitudes.len() {
        return 0.0;
    }
    let y1 = magnitudes[bin - 1].max(MAGNITUDE_FLOOR).ln();
    let y2 = magnitudes[bin].max(MAGNITUDE_FLOOR).ln();
    let y3 = magnitudes[bin + 1].max(MAGNITUDE_FLOOR).ln();

    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < 1e-6 {
        return 0.0;
    }
    let shift = 0.5 * (y1 - y3) / denominator;
    if shift.is_finite() { shift.clamp(-1.0, 1.0) } else { 0.0 }
}

/// Result of the autocorrelation estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcfEstimate {
    pub frequency: f32,
    /// Normalized margin between the best and second-best correlation peak.
    pub confidence: f32,
}

/// Time-domain autocorrelation fundamental in `[f_min, f_max]`.
///
/// Picks the lag with the highest correlation; confidence is the margin over
/// the second-highest local peak of the correlation curve.
///
/// # Returns
/// * `Some(estimate)` - Best lag converted to Hz plus its confidence
/// * `None` - Signal too short, silent, or correlation not positive
pub fn autocorrelation_f0(
    signal: &[f32],
    sample_rate: u32,
    f_min: f32,
    f_max: f32,
) -> Option<AcfEstimate> {
    if f_min <= 0.0 || f_max <= f_min {
        return None;
    }
    let min_lag = ((sample_rate as f32 / f_max).floor() as usize).max(1);
    let max_lag = (sample_rate as f32 / f_min).floor() as usize;
    if max_lag >= signal.len() || min_lag > max_lag {
        return None;
    }

    let correlation: Vec<f32> = (min_lag..=max_lag)
        .map(|lag| {
            signal[..signal.len() - lag]
                .iter()
                .zip(&signal[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect();

    let (best_idx, &best) = correlation
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if !(best.is_finite() && best > EPSILON) {
        return None;
    }

    // Second-best local peak, excluding the winner itself.
    let second = (0..correlation.len())
        .filter(|&i| i != best_idx)
        .filter(|&i| {
            let c = correlation[i];
            let left = i == 0 || correlation[i - 1] <= c;
            let right = i + 1 == correlation.len() || correlation[i + 1] < c;
            left && right
        })
        .map(|i| correlation[i])
        .fold(f32::NEG_INFINITY, f32::max);

    let confidence = ((best - second.max(EPSILON)) / best.max(EPSILON)).clamp(0.0, 1.0);
    let frequency = sample_rate as f32 / (min_lag + best_idx) as f32;
    frequency.is_finite().then_some(AcfEstimate {
        frequency,
        confidence,
    })
}

/// Result of the YIN estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YinEstimate {
    pub frequency: f32,
    /// `1 - cmnd[tau]`, clamped to [0, 1].
    pub confidence: f32,
}

/// YIN fundamental estimation restricted to `[f_min, f_max]`.
///
/// # Arguments
/// * `signal` - Input audio signal (one frame, not windowed)
/// * `sample_rate` - Sample rate in Hz
/// * `f_min`, `f_max` - Search range in Hz; sets the candidate lags
/// * `threshold` - Absolute threshold on the CMND curve
///
/// # Returns
/// * `Some(estimate)` - Bottom of the first dip that crosses the threshold
///   (or the global minimum when none does), refined with parabolic
///   interpolation. On a pure tone the dip is wide and its first crossing
///   sits several lags short of the period, so the first crossing alone
///   would read sharp by up to a semitone.
/// * `None` - Frame too short for the range, or a degenerate result
pub fn yin_f0(
    signal: &[f32],
    sample_rate: u32,
    f_min: f32,
    f_max: f32,
    threshold: f32,
) -> Option<YinEstimate> {
    if f_min <= 0.0 || f_max <= f_min || signal.len() < 4 {
        return None;
    }
    let len = signal.len();
    let min_lag = ((sample_rate as f32 / f_max).floor() as usize).max(2);
    let max_lag = ((sample_rate as f32 / f_min).floor() as usize).min(len / 2 - 1);
    if min_lag >= max_lag {
        return None;
    }

    // --- Step 1 & 2: Difference function over a fixed integration window ---
    let window = len - max_lag;
    let mut yin_buffer = vec![0.0f32; max_lag + 1];
    for tau in 1..=max_lag {
        let mut diff = 0.0;
        for i in 0..window {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Step 3: Cumulative mean normalized difference ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..=max_lag {
        running_sum += yin_buffer[tau];
        if running_sum > 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- Step 4: First dip below threshold, else the global minimum ---
    let period = (min_lag..=max_lag)
        .find(|&tau| yin_buffer[tau] < threshold)
        .map(|tau| {
            // the crossing lag is only the dip's edge; walk down to its bottom
            let mut t = tau;
            while t < max_lag && yin_buffer[t + 1] < yin_buffer[t] {
                t += 1;
            }
            t
        })
        .or_else(|| {
            (min_lag..=max_lag).min_by(|&a, &b| yin_buffer[a].total_cmp(&yin_buffer[b]))
        })?;

    // --- Step 5: Parabolic interpolation for better precision ---
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = if period < max_lag { yin_buffer[period + 1] } else { y2 };

    let curvature = y1 - 2.0 * y2 + y3;
    let period_float = if curvature.abs() > f32::EPSILON {
        let shift = (0.5 * (y1 - y3) / curvature).clamp(-1.0, 1.0);
        period as f32 + shift
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;
    let confidence = (1.0 - y2).clamp(0.0, 1.0);

    if frequency.is_finite() && frequency > 0.0 && confidence.is_finite() {
        Some(YinEstimate {
            frequency,
            confidence,
        })
    } else {
        None
    }
}
