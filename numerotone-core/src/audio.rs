//! # Audio Input Module
//!
//! Everything between raw samples and analysis frames:
//! - In-memory buffers in interleaved or planar layout, downmixed to mono
//! - A push-based frame assembler for live chunks of arbitrary length
//! - Real-time capture from the default input device using CPAL
//!
//! ## Capture
//! The CPAL callback only downmixes and forwards chunks; it never blocks.
//! When the analysis side falls behind, chunks are dropped.

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::schedule::{Frame, FrameSource};

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Frames of backlog the assembler keeps before dropping old audio.
const MAX_BACKLOG_FRAMES: usize = 8;

/// How channels are arranged in [`AudioBuffer::samples`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleLayout {
    /// `L R L R ...`
    Interleaved,
    /// `L L ... R R ...`
    Planar,
}

/// A complete block of float samples plus its format.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub layout: SampleLayout,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Validates the format and wraps the samples.
    pub fn new(
        samples: Vec<f32>,
        channels: usize,
        layout: SampleLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidBuffer("channel count must be non-zero".into()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidBuffer("sample rate must be non-zero".into()));
        }
        if samples.len() % channels != 0 {
            return Err(Error::InvalidBuffer(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            channels,
            layout,
            sample_rate,
        })
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: 1,
            layout: SampleLayout::Interleaved,
            sample_rate,
        }
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    /// Averages all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1);
        if channels == 1 {
            return self.samples.clone();
        }
        match self.layout {
            SampleLayout::Interleaved => downmix_interleaved(&self.samples, channels),
            SampleLayout::Planar => {
                let frames = self.frames();
                (0..frames)
                    .map(|i| {
                        (0..channels)
                            .map(|c| self.samples[c * frames + i])
                            .sum::<f32>()
                            / channels as f32
                    })
                    .collect()
            }
        }
    }
}

/// Averages interleaved channels. A trailing partial frame is dropped.
pub fn downmix_interleaved(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Cuts a stream of mono chunks into overlapping frames.
///
/// Frames start every `hop_size` samples; `start_sample` counts from the
/// first sample ever pushed (or from the last [`FrameAssembler::clear`]).
/// Dropped audio still advances the position, so start samples never go
/// backwards short of a `clear`.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    frame_size: usize,
    hop_size: usize,
    buffer: Vec<f32>,
    /// Stream position of `buffer[0]`.
    position: u64,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, hop_size: usize) -> Self {
        Self {
            frame_size,
            hop_size: hop_size.max(1),
            buffer: Vec::with_capacity(frame_size * 2),
            position: 0,
        }
    }

    pub fn push(&mut self, chunk: &[f32]) {
        self.buffer.extend_from_slice(chunk);

        let limit = self.frame_size * MAX_BACKLOG_FRAMES;
        if self.buffer.len() > limit {
            // skip whole hops so frame starts stay on the hop grid
            let excess = self.buffer.len() - limit;
            let skip = excess.div_ceil(self.hop_size) * self.hop_size;
            let skip = skip.min(self.buffer.len());
            warn!(samples = skip, "analysis falling behind, dropping audio");
            self.buffer.drain(..skip);
            self.position += skip as u64;
        }
    }

    /// Samples waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drops buffered samples without rewinding the stream position.
    pub fn discard_pending(&mut self) {
        self.position += self.buffer.len() as u64;
        self.buffer.clear();
    }

    /// Drops buffered samples and restarts the stream position at zero.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.position = 0;
    }
}

impl FrameSource for FrameAssembler {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.frame_size == 0 || self.buffer.len() < self.frame_size {
            return None;
        }
        let frame = Frame {
            samples: self.buffer[..self.frame_size].to_vec(),
            start_sample: self.position,
        };
        let advance = self.hop_size.min(self.buffer.len());
        self.buffer.drain(..advance);
        self.position += advance as u64;
        Some(frame)
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks an f32 input format, preferring mono and 44.1 kHz
/// 3. Sets up a callback that downmixes each chunk and forwards it
///
/// # Arguments
/// * `sender` - Channel sender for mono chunks bound for the analysis thread
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and sample rate
/// * `Err(e)` - No device, no usable format, or the stream failed to start
pub fn start_audio_capture(sender: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(Error::NoInputDevice)?;

    let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
    info!(device = %name, "using audio input device");

    let configs = device
        .supported_input_configs()
        .map_err(|e| Error::Capture(e.to_string()))?
        .collect::<Vec<_>>();
    let supported_config =
        find_supported_config(configs, TARGET_SAMPLE_RATE).ok_or(Error::UnsupportedInputFormat)?;

    // with_sample_rate panics outside the supported range
    let rate = TARGET_SAMPLE_RATE.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    info!(sample_rate, channels, "selected input format");

    let err_fn = |err| warn!("audio stream error: {}", err);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // full channel means the analysis thread is behind; drop the chunk
                let _ = sender.try_send(downmix_interleaved(data, channels));
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::Capture(e.to_string()))?;

    stream.play().map_err(|e| Error::Capture(e.to_string()))?;

    Ok((stream, sample_rate))
}

/// Finds the best supported f32 input configuration.
///
/// Mono formats win over multichannel ones; within the same channel
/// preference the closest sample rate wins.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let (lo, hi) = (c.min_sample_rate().0, c.max_sample_rate().0);
            let rate_diff = if target_rate < lo {
                lo - target_rate
            } else {
                target_rate.saturating_sub(hi)
            };
            (c.channels() != 1, rate_diff)
        })
}
