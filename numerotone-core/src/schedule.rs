//! # Frame Scheduling Module
//!
//! Splits audio into overlapping analysis frames and drives a session over
//! them, one frame per tick, until the source runs dry or the caller cancels.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::session::Session;

/// One analysis frame and the position of its first sample in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub samples: Vec<f32>,
    pub start_sample: u64,
}

/// Anything that hands out frames in chronological order.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Frame>;
}

/// Frames over an in-memory mono buffer.
///
/// Yields `floor((len - frame_size) / hop_size) + 1` frames, or none when
/// the buffer is shorter than one frame.
#[derive(Debug, Clone)]
pub struct BufferSource<'a> {
    samples: &'a [f32],
    frame_size: usize,
    hop_size: usize,
    position: usize,
}

impl<'a> BufferSource<'a> {
    pub fn new(samples: &'a [f32], frame_size: usize, hop_size: usize) -> Self {
        Self {
            samples,
            frame_size,
            hop_size: hop_size.max(1),
            position: 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        if self.frame_size == 0 || self.samples.len() < self.frame_size {
            0
        } else {
            (self.samples.len() - self.frame_size) / self.hop_size + 1
        }
    }
}

impl FrameSource for BufferSource<'_> {
    fn next_frame(&mut self) -> Option<Frame> {
        let end = self.position.checked_add(self.frame_size)?;
        if self.frame_size == 0 || end > self.samples.len() {
            return None;
        }
        let frame = Frame {
            samples: self.samples[self.position..end].to_vec(),
            start_sample: self.position as u64,
        };
        self.position += self.hop_size;
        Some(frame)
    }
}

/// Feeds frames from `source` into `session` until the source is exhausted
/// or `cancel` is raised.
///
/// The flag is checked at the top of every tick. Returns the number of
/// frames the session actually analyzed.
pub fn drive<S: FrameSource + ?Sized>(
    session: &mut Session,
    source: &mut S,
    cancel: &AtomicBool,
) -> usize {
    let mut processed = 0;
    loop {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!(processed, "frame loop cancelled");
            break;
        }
        let Some(frame) = source.next_frame() else {
            break;
        };
        if session.process_frame(&frame).is_some() {
            processed += 1;
        }
    }
    processed
}
