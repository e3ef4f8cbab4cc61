//! # Error Module
//!
//! Session-level failures of the engine. Per-frame problems (silence, noise,
//! percussive frames, out-of-band estimates) are never errors; they simply
//! produce no vote for that frame.

use thiserror::Error;

/// Errors surfaced to the caller when a session cannot start or a setting
/// is rejected.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("No input device available")]
    NoInputDevice,
    #[error("No suitable f32 input format found")]
    UnsupportedInputFormat,
    #[error("Audio capture error: {0}")]
    Capture(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid audio buffer: {0}")]
    InvalidBuffer(String),
}

pub type Result<T> = std::result::Result<T, Error>;
