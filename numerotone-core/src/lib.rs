// numerotone-core/src/lib.rs

//! The core logic for the numerotone pitch-to-digit analyzer.
//! This crate is responsible for audio input, per-band pitch detection,
//! digit aggregation and key estimation. It is completely headless
//! and contains no UI code.

pub mod audio;
pub mod band;
pub mod config;
pub mod counts;
pub mod decode;
pub mod error;
pub mod fft;
pub mod gate;
pub mod key;
pub mod live;
pub mod main_note;
pub mod offline;
pub mod pitch;
pub mod reader;
pub mod schedule;
pub mod session;
pub mod tuning;

pub use audio::{AudioBuffer, SampleLayout};
pub use band::{Band, BandRange, BandWeights};
pub use config::EngineConfig;
pub use counts::{DigitCounts, DigitShare, DigitVote};
pub use error::{Error, Result};
pub use key::{KeyEstimate, Mode};
pub use live::{Command, LiveAnalyzer};
pub use main_note::MainNote;
pub use reader::PitchEstimate;
pub use session::{BandReadout, SampleLogEntry, Session, SessionState, Snapshot};
pub use tuning::Digit;
