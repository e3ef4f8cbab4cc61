//! # Offline Analysis Module
//!
//! Single-pass batch analysis of a complete buffer or an audio file. The
//! whole pass runs on the calling thread; the same input and configuration
//! always produce the same [`Snapshot`].

use std::path::Path;
use std::sync::atomic::AtomicBool;
use tracing::info;

use crate::audio::AudioBuffer;
use crate::config::EngineConfig;
use crate::decode;
use crate::error::Result;
use crate::schedule::{self, BufferSource};
use crate::session::{Session, Snapshot};

/// Analyzes every frame of `buffer` and returns the final snapshot.
///
/// The returned snapshot is taken after the last frame, with the session
/// still running, so it carries the accumulated counts.
pub fn analyze_buffer(buffer: &AudioBuffer, config: &EngineConfig) -> Result<Snapshot> {
    let mut session = Session::new(config.clone())?;
    session.start(buffer.sample_rate)?;

    let mono = buffer.to_mono();
    let mut source = BufferSource::new(&mono, config.frame_size, config.hop_size);
    let cancel = AtomicBool::new(false);
    let frames = schedule::drive(&mut session, &mut source, &cancel);

    let snapshot = session.snapshot();
    info!(
        frames,
        seconds = buffer.duration_seconds(),
        key = %snapshot.key.name(),
        "offline analysis finished"
    );
    Ok(snapshot)
}

/// Decodes `path` and analyzes it. Decoding failures are returned before any
/// analysis starts.
pub fn analyze_file(path: &Path, config: &EngineConfig) -> Result<Snapshot> {
    config.validate()?;
    let buffer = decode::decode_file(path)?;
    analyze_buffer(&buffer, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleLayout;
    use crate::band::Band;
    use crate::session::SessionState;

    #[test]
    fn test_short_buffer_has_no_frames() {
        let buffer = AudioBuffer::mono(vec![0.1; 100], 44100);
        let snapshot = analyze_buffer(&buffer, &EngineConfig::default()).unwrap();
        assert_eq!(snapshot.frames_processed, 0);
        assert_eq!(snapshot.state, SessionState::Running);
    }

    #[test]
    fn test_stereo_buffer_is_downmixed() {
        let sr = 44100;
        let mut samples = Vec::with_capacity(2 * sr as usize);
        for i in 0..sr as usize {
            let s = 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin();
            samples.push(s);
            samples.push(s);
        }
        let buffer = AudioBuffer::new(samples, 2, SampleLayout::Interleaved, sr).unwrap();
        let snapshot = analyze_buffer(&buffer, &EngineConfig::default()).unwrap();
        assert_eq!(snapshot.frames_processed, 20);
        let low = snapshot.band(Band::Low);
        assert_eq!(low.summary[0].digit.value(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            hop_size: 0,
            ..EngineConfig::default()
        };
        let buffer = AudioBuffer::mono(vec![0.0; 8192], 44100);
        assert!(analyze_buffer(&buffer, &config).is_err());
    }
}
