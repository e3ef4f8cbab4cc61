//! # Live Analysis Module
//!
//! Runs a [`Session`] on a dedicated thread fed by the default capture
//! device. The caller talks to the thread with [`Command`]s and reads
//! cloned [`Snapshot`]s back; no analysis state is shared.
//!
//! ## Threads
//! - CPAL callback: downmixes and forwards chunks, drops them when behind
//! - Analysis thread: sole owner of the session, assembles frames, applies
//!   commands between ticks
//! - Caller: sends commands, polls snapshots
//!
//! Snapshots travel over a one-slot channel. A snapshot the caller has not
//! picked up yet is replaced by the newer one, so a slow caller never makes
//! the queue grow.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use cpal::traits::StreamTrait;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::audio::{self, FrameAssembler};
use crate::band::BandWeights;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::schedule::FrameSource;
use crate::session::{Session, SessionState, Snapshot};

/// Chunks the capture callback may queue before it starts dropping audio.
const AUDIO_QUEUE_CHUNKS: usize = 64;

/// Control messages for the analysis thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Pause,
    Resume,
    /// Stops accumulating and clears counts; audio is ignored until `Reset`.
    Stop,
    /// Clears all state and starts accumulating again.
    Reset,
    SetTuning(f32),
    SetBandWeights(BandWeights),
    Shutdown,
}

/// Handle to a running live analysis.
pub struct LiveAnalyzer {
    commands: Sender<Command>,
    snapshots: Receiver<Snapshot>,
    latest: Option<Snapshot>,
    sample_rate: u32,
    thread_handle: Option<JoinHandle<()>>,
}

impl LiveAnalyzer {
    /// Opens the default input device and starts analyzing.
    ///
    /// Device or format problems are returned here, once; in that case no
    /// thread is left running.
    pub fn start(config: EngineConfig) -> Result<Self> {
        let mut session = Session::new(config.clone())?;
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<Command>();
        let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded::<Snapshot>(1);
        let stale_rx = snapshot_rx.clone();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32>>(1);

        let thread_handle = thread::spawn(move || {
            let (audio_tx, audio_rx) = crossbeam_channel::bounded::<Vec<f32>>(AUDIO_QUEUE_CHUNKS);

            // the stream is not Send on every platform; it lives and dies here
            let (stream, sample_rate) = match audio::start_audio_capture(audio_tx) {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = session.start(sample_rate) {
                let _ = ready_tx.send(Err(e));
                return;
            }
            let _ = ready_tx.send(Ok(sample_rate));

            let assembler = FrameAssembler::new(config.frame_size, config.hop_size);
            let publisher = Publisher::new(snapshot_tx, stale_rx);
            run_analysis_loop(session, assembler, audio_rx, command_rx, publisher);

            if let Err(e) = stream.pause() {
                warn!("error pausing stream: {}", e);
            }
            drop(stream);
            debug!("analysis thread finished");
        });

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(Error::Capture("analysis thread exited during startup".into()));
            }
        };
        info!(sample_rate, "live analysis started");

        Ok(Self {
            commands: command_tx,
            snapshots: snapshot_rx,
            latest: None,
            sample_rate,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Newest snapshot published by the analysis thread, if any yet.
    pub fn latest_snapshot(&mut self) -> Option<&Snapshot> {
        while let Ok(snapshot) = self.snapshots.try_recv() {
            self.latest = Some(snapshot);
        }
        self.latest.as_ref()
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Capture("analysis thread is not running".into()))
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    pub fn set_tuning(&self, a4_hz: f32) -> Result<()> {
        if !(a4_hz.is_finite() && a4_hz > 0.0) {
            return Err(Error::InvalidConfig(format!("a4_hz must be positive, got {a4_hz}")));
        }
        self.send(Command::SetTuning(a4_hz))
    }

    pub fn set_band_weights(&self, weights: BandWeights) -> Result<()> {
        if !weights.is_valid() {
            return Err(Error::InvalidConfig(
                "band weights must be finite and non-negative".into(),
            ));
        }
        self.send(Command::SetBandWeights(weights))
    }

    /// Stops the analysis thread and waits for it to exit.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                warn!("analysis thread panicked");
            }
        }
    }
}

impl Drop for LiveAnalyzer {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

/// Newest-wins sender for the one-slot snapshot channel.
///
/// Holds a receiver clone so it can evict a snapshot nobody collected.
struct Publisher {
    tx: Sender<Snapshot>,
    stale: Receiver<Snapshot>,
}

impl Publisher {
    fn new(tx: Sender<Snapshot>, stale: Receiver<Snapshot>) -> Self {
        Self { tx, stale }
    }

    fn publish(&self, snapshot: Snapshot) {
        let Err(TrySendError::Full(snapshot)) = self.tx.try_send(snapshot) else {
            return;
        };
        let _ = self.stale.try_recv();
        // only this thread sends, so the slot is free now
        let _ = self.tx.try_send(snapshot);
    }
}

/// Feeds one capture chunk through the assembler. Returns the number of
/// frames the session ticked on.
fn process_chunk(session: &mut Session, assembler: &mut FrameAssembler, chunk: &[f32]) -> usize {
    if session.state() != SessionState::Running {
        return 0;
    }
    assembler.push(chunk);
    let mut ticks = 0;
    while let Some(frame) = assembler.next_frame() {
        if session.process_frame(&frame).is_some() {
            ticks += 1;
        }
    }
    ticks
}

/// The analysis thread's loop. Returns on `Shutdown` or when either input
/// channel closes.
fn run_analysis_loop(
    mut session: Session,
    mut assembler: FrameAssembler,
    audio_rx: Receiver<Vec<f32>>,
    command_rx: Receiver<Command>,
    publisher: Publisher,
) {
    loop {
        crossbeam_channel::select! {
            recv(audio_rx) -> msg => match msg {
                Ok(chunk) => {
                    if process_chunk(&mut session, &mut assembler, &chunk) > 0 {
                        publisher.publish(session.snapshot());
                    }
                }
                Err(_) => {
                    warn!("audio channel closed");
                    break;
                }
            },
            recv(command_rx) -> msg => {
                let command = match msg {
                    Ok(Command::Shutdown) | Err(_) => break,
                    Ok(command) => command,
                };
                apply_command(&mut session, &mut assembler, command);
                publisher.publish(session.snapshot());
            },
        }
    }
}

fn apply_command(session: &mut Session, assembler: &mut FrameAssembler, command: Command) {
    debug!(?command, "applying command");
    match command {
        Command::Pause => {
            // drop the partial frame without rewinding start_sample
            session.pause();
            assembler.discard_pending();
        }
        Command::Resume => session.resume(),
        Command::Stop => {
            session.stop();
            assembler.clear();
        }
        Command::Reset => {
            assembler.clear();
            if let Err(e) = session.start(session.sample_rate()) {
                warn!("could not restart session: {}", e);
            }
        }
        Command::SetTuning(a4_hz) => {
            if let Err(e) = session.set_tuning(a4_hz) {
                warn!("{}", e);
            }
        }
        Command::SetBandWeights(weights) => {
            if let Err(e) = session.set_band_weights(weights) {
                warn!("{}", e);
            }
        }
        Command::Shutdown => {}
    }
}
