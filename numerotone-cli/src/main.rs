//! # Numerotone - Command Line Front End
//!
//! Thin shell around `numerotone-core`:
//! - **analyze**: decodes a file and runs one offline pass
//! - **listen**: runs live analysis on the default input device and prints
//!   a status line until the time is up
//!
//! Both commands print a final report and can save the last snapshot as JSON.

mod cli;
mod report;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, EngineArgs};
use numerotone_core::{BandWeights, EngineConfig, LiveAnalyzer, Snapshot, offline};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            input,
            output,
            engine,
        } => {
            let config = build_config(&engine)?;
            let snapshot = offline::analyze_file(&input, &config)
                .with_context(|| format!("failed to analyze {}", input.display()))?;
            finish(&snapshot, output.as_deref())
        }
        Commands::Listen {
            seconds,
            interval_ms,
            output,
            engine,
        } => {
            let config = build_config(&engine)?;
            let snapshot = listen(config, Duration::from_secs(seconds), Duration::from_millis(interval_ms))?;
            finish(&snapshot, output.as_deref())
        }
    }
}

/// Loads the config file (if any) and applies command line overrides.
fn build_config(args: &EngineArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config: EngineConfig = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            info!(path = %path.display(), "loaded engine config");
            config
        }
        None => EngineConfig::default(),
    };

    if let Some(a4) = args.a4 {
        config.a4_hz = a4;
    }
    if let Some(weights) = &args.weights {
        let [bass, low, mid, high] = weights[..] else {
            bail!("--weights takes exactly four values (bass,low,mid,high), got {}", weights.len());
        };
        config.band_weights = BandWeights {
            bass,
            low,
            mid,
            high,
        };
    }
    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

fn listen(config: EngineConfig, duration: Duration, interval: Duration) -> Result<Snapshot> {
    let mut analyzer = LiveAnalyzer::start(config).context("failed to start live analysis")?;
    info!(
        sample_rate = analyzer.sample_rate(),
        seconds = duration.as_secs(),
        "listening"
    );

    let started = Instant::now();
    while started.elapsed() < duration {
        std::thread::sleep(interval.min(duration.saturating_sub(started.elapsed())));
        if let Some(snapshot) = analyzer.latest_snapshot() {
            println!(
                "{}",
                report::status_line(started.elapsed().as_secs_f64(), snapshot)
            );
        }
    }

    let snapshot = analyzer.latest_snapshot().cloned();
    analyzer.shutdown();
    snapshot.context("no audio was analyzed")
}

fn finish(snapshot: &Snapshot, output: Option<&Path>) -> Result<()> {
    print!("{}", report::full_report(snapshot));
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(snapshot).context("failed to serialize snapshot")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "snapshot saved");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(a4: Option<f32>, weights: Option<Vec<f32>>) -> EngineArgs {
        EngineArgs {
            config: None,
            a4,
            weights,
        }
    }

    #[test]
    fn test_overrides_apply() {
        let config = build_config(&args(Some(432.0), Some(vec![0.1, 0.2, 0.3, 0.4]))).unwrap();
        assert_eq!(config.a4_hz, 432.0);
        assert_eq!(config.band_weights.high, 0.4);
    }

    #[test]
    fn test_weights_need_four_values() {
        assert!(build_config(&args(None, Some(vec![0.1, 0.2]))).is_err());
    }

    #[test]
    fn test_bad_tuning_rejected() {
        assert!(build_config(&args(Some(-440.0), None)).is_err());
    }

    #[test]
    fn test_cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "numerotone",
            "analyze",
            "song.wav",
            "--a4",
            "442",
            "--weights",
            "0.25,0.35,0.45,0.2",
        ])
        .unwrap();
        let Commands::Analyze { input, engine, .. } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(input, Path::new("song.wav"));
        assert_eq!(engine.a4, Some(442.0));
        assert_eq!(engine.weights.as_deref(), Some(&[0.25, 0.35, 0.45, 0.2][..]));
    }
}
