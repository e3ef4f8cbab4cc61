use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "numerotone",
    version,
    about = "Multi-band pitch and key analyzer that reduces what it hears to digits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze an audio file (WAV, MP3, FLAC, OGG) in one pass
    Analyze {
        /// Input audio file
        input: PathBuf,

        /// Write the final snapshot as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Analyze the default input device
    Listen {
        /// How long to listen, in seconds
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,

        /// Status line interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,

        /// Write the final snapshot as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// Settings shared by both commands. Flags override the config file.
#[derive(Args, Debug)]
pub struct EngineArgs {
    /// JSON engine configuration; missing fields keep their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Reference pitch for A4 in Hz
    #[arg(long)]
    pub a4: Option<f32>,

    /// Embodiment weights as bass,low,mid,high
    #[arg(long, value_delimiter = ',')]
    pub weights: Option<Vec<f32>>,
}
