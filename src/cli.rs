use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use wavebars::BackendKind;

#[derive(Parser, Debug)]
#[command(name = "wavebars", about = "Extract RMS waveform bars from compressed audio")]
pub struct Cli {
    /// Input audio files (MP3, WAV, FLAC, OGG, AAC)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Number of bars per waveform
    #[arg(long, default_value_t = 200)]
    pub bars: u32,

    /// Keep every Nth decoded sample
    #[arg(long, default_value_t = 20)]
    pub decimation: u32,

    /// Decoder backend
    #[arg(long, value_enum, default_value_t = BackendKind::Symphonia)]
    pub backend: BackendKind,

    /// Scale each waveform so its loudest bar is 1.0
    #[arg(long)]
    pub normalize: bool,

    /// Give up on a decoder that produces no output for this long
    #[arg(long, default_value_t = 10_000)]
    pub stall_timeout_ms: u64,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (defaults to wavebars.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON array of reports
    Json,
    /// One comma-separated line of bars per input
    Text,
}
