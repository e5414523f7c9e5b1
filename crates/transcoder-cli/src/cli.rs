//! Command-line surface understood by the `transcode` binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(name = "transcode", about = "single-pipeline transcoding orchestrator")]
pub struct Cli {
    pub input: PathBuf,
    pub output: PathBuf,

    /// Video handling: stream-copy the input video track, or re-encode it.
    #[arg(long = "c:v", value_enum, default_value_t = CodecMode::Copy)]
    pub video_codec: CodecMode,

    /// Audio handling: stream-copy the input audio track, or re-encode it.
    #[arg(long = "c:a", value_enum, default_value_t = CodecMode::Copy)]
    pub audio_codec: CodecMode,

    /// x264 `-crf` value, only consulted when `-c:v encode`.
    #[arg(long, default_value = "23")]
    pub crf: String,

    /// x264 preset, only consulted when `-c:v encode`.
    #[arg(long, default_value = "medium")]
    pub preset: String,

    /// AAC bit rate in bits/second, only consulted when `-c:a encode`.
    #[arg(long, default_value_t = 128_000)]
    pub audio_bitrate: usize,

    /// Rewrite all timestamps relative to the first packet.
    #[arg(long = "start_at_zero")]
    pub start_at_zero: bool,

    /// Preserve input timestamps verbatim instead of the usual rebasing.
    #[arg(long = "copyts")]
    pub copyts: bool,

    /// Progress-report interval in microseconds.
    #[arg(long = "stats_period", default_value_t = 500_000)]
    pub stats_period_us: i64,

    #[arg(long = "benchmark")]
    pub benchmark: bool,

    #[arg(long = "benchmark_all")]
    pub benchmark_all: bool,

    /// Maximum tolerated per-stream decode error rate before exit code 69.
    #[arg(long = "max_error_rate", default_value_t = 2.0 / 3.0)]
    pub max_error_rate: f64,

    /// Machine-readable progress sink: a file path, or `-` for stdout.
    #[arg(long = "progress")]
    pub progress: Option<String>,

    /// Escalate any warning-level condition to a fatal exit.
    #[arg(long = "xerror")]
    pub xerror: bool,

    #[arg(long = "loglevel", default_value_t = 0)]
    pub loglevel: i32,

    /// Disable keyboard polling and terminal raw mode (for non-tty runs).
    #[arg(long = "nostdin")]
    pub nostdin: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CodecMode {
    Copy,
    Encode,
}
