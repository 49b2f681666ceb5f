//! CLI Module
//!
//! Command-line interface for rendering WAV files through a single effect
//! unit and inspecting control curves.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// fxcore - render audio through the effect core
#[derive(Parser, Debug)]
#[command(name = "fxcore-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON file with unit defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a WAV file through one effect unit
    #[command(name = "render")]
    Render(RenderArgs),

    /// Print the value a control position maps to
    #[command(name = "curve")]
    Curve {
        /// Curve kind (frequency, gain, time, q, ratio)
        #[arg(short, long)]
        kind: String,

        /// Control position in [0, 1]
        value: f32,
    },

    /// List the effect types and their parameter keys
    #[command(name = "effects")]
    Effects,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Effect type (width, ducker, trim, limiter, reverseReverb)
    #[arg(short, long)]
    pub effect: String,

    /// Input WAV file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output WAV file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Trigger signal for the ducker (defaults to the input itself)
    #[arg(long)]
    pub sidechain: Option<PathBuf>,

    /// Parameter override as key=value (repeatable)
    #[arg(short, long = "param", value_parser = parse_param)]
    pub params: Vec<(String, f64)>,

    /// Run the result through the master limiter
    #[arg(long)]
    pub limit: bool,

    /// Seconds of silence appended so tails can ring out
    #[arg(long, default_value_t = 0.0)]
    pub tail: f32,

    /// Processing block size in samples
    #[arg(long, default_value_t = 512)]
    pub block_size: usize,

    /// Output bit depth (16, 24, or 32 for float)
    #[arg(long, default_value_t = 24)]
    pub bit_depth: u16,
}

/// Parse a `key=value` parameter override
pub fn parse_param(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{}'", s));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for '{}': {}", key, e))?;
    Ok((key.to_string(), value))
}
