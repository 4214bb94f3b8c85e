//! CLI flag definitions using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// ttsprobe: partition and boundary testing of a speech-synthesis web frontend
#[derive(Parser, Debug)]
#[command(name = "ttsprobe")]
#[command(author, version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Show the browser window (disable headless mode)
    #[arg(long)]
    pub visible: bool,

    /// Timeout of each element wait, in seconds (default 120; generation waits twice as long)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Run only boundary-value cases
    #[arg(long, conflicts_with = "only_partitioning")]
    pub only_boundary: bool,

    /// Run only equivalence-partition cases
    #[arg(long)]
    pub only_partitioning: bool,

    /// Keep generation order instead of shuffling
    #[arg(long)]
    pub no_random: bool,

    /// Directory for results, reports and screenshots
    #[arg(long, env = "TTSPROBE_OUTPUT_DIR", value_name = "PATH")]
    pub output_dir: Option<PathBuf>,

    /// Capture screenshots of failed and errored attempts
    #[arg(long)]
    pub screenshots: bool,

    /// Base URL of the frontend under test
    #[arg(long, env = "TTSPROBE_URL", value_name = "URL")]
    pub url: Option<String>,

    /// Shuffle seed, to replay an earlier order
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Retries after the first attempt of a case
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Backoff before the first retry, in milliseconds (doubles per retry)
    #[arg(long, value_name = "MS")]
    pub backoff_ms: Option<u64>,

    /// Overall run timeout, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub run_timeout: Option<u64>,

    /// Minimum length of the very-long-text probe, in characters
    #[arg(long, value_name = "CHARS")]
    pub long_text_threshold: Option<usize>,

    /// Language that receives boundary cases (repeatable; "all" for every language)
    #[arg(long = "boundary-language", value_name = "LANGUAGE")]
    pub boundary_languages: Vec<String>,

    /// Skip the per-language warmup generation
    #[arg(long)]
    pub no_warmup: bool,

    /// Read the voice catalog from the page instead of the built-in one
    #[arg(long)]
    pub discover_voices: bool,

    /// Run against the in-process simulated frontend instead of a browser
    #[arg(long, conflicts_with = "from_results")]
    pub dry_run: bool,

    /// Re-aggregate a stored result document without running anything
    #[arg(long, value_name = "FILE")]
    pub from_results: Option<PathBuf>,

    /// YAML run configuration (flags override it)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the chromium binary
    #[arg(long, env = "CHROMIUM_PATH", value_name = "PATH")]
    pub chromium_path: Option<PathBuf>,

    /// Disable the chromium sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorArg,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Auto-detect
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}
