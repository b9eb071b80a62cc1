//! CLI arguments for herakles-sampler.
//!
//! This module defines the command-line interface using the clap library.

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-sampler",
    about = "Process and host telemetry sampler in the style of top",
    long_about = "Process and host telemetry sampler in the style of top.\n\n\
                  Samples per-process CPU, memory, thread and fault figures plus host-wide \
                  CPU, VM, network and disk statistics once per interval and logs a summary \
                  with the top processes.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Milliseconds between samples
    #[arg(short = 's', long)]
    pub interval_ms: Option<u64>,

    /// Stop after N samples (0 runs until killed)
    #[arg(short = 'l', long)]
    pub iterations: Option<u64>,

    /// Walk VM regions of every process on every pass
    #[arg(short = 'r', long)]
    pub collect_regions: bool,

    /// Collect shared framework totals
    #[arg(short = 'f', long)]
    pub collect_frameworks: bool,

    /// Refresh framework totals every N passes
    #[arg(long)]
    pub framework_interval: Option<u32>,

    /// Number of processes logged per pass
    #[arg(short = 'n', long)]
    pub top_n: Option<usize>,

    /// Primary sort key, e.g. "-cpu" or "+pid"
    #[arg(short = 'o', long = "sort")]
    pub sort_primary: Option<String>,

    /// Secondary sort key
    #[arg(short = 'O', long = "secondary-sort")]
    pub sort_secondary: Option<String>,

    /// Root of the proc filesystem
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}
