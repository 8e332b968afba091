//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "sipper", version, about = "Drink detection on a load cell")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/sipper.toml")]
    pub config: PathBuf,

    /// Log as JSON lines and print the summary/errors as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the scale and report sips as JSON lines until Ctrl-C
    Run {
        /// Stop on its own after this many milliseconds
        #[arg(long, value_name = "MS")]
        duration_ms: Option<u64>,
        /// Override detection.deviation_threshold from the config
        #[arg(long, value_name = "UNITS")]
        deviation: Option<i32>,
    },
    /// Zero the scale and print the first reading afterwards
    Tare,
    /// Derive scale.calibration_factor from a known weight
    Calibrate {
        /// Weight placed on the scale, in the units the factor should produce
        #[arg(long, value_name = "UNITS")]
        known_weight: f32,
        /// Time to place the weight after taring
        #[arg(long, value_name = "MS", default_value_t = 3000)]
        settle_ms: u64,
        /// Readings to average (defaults to scale.tare_samples)
        #[arg(long, value_name = "N")]
        samples: Option<u8>,
    },
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
