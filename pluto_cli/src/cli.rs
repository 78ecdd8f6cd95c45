//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Port the current run talks to (for JSON error details).
pub static LAST_PORT: OnceLock<String> = OnceLock::new();

/// Port name that selects the in-process emulator.
pub const SIM_PORT: &str = "sim";

#[derive(Parser, Debug)]
#[command(name = "pluto", version, about = "PLUTO rehabilitation robot host")]
pub struct Cli {
    /// Path to config TOML (typed). Without it, defaults are used with the emulator.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Serial port to use; overrides [serial] port. "sim" selects the emulator.
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); defaults to [logging] level, then warn
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run assist-as-needed reaching trials until done or Ctrl-C
    Aan {
        /// Stop after this many trials (overrides trial.max_trials)
        #[arg(long, value_name = "N")]
        trials: Option<u32>,
        /// Seed for target selection, for reproducible sessions
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,
    },
    /// Stream telemetry and print link statistics
    Monitor {
        /// How long to monitor
        #[arg(long, value_name = "S", default_value_t = 5)]
        seconds: u64,
    },
    /// Print device id, firmware version and compile date
    Version,
    /// Button-driven calibration of a mechanism
    Calibrate {
        /// Mechanism label (WFE, WURD, FPS, HOC, FME1, FME2)
        #[arg(long, value_name = "MECH")]
        mech: String,
        /// Give up if the operator does not finish within this many seconds
        #[arg(long, value_name = "S", default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Send one command by label, e.g. `send SET_CONTROL_BOUND 0.5`
    Send {
        /// Opcode label
        label: String,
        /// Opcode arguments
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Move to an angle along a minimum-jerk trajectory in POSITION control
    Move {
        /// Target angle in degrees
        #[arg(long, value_name = "DEG", allow_hyphen_values = true)]
        target: f32,
        /// Trajectory duration
        #[arg(long, value_name = "MS", default_value_t = 2000)]
        duration_ms: u64,
        /// Control bound used for the move, in [0, 1]
        #[arg(long, value_name = "BOUND", default_value_t = 1.0)]
        bound: f32,
    },
    /// Quick health check: open the link and confirm frames arrive
    SelfCheck,
}
