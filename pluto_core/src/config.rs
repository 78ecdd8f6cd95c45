//! Runtime configuration for the AAN controller, trial sequencer and runner.
//!
//! These are separate from the TOML-deserialized config in `pluto_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

/// Adaptive controller parameters.
#[derive(Debug, Clone, Copy)]
pub struct AanCfg {
    /// Control bound for the first trial, in [0, 1].
    pub initial_bound: f32,
    /// Applied after a streak of 3+ successes. Must be < 1.
    pub forget_factor: f32,
    /// Applied after any failure streak. Must be > 1.
    pub assist_factor: f32,
}

impl Default for AanCfg {
    fn default() -> Self {
        Self {
            initial_bound: 0.16,
            forget_factor: 0.9,
            assist_factor: 1.1,
        }
    }
}

/// Trial timing and success criteria. All durations in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct TrialCfg {
    pub rest_ms: u64,
    pub set_target_ms: u64,
    pub moving_ms: u64,
    pub display_ms: u64,
    /// Reach duration sent with the position command.
    pub reach_ms: u64,
    /// |target - angle| must stay within this (degrees) ...
    pub tolerance_deg: f32,
    /// ... for this long to count as a success.
    pub hold_ms: u64,
    pub tick_hz: u32,
    pub max_trials: Option<u32>,
}

impl Default for TrialCfg {
    fn default() -> Self {
        Self {
            rest_ms: 2000,
            set_target_ms: 500,
            moving_ms: 6000,
            display_ms: 1000,
            reach_ms: 2000,
            tolerance_deg: 5.0,
            hold_ms: 1000,
            tick_hz: 50,
            max_trials: None,
        }
    }
}

impl TrialCfg {
    pub fn reach_secs(&self) -> f32 {
        Duration::from_millis(self.reach_ms).as_secs_f32()
    }
}

/// Which telemetry variant to request when a session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamKind {
    #[default]
    Diagnostics,
    Sensor,
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerCfg {
    pub heartbeat_ms: u64,
    pub stream: StreamKind,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            heartbeat_ms: 500,
            stream: StreamKind::Diagnostics,
        }
    }
}
