#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the PLUTO therapy runner.
//!
//! `Config` and its sections are deserialized from TOML and checked by
//! `Config::validate`. Serial link parameters are fixed by the device and are
//! deliberately absent; only the port name is configurable.
use serde::Deserialize;

/// Mechanism labels accepted in `[mechanism] name`, in device index order.
pub const MECHANISM_LABELS: [&str; 7] = ["NOMECH", "WFE", "WURD", "FPS", "HOC", "FME1", "FME2"];

#[derive(Debug, Deserialize)]
pub struct SerialCfg {
    /// OS name of the serial port, e.g. "/dev/ttyACM0" or "COM3".
    pub port: String,
    /// Upper bound on waiting for the ingestion thread during disconnect (ms).
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_join_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AanCfg {
    /// Control bound used for the first trial, in [0, 1].
    pub initial_bound: f32,
    /// Multiplier applied after a success streak of 3 or more; must be < 1.
    pub forget_factor: f32,
    /// Multiplier applied after a failure; must be > 1.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TrialCfg {
    pub rest_ms: u64,
    pub set_target_ms: u64,
    /// Maximum time allowed to reach and hold the target.
    pub moving_ms: u64,
    /// How long Success/Failure is shown before returning to rest.
    pub display_ms: u64,
    /// Duration sent with the position command.
    pub reach_ms: u64,
    pub tolerance_deg: f32,
    pub hold_ms: u64,
    pub tick_hz: u32,
    /// Stop the session after this many finished trials.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MechanismCfg {
    /// One of `MECHANISM_LABELS` except NOMECH.
    pub name: String,
    /// Override for the calibrated range of motion (degrees).
    pub rom_deg: Option<f32>,
}

impl Default for MechanismCfg {
    fn default() -> Self {
        Self {
            name: "WFE".to_string(),
            rom_deg: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// DIAGNOSTICS frames (7 sensors, includes controller error terms)
    #[default]
    Diagnostics,
    /// SENSORSTREAM frames (4 sensors)
    Sensor,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Interval between HEARTBEAT commands while a session runs (ms).
    pub heartbeat_ms: u64,
    pub stream: StreamMode,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            heartbeat_ms: 500,
            stream: StreamMode::Diagnostics,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
    /// Optional CSV file receiving telemetry rows and trial outcomes.
    pub session_csv: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub serial: SerialCfg,
    #[serde(default)]
    pub aan: AanCfg,
    #[serde(default)]
    pub trial: TrialCfg,
    #[serde(default)]
    pub mechanism: MechanismCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Defaults for every section, talking to `port`.
    pub fn for_port(port: &str) -> Self {
        Self {
            serial: SerialCfg {
                port: port.to_string(),
                join_timeout_ms: default_join_timeout_ms(),
            },
            aan: AanCfg::default(),
            trial: TrialCfg::default(),
            mechanism: MechanismCfg::default(),
            runner: RunnerCfg::default(),
            logging: Logging::default(),
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Serial
        if self.serial.port.trim().is_empty() {
            eyre::bail!("serial.port must not be empty");
        }
        if self.serial.join_timeout_ms == 0 {
            eyre::bail!("serial.join_timeout_ms must be >= 1");
        }

        // AAN
        if !(0.0..=1.0).contains(&self.aan.initial_bound) {
            eyre::bail!("aan.initial_bound must be in [0.0, 1.0]");
        }
        if !(self.aan.forget_factor > 0.0 && self.aan.forget_factor < 1.0) {
            eyre::bail!("aan.forget_factor must be in (0.0, 1.0)");
        }
        if !(self.aan.assist_factor > 1.0 && self.aan.assist_factor.is_finite()) {
            eyre::bail!("aan.assist_factor must be > 1.0");
        }

        // Trial timing
        for (name, v) in [
            ("trial.rest_ms", self.trial.rest_ms),
            ("trial.set_target_ms", self.trial.set_target_ms),
            ("trial.moving_ms", self.trial.moving_ms),
            ("trial.display_ms", self.trial.display_ms),
            ("trial.reach_ms", self.trial.reach_ms),
            ("trial.hold_ms", self.trial.hold_ms),
        ] {
            if v == 0 {
                eyre::bail!("{name} must be >= 1");
            }
            if v > 10 * 60 * 1000 {
                eyre::bail!("{name} is unreasonably large (>10min)");
            }
        }
        if self.trial.hold_ms >= self.trial.moving_ms {
            eyre::bail!("trial.hold_ms must be < trial.moving_ms");
        }
        if !(self.trial.tolerance_deg > 0.0 && self.trial.tolerance_deg.is_finite()) {
            eyre::bail!("trial.tolerance_deg must be > 0");
        }
        if !(1..=1000).contains(&self.trial.tick_hz) {
            eyre::bail!("trial.tick_hz must be in [1, 1000]");
        }
        if self.trial.max_trials == Some(0) {
            eyre::bail!("trial.max_trials must be >= 1 when set");
        }

        // Mechanism
        match MECHANISM_LABELS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(self.mechanism.name.trim()))
        {
            None => eyre::bail!(
                "mechanism.name '{}' is not one of {}",
                self.mechanism.name,
                MECHANISM_LABELS.join(", ")
            ),
            Some(0) => eyre::bail!("mechanism.name must name a real mechanism, not NOMECH"),
            Some(_) => {}
        }
        if let Some(rom) = self.mechanism.rom_deg
            && !(rom > 0.0 && rom.is_finite())
        {
            eyre::bail!("mechanism.rom_deg must be > 0");
        }

        // Runner
        if self.runner.heartbeat_ms == 0 {
            eyre::bail!("runner.heartbeat_ms must be >= 1");
        }

        // Logging
        if let Some(rot) = &self.logging.rotation
            && !matches!(rot.as_str(), "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
