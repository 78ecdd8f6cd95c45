//! `From` implementations bridging `pluto_config` types to `pluto_core` types.

use crate::config::{AanCfg, RunnerCfg, StreamKind, TrialCfg};
use crate::transport::TransportCfg;

impl From<&pluto_config::AanCfg> for AanCfg {
    fn from(c: &pluto_config::AanCfg) -> Self {
        Self {
            initial_bound: c.initial_bound,
            forget_factor: c.forget_factor,
            assist_factor: c.assist_factor,
        }
    }
}

impl From<&pluto_config::TrialCfg> for TrialCfg {
    fn from(c: &pluto_config::TrialCfg) -> Self {
        Self {
            rest_ms: c.rest_ms,
            set_target_ms: c.set_target_ms,
            moving_ms: c.moving_ms,
            display_ms: c.display_ms,
            reach_ms: c.reach_ms,
            tolerance_deg: c.tolerance_deg,
            hold_ms: c.hold_ms,
            tick_hz: c.tick_hz,
            max_trials: c.max_trials,
        }
    }
}

impl From<pluto_config::StreamMode> for StreamKind {
    fn from(m: pluto_config::StreamMode) -> Self {
        match m {
            pluto_config::StreamMode::Diagnostics => Self::Diagnostics,
            pluto_config::StreamMode::Sensor => Self::Sensor,
        }
    }
}

impl From<&pluto_config::RunnerCfg> for RunnerCfg {
    fn from(c: &pluto_config::RunnerCfg) -> Self {
        Self {
            heartbeat_ms: c.heartbeat_ms,
            stream: c.stream.into(),
        }
    }
}

impl From<&pluto_config::SerialCfg> for TransportCfg {
    fn from(c: &pluto_config::SerialCfg) -> Self {
        Self {
            join_timeout: std::time::Duration::from_millis(c.join_timeout_ms),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_cfg_maps_every_field() {
        let src = pluto_config::TrialCfg {
            hold_ms: 750,
            max_trials: Some(4),
            ..Default::default()
        };
        let t = TrialCfg::from(&src);
        assert_eq!(t.hold_ms, 750);
        assert_eq!(t.max_trials, Some(4));
        assert_eq!(t.moving_ms, 6000);
    }

    #[test]
    fn serial_join_timeout_carries_over() {
        let src = pluto_config::SerialCfg {
            port: "sim".into(),
            join_timeout_ms: 300,
        };
        assert_eq!(TransportCfg::from(&src).join_timeout.as_millis(), 300);
    }
}
