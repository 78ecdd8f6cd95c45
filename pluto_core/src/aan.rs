//! Assist-as-needed controller.
//!
//! Tracks a signed streak of trial outcomes and adapts the control bound:
//! three or more successes in a row shrink it by the forget factor, any
//! failure streak grows it by the assist factor (capped at 1).

use crate::config::AanCfg;
use crate::error::PlutoError;

#[derive(Debug, Clone)]
pub struct AanController {
    current: f32,
    previous: f32,
    /// Positive for consecutive successes, negative for consecutive failures.
    streak: i32,
    forget: f32,
    assist: f32,
    running: bool,
    initial_position: f32,
    target_position: f32,
    direction: i8,
}

impl AanController {
    pub fn new(cfg: &AanCfg) -> Self {
        let b = cfg.initial_bound.clamp(0.0, 1.0);
        Self {
            current: b,
            previous: b,
            streak: 0,
            forget: cfg.forget_factor,
            assist: cfg.assist_factor,
            running: false,
            initial_position: 0.0,
            target_position: 0.0,
            direction: 0,
        }
    }

    /// Start a trial from `initial` towards `target`.
    ///
    /// Fails with `PlutoError::State` and changes nothing if a trial is already running.
    pub fn begin_trial(&mut self, initial: f32, target: f32) -> Result<(), PlutoError> {
        if self.running {
            tracing::warn!(initial, target, "begin_trial rejected: a trial is already running");
            return Err(PlutoError::State("a trial is already running".into()));
        }
        self.initial_position = initial;
        self.target_position = target;
        let d = target - initial;
        self.direction = if d > 0.0 {
            1
        } else if d < 0.0 {
            -1
        } else {
            0
        };
        self.running = true;
        tracing::debug!(initial, target, bound = self.current, "trial started");
        Ok(())
    }

    /// Feed the outcome of the running trial and adapt the bound.
    ///
    /// Returns the new bound, or `None` (no-op) when no trial is running.
    pub fn report_outcome(&mut self, success: bool) -> Option<f32> {
        if !self.running {
            tracing::debug!(success, "report_outcome ignored: no trial running");
            return None;
        }
        self.streak = match (success, self.streak) {
            (true, s) if s > 0 => s.saturating_add(1),
            (true, _) => 1,
            (false, s) if s < 0 => s.saturating_sub(1),
            (false, _) => -1,
        };
        self.previous = self.current;
        if self.streak >= 3 {
            self.current *= self.forget;
        } else if self.streak < 0 {
            self.current = (self.current * self.assist).min(1.0);
        }
        self.current = self.current.clamp(0.0, 1.0);
        self.running = false;
        tracing::info!(
            success,
            streak = self.streak,
            previous = self.previous,
            bound = self.current,
            "trial outcome"
        );
        Some(self.current)
    }

    pub fn control_bound(&self) -> f32 {
        self.current
    }

    pub fn previous_control_bound(&self) -> f32 {
        self.previous
    }

    pub fn success_streak(&self) -> i32 {
        self.streak
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Sign of `target - initial` for the current or last trial.
    pub fn direction(&self) -> i8 {
        self.direction
    }

    pub fn initial_position(&self) -> f32 {
        self.initial_position
    }

    pub fn target_position(&self) -> f32 {
        self.target_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctl(bound: f32) -> AanController {
        AanController::new(&AanCfg {
            initial_bound: bound,
            ..AanCfg::default()
        })
    }

    fn trial(c: &mut AanController, ok: bool) -> Option<f32> {
        c.begin_trial(0.0, 10.0).unwrap();
        c.report_outcome(ok)
    }

    #[test]
    fn third_success_forgets() {
        let mut c = ctl(0.5);
        assert_eq!(trial(&mut c, true), Some(0.5));
        assert_eq!(trial(&mut c, true), Some(0.5));
        let b = trial(&mut c, true).unwrap();
        assert!((b - 0.45).abs() < 1e-6);
        assert_eq!(c.success_streak(), 3);
    }

    #[test]
    fn failure_assists_and_flips_streak() {
        let mut c = ctl(0.5);
        trial(&mut c, true);
        trial(&mut c, true);
        let b = trial(&mut c, false).unwrap();
        assert!((b - 0.55).abs() < 1e-6);
        assert_eq!(c.success_streak(), -1);
        trial(&mut c, false);
        assert_eq!(c.success_streak(), -2);
    }

    #[test]
    fn bound_caps_at_one() {
        let mut c = ctl(0.95);
        for _ in 0..5 {
            trial(&mut c, false);
        }
        assert!((c.control_bound() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn outcome_without_trial_is_noop() {
        let mut c = ctl(0.5);
        assert_eq!(c.report_outcome(false), None);
        assert_eq!(c.success_streak(), 0);
    }

    #[test]
    fn second_begin_is_rejected() {
        let mut c = ctl(0.5);
        c.begin_trial(10.0, 0.0).unwrap();
        assert_eq!(c.direction(), -1);
        assert!(matches!(c.begin_trial(0.0, 50.0), Err(PlutoError::State(_))));
        assert_eq!(c.target_position(), 0.0);
    }
}
