//! Discrete reaching-trial state machine.
//!
//! ```text
//! Rest -> SetTarget -> Moving -> {Success | Failure} -> Rest
//! ```
//!
//! `next_state` is the pure transition function; `TrialSequencer` wraps it
//! with timers, the hold check, the AAN controller and the commands each
//! transition produces. Each `advance` call makes at most one transition.
use rand::Rng;

use crate::aan::AanController;
use crate::command::Command;
use crate::config::TrialCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Rest,
    SetTarget,
    Moving,
    Success,
    Failure,
}

impl TrialState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::SetTarget => "set_target",
            Self::Moving => "moving",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Transition for a state that has lasted `elapsed_ms`, with the angle inside
/// the tolerance band for `held_ms` (only meaningful while Moving).
pub fn next_state(state: TrialState, elapsed_ms: u64, held_ms: u64, cfg: &TrialCfg) -> Option<TrialState> {
    match state {
        TrialState::Rest => (elapsed_ms >= cfg.rest_ms).then_some(TrialState::SetTarget),
        TrialState::SetTarget => (elapsed_ms >= cfg.set_target_ms).then_some(TrialState::Moving),
        TrialState::Moving => {
            if held_ms >= cfg.hold_ms {
                Some(TrialState::Success)
            } else if elapsed_ms >= cfg.moving_ms {
                Some(TrialState::Failure)
            } else {
                None
            }
        }
        TrialState::Success | TrialState::Failure => {
            (elapsed_ms >= cfg.display_ms).then_some(TrialState::Rest)
        }
    }
}

/// Outcome of one finished trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    /// 1-based trial number within the session.
    pub index: u32,
    pub initial_position: f32,
    pub target_position: f32,
    pub direction: i8,
    pub success: bool,
    /// Bound sent with the position command for this trial.
    pub control_bound_used: f32,
    /// Bound the controller settled on afterwards.
    pub next_control_bound: f32,
    pub success_streak: i32,
    /// Time from entering Moving to the outcome.
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialEffect {
    Send(Command),
    Finished(TrialRecord),
}

#[derive(Debug)]
pub struct TrialSequencer {
    cfg: TrialCfg,
    aan: AanController,
    rom_deg: f32,
    state: TrialState,
    entered_ms: Option<u64>,
    hold_start_ms: Option<u64>,
    target: f32,
    bound_used: f32,
    moving_started_ms: u64,
    outcome: Option<(bool, u64)>,
    completed: u32,
}

impl TrialSequencer {
    /// `rom_deg` is the calibrated range targets are drawn from.
    pub fn new(cfg: TrialCfg, aan: AanController, rom_deg: f32) -> Self {
        Self {
            cfg,
            aan,
            rom_deg,
            state: TrialState::Rest,
            entered_ms: None,
            hold_start_ms: None,
            target: 0.0,
            bound_used: 0.0,
            moving_started_ms: 0,
            outcome: None,
            completed: 0,
        }
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn aan(&self) -> &AanController {
        &self.aan
    }

    pub fn trials_completed(&self) -> u32 {
        self.completed
    }

    /// True once `max_trials` trials have been finalized.
    pub fn is_done(&self) -> bool {
        self.cfg.max_trials.is_some_and(|n| self.completed >= n)
    }

    /// Advance the machine to `now_ms` given the latest measured angle.
    pub fn advance<R: Rng + ?Sized>(&mut self, now_ms: u64, angle: f32, rng: &mut R) -> Vec<TrialEffect> {
        let Some(entered) = self.entered_ms else {
            self.entered_ms = Some(now_ms);
            return Vec::new();
        };
        if self.is_done() {
            return Vec::new();
        }
        let elapsed = now_ms.saturating_sub(entered);

        let held = if self.state == TrialState::Moving {
            if (self.target - angle).abs() <= self.cfg.tolerance_deg {
                now_ms.saturating_sub(*self.hold_start_ms.get_or_insert(now_ms))
            } else {
                self.hold_start_ms = None;
                0
            }
        } else {
            0
        };

        let Some(next) = next_state(self.state, elapsed, held, &self.cfg) else {
            return Vec::new();
        };
        tracing::debug!(from = self.state.label(), to = next.label(), elapsed_ms = elapsed, "trial transition");
        let from = self.state;
        self.state = next;
        self.entered_ms = Some(now_ms);
        self.hold_start_ms = None;
        self.on_enter(from, now_ms, angle, rng)
    }

    fn on_enter<R: Rng + ?Sized>(&mut self, from: TrialState, now_ms: u64, angle: f32, rng: &mut R) -> Vec<TrialEffect> {
        match self.state {
            TrialState::Rest => self.finalize(from).map(TrialEffect::Finished).into_iter().collect(),
            TrialState::SetTarget => {
                let fraction: f32 = rng.gen_range(0.0..1.0);
                self.target = fraction * self.rom_deg;
                tracing::debug!(target = self.target, "new trial target");
                Vec::new()
            }
            TrialState::Moving => {
                if let Err(e) = self.aan.begin_trial(angle, self.target) {
                    tracing::warn!(error = %e, "controller was mid-trial; keeping its state");
                }
                self.bound_used = self.aan.control_bound();
                self.moving_started_ms = now_ms;
                vec![
                    TrialEffect::Send(Command::SetControlBound(self.bound_used)),
                    TrialEffect::Send(Command::SetControlTarget {
                        target: self.target,
                        duration: Some(self.cfg.reach_secs()),
                    }),
                ]
            }
            TrialState::Success | TrialState::Failure => {
                let success = self.state == TrialState::Success;
                self.aan.report_outcome(success);
                self.outcome = Some((success, now_ms.saturating_sub(self.moving_started_ms)));
                Vec::new()
            }
        }
    }

    fn finalize(&mut self, from: TrialState) -> Option<TrialRecord> {
        if !matches!(from, TrialState::Success | TrialState::Failure) {
            return None;
        }
        let (success, duration_ms) = self.outcome.take()?;
        self.completed += 1;
        let rec = TrialRecord {
            index: self.completed,
            initial_position: self.aan.initial_position(),
            target_position: self.aan.target_position(),
            direction: self.aan.direction(),
            success,
            control_bound_used: self.bound_used,
            next_control_bound: self.aan.control_bound(),
            success_streak: self.aan.success_streak(),
            duration_ms,
        };
        tracing::info!(
            trial = rec.index,
            success,
            target = rec.target_position,
            bound = rec.control_bound_used,
            next_bound = rec.next_control_bound,
            "trial finished"
        );
        Some(rec)
    }
}
