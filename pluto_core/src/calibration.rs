//! Button-driven mechanism calibration.
//!
//! ```text
//! WaitForZeroSet --release--> ZeroSet --release, |angle| in range--> RomSet --release--> AllDone
//!                                     \--release, out of range----> Error  --release--> AllDone
//! ```
//!
//! The range check accepts |angle| within 0.9..=1.1 of the mechanism's
//! calibrated range of motion.

use crate::command::Command;
use crate::device::Mechanism;
use crate::error::PlutoError;

const ROM_LOW: f32 = 0.9;
const ROM_HIGH: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    WaitForZeroSet,
    ZeroSet,
    RomSet,
    Error,
    AllDone,
}

/// Transition on a button release. `rom_ok` is only consulted in `ZeroSet`.
pub fn next_calibration_state(state: CalibrationState, rom_ok: bool) -> CalibrationState {
    match state {
        CalibrationState::WaitForZeroSet => CalibrationState::ZeroSet,
        CalibrationState::ZeroSet if rom_ok => CalibrationState::RomSet,
        CalibrationState::ZeroSet => CalibrationState::Error,
        CalibrationState::RomSet | CalibrationState::Error | CalibrationState::AllDone => {
            CalibrationState::AllDone
        }
    }
}

#[derive(Debug, Clone)]
pub struct Calibration {
    mechanism: Mechanism,
    rom_deg: f32,
    state: CalibrationState,
    last_angle: f32,
    rom_set: bool,
}

impl Calibration {
    /// `rom_override` replaces the table range and is required for mechanisms without one.
    pub fn new(mechanism: Mechanism, rom_override: Option<f32>) -> Result<Self, PlutoError> {
        if mechanism == Mechanism::NoMech {
            return Err(PlutoError::Config("cannot calibrate NOMECH".into()));
        }
        let rom_deg = rom_override
            .or_else(|| mechanism.calibrated_angle())
            .ok_or_else(|| {
                PlutoError::Config(format!(
                    "{mechanism} has no calibrated range; set mechanism.rom_deg"
                ))
            })?;
        Ok(Self {
            mechanism,
            rom_deg,
            state: CalibrationState::WaitForZeroSet,
            last_angle: 0.0,
            rom_set: false,
        })
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    pub fn rom_deg(&self) -> f32 {
        self.rom_deg
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CalibrationState::AllDone
    }

    /// Commands that put the device into an uncalibrated state before the zero is set.
    pub fn start(&mut self) -> Vec<Command> {
        self.state = CalibrationState::WaitForZeroSet;
        self.rom_set = false;
        vec![Command::Calibrate(Mechanism::NoMech)]
    }

    pub fn rom_in_range(&self, angle: f32) -> bool {
        let a = angle.abs();
        a >= ROM_LOW * self.rom_deg && a <= ROM_HIGH * self.rom_deg
    }

    /// Advance on a button release, given the angle at release time.
    pub fn on_button_released(&mut self, angle: f32) -> Vec<Command> {
        let from = self.state;
        self.last_angle = angle;
        self.state = next_calibration_state(from, self.rom_in_range(angle));
        tracing::info!(from = ?from, to = ?self.state, angle, mechanism = %self.mechanism, "calibration step");
        match (from, self.state) {
            (CalibrationState::WaitForZeroSet, CalibrationState::ZeroSet) => {
                vec![Command::Calibrate(self.mechanism)]
            }
            (CalibrationState::ZeroSet, CalibrationState::RomSet) => {
                self.rom_set = true;
                Vec::new()
            }
            (CalibrationState::ZeroSet, CalibrationState::Error) => {
                tracing::warn!(angle, expected = self.rom_deg, "range of motion out of bounds");
                vec![Command::Calibrate(Mechanism::NoMech)]
            }
            _ => Vec::new(),
        }
    }

    /// Instruction for the operator in the current state.
    pub fn prompt(&self) -> String {
        let mech = self.mechanism.text();
        match self.state {
            CalibrationState::WaitForZeroSet => {
                format!("Bring '{mech}' to the zero position and press the PLUTO button to set zero.")
            }
            CalibrationState::ZeroSet => format!(
                "[{:7.2}] Zero set. Move to the other extreme and press the PLUTO button.",
                self.last_angle
            ),
            CalibrationState::RomSet => {
                format!("'{mech}' calibrated. Press the PLUTO button to finish.")
            }
            CalibrationState::Error => format!(
                "Calibration of '{mech}' failed. Press the PLUTO button to exit, then try again."
            ),
            CalibrationState::AllDone => "Calibration finished.".to_string(),
        }
    }

    /// True once the range check has passed.
    pub fn succeeded(&self) -> bool {
        self.rom_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_sends_mechanism_then_done() {
        let mut c = Calibration::new(Mechanism::Wfe, None).unwrap();
        assert_eq!(c.start(), vec![Command::Calibrate(Mechanism::NoMech)]);
        assert_eq!(c.on_button_released(0.0), vec![Command::Calibrate(Mechanism::Wfe)]);
        assert!(c.on_button_released(-130.0).is_empty());
        assert_eq!(c.state(), CalibrationState::RomSet);
        c.on_button_released(0.0);
        assert!(c.is_done());
        assert!(c.succeeded());
    }

    #[test]
    fn out_of_range_resets_to_nomech() {
        let mut c = Calibration::new(Mechanism::Hoc, None).unwrap();
        c.start();
        c.on_button_released(0.0);
        assert_eq!(c.on_button_released(40.0), vec![Command::Calibrate(Mechanism::NoMech)]);
        assert_eq!(c.state(), CalibrationState::Error);
    }

    #[test]
    fn fme_needs_override() {
        assert!(Calibration::new(Mechanism::Fme1, None).is_err());
        assert_eq!(Calibration::new(Mechanism::Fme1, Some(60.0)).unwrap().rom_deg(), 60.0);
    }
}
