//! Device backends for the PLUTO link.
//!
//! - `serial` (feature `hardware`): a real serial port opened with the fixed
//!   link parameters from `pluto_traits::link`.
//! - `sim`: an in-process PLUTO emulator that speaks the same wire protocol,
//!   used by the CLI when built without hardware support and by tests.
pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;

pub use sim::{SimConfig, SimReader, SimWriter, SimulatedPluto};
