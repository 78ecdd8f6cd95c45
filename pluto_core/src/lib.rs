#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Host-side core for the PLUTO wrist/hand rehabilitation robot.
//!
//! All device I/O goes through `pluto_traits::LinkReader` / `LinkWriter`, so
//! the same code drives a real serial port or the in-process emulator.
//!
//! ## Architecture
//!
//! - **Framing** (`frame`): `FF FF N payload chk` inbound, `AA AA N msg chk` outbound
//! - **Commands** (`command`): opcode table and argument encoding
//! - **Decoder** (`decoder`, `device`): payload → `DeviceState` + edge events
//! - **Session** (`session`): single-writer state, copy-on-publish snapshots, observers
//! - **Transport** (`transport`): ingestion thread with stop/pause flags and bounded join
//! - **AAN** (`aan`) and **trials** (`trial`): adaptive bound and reaching-trial state machine
//! - **Calibration** (`calibration`), **trajectory** (`trajectory`), **logging** (`logger`)
//! - **Runner** (`runner`): fixed-tick loops tying the pieces together

pub mod aan;
pub mod calibration;
pub mod command;
pub mod config;
pub mod conversions;
pub mod decoder;
pub mod device;
pub mod error;
pub mod frame;
pub mod hw_error;
pub mod logger;
pub mod mocks;
pub mod runner;
pub mod session;
pub mod trajectory;
pub mod transport;
pub mod trial;
pub mod util;

pub use aan::AanController;
pub use calibration::{Calibration, CalibrationState};
pub use command::{Command, CommandSink, Opcode};
pub use config::{AanCfg, RunnerCfg, StreamKind, TrialCfg};
pub use decoder::{Decoder, DeviceEvent};
pub use device::{ControlType, DataType, DeviceIdentity, DeviceState, Mechanism};
pub use error::{BuildError, CommandError, DecodeError, FrameError, PlutoError, Result};
pub use logger::{CsvSessionLogger, SessionHeader, SessionLogger};
pub use session::{DeviceSession, DeviceSnapshot, LinkStats};
pub use trajectory::MinJerk;
pub use transport::{CommandSender, Transport, TransportCfg};
pub use trial::{TrialEffect, TrialRecord, TrialSequencer, TrialState};

use std::sync::Arc;

use pluto_traits::clock::Clock;
use pluto_traits::{LinkReader, LinkWriter};

/// Assembles a `Transport` from its parts.
///
/// ```ignore
/// let transport = TransportBuilder::new()
///     .with_reader(reader)
///     .with_writer(writer)
///     .build()?;
/// ```
pub struct TransportBuilder<R, W> {
    reader: Option<R>,
    writer: Option<W>,
    session: Option<Arc<DeviceSession>>,
    cfg: TransportCfg,
}

impl<R, W> Default for TransportBuilder<R, W> {
    fn default() -> Self {
        Self {
            reader: None,
            writer: None,
            session: None,
            cfg: TransportCfg::default(),
        }
    }
}

impl<R, W> TransportBuilder<R, W>
where
    R: LinkReader + Send + 'static,
    W: LinkWriter + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reader(mut self, reader: R) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_writer(mut self, writer: W) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Share an existing session instead of creating a fresh one.
    pub fn with_session(mut self, session: Arc<DeviceSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_cfg(mut self, cfg: TransportCfg) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn build(self) -> Result<Transport> {
        self.build_with_clock(pluto_traits::MonotonicClock::new())
    }

    pub fn build_with_clock<C: Clock + Send + Sync + 'static>(self, clock: C) -> Result<Transport> {
        let reader = self.reader.ok_or(BuildError::MissingReader)?;
        let writer = self.writer.ok_or(BuildError::MissingWriter)?;
        if self.cfg.read_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("read_timeout must be > 0").into());
        }
        if self.cfg.join_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("join_timeout must be > 0").into());
        }
        let session = self.session.unwrap_or_default();
        Transport::start(reader, writer, session, clock, self.cfg)
    }
}
