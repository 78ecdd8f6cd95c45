//! Test and helper doubles for pluto_core.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::{Command, CommandSink};
use crate::device::DeviceState;
use crate::error::Result;
use crate::logger::SessionLogger;
use crate::trial::TrialRecord;

/// Sink that remembers every command it is asked to send.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<Command>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    pub fn take(&self) -> Vec<Command> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl CommandSink for RecordingSink {
    fn send(&self, cmd: &Command) {
        self.sent.lock().push(*cmd);
    }
}

/// Reader that replays a script. `None` entries read as timeouts; once the
/// script is exhausted every read times out after sleeping `idle`.
pub struct ScriptedReader {
    script: VecDeque<Option<u8>>,
    idle: Duration,
}

impl ScriptedReader {
    pub fn new(bytes: impl IntoIterator<Item = Option<u8>>) -> Self {
        Self {
            script: bytes.into_iter().collect(),
            idle: Duration::from_millis(1),
        }
    }

    /// Script made only of data bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(bytes.iter().copied().map(Some))
    }
}

impl pluto_traits::LinkReader for ScriptedReader {
    fn read_byte(
        &mut self,
        _timeout: Duration,
    ) -> std::result::Result<Option<u8>, Box<dyn std::error::Error + Send + Sync>> {
        match self.script.pop_front() {
            Some(b) => Ok(b),
            None => {
                std::thread::sleep(self.idle);
                Ok(None)
            }
        }
    }
}

/// Writer that accepts everything, or fails every write when `failing`.
#[derive(Debug, Default, Clone)]
pub struct NullWriter {
    pub failing: bool,
    written: Arc<Mutex<Vec<u8>>>,
}

impl NullWriter {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }
}

impl pluto_traits::LinkWriter for NullWriter {
    fn write_all(
        &mut self,
        bytes: &[u8],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.failing {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "port closed",
            )));
        }
        self.written.lock().extend_from_slice(bytes);
        Ok(())
    }
}

/// In-memory session logger.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogger {
    pub telemetry: Arc<Mutex<Vec<(u64, DeviceState)>>>,
    pub trials: Arc<Mutex<Vec<TrialRecord>>>,
}

impl SessionLogger for MemoryLogger {
    fn log_telemetry(&mut self, time_ms: u64, state: &DeviceState) -> Result<()> {
        self.telemetry.lock().push((time_ms, *state));
        Ok(())
    }

    fn log_trial(&mut self, record: &TrialRecord) -> Result<()> {
        self.trials.lock().push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
