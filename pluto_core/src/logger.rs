//! Session logging collaborator.
//!
//! A session log receives one telemetry row per `NewData` event and one row
//! per finished trial. `CsvSessionLogger` writes both into a single CSV file
//! whose first field tags the row kind (`data` or `trial`), preceded by `#`
//! preamble lines identifying the device.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::device::{DeviceIdentity, DeviceState};
use crate::error::Result;
use crate::trial::TrialRecord;

pub const DATA_COLUMNS: [&str; 18] = [
    "kind",
    "time_ms",
    "packet_number",
    "run_time_ms",
    "data_type",
    "error_bits",
    "control_type",
    "calibrated",
    "mechanism",
    "button",
    "angle",
    "control",
    "control_bound",
    "target",
    "desired",
    "err",
    "err_diff",
    "err_sum",
];

pub const TRIAL_COLUMNS: [&str; 10] = [
    "kind",
    "index",
    "initial_position",
    "target_position",
    "direction",
    "success",
    "control_bound_used",
    "next_control_bound",
    "success_streak",
    "duration_ms",
];

pub trait SessionLogger: Send {
    /// `time_ms` is host time since the session started.
    fn log_telemetry(&mut self, time_ms: u64, state: &DeviceState) -> Result<()>;
    fn log_trial(&mut self, record: &TrialRecord) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Values written to the preamble.
#[derive(Debug, Clone)]
pub struct SessionHeader {
    pub identity: Option<DeviceIdentity>,
    pub actuated: bool,
    /// Wall-clock start, formatted by the caller.
    pub started: String,
}

pub struct CsvSessionLogger {
    wtr: csv::Writer<BufWriter<File>>,
}

impl CsvSessionLogger {
    pub fn create(path: &Path, header: &SessionHeader) -> Result<Self> {
        let file = File::create(path).map_err(|e| eyre::eyre!("create session log {:?}: {}", path, e))?;
        let mut out = BufWriter::new(file);
        let (id, ver, date) = header.identity.as_ref().map_or(("unknown", "unknown", "unknown"), |i| {
            (
                i.device_id.as_str(),
                i.firmware_version.as_str(),
                i.compile_date.as_str(),
            )
        });
        writeln!(out, "# DeviceId = {id}")?;
        writeln!(out, "# FirmwareVersion = {ver}")?;
        writeln!(out, "# CompileDate = {date}")?;
        writeln!(out, "# Actuated = {}", u8::from(header.actuated))?;
        writeln!(out, "# Start = {}", header.started)?;
        writeln!(out, "# data: {}", DATA_COLUMNS.join(","))?;
        writeln!(out, "# trial: {}", TRIAL_COLUMNS.join(","))?;
        let wtr = csv::WriterBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_writer(out);
        Ok(Self { wtr })
    }
}

impl SessionLogger for CsvSessionLogger {
    fn log_telemetry(&mut self, time_ms: u64, s: &DeviceState) -> Result<()> {
        self.wtr.write_record([
            "data".to_string(),
            time_ms.to_string(),
            s.packet_number.to_string(),
            s.run_time_ms.to_string(),
            s.data_type.label().to_string(),
            s.error_bits.to_string(),
            s.control_type.to_string(),
            u8::from(s.calibrated).to_string(),
            s.mechanism().map_or_else(|| s.mechanism.to_string(), |m| m.label().to_string()),
            s.button.to_string(),
            format!("{:.3}", s.angle),
            format!("{:.4}", s.control),
            format!("{:.3}", s.control_bound),
            format!("{:.3}", s.target),
            format!("{:.3}", s.desired),
            format!("{:.4}", s.err),
            format!("{:.4}", s.err_diff),
            format!("{:.4}", s.err_sum),
        ])?;
        Ok(())
    }

    fn log_trial(&mut self, r: &TrialRecord) -> Result<()> {
        self.wtr.write_record([
            "trial".to_string(),
            r.index.to_string(),
            format!("{:.3}", r.initial_position),
            format!("{:.3}", r.target_position),
            r.direction.to_string(),
            u8::from(r.success).to_string(),
            format!("{:.4}", r.control_bound_used),
            format!("{:.4}", r.next_control_bound),
            r.success_streak.to_string(),
            r.duration_ms.to_string(),
        ])?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.wtr.flush()?;
        Ok(())
    }
}

impl Drop for CsvSessionLogger {
    fn drop(&mut self) {
        if let Err(e) = self.wtr.flush() {
            tracing::warn!(error = %e, "failed to flush session log");
        }
    }
}
