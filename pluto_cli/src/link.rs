//! Backend selection and link assembly.

use crate::cli::{LAST_PORT, SIM_PORT};
use pluto_core::{Transport, TransportBuilder, TransportCfg};
use pluto_hardware::SimConfig;

/// Open the link named by `port` and start ingestion.
///
/// `"sim"` always selects the in-process emulator. Any other name needs the
/// `hardware` feature.
pub fn open(port: &str, cfg: TransportCfg) -> eyre::Result<Transport> {
    let _ = LAST_PORT.set(port.to_string());
    if port.eq_ignore_ascii_case(SIM_PORT) {
        return open_sim(cfg);
    }
    open_serial(port, cfg)
}

/// The emulator stays quiet until asked to stream, like a freshly reset board.
fn open_sim(cfg: TransportCfg) -> eyre::Result<Transport> {
    let sim = pluto_hardware::SimulatedPluto::new(SimConfig {
        stream_on_start: false,
        ..SimConfig::default()
    });
    let (rx, tx) = sim.split();
    tracing::info!(backend = "sim", "link opened");
    TransportBuilder::new()
        .with_reader(rx)
        .with_writer(tx)
        .with_cfg(cfg)
        .build()
}

#[cfg(feature = "hardware")]
fn open_serial(port: &str, cfg: TransportCfg) -> eyre::Result<Transport> {
    let (rx, tx) = pluto_hardware::serial::open(port)?;
    TransportBuilder::new()
        .with_reader(rx)
        .with_writer(tx)
        .with_cfg(cfg)
        .build()
}

#[cfg(not(feature = "hardware"))]
fn open_serial(port: &str, _cfg: TransportCfg) -> eyre::Result<Transport> {
    eyre::bail!(
        "failed to open serial port {port}: built without the `hardware` feature (use --port sim)"
    )
}

/// Close the link, logging instead of failing when the thread does not exit in time.
pub fn close(mut transport: Transport) {
    if let Err(e) = transport.stop() {
        tracing::warn!(error = %e, "ingestion thread did not stop in time");
    }
}
