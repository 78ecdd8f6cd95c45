//! Serial-port backend (115200 8N1, no flow control, DTR asserted).

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use pluto_traits::link::{BAUD_RATE, READ_TIMEOUT, WRITE_TIMEOUT};
use pluto_traits::{LinkReader, LinkWriter};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{HwError, Result};

/// Inbound half of an open serial port. Dropping it closes the handle.
pub struct SerialReader {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

/// Outbound half of an open serial port.
pub struct SerialWriter {
    port: Box<dyn SerialPort>,
}

/// Open `path` with the fixed link parameters and split it into reader and writer halves.
pub fn open(path: &str) -> Result<(SerialReader, SerialWriter)> {
    let mut port = serialport::new(path, BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|e| HwError::PortOpen {
            port: path.to_string(),
            reason: e.to_string(),
        })?;
    port.write_data_terminal_ready(true)
        .map_err(|e| HwError::Serial(e.to_string()))?;
    let writer = port.try_clone().map_err(|e| HwError::PortOpen {
        port: path.to_string(),
        reason: format!("clone handle: {e}"),
    })?;
    tracing::info!(port = path, baud = BAUD_RATE, "serial port opened");
    Ok((
        SerialReader {
            port,
            timeout: READ_TIMEOUT,
        },
        SerialWriter { port: writer },
    ))
}

impl LinkReader for SerialReader {
    fn read_byte(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<Option<u8>, Box<dyn std::error::Error + Send + Sync>> {
        if timeout != self.timeout {
            self.port
                .set_timeout(timeout)
                .map_err(|e| HwError::Serial(e.to_string()))?;
            self.timeout = timeout;
        }
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }
}

impl LinkWriter for SerialWriter {
    fn write_all(
        &mut self,
        bytes: &[u8],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // The clone shares the port's timeout; reads and writes both use 250 ms.
        debug_assert_eq!(READ_TIMEOUT, WRITE_TIMEOUT);
        match self.port.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(Box::new(HwError::Timeout)),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }
}
