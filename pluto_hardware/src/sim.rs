//! In-process PLUTO emulator.
//!
//! The emulator owns a byte queue towards the host and a frame parser for the
//! host's commands. Telemetry is generated lazily from `read_byte`: whenever
//! the queue is empty and a stream period has elapsed, one frame is built from
//! the current simulated state. In POSITION control the angle tracks the
//! commanded target with a first-order lag whose speed grows with the control
//! bound.
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pluto_traits::{LinkReader, LinkWriter};

const HEADER_IN: u8 = 0xFF;
const HEADER_OUT: u8 = 0xAA;

// Data types (status bits 7..4)
const DT_SENSORSTREAM: u8 = 0;
const DT_DIAGNOSTICS: u8 = 2;
const DT_VERSION: u8 = 3;

// Opcodes understood by the emulator
const OP_GET_VERSION: u8 = 0;
const OP_CALIBRATE: u8 = 1;
const OP_START_STREAM: u8 = 2;
const OP_STOP_STREAM: u8 = 3;
const OP_SET_CONTROL_TYPE: u8 = 4;
const OP_SET_CONTROL_TARGET: u8 = 5;
const OP_SET_DIAGNOSTICS: u8 = 6;
const OP_SET_CONTROL_BOUND: u8 = 7;
const OP_RESET_PACKETNO: u8 = 8;
const OP_SET_ROM_MIDPOINT: u8 = 9;
const OP_HEARTBEAT: u8 = 10;

const CONTROL_POSITION: u8 = 1;

/// Emulator settings.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Telemetry frame period while streaming.
    pub stream_period: Duration,
    /// Start streaming without waiting for START_STREAM / SET_DIAGNOSTICS.
    pub stream_on_start: bool,
    /// Initial mechanism index reported in telemetry.
    pub mechanism: u8,
    /// Time constant of the position tracking lag at full control bound.
    pub tracking_tau: Duration,
    /// Corrupt the checksum of every n-th telemetry frame (0 disables).
    pub corrupt_every: u32,
    pub device_id: String,
    pub firmware_version: String,
    pub compile_date: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            stream_period: Duration::from_millis(10),
            stream_on_start: true,
            mechanism: 1,
            tracking_tau: Duration::from_millis(150),
            corrupt_every: 0,
            device_id: "PLUTO-SIM".to_string(),
            firmware_version: "0.3.0".to_string(),
            compile_date: "2024-11-05".to_string(),
        }
    }
}

#[derive(Debug)]
struct SimState {
    cfg: SimConfig,
    to_host: VecDeque<u8>,
    from_host: Vec<u8>,
    streaming: bool,
    data_type: u8,
    control_type: u8,
    mechanism: u8,
    calibrated: bool,
    angle: f32,
    target: f32,
    control: f32,
    control_bound: f32,
    rom_midpoint: i8,
    button: u8,
    error_bits: u16,
    packet_number: u16,
    started: Instant,
    last_frame: Option<Instant>,
    frames_sent: u32,
    commands: Vec<Vec<u8>>,
}

impl SimState {
    fn new(cfg: SimConfig) -> Self {
        let streaming = cfg.stream_on_start;
        let mechanism = cfg.mechanism;
        Self {
            cfg,
            to_host: VecDeque::with_capacity(256),
            from_host: Vec::with_capacity(32),
            streaming,
            data_type: DT_SENSORSTREAM,
            control_type: 0,
            mechanism,
            calibrated: mechanism != 0,
            angle: 0.0,
            target: 0.0,
            control: 0.0,
            control_bound: 0.0,
            rom_midpoint: 0,
            button: 0,
            error_bits: 0,
            packet_number: 0,
            started: Instant::now(),
            last_frame: None,
            frames_sent: 0,
            commands: Vec::new(),
        }
    }

    fn status_byte(&self, data_type: u8) -> u8 {
        (data_type << 4) | ((self.control_type & 0x07) << 1) | u8::from(self.calibrated)
    }

    /// The error word travels as `255 * hi + lo`.
    fn header(&self, data_type: u8) -> Vec<u8> {
        let err = self.error_bits;
        vec![
            self.status_byte(data_type),
            (err % 255) as u8,
            (err / 255) as u8,
            (self.mechanism << 4) | 0x01,
        ]
    }

    fn advance_dynamics(&mut self, dt: Duration) {
        if self.control_type != CONTROL_POSITION {
            self.control = 0.0;
            return;
        }
        let tau = self.cfg.tracking_tau.as_secs_f32().max(1e-3);
        // Low bounds track slowly; a zero bound still creeps so that trials can succeed.
        let gain = (0.25 + 0.75 * self.control_bound) / tau;
        let alpha = (gain * dt.as_secs_f32()).min(1.0);
        let err = self.target - self.angle;
        self.control = (err / 10.0).clamp(-1.0, 1.0) * self.control_bound;
        self.angle += alpha * err;
    }

    fn push_telemetry(&mut self, now: Instant) {
        let dt = self
            .last_frame
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::ZERO);
        self.advance_dynamics(dt);
        self.last_frame = Some(now);
        self.packet_number = self.packet_number.wrapping_add(1);

        let mut payload = self.header(self.data_type);
        payload.extend_from_slice(&self.packet_number.to_le_bytes());
        let run_ms = now.saturating_duration_since(self.started).as_millis() as u32;
        payload.extend_from_slice(&run_ms.to_le_bytes());
        let err = self.target - self.angle;
        let mut sensors = vec![self.angle, self.control, self.target, self.target];
        if self.data_type == DT_DIAGNOSTICS {
            sensors.extend_from_slice(&[err, 0.0, 0.0]);
        }
        for v in sensors {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        payload.push((self.control_bound.clamp(0.0, 1.0) * 255.0) as u8);
        let dir: i8 = if err > 0.5 {
            1
        } else if err < -0.5 {
            -1
        } else {
            0
        };
        payload.push(dir as u8);
        payload.push(self.rom_midpoint as u8);
        payload.push(self.button);

        self.frames_sent = self.frames_sent.wrapping_add(1);
        let corrupt =
            self.cfg.corrupt_every > 0 && self.frames_sent % self.cfg.corrupt_every == 0;
        self.push_frame(&payload, corrupt);
    }

    fn push_version(&mut self) {
        let mut payload = self.header(DT_VERSION);
        let text = format!(
            "{},{},{}",
            self.cfg.device_id, self.cfg.firmware_version, self.cfg.compile_date
        );
        payload.extend_from_slice(text.as_bytes());
        self.push_frame(&payload, false);
    }

    fn push_frame(&mut self, payload: &[u8], corrupt: bool) {
        let len = (payload.len() + 1) as u8;
        let mut sum: u32 = u32::from(HEADER_IN) * 2 + u32::from(len);
        self.to_host.extend([HEADER_IN, HEADER_IN, len]);
        for &b in payload {
            sum += u32::from(b);
            self.to_host.push_back(b);
        }
        let chk = (sum & 0xFF) as u8;
        self.to_host
            .push_back(if corrupt { chk.wrapping_add(1) } else { chk });
    }

    /// Feed host bytes; complete and valid frames are executed.
    fn accept_from_host(&mut self, bytes: &[u8]) {
        self.from_host.extend_from_slice(bytes);
        loop {
            // Resync on the outbound header pair.
            while self.from_host.len() >= 2
                && !(self.from_host[0] == HEADER_OUT && self.from_host[1] == HEADER_OUT)
            {
                self.from_host.remove(0);
            }
            if self.from_host.len() < 3 {
                return;
            }
            let len = self.from_host[2] as usize;
            if len == 0 {
                self.from_host.drain(..3);
                continue;
            }
            let total = 3 + (len - 1) + 1;
            if self.from_host.len() < total {
                return;
            }
            let frame: Vec<u8> = self.from_host.drain(..total).collect();
            let sum: u32 = frame[..total - 1].iter().map(|&b| u32::from(b)).sum();
            if (sum & 0xFF) as u8 != frame[total - 1] {
                tracing::debug!("sim: dropping host frame with bad checksum");
                continue;
            }
            let msg = frame[3..total - 1].to_vec();
            self.execute(&msg);
            self.commands.push(msg);
        }
    }

    fn execute(&mut self, msg: &[u8]) {
        let Some((&op, args)) = msg.split_first() else {
            return;
        };
        match op {
            OP_GET_VERSION => self.push_version(),
            OP_CALIBRATE => {
                let mech = args.first().copied().unwrap_or(0);
                self.mechanism = mech;
                self.calibrated = mech != 0;
                self.angle = 0.0;
                self.target = 0.0;
            }
            OP_START_STREAM => {
                self.streaming = true;
                self.data_type = DT_SENSORSTREAM;
            }
            OP_STOP_STREAM => self.streaming = false,
            OP_SET_DIAGNOSTICS => {
                self.streaming = true;
                self.data_type = DT_DIAGNOSTICS;
            }
            OP_SET_CONTROL_TYPE => {
                self.control_type = args.first().copied().unwrap_or(0) & 0x07;
            }
            OP_SET_CONTROL_TARGET => {
                if let Some(bytes) = args.get(0..4) {
                    self.target = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                }
            }
            OP_SET_CONTROL_BOUND => {
                self.control_bound = f32::from(args.first().copied().unwrap_or(0)) / 255.0;
            }
            OP_RESET_PACKETNO => self.packet_number = 0,
            OP_SET_ROM_MIDPOINT => {
                self.rom_midpoint = args.first().copied().unwrap_or(0) as i8;
            }
            OP_HEARTBEAT => {}
            other => tracing::debug!(opcode = other, "sim: ignoring unknown opcode"),
        }
    }
}

/// Handle to an emulated device. Clones share the same device.
#[derive(Clone)]
pub struct SimulatedPluto {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedPluto {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimulatedPluto {
    pub fn new(cfg: SimConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(cfg))),
        }
    }

    /// Reader and writer halves, suitable for `Transport::start`.
    pub fn split(&self) -> (SimReader, SimWriter) {
        (
            SimReader {
                state: self.state.clone(),
            },
            SimWriter {
                state: self.state.clone(),
            },
        )
    }

    /// Set the reported button state (1 = released, 0 = pressed).
    pub fn set_button(&self, button: u8) {
        self.state.lock().button = button;
    }

    /// Force the simulated angle, e.g. to emulate the patient moving the handle.
    pub fn set_angle(&self, angle: f32) {
        self.state.lock().angle = angle;
    }

    pub fn set_error_bits(&self, bits: u16) {
        self.state.lock().error_bits = bits;
    }

    pub fn angle(&self) -> f32 {
        self.state.lock().angle
    }

    pub fn control_type(&self) -> u8 {
        self.state.lock().control_type
    }

    pub fn control_bound(&self) -> f32 {
        self.state.lock().control_bound
    }

    pub fn target(&self) -> f32 {
        self.state.lock().target
    }

    pub fn mechanism(&self) -> u8 {
        self.state.lock().mechanism
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().streaming
    }

    /// Messages (opcode + args) received from the host, oldest first.
    pub fn received_commands(&self) -> Vec<Vec<u8>> {
        self.state.lock().commands.clone()
    }
}

/// Inbound half: bytes the device sends to the host.
pub struct SimReader {
    state: Arc<Mutex<SimState>>,
}

/// Outbound half: bytes the host sends to the device.
pub struct SimWriter {
    state: Arc<Mutex<SimState>>,
}

impl LinkReader for SimReader {
    fn read_byte(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let deadline = Instant::now() + timeout;
        loop {
            let wait = {
                let mut st = self.state.lock();
                if let Some(b) = st.to_host.pop_front() {
                    return Ok(Some(b));
                }
                let now = Instant::now();
                if st.streaming {
                    let due = st
                        .last_frame
                        .map(|t| t + st.cfg.stream_period)
                        .unwrap_or(now);
                    if now >= due {
                        st.push_telemetry(now);
                        continue;
                    }
                    due.saturating_duration_since(now)
                } else {
                    Duration::from_millis(5)
                }
            };
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(wait.min(deadline.saturating_duration_since(now)));
        }
    }
}

impl LinkWriter for SimWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.lock().accept_from_host(bytes);
        Ok(())
    }
}
