//! JEDI framing: header pair, length byte, payload, additive checksum.
//!
//! ```text
//! inbound : FF FF N payload[0..N-1) checksum
//! outbound: AA AA N message[0..N-1) checksum
//! checksum = (sum of every preceding byte) mod 256
//! ```
//!
//! `N` counts the payload plus the checksum byte. The decoder is a byte-level
//! state machine so the ingestion loop can feed it one read at a time.

use crate::error::FrameError;

/// Header byte of device-to-host frames.
pub const HEADER_IN: u8 = 0xFF;
/// Header byte of host-to-device frames.
pub const HEADER_OUT: u8 = 0xAA;
/// Length byte the device never sends; treated as a protocol violation.
pub const INVALID_LENGTH: u8 = 255;
/// Largest message that fits a frame (`N = len + 1` must stay below 255).
pub const MAX_MESSAGE_LEN: usize = 253;

/// Additive checksum: sum of `bytes` modulo 256.
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Wrap `message` in a frame with the given header byte.
///
/// Messages longer than `MAX_MESSAGE_LEN` are truncated; no command the host
/// sends comes close to that size.
pub fn encode_frame(header: u8, message: &[u8]) -> Vec<u8> {
    debug_assert!(message.len() <= MAX_MESSAGE_LEN);
    let message = &message[..message.len().min(MAX_MESSAGE_LEN)];
    let mut out = Vec::with_capacity(message.len() + 4);
    out.push(header);
    out.push(header);
    out.push((message.len() + 1) as u8);
    out.extend_from_slice(message);
    out.push(checksum(&out));
    out
}

/// Frame a host-to-device message.
#[inline]
pub fn encode_outbound(message: &[u8]) -> Vec<u8> {
    encode_frame(HEADER_OUT, message)
}

/// Frame a device-to-host payload (used by tests, benches and emulators).
#[inline]
pub fn encode_inbound(payload: &[u8]) -> Vec<u8> {
    encode_frame(HEADER_IN, payload)
}

/// Result of feeding a byte that completes (or breaks) a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Accepted(Vec<u8>),
    Rejected(FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header1,
    Header2,
    Length,
    Payload { remaining: usize },
    Checksum,
}

/// Incremental frame decoder.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    header: u8,
    state: State,
    payload: Vec<u8>,
    sum: u8,
}

impl FrameDecoder {
    pub fn with_header(header: u8) -> Self {
        Self {
            header,
            state: State::Header1,
            payload: Vec::with_capacity(64),
            sum: 0,
        }
    }

    /// Decoder for device telemetry (`0xFF` headers).
    pub fn inbound() -> Self {
        Self::with_header(HEADER_IN)
    }

    /// Decoder for host commands (`0xAA` headers).
    pub fn outbound() -> Self {
        Self::with_header(HEADER_OUT)
    }

    /// True while a frame has been started but not finished.
    pub fn in_frame(&self) -> bool {
        self.state != State::Header1
    }

    /// Abandon any partially received frame.
    pub fn reset(&mut self) {
        self.state = State::Header1;
        self.payload.clear();
        self.sum = 0;
    }

    /// Feed one byte. Returns an outcome when the byte completes or breaks a frame.
    pub fn push(&mut self, byte: u8) -> Option<FrameOutcome> {
        match self.state {
            State::Header1 => {
                if byte == self.header {
                    self.state = State::Header2;
                    None
                } else {
                    Some(FrameOutcome::Rejected(FrameError::BadHeader(byte)))
                }
            }
            State::Header2 => {
                if byte == self.header {
                    self.payload.clear();
                    self.sum = self.header.wrapping_add(self.header);
                    self.state = State::Length;
                    None
                } else {
                    self.reset();
                    Some(FrameOutcome::Rejected(FrameError::BadHeader(byte)))
                }
            }
            State::Length => {
                if byte == 0 || byte == INVALID_LENGTH {
                    self.reset();
                    return Some(FrameOutcome::Rejected(FrameError::InvalidLength(byte)));
                }
                self.sum = self.sum.wrapping_add(byte);
                let remaining = usize::from(byte) - 1;
                self.state = if remaining == 0 {
                    State::Checksum
                } else {
                    State::Payload { remaining }
                };
                None
            }
            State::Payload { remaining } => {
                self.payload.push(byte);
                self.sum = self.sum.wrapping_add(byte);
                self.state = if remaining == 1 {
                    State::Checksum
                } else {
                    State::Payload {
                        remaining: remaining - 1,
                    }
                };
                None
            }
            State::Checksum => {
                let computed = self.sum;
                let outcome = if computed == byte {
                    FrameOutcome::Accepted(std::mem::take(&mut self.payload))
                } else {
                    FrameOutcome::Rejected(FrameError::Checksum {
                        computed,
                        received: byte,
                    })
                };
                self.reset();
                Some(outcome)
            }
        }
    }

    /// Feed a buffer and collect every outcome it produces.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Vec<FrameOutcome> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }
}

/// Decode exactly one frame from `bytes`, ignoring anything after it.
///
/// Leading garbage counts as a rejection, matching how the link reader treats it.
pub fn decode_frame(header: u8, bytes: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut dec = FrameDecoder::with_header(header);
    for &b in bytes {
        match dec.push(b) {
            Some(FrameOutcome::Accepted(p)) => return Ok(p),
            Some(FrameOutcome::Rejected(e)) => return Err(e),
            None => {}
        }
    }
    Err(FrameError::Incomplete)
}
