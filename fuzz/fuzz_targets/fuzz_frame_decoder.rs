#![no_main]
use libfuzzer_sys::fuzz_target;
use pluto_core::Decoder;
use pluto_core::frame::{FrameDecoder, FrameOutcome};
use std::time::Instant;

// Arbitrary inbound bytes through framing and payload decoding must never panic,
// and a rejected payload must leave the decoded state untouched.
fuzz_target!(|data: &[u8]| {
    let mut frames = FrameDecoder::inbound();
    let mut decoder = Decoder::new();
    let now = Instant::now();
    for &byte in data {
        if let Some(FrameOutcome::Accepted(payload)) = frames.push(byte) {
            let key = |d: &Decoder| {
                let s = d.current();
                (s.data_type, s.packet_number, s.run_time_ms, s.angle.to_bits())
            };
            let before = key(&decoder);
            if decoder.decode(&payload, now).is_err() {
                assert_eq!(before, key(&decoder));
            }
        }
    }
});
