use pluto_core::command::{Command, Opcode};
use pluto_core::decoder::Decoder;
use pluto_core::device::{ControlType, DataType, Mechanism};
use pluto_core::error::FrameError;
use pluto_core::frame::{self, FrameDecoder, FrameOutcome, HEADER_IN, HEADER_OUT};
use rstest::rstest;
use std::time::Instant;

fn control_param_frame() -> Vec<u8> {
    let body = [0xFF, 0xFF, 0x05, 0x10, 0x00, 0x00, 0x00];
    let mut f = body.to_vec();
    f.push(frame::checksum(&body));
    f
}

#[test]
fn minimal_control_param_frame_decodes() {
    let payload = frame::decode_frame(HEADER_IN, &control_param_frame()).unwrap();
    assert_eq!(payload, vec![0x10, 0x00, 0x00, 0x00]);

    let mut d = Decoder::new();
    let events = d.decode(&payload, Instant::now()).unwrap();
    assert!(events.is_empty());
    assert_eq!(d.current().data_type, DataType::ControlParam);
    assert_eq!(d.current().control_type, ControlType::None);
}

#[test]
fn flipping_any_bit_of_the_payload_is_rejected() {
    let good = control_param_frame();
    for byte in 3..7 {
        for bit in 0..8 {
            let mut f = good.clone();
            f[byte] ^= 1 << bit;
            assert!(
                matches!(
                    frame::decode_frame(HEADER_IN, &f),
                    Err(FrameError::Checksum { .. })
                ),
                "byte {byte} bit {bit} was accepted"
            );
        }
    }
}

#[rstest]
#[case::zero(0)]
#[case::max(255)]
fn structural_lengths_are_rejected(#[case] len: u8) {
    let mut dec = FrameDecoder::inbound();
    let out = dec.push_slice(&[0xFF, 0xFF, len, 0x00, 0x00]);
    assert_eq!(out[0], FrameOutcome::Rejected(FrameError::InvalidLength(len)));
}

#[rstest]
#[case(Command::GetVersion, &[0])]
#[case(Command::Calibrate(Mechanism::Hoc), &[1, 4])]
#[case(Command::StartStream, &[2])]
#[case(Command::StopStream, &[3])]
#[case(Command::SetControlType(ControlType::Position), &[4, 1])]
#[case(Command::SetDiagnostics, &[6])]
#[case(Command::SetControlBound(1.0), &[7, 255])]
#[case(Command::ResetPacketNumber, &[8])]
#[case(Command::SetRomMidpoint(-3), &[9, 0xFD])]
#[case(Command::Heartbeat, &[10])]
fn command_messages(#[case] cmd: Command, #[case] expected: &[u8]) {
    assert_eq!(cmd.encode(), expected);
    let f = cmd.to_frame();
    assert_eq!(&f[..3], &[HEADER_OUT, HEADER_OUT, expected.len() as u8 + 1]);
    let msg = frame::decode_frame(HEADER_OUT, &f).unwrap();
    assert_eq!(Command::decode(&msg).unwrap().opcode(), cmd.opcode());
}

#[test]
fn every_label_resolves_to_its_code() {
    for (i, op) in Opcode::ALL.iter().enumerate() {
        assert_eq!(usize::from(op.code()), i);
        assert_eq!(op.label().parse::<Opcode>().unwrap(), *op);
    }
    assert!("BOGUS".parse::<Opcode>().is_err());
}

#[test]
fn interleaved_stream_recovers_every_good_frame() {
    let a = frame::encode_inbound(&[0x10, 0, 0, 0x11]);
    let mut bad = frame::encode_inbound(&[0x10, 0, 0, 0x12]);
    let last = bad.len() - 1;
    bad[last] ^= 0x55;
    let c = frame::encode_inbound(&[0x12, 0, 0, 0x13]);
    let stream: Vec<u8> = [a, bad, c].concat();

    let mut dec = FrameDecoder::inbound();
    let accepted: Vec<Vec<u8>> = dec
        .push_slice(&stream)
        .into_iter()
        .filter_map(|o| match o {
            FrameOutcome::Accepted(p) => Some(p),
            FrameOutcome::Rejected(_) => None,
        })
        .collect();
    assert_eq!(accepted, vec![vec![0x10, 0, 0, 0x11], vec![0x12, 0, 0, 0x13]]);
}
