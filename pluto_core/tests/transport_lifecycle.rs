//! Ingestion thread lifecycle against the in-process emulator.
//!
//! Verifies that:
//! - telemetry flows into the session and publishes snapshots
//! - commands reach the device
//! - stop/pause are cooperative and the thread exits within the join timeout
//! - corrupted frames are counted and dropped, never surfaced

use pluto_core::command::{Command, CommandSink};
use pluto_core::decoder::DeviceEvent;
use pluto_core::device::{ControlType, DataType};
use pluto_core::mocks::{NullWriter, ScriptedReader};
use pluto_core::StreamKind;
use pluto_core::runner::{RunContext, request_identity, start_streaming, wait_for};
use pluto_core::session::DeviceSession;
use pluto_core::transport::{Transport, TransportCfg};
use pluto_core::{TransportBuilder, frame};
use pluto_hardware::sim::{SimConfig, SimulatedPluto};
use pluto_traits::clock::MonotonicClock;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

fn cfg() -> TransportCfg {
    TransportCfg {
        read_timeout: Duration::from_millis(20),
        join_timeout: Duration::from_millis(500),
    }
}

fn start(sim: &SimulatedPluto) -> Transport {
    let (rx, tx) = sim.split();
    Transport::start(rx, tx, Arc::new(DeviceSession::new()), MonotonicClock::new(), cfg()).unwrap()
}

#[test]
fn telemetry_reaches_the_session() {
    let sim = SimulatedPluto::default();
    let t = start(&sim);
    let snap = wait_for(t.session(), &MonotonicClock::new(), Duration::from_secs(2), |s| {
        s.stats.accepted >= 5
    })
    .expect("frames within 2s");
    assert_eq!(snap.state.data_type, DataType::SensorStream);
    assert!(snap.stats.responding);
    assert!(snap.frame_rate > 0.0);
}

#[test]
fn commands_change_device_state() {
    let sim = SimulatedPluto::default();
    let t = start(&sim);
    t.send(&Command::SetDiagnostics);
    t.send(&Command::SetControlType(ControlType::Position));
    t.send(&Command::SetControlBound(1.0));
    t.send(&Command::SetControlTarget {
        target: 30.0,
        duration: None,
    });
    assert_eq!(sim.control_type(), 1);
    let snap = wait_for(t.session(), &MonotonicClock::new(), Duration::from_secs(3), |s| {
        s.state.data_type == DataType::Diagnostics && (s.state.angle - 30.0).abs() < 2.0
    });
    assert!(snap.is_some(), "angle never tracked the target");
}

#[test]
fn version_request_fills_identity() {
    let sim = SimulatedPluto::default();
    let t = start(&sim);
    let clock = MonotonicClock::new();
    let stop = AtomicBool::new(false);
    let ctx = RunContext {
        session: t.session(),
        sink: &t,
        clock: &clock,
        shutdown: &stop,
    };
    let id = request_identity(&ctx, Duration::from_secs(2)).unwrap();
    assert_eq!(id.device_id, "PLUTO-SIM");
    assert_eq!(id.compile_date, "2024-11-05");
}

#[test]
fn button_release_is_observed_once() {
    let sim = SimulatedPluto::default();
    let t = start(&sim);
    let (_id, events) = t.session().event_channel(1024);
    let clock = MonotonicClock::new();
    wait_for(t.session(), &clock, Duration::from_secs(2), |s| s.stats.accepted >= 3).unwrap();
    sim.set_button(1);
    std::thread::sleep(Duration::from_millis(150));
    let releases = events
        .try_iter()
        .filter(|(e, _)| *e == DeviceEvent::ButtonReleased)
        .count();
    assert_eq!(releases, 1);
}

#[test]
fn quiet_device_streams_once_asked() {
    let sim = SimulatedPluto::new(SimConfig {
        stream_on_start: false,
        ..SimConfig::default()
    });
    let t = start(&sim);
    let clock = MonotonicClock::new();
    assert!(wait_for(t.session(), &clock, Duration::from_millis(200), |s| s.stats.accepted > 0).is_none());
    start_streaming(&t, StreamKind::Diagnostics);
    let snap = wait_for(t.session(), &clock, Duration::from_secs(2), |s| s.stats.accepted > 0)
        .expect("frames after the stream request");
    assert_eq!(snap.state.data_type, DataType::Diagnostics);
}

#[test]
fn injected_error_word_decodes_to_same_bits() {
    let sim = SimulatedPluto::default();
    sim.set_error_bits(0x0104);
    let t = start(&sim);
    let snap = wait_for(t.session(), &MonotonicClock::new(), Duration::from_secs(2), |s| {
        s.stats.accepted > 0
    })
    .unwrap();
    assert_eq!(snap.state.error_bits, 0x0104);
    assert_eq!(snap.state.error_names(), vec!["NOHEARTBEAT"]);
}

#[test]
fn corrupted_frames_are_counted_not_decoded() {
    let sim = SimulatedPluto::new(SimConfig {
        corrupt_every: 2,
        ..SimConfig::default()
    });
    let t = start(&sim);
    let snap = wait_for(t.session(), &MonotonicClock::new(), Duration::from_secs(2), |s| {
        s.stats.checksum_errors >= 3 && s.stats.accepted >= 3
    });
    assert!(snap.is_some());
}

#[test]
fn stop_joins_within_timeout() {
    let sim = SimulatedPluto::default();
    let mut t = start(&sim);
    std::thread::sleep(Duration::from_millis(50));
    assert!(t.is_running());
    t.stop().unwrap();
    assert!(!t.is_running());
    // Second stop is a no-op.
    t.stop().unwrap();
}

#[test]
fn pause_suspends_ingestion() {
    let sim = SimulatedPluto::default();
    let t = start(&sim);
    let clock = MonotonicClock::new();
    wait_for(t.session(), &clock, Duration::from_secs(2), |s| s.stats.accepted >= 2).unwrap();
    t.pause();
    std::thread::sleep(Duration::from_millis(60));
    let before = t.session().stats().accepted;
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(t.session().stats().accepted, before);
    t.resume();
    assert!(wait_for(t.session(), &clock, Duration::from_secs(2), |s| s.stats.accepted > before).is_some());
}

#[test]
fn many_transports_do_not_leak_threads() {
    for _ in 0..10 {
        let sim = SimulatedPluto::default();
        let t = start(&sim);
        std::thread::sleep(Duration::from_millis(5));
        drop(t);
    }
}

#[test]
fn timeout_mid_frame_abandons_partial_frame() {
    let good = frame::encode_inbound(&[0x10, 0, 0, 0x10]);
    let mut script: Vec<Option<u8>> = good[..4].iter().copied().map(Some).collect();
    script.push(None);
    script.extend(good.iter().copied().map(Some));
    let t = TransportBuilder::new()
        .with_reader(ScriptedReader::new(script))
        .with_writer(NullWriter::default())
        .with_cfg(cfg())
        .build()
        .unwrap();
    let snap = wait_for(t.session(), &MonotonicClock::new(), Duration::from_secs(1), |s| {
        s.stats.accepted == 1
    })
    .unwrap();
    assert_eq!(snap.stats.abandoned, 1);
    assert_eq!(snap.stats.checksum_errors, 0);
}

#[test]
fn failed_writes_are_counted() {
    let t = TransportBuilder::new()
        .with_reader(ScriptedReader::new([]))
        .with_writer(NullWriter::failing())
        .with_cfg(cfg())
        .build()
        .unwrap();
    t.send(&Command::Heartbeat);
    t.send(&Command::Heartbeat);
    assert_eq!(t.session().stats().write_errors, 2);
}

#[test]
fn builder_requires_both_halves() {
    let err = TransportBuilder::<ScriptedReader, NullWriter>::new()
        .with_writer(NullWriter::default())
        .build()
        .err()
        .unwrap();
    assert!(err.to_string().contains("missing link reader"));
}
