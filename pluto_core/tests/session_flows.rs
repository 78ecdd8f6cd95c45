//! End-to-end flows over the emulator: calibration, session logging, moves.

use pluto_core::calibration::{Calibration, CalibrationState};
use pluto_core::command::Command;
use pluto_core::device::Mechanism;
use pluto_core::logger::{CsvSessionLogger, SessionHeader, SessionLogger};
use pluto_core::mocks::{MemoryLogger, RecordingSink};
use pluto_core::runner::{self, RunContext, SharedLogger};
use pluto_core::session::DeviceSession;
use pluto_core::transport::{Transport, TransportCfg};
use pluto_hardware::sim::SimulatedPluto;
use pluto_traits::clock::MonotonicClock;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

fn start(sim: &SimulatedPluto) -> Transport {
    let (rx, tx) = sim.split();
    Transport::start(
        rx,
        tx,
        Arc::new(DeviceSession::new()),
        MonotonicClock::new(),
        TransportCfg {
            read_timeout: Duration::from_millis(20),
            join_timeout: Duration::from_millis(500),
        },
    )
    .unwrap()
}

fn press_and_release(sim: &SimulatedPluto) {
    sim.set_button(0);
    std::thread::sleep(Duration::from_millis(80));
    sim.set_button(1);
    std::thread::sleep(Duration::from_millis(80));
}

#[test]
fn calibration_walks_through_all_states() {
    let sim = SimulatedPluto::default();
    let t = start(&sim);
    let clock = MonotonicClock::new();
    let stop = AtomicBool::new(false);
    runner::wait_for(t.session(), &clock, Duration::from_secs(2), |s| s.stats.accepted >= 3).unwrap();

    let operator = {
        let sim = sim.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            press_and_release(&sim); // zero
            sim.set_angle(-130.0);
            press_and_release(&sim); // range
            press_and_release(&sim); // done
        })
    };

    let ctx = RunContext {
        session: t.session(),
        sink: &t,
        clock: &clock,
        shutdown: &stop,
    };
    let mut cal = Calibration::new(Mechanism::Wfe, None).unwrap();
    let mut prompts = Vec::new();
    let ok = runner::run_calibration(&ctx, &mut cal, Duration::from_secs(5), |p| {
        prompts.push(p.to_string());
    })
    .unwrap();
    operator.join().unwrap();

    assert!(ok);
    assert_eq!(cal.state(), CalibrationState::AllDone);
    assert_eq!(prompts.len(), 4);
    assert_eq!(sim.mechanism(), Mechanism::Wfe.index());
}

#[test]
fn telemetry_rows_follow_new_data_events() {
    let sim = SimulatedPluto::default();
    let t = start(&sim);
    let mem = MemoryLogger::default();
    let shared: SharedLogger = Arc::new(parking_lot::Mutex::new(Box::new(mem.clone())));
    let id = runner::attach_logger(t.session(), shared, Instant::now());
    std::thread::sleep(Duration::from_millis(200));
    t.session().unsubscribe(id);
    let rows = mem.telemetry.lock().len();
    assert!(rows >= 5, "only {rows} rows");
    let times: Vec<u64> = mem.telemetry.lock().iter().map(|(t, _)| *t).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn csv_log_gets_identity_preamble() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
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
    let identity = runner::request_identity(&ctx, Duration::from_secs(2)).ok();
    let logger: Box<dyn SessionLogger> = Box::new(
        CsvSessionLogger::create(
            &path,
            &SessionHeader {
                identity,
                actuated: t.session().state().actuated,
                started: "test".into(),
            },
        )
        .unwrap(),
    );
    let shared: SharedLogger = Arc::new(parking_lot::Mutex::new(logger));
    let id = runner::attach_logger(t.session(), shared.clone(), Instant::now());
    std::thread::sleep(Duration::from_millis(100));
    t.session().unsubscribe(id);
    shared.lock().flush().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("# DeviceId = PLUTO-SIM"));
    assert!(text.contains("# FirmwareVersion = 0.3.0"));
    assert!(text.lines().any(|l| l.starts_with("data,")));
}

#[test]
fn move_streams_targets_until_trajectory_ends() {
    let session = DeviceSession::new();
    let sink = RecordingSink::new();
    let clock = MonotonicClock::new();
    let stop = AtomicBool::new(false);
    let ctx = RunContext {
        session: &session,
        sink: &sink,
        clock: &clock,
        shutdown: &stop,
    };
    runner::run_move(&ctx, -20.0, Duration::from_millis(200), 0.8, 100).unwrap();
    let sent = sink.sent();
    assert_eq!(sent[0], Command::SetControlType(pluto_core::ControlType::Position));
    assert_eq!(sent[1], Command::SetControlBound(0.8));
    let targets: Vec<f32> = sent
        .iter()
        .filter_map(|c| match c {
            Command::SetControlTarget { target, .. } => Some(*target),
            _ => None,
        })
        .collect();
    assert!(targets.len() >= 10);
    assert!(targets.windows(2).all(|w| w[1] <= w[0] + 1e-6));
    assert_eq!(*targets.last().unwrap(), -20.0);
}
