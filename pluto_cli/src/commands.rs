//! Subcommand handlers: config mapping, link assembly and result printing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use pluto_core::runner::{self, RunContext, SessionSummary, SharedLogger};
use pluto_core::{
    AanController, Calibration, Command, CommandSink, ControlType, CsvSessionLogger, DeviceSnapshot,
    DeviceState, Mechanism, PlutoError, SessionHeader, SessionLogger, Transport, TrialCfg,
    TrialSequencer,
};
use pluto_traits::MonotonicClock;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cli::Commands;
use crate::link;

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(2);
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a handler needs besides its own arguments.
pub struct Env<'a> {
    pub cfg: &'a pluto_config::Config,
    pub port: &'a str,
    pub json: bool,
    pub shutdown: Arc<AtomicBool>,
}

impl Env<'_> {
    fn open(&self) -> eyre::Result<Transport> {
        link::open(self.port, (&self.cfg.serial).into())
    }

    /// Open the link, request the configured stream and wait for its first frame.
    fn open_streaming(&self, clock: &MonotonicClock) -> eyre::Result<Transport> {
        let t = self.open()?;
        runner::start_streaming(&t, self.cfg.runner.stream.into());
        if let Err(e) = wait_first_frame(&t, clock) {
            link::close(t);
            return Err(e);
        }
        Ok(t)
    }
}

pub fn run(cmd: &Commands, env: &Env<'_>) -> eyre::Result<()> {
    match cmd {
        Commands::Aan { trials, seed } => aan(env, *trials, *seed),
        Commands::Monitor { seconds } => monitor(env, Duration::from_secs(*seconds)),
        Commands::Version => version(env),
        Commands::Calibrate { mech, timeout_secs } => {
            calibrate(env, mech, Duration::from_secs(*timeout_secs))
        }
        Commands::Send { label, args } => send(env, label, args),
        Commands::Move {
            target,
            duration_ms,
            bound,
        } => move_to(env, *target, Duration::from_millis(*duration_ms), *bound),
        Commands::SelfCheck => self_check(env),
    }
}

fn context<'a>(
    t: &'a Transport,
    clock: &'a MonotonicClock,
    shutdown: &'a AtomicBool,
) -> RunContext<'a, Transport, MonotonicClock> {
    RunContext {
        session: t.session(),
        sink: t,
        clock,
        shutdown,
    }
}

fn wait_first_frame(t: &Transport, clock: &MonotonicClock) -> eyre::Result<Arc<DeviceSnapshot>> {
    runner::wait_for(t.session(), clock, FIRST_FRAME_TIMEOUT, |s| s.stats.accepted > 0)
        .ok_or_else(|| eyre::Report::new(PlutoError::Timeout))
}

fn rom_for(mechanism: Mechanism, rom_override: Option<f32>) -> eyre::Result<f32> {
    rom_override
        .or_else(|| mechanism.calibrated_angle())
        .ok_or_else(|| {
            eyre::Report::new(PlutoError::Config(format!(
                "mechanism {mechanism} has no calibrated angle; set mechanism.rom_deg"
            )))
        })
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn aan(env: &Env<'_>, trials: Option<u32>, seed: Option<u64>) -> eyre::Result<()> {
    let cfg = env.cfg;
    let mechanism = Mechanism::from_label(&cfg.mechanism.name)?;
    let rom = rom_for(mechanism, cfg.mechanism.rom_deg)?;
    let mut trial_cfg: TrialCfg = (&cfg.trial).into();
    if trials.is_some() {
        trial_cfg.max_trials = trials;
    }
    let controller = AanController::new(&(&cfg.aan).into());
    let mut sequencer = TrialSequencer::new(trial_cfg, controller, rom);
    let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

    let clock = MonotonicClock::new();
    let t = env.open_streaming(&clock)?;
    let ctx = context(&t, &clock, &env.shutdown);

    let logger: Option<SharedLogger> = match &cfg.logging.session_csv {
        Some(path) => {
            let header = SessionHeader {
                identity: runner::request_identity(&ctx, IDENTITY_TIMEOUT).ok(),
                actuated: t.session().state().actuated,
                started: unix_secs().to_string(),
            };
            let csv: Box<dyn SessionLogger> =
                Box::new(CsvSessionLogger::create(std::path::Path::new(path), &header)?);
            Some(Arc::new(parking_lot::Mutex::new(csv)))
        }
        None => None,
    };
    let observer = logger
        .as_ref()
        .map(|l| runner::attach_logger(t.session(), l.clone(), Instant::now()));

    tracing::info!(%mechanism, rom, max_trials = ?trial_cfg.max_trials, "starting AAN session");
    let result = runner::run_aan_session(
        &ctx,
        &mut sequencer,
        &(&cfg.runner).into(),
        trial_cfg.tick_hz,
        logger.as_ref(),
        &mut rng,
    );
    if let Some(id) = observer {
        t.session().unsubscribe(id);
    }
    link::close(t);
    print_summary(&result?, env.json);
    Ok(())
}

fn print_summary(s: &SessionSummary, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "trials": s.trials,
                "successes": s.successes,
                "failures": s.failures,
                "final_bound": s.final_bound,
                "elapsed_ms": s.elapsed_ms,
                "interrupted": s.interrupted,
                "frames_accepted": s.stats.accepted,
                "frames_rejected": s.stats.rejected(),
            })
        );
    } else {
        println!(
            "AAN session {}: {} trials ({} ok, {} failed), final bound {:.3}, {:.1}s",
            if s.interrupted { "interrupted" } else { "complete" },
            s.trials,
            s.successes,
            s.failures,
            s.final_bound,
            s.elapsed_ms as f64 / 1000.0
        );
    }
}

fn monitor(env: &Env<'_>, span: Duration) -> eyre::Result<()> {
    let t = env.open()?;
    runner::start_streaming(&t, env.cfg.runner.stream.into());
    let start = Instant::now();
    let mut last_print = start;
    while start.elapsed() < span && !env.shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
        if last_print.elapsed() >= Duration::from_secs(1) {
            last_print = Instant::now();
            print_snapshot(&t.session().snapshot(), env.json);
        }
    }
    let snap = t.session().snapshot();
    link::close(t);
    if snap.stats.accepted == 0 {
        return Err(PlutoError::Timeout.into());
    }
    print_snapshot(&snap, env.json);
    Ok(())
}

fn mechanism_label(st: &DeviceState) -> &'static str {
    st.mechanism().map_or("?", Mechanism::label)
}

/// Hand-opening displacement in cm, only when the HOC mechanism is attached.
fn hoc_displacement(st: &DeviceState) -> Option<f32> {
    (st.mechanism() == Some(Mechanism::Hoc)).then(|| st.hoc_displacement())
}

fn snapshot_json(snap: &DeviceSnapshot) -> serde_json::Value {
    let st = &snap.state;
    let mut v = serde_json::json!({
        "frame_rate_hz": snap.frame_rate,
        "accepted": snap.stats.accepted,
        "dropped": snap.stats.rejected(),
        "responding": snap.stats.responding,
        "data_type": st.data_type.label(),
        "mechanism": mechanism_label(st),
        "control_type": st.control_type.label(),
        "angle": st.angle,
        "control": st.control,
        "target": st.target,
        "button": st.button,
        "errors": st.error_names(),
    });
    if let Some(cm) = hoc_displacement(st) {
        v["displacement_cm"] = serde_json::json!(cm);
    }
    v
}

fn snapshot_line(snap: &DeviceSnapshot) -> String {
    let st = &snap.state;
    let mut line = format!(
        "{:6.1} Hz  frames {} (dropped {})  {} {}  angle {:7.2}",
        snap.frame_rate,
        snap.stats.accepted,
        snap.stats.rejected(),
        mechanism_label(st),
        st.control_type.label(),
        st.angle,
    );
    if let Some(cm) = hoc_displacement(st) {
        line.push_str(&format!(" [{cm:.2} cm]"));
    }
    line.push_str(&format!(
        "  target {:7.2}  bound {:.2}  button {}",
        st.target, st.control_bound, st.button
    ));
    line
}

fn print_snapshot(snap: &DeviceSnapshot, json: bool) {
    if json {
        println!("{}", snapshot_json(snap));
    } else {
        println!("{}", snapshot_line(snap));
    }
}

fn version(env: &Env<'_>) -> eyre::Result<()> {
    let t = env.open()?;
    let clock = MonotonicClock::new();
    let id = runner::request_identity(&context(&t, &clock, &env.shutdown), IDENTITY_TIMEOUT);
    link::close(t);
    let id = id?;
    if env.json {
        println!(
            "{}",
            serde_json::json!({
                "device_id": id.device_id,
                "firmware_version": id.firmware_version,
                "compile_date": id.compile_date,
            })
        );
    } else {
        println!("Device:   {}", id.device_id);
        println!("Firmware: {}", id.firmware_version);
        println!("Compiled: {}", id.compile_date);
    }
    Ok(())
}

fn calibrate(env: &Env<'_>, label: &str, timeout: Duration) -> eyre::Result<()> {
    let mechanism = Mechanism::from_label(label)?;
    let mut cal = Calibration::new(mechanism, env.cfg.mechanism.rom_deg)?;
    let clock = MonotonicClock::new();
    let t = env.open_streaming(&clock)?;
    let json = env.json;
    let ok = runner::run_calibration(&context(&t, &clock, &env.shutdown), &mut cal, timeout, |p| {
        if json {
            println!("{}", serde_json::json!({ "prompt": p }));
        } else {
            println!("{p}");
        }
    });
    link::close(t);
    if ok? {
        println!("Calibration of {mechanism} complete (range {:.0} deg)", cal.rom_deg());
        Ok(())
    } else {
        Err(PlutoError::State(format!("calibration of {mechanism} failed the range check")).into())
    }
}

fn send(env: &Env<'_>, label: &str, args: &[String]) -> eyre::Result<()> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let cmd = Command::from_label(label, &args)?;
    let frame = cmd.to_frame();
    let t = env.open()?;
    let clock = MonotonicClock::new();
    if cmd == Command::GetVersion {
        let id = runner::request_identity(&context(&t, &clock, &env.shutdown), IDENTITY_TIMEOUT);
        link::close(t);
        let id = id?;
        println!("{},{},{}", id.device_id, id.firmware_version, id.compile_date);
        return Ok(());
    }
    t.send(&cmd);
    std::thread::sleep(Duration::from_millis(50));
    let write_errors = t.session().stats().write_errors;
    link::close(t);
    if write_errors > 0 {
        return Err(PlutoError::Link(format!("write of {} failed", cmd.opcode().label())).into());
    }
    let hex: Vec<String> = frame.iter().map(|b| format!("{b:02X}")).collect();
    println!("sent {}: {}", cmd.opcode().label(), hex.join(" "));
    Ok(())
}

fn move_to(env: &Env<'_>, target: f32, duration: Duration, bound: f32) -> eyre::Result<()> {
    if !(0.0..=1.0).contains(&bound) {
        return Err(PlutoError::Config(format!("bound {bound} is outside [0, 1]")).into());
    }
    let clock = MonotonicClock::new();
    let t = env.open_streaming(&clock)?;
    let ctx = context(&t, &clock, &env.shutdown);
    let reached = runner::run_move(&ctx, target, duration, bound, env.cfg.trial.tick_hz);
    t.send(&Command::SetControlType(ControlType::None));
    link::close(t);
    let angle = reached?;
    println!("moved to {target:.1} deg (device reports {angle:.1} deg)");
    Ok(())
}

fn self_check(env: &Env<'_>) -> eyre::Result<()> {
    let t = env.open()?;
    let clock = MonotonicClock::new();
    runner::start_streaming(&t, env.cfg.runner.stream.into());
    let snap = runner::wait_for(t.session(), &clock, FIRST_FRAME_TIMEOUT, |s| s.stats.accepted >= 3);
    link::close(t);
    let snap = snap.ok_or_else(|| eyre::Report::new(PlutoError::Timeout))?;
    println!(
        "OK: {} frames at {:.0} Hz, mechanism {}",
        snap.stats.accepted,
        snap.frame_rate,
        mechanism_label(&snap.state)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluto_core::{DataType, StreamKind};

    fn snapshot(mechanism: Mechanism, angle: f32) -> DeviceSnapshot {
        DeviceSnapshot {
            state: DeviceState {
                data_type: DataType::SensorStream,
                mechanism: mechanism.index(),
                angle,
                ..DeviceState::default()
            },
            frame_rate: 100.0,
            ..DeviceSnapshot::default()
        }
    }

    #[test]
    fn hoc_snapshot_shows_displacement() {
        let snap = snapshot(Mechanism::Hoc, 100.0);
        let v = snapshot_json(&snap);
        let cm = v["displacement_cm"].as_f64().unwrap();
        assert!((cm - 10.752).abs() < 1e-3);
        assert!(snapshot_line(&snap).contains("[10.75 cm]"));
    }

    #[test]
    fn other_mechanisms_have_no_displacement() {
        let snap = snapshot(Mechanism::Wfe, 100.0);
        assert!(snapshot_json(&snap).get("displacement_cm").is_none());
        assert!(!snapshot_line(&snap).contains(" cm]"));
    }

    #[test]
    fn sensor_stream_is_requested_before_waiting() {
        let cfg = pluto_config::Config::for_port(crate::cli::SIM_PORT);
        let env = Env {
            cfg: &cfg,
            port: crate::cli::SIM_PORT,
            json: false,
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        let clock = MonotonicClock::new();
        let t = env.open_streaming(&clock).unwrap();
        let snap = t.session().snapshot();
        link::close(t);
        assert!(snap.stats.accepted > 0);
        let expected = match StreamKind::from(cfg.runner.stream) {
            StreamKind::Sensor => DataType::SensorStream,
            StreamKind::Diagnostics => DataType::Diagnostics,
        };
        assert_eq!(snap.state.data_type, expected);
    }
}
