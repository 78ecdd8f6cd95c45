//! Session orchestration on top of a running link.
//!
//! These loops run on the caller's thread at a fixed tick. They read the
//! latest published `DeviceSnapshot`, drive a state machine and push
//! commands through a `CommandSink`. Time comes from an injected `Clock`, so
//! tests can run them against a `ManualClock` without real sleeps.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pluto_traits::clock::Clock;
use rand::Rng;

use crate::calibration::Calibration;
use crate::command::{Command, CommandSink};
use crate::config::{RunnerCfg, StreamKind};
use crate::decoder::DeviceEvent;
use crate::device::{ControlType, DeviceIdentity};
use crate::error::{PlutoError, Result};
use crate::logger::SessionLogger;
use crate::session::{DeviceSession, DeviceSnapshot, LinkStats, ObserverId};
use crate::trajectory::MinJerk;
use crate::trial::{TrialEffect, TrialSequencer};

pub type SharedLogger = Arc<Mutex<Box<dyn SessionLogger>>>;

/// Everything a loop needs to talk to the device.
pub struct RunContext<'a, S: CommandSink, C: Clock> {
    pub session: &'a DeviceSession,
    pub sink: &'a S,
    pub clock: &'a C,
    /// Cooperative stop, e.g. set from a Ctrl-C handler.
    pub shutdown: &'a AtomicBool,
}

impl<S: CommandSink, C: Clock> RunContext<'_, S, C> {
    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub trials: u32,
    pub successes: u32,
    pub failures: u32,
    pub final_bound: f32,
    pub elapsed_ms: u64,
    pub interrupted: bool,
    pub stats: LinkStats,
}

/// Ask the device to stream the configured telemetry variant.
pub fn start_streaming<S: CommandSink>(sink: &S, stream: StreamKind) {
    match stream {
        StreamKind::Diagnostics => sink.send(&Command::SetDiagnostics),
        StreamKind::Sensor => sink.send(&Command::StartStream),
    }
}

/// Log one telemetry row per `NewData` event, timed from `epoch`.
pub fn attach_logger(session: &DeviceSession, logger: SharedLogger, epoch: Instant) -> ObserverId {
    session.subscribe(move |ev, snap| {
        if *ev != DeviceEvent::NewData {
            return;
        }
        let at = snap.received_at.map_or(0, |t| {
            t.saturating_duration_since(epoch).as_millis().min(u128::from(u64::MAX)) as u64
        });
        if let Err(e) = logger.lock().log_telemetry(at, &snap.state) {
            tracing::warn!(error = %e, "session log write failed");
        }
    })
}

/// Poll the published snapshot until `pred` holds or `timeout` passes.
pub fn wait_for<C, F>(session: &DeviceSession, clock: &C, timeout: Duration, mut pred: F) -> Option<Arc<DeviceSnapshot>>
where
    C: Clock,
    F: FnMut(&DeviceSnapshot) -> bool,
{
    let start = clock.now();
    let poll = Duration::from_millis(5);
    loop {
        let snap = session.snapshot();
        if pred(&snap) {
            return Some(snap);
        }
        if clock.now().saturating_duration_since(start) >= timeout {
            return None;
        }
        clock.sleep(poll);
    }
}

/// Request the VERSION payload and wait for the identity to be parsed.
pub fn request_identity<S: CommandSink, C: Clock>(
    ctx: &RunContext<'_, S, C>,
    timeout: Duration,
) -> Result<DeviceIdentity> {
    if let Some(id) = ctx.session.identity() {
        return Ok(id);
    }
    ctx.sink.send(&Command::GetVersion);
    wait_for(ctx.session, ctx.clock, timeout, |s| s.identity.is_some())
        .and_then(|s| s.identity.clone())
        .ok_or_else(|| eyre::Report::new(PlutoError::Timeout))
}

/// Run AAN trials until the sequencer reaches `max_trials` or shutdown is requested.
pub fn run_aan_session<S, C, R>(
    ctx: &RunContext<'_, S, C>,
    sequencer: &mut TrialSequencer,
    cfg: &RunnerCfg,
    tick_hz: u32,
    logger: Option<&SharedLogger>,
    rng: &mut R,
) -> Result<SessionSummary>
where
    S: CommandSink,
    C: Clock,
    R: Rng + ?Sized,
{
    let period = Duration::from_millis(crate::util::period_ms(tick_hz));
    let epoch = ctx.clock.now();
    let mut summary = SessionSummary::default();
    let mut last_heartbeat = 0u64;

    start_streaming(ctx.sink, cfg.stream);
    ctx.sink.send(&Command::SetControlType(ControlType::Position));
    ctx.sink.send(&Command::SetControlBound(sequencer.aan().control_bound()));
    tracing::info!(tick_hz, bound = sequencer.aan().control_bound(), "AAN session start");

    loop {
        if ctx.stopping() {
            summary.interrupted = true;
            tracing::info!("AAN session interrupted");
            break;
        }
        let now_ms = ctx.clock.ms_since(epoch);
        if now_ms.saturating_sub(last_heartbeat) >= cfg.heartbeat_ms {
            ctx.sink.send(&Command::Heartbeat);
            last_heartbeat = now_ms;
        }

        let angle = ctx.session.state().angle;
        for effect in sequencer.advance(now_ms, angle, rng) {
            match effect {
                TrialEffect::Send(cmd) => ctx.sink.send(&cmd),
                TrialEffect::Finished(rec) => {
                    summary.trials += 1;
                    if rec.success {
                        summary.successes += 1;
                    } else {
                        summary.failures += 1;
                    }
                    if let Some(l) = logger
                        && let Err(e) = l.lock().log_trial(&rec)
                    {
                        tracing::warn!(error = %e, "session log write failed");
                    }
                }
            }
        }
        if sequencer.is_done() {
            break;
        }
        ctx.clock.sleep(period);
    }

    ctx.sink.send(&Command::SetControlType(ControlType::None));
    if let Some(l) = logger {
        l.lock().flush()?;
    }
    summary.final_bound = sequencer.aan().control_bound();
    summary.elapsed_ms = ctx.clock.ms_since(epoch);
    summary.stats = ctx.session.stats();
    tracing::info!(
        trials = summary.trials,
        successes = summary.successes,
        final_bound = summary.final_bound,
        "AAN session complete"
    );
    Ok(summary)
}

/// Drive `calibration` from button releases until it finishes.
///
/// `on_prompt` is called with the operator text whenever the state changes.
/// Returns whether the range check passed.
pub fn run_calibration<S, C, F>(
    ctx: &RunContext<'_, S, C>,
    calibration: &mut Calibration,
    timeout: Duration,
    mut on_prompt: F,
) -> Result<bool>
where
    S: CommandSink,
    C: Clock,
    F: FnMut(&str),
{
    let (id, events) = ctx.session.event_channel(64);
    for cmd in calibration.start() {
        ctx.sink.send(&cmd);
    }
    on_prompt(&calibration.prompt());
    let start = ctx.clock.now();
    let poll = Duration::from_millis(10);

    let result = loop {
        if ctx.stopping() {
            break Err(eyre::Report::new(PlutoError::State("calibration interrupted".into())));
        }
        if ctx.clock.now().saturating_duration_since(start) >= timeout {
            break Err(eyre::Report::new(PlutoError::Timeout));
        }
        while let Ok((ev, state)) = events.try_recv() {
            if ev != DeviceEvent::ButtonReleased {
                continue;
            }
            for cmd in calibration.on_button_released(state.angle) {
                ctx.sink.send(&cmd);
            }
            on_prompt(&calibration.prompt());
            if calibration.is_done() {
                break;
            }
        }
        if calibration.is_done() {
            break Ok(calibration.succeeded());
        }
        ctx.clock.sleep(poll);
    };
    ctx.session.unsubscribe(id);
    result
}

/// Stream a minimum-jerk trajectory from the current angle to `target`.
///
/// Returns the angle reported at the end of the move.
pub fn run_move<S: CommandSink, C: Clock>(
    ctx: &RunContext<'_, S, C>,
    target: f32,
    duration: Duration,
    bound: f32,
    tick_hz: u32,
) -> Result<f32> {
    let period = Duration::from_millis(crate::util::period_ms(tick_hz));
    let start_angle = ctx.session.state().angle;
    let traj = MinJerk::new(start_angle, target, duration.as_secs_f32());
    ctx.sink.send(&Command::SetControlType(ControlType::Position));
    ctx.sink.send(&Command::SetControlBound(bound));
    tracing::info!(from = start_angle, to = target, duration_ms = duration.as_millis() as u64, "move start");

    let epoch = ctx.clock.now();
    loop {
        if ctx.stopping() {
            return Err(eyre::Report::new(PlutoError::State("move interrupted".into())));
        }
        let t = ctx.clock.now().saturating_duration_since(epoch).as_secs_f32();
        let (value, changing) = traj.sample(t);
        ctx.sink.send(&Command::SetControlTarget {
            target: value,
            duration: None,
        });
        if !changing {
            break;
        }
        ctx.clock.sleep(period);
    }
    Ok(ctx.session.state().angle)
}
