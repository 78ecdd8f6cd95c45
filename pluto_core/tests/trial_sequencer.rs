use pluto_core::aan::AanController;
use pluto_core::command::Command;
use pluto_core::config::{AanCfg, TrialCfg};
use pluto_core::trial::{TrialEffect, TrialSequencer, TrialState};
use rand::SeedableRng;
use rand::rngs::StdRng;

const ROM: f32 = 120.0;

fn sequencer(cfg: TrialCfg) -> TrialSequencer {
    TrialSequencer::new(cfg, AanController::new(&AanCfg::default()), ROM)
}

/// Step the sequencer every `dt` ms from `from` to `to`, with the angle given by `angle`.
fn drive(
    s: &mut TrialSequencer,
    rng: &mut StdRng,
    from: u64,
    to: u64,
    dt: u64,
    angle: impl Fn(&TrialSequencer) -> f32,
) -> Vec<TrialEffect> {
    let mut out = Vec::new();
    let mut t = from;
    while t <= to {
        let a = angle(s);
        out.extend(s.advance(t, a, rng));
        t += dt;
    }
    out
}

#[test]
fn timer_gives_exactly_one_rest_to_set_target() {
    let mut s = sequencer(TrialCfg::default());
    let mut rng = StdRng::seed_from_u64(3);
    let mut transitions = 0;
    let mut prev = s.state();
    for t in (0..=2490).step_by(10) {
        s.advance(t, 0.0, &mut rng);
        if s.state() != prev {
            transitions += 1;
            prev = s.state();
        }
    }
    assert_eq!(transitions, 1);
    assert_eq!(s.state(), TrialState::SetTarget);
}

#[test]
fn reaching_and_holding_succeeds() {
    let mut s = sequencer(TrialCfg::default());
    let mut rng = StdRng::seed_from_u64(11);
    // Rest (2000) + SetTarget (500) -> Moving at 2500.
    let fx = drive(&mut s, &mut rng, 0, 2500, 20, |_| 0.0);
    assert_eq!(s.state(), TrialState::Moving);
    let sent: Vec<Command> = fx
        .iter()
        .filter_map(|e| match e {
            TrialEffect::Send(c) => Some(*c),
            TrialEffect::Finished(_) => None,
        })
        .collect();
    assert_eq!(sent.len(), 2);
    assert!(matches!(sent[0], Command::SetControlBound(b) if (b - 0.16).abs() < 1e-6));
    assert!(matches!(
        sent[1],
        Command::SetControlTarget { duration: Some(d), .. } if (d - 2.0).abs() < 1e-6
    ));
    assert!(s.aan().is_running());

    // Sit on the target: success after the 1 s hold.
    drive(&mut s, &mut rng, 2520, 3600, 20, |s| s.target() + 1.0);
    assert_eq!(s.state(), TrialState::Success);
    assert!(!s.aan().is_running());

    // Display, then back to rest with a finished record.
    let fx = drive(&mut s, &mut rng, 3620, 4700, 20, |s| s.target());
    assert_eq!(s.state(), TrialState::Rest);
    let rec = fx
        .into_iter()
        .find_map(|e| match e {
            TrialEffect::Finished(r) => Some(r),
            TrialEffect::Send(_) => None,
        })
        .unwrap();
    assert!(rec.success);
    assert_eq!(rec.index, 1);
    assert_eq!(s.trials_completed(), 1);
}

#[test]
fn leaving_the_band_restarts_the_hold() {
    let mut s = sequencer(TrialCfg::default());
    let mut rng = StdRng::seed_from_u64(5);
    drive(&mut s, &mut rng, 0, 2500, 20, |_| 0.0);
    assert_eq!(s.state(), TrialState::Moving);
    // 900 ms inside, one tick far away, 900 ms inside again: still moving.
    drive(&mut s, &mut rng, 2520, 3420, 20, |s| s.target());
    drive(&mut s, &mut rng, 3440, 3440, 20, |s| s.target() + 50.0);
    drive(&mut s, &mut rng, 3460, 4360, 20, |s| s.target());
    assert_eq!(s.state(), TrialState::Moving);
}

#[test]
fn never_reaching_fails_after_moving_window() {
    let cfg = TrialCfg {
        max_trials: Some(1),
        ..TrialCfg::default()
    };
    let mut s = sequencer(cfg);
    let mut rng = StdRng::seed_from_u64(9);
    drive(&mut s, &mut rng, 0, 2500, 20, |_| 0.0);
    drive(&mut s, &mut rng, 2520, 8500, 20, |s| s.target() + 90.0);
    assert_eq!(s.state(), TrialState::Failure);
    // Failure streak raises the bound by the assist factor.
    assert!((s.aan().control_bound() - 0.176).abs() < 1e-5);
    drive(&mut s, &mut rng, 8520, 9600, 20, |_| 0.0);
    assert!(s.is_done());
    assert!(s.advance(20_000, 0.0, &mut rng).is_empty());
}

#[test]
fn targets_stay_inside_range_of_motion() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let mut s = sequencer(TrialCfg::default());
        drive(&mut s, &mut rng, 0, 2000, 100, |_| 0.0);
        assert_eq!(s.state(), TrialState::SetTarget);
        assert!((0.0..ROM).contains(&s.target()));
    }
}
