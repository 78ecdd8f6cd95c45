use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal valid TOML config talking to the emulator
fn write_valid_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[serial]
port = "sim"
join_timeout_ms = 500

[mechanism]
name = "WFE"

[runner]
heartbeat_ms = 200
stream = "sensor"
{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["version"], 0, "PLUTO-SIM", "stdout")]
#[case(&["self-check"], 0, "OK:", "stdout")]
#[case(&["send", "BOGUS"], 3, "unrecognized opcode", "stderr")]
#[case(&["send", "SET_CONTROL_BOUND"], 3, "expects argument", "stderr")]
#[case(&["send", "HEARTBEAT"], 0, "AA AA 02 0A", "stdout")]
#[case(&["calibrate", "--mech", "ELBOW"], 3, "unknown mechanism", "stderr")]
#[case(&["monitor", "--seconds", "1"], 0, "Hz", "stdout")]
#[case(&["move", "--target", "10", "--duration-ms", "300"], 0, "moved to 10.0", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "");

    let mut cmd = Command::cargo_bin("pluto").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn runs_on_defaults_without_config() {
    Command::cargo_bin("pluto")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.3.0"));
}

#[test]
fn json_mode_emits_parseable_objects() {
    let out = Command::cargo_bin("pluto")
        .unwrap()
        .args(["--json", "version"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let line = String::from_utf8(out.stdout).unwrap();
    let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(v["device_id"], "PLUTO-SIM");
    assert_eq!(v["compile_date"], "2024-11-05");
}

#[test]
fn json_errors_are_structured() {
    let out = Command::cargo_bin("pluto")
        .unwrap()
        .args(["--json", "send", "NOPE"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    let err = String::from_utf8(out.stderr).unwrap();
    let v: serde_json::Value = serde_json::from_str(err.lines().last().unwrap()).unwrap();
    assert_eq!(v["reason"], "Command");
    assert!(v["message"].as_str().unwrap().contains("unrecognized opcode"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir, "[aan]\nforget_factor = 1.5\n");
    Command::cargo_bin("pluto")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("forget_factor"));
}

#[test]
fn missing_port_in_config_is_a_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, "[aan]\ninitial_bound = 0.5\n").unwrap();
    Command::cargo_bin("pluto")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("version")
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse config"));
}

#[cfg(not(feature = "hardware"))]
#[test]
fn real_port_needs_hardware_feature() {
    Command::cargo_bin("pluto")
        .unwrap()
        .args(["--port", "/dev/ttyUSB9", "self-check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("hardware"));
}

#[test]
fn short_aan_session_logs_trials_to_csv() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("session.csv");
    let extra = format!(
        r#"
[trial]
rest_ms = 50
set_target_ms = 20
moving_ms = 200
hold_ms = 50
display_ms = 20
reach_ms = 100

[logging]
session_csv = "{}"
"#,
        csv.display().to_string().replace('\\', "/")
    );
    let cfg = write_valid_config(&dir, &extra);
    Command::cargo_bin("pluto")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["aan", "--trials", "2", "--seed", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 trials"));

    let text = fs::read_to_string(&csv).unwrap();
    assert!(text.starts_with("# DeviceId = PLUTO-SIM"));
    assert_eq!(text.lines().filter(|l| l.starts_with("trial,")).count(), 2);
    assert!(text.lines().any(|l| l.starts_with("data,")));
}
