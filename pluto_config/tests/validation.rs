use pluto_config::{StreamMode, load_file, load_toml};
use rstest::rstest;

fn base() -> String {
    r#"
[serial]
port = "/dev/ttyACM0"

[aan]
initial_bound = 0.5
forget_factor = 0.9
assist_factor = 1.1

[trial]
rest_ms = 1500
set_target_ms = 400
moving_ms = 5000
display_ms = 800
reach_ms = 1500
tolerance_deg = 5.0
hold_ms = 1000
tick_hz = 50
max_trials = 20

[mechanism]
name = "HOC"

[runner]
heartbeat_ms = 400
stream = "sensor"
"#
    .to_string()
}

#[test]
fn accepts_complete_config() {
    let cfg = load_toml(&base()).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.trial.max_trials, Some(20));
    assert_eq!(cfg.runner.stream, StreamMode::Sensor);
    assert_eq!(cfg.mechanism.name, "HOC");
}

#[rstest]
#[case("forget_factor = 0.9", "forget_factor = 1.0", "aan.forget_factor")]
#[case("assist_factor = 1.1", "assist_factor = 0.95", "aan.assist_factor")]
#[case("initial_bound = 0.5", "initial_bound = 1.5", "aan.initial_bound")]
#[case("tick_hz = 50", "tick_hz = 0", "trial.tick_hz")]
#[case("hold_ms = 1000", "hold_ms = 0", "trial.hold_ms")]
#[case("hold_ms = 1000", "hold_ms = 6000", "trial.hold_ms must be < trial.moving_ms")]
#[case("tolerance_deg = 5.0", "tolerance_deg = -1.0", "trial.tolerance_deg")]
#[case("max_trials = 20", "max_trials = 0", "trial.max_trials")]
#[case("name = \"HOC\"", "name = \"ELBOW\"", "mechanism.name")]
#[case("name = \"HOC\"", "name = \"NOMECH\"", "not nomech")]
#[case("heartbeat_ms = 400", "heartbeat_ms = 0", "runner.heartbeat_ms")]
#[case("port = \"/dev/ttyACM0\"", "port = \"  \"", "serial.port")]
fn rejects_out_of_range_values(#[case] from: &str, #[case] to: &str, #[case] needle: &str) {
    let text = base().replace(from, to);
    let cfg = load_toml(&text).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}")
            .to_lowercase()
            .contains(&needle.to_lowercase()),
        "unexpected error: {err}"
    );
}

#[test]
fn rejects_unknown_stream_mode_at_parse_time() {
    let text = base().replace("stream = \"sensor\"", "stream = \"torque\"");
    assert!(load_toml(&text).is_err());
}

#[test]
fn fme_mechanism_accepts_rom_override() {
    let text = base().replace("name = \"HOC\"", "name = \"FME1\"\nrom_deg = 60.0");
    let cfg = load_toml(&text).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.mechanism.rom_deg, Some(60.0));
}

#[test]
fn load_file_reads_and_validates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pluto.toml");
    std::fs::write(&path, base()).expect("write");
    let cfg = load_file(&path).expect("load");
    assert_eq!(cfg.serial.port, "/dev/ttyACM0");

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, base().replace("tick_hz = 50", "tick_hz = 5000")).expect("write");
    let err = load_file(&bad).expect_err("invalid");
    assert!(format!("{err}").contains("tick_hz"));
}
