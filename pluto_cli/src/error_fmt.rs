//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_PORT;
use pluto_core::error::{BuildError, CommandError, PlutoError};

fn command_error(err: &eyre::Report) -> Option<&CommandError> {
    if let Some(ce) = err.downcast_ref::<CommandError>() {
        return Some(ce);
    }
    match err.downcast_ref::<PlutoError>() {
        Some(PlutoError::Command(ce)) => Some(ce),
        _ => None,
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(ce) = command_error(err) {
        return match ce {
            CommandError::UnrecognizedOpcode(_) => {
                let labels: Vec<&str> = pluto_core::Opcode::ALL.iter().map(|o| o.label()).collect();
                format!(
                    "What happened: {ce}.\nLikely causes: Typo in the opcode label.\nHow to fix: Use one of {}.",
                    labels.join(", ")
                )
            }
            CommandError::UnknownMechanism(_) => format!(
                "What happened: {ce}.\nLikely causes: Mechanism label misspelled.\nHow to fix: Use one of {}.",
                pluto_config::MECHANISM_LABELS.join(", ")
            ),
            _ => format!(
                "What happened: {ce}.\nLikely causes: Missing or malformed command argument.\nHow to fix: Check `pluto send --help` and the argument list for this opcode."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingReader | BuildError::MissingWriter => {
                "What happened: The link was not fully assembled.\nLikely causes: The serial port failed to open for reading or writing.\nHow to fix: Check the port name and that no other program holds it.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid link configuration ({msg}).\nLikely causes: Out-of-range values in [serial].\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(pe) = err.downcast_ref::<PlutoError>() {
        return match pe {
            PlutoError::Timeout => {
                let port = LAST_PORT.get().map_or("the port", String::as_str);
                format!(
                    "What happened: The device did not answer in time.\nLikely causes: Wrong port ({port}), device powered off, or firmware not streaming.\nHow to fix: Check the USB cable and power, then run `pluto self-check`."
                )
            }
            PlutoError::Link(msg) | PlutoError::LinkFault(msg) | PlutoError::Io(msg) => format!(
                "What happened: Serial link failure ({msg}).\nLikely causes: Device unplugged or port in use.\nHow to fix: Reconnect the device and rerun; list ports with your OS tools."
            ),
            PlutoError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Mechanism or range of motion not set.\nHow to fix: Edit [mechanism] in the config, then rerun."
            ),
            _ => format!(
                "What happened: {pe}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("failed to open serial port") {
        return format!(
            "What happened: {msg}.\nLikely causes: Wrong port name, missing permissions, or the device is not connected.\nHow to fix: Pass --port with the right device (e.g. /dev/ttyACM0) or set [serial] port."
        );
    }

    if lower.contains("read config") || lower.contains("parse config") || lower.contains("must") {
        return format!(
            "What happened: Configuration is invalid or incomplete ({msg}).\nLikely causes: Missing [serial] port or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 bad command, 4 device timeout, 5 link failure, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if command_error(err).is_some() {
        return 3;
    }
    match err.downcast_ref::<PlutoError>() {
        Some(PlutoError::Timeout) => 4,
        Some(PlutoError::Link(_) | PlutoError::LinkFault(_) | PlutoError::Io(_)) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if command_error(err).is_some() {
        return "Command";
    }
    match err.downcast_ref::<PlutoError>() {
        Some(PlutoError::Timeout) => "Timeout",
        Some(PlutoError::Link(_) | PlutoError::LinkFault(_) | PlutoError::Io(_)) => "Link",
        Some(PlutoError::Config(_)) => "Config",
        Some(PlutoError::State(_)) => "State",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let reason = reason_name(err);
    match (reason, LAST_PORT.get()) {
        ("Timeout" | "Link", Some(port)) => {
            json!({ "reason": reason, "details": { "port": port }, "message": msg }).to_string()
        }
        _ => json!({ "reason": reason, "message": msg }).to_string(),
    }
}
