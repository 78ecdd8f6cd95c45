mod cli;
mod commands;
mod error_fmt;
mod link;

use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cli::{Cli, FILE_GUARD, JSON_MODE, SIM_PORT};
use commands::Env;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(e) = try_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}

fn try_main(cli: Cli) -> eyre::Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => pluto_config::load_file(path)?,
        None => pluto_config::Config::for_port(SIM_PORT),
    };
    if let Some(port) = &cli.port {
        cfg.serial.port.clone_from(port);
    }
    cfg.validate()?;

    let level = cli
        .log_level
        .as_deref()
        .or(cfg.logging.level.as_deref())
        .unwrap_or("warn");
    init_tracing(
        cli.json,
        level,
        cfg.logging.file.as_deref(),
        cfg.logging.rotation.as_deref(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let port = cfg.serial.port.clone();
    tracing::debug!(port = %port, cmd = ?cli.cmd, "dispatch");
    commands::run(
        &cli.cmd,
        &Env {
            cfg: &cfg,
            port: &port,
            json: cli.json,
            shutdown,
        },
    )
}

/// Console logs go to stderr so stdout stays machine-readable.
fn init_tracing(json: bool, level: &str, file: Option<&str>, rotation: Option<&str>) {
    use tracing_appender::rolling;
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file_layer = file.map(|path| {
        let path = Path::new(path);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "pluto.log".into(), std::ffi::OsStr::to_os_string);
        let appender = match rotation {
            Some("daily") => rolling::daily(dir, name),
            Some("hourly") => rolling::hourly(dir, name),
            _ => rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer().json().with_ansi(false).with_writer(writer).boxed()
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init();
}
