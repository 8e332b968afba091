#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod scale_ops;
mod session;

use clap::Parser;
use cli::{Cli, Commands, JSON_MODE};
use eyre::{Result, WrapErr};
use sipper_config::{Logging, Rotation};
use sipper_core::DetectionCfg;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    color_eyre::install()?;

    // Logging comes up before the config error (if any) is reported, so the
    // file sink is only available once the config parsed. The guard flushes
    // the file writer when this function returns.
    let cfg = sipper_config::load_file(&cli.config);
    let _log_guard = init_tracing(cli.json, &cli.log_level, cfg.as_ref().ok().map(|c| &c.logging))?;
    let cfg = cfg?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run {
            duration_ms,
            deviation,
        } => {
            let mut detection = DetectionCfg::from(&cfg);
            if let Some(d) = deviation {
                detection.deviation_threshold = d;
            }
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = shutdown.clone();
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }
            let scale = scale_ops::open_scale(&cfg)?;
            let summary = session::run(
                scale,
                detection,
                duration_ms.map(Duration::from_millis),
                &shutdown,
            )?;
            if cli.json {
                println!("{}", summary.to_json());
            } else {
                println!(
                    "Session finished: {} sip(s), {} consumed in total, {} refill(s)",
                    summary.stats.sips, summary.stats.consumed_total, summary.stats.refills
                );
            }
        }
        Commands::Tare => {
            let mut scale = scale_ops::open_scale(&cfg)?;
            let w = scale_ops::tare(&mut scale, scale_ops::read_timeout(&cfg))?;
            if cli.json {
                println!("{}", serde_json::json!({ "event": "tare", "reading": w }));
            } else {
                println!("Tare complete (reading after tare: {w})");
            }
        }
        Commands::Calibrate {
            known_weight,
            settle_ms,
            samples,
        } => {
            let samples = samples.unwrap_or(cfg.scale.tare_samples);
            let settle = Duration::from_millis(settle_ms);
            #[cfg(feature = "hardware")]
            let factor = {
                let mut scale = scale_ops::open_hx711(&cfg)?;
                scale_ops::calibrate_hx711(
                    &mut scale,
                    known_weight,
                    samples,
                    settle,
                    scale_ops::read_timeout(&cfg),
                )?
            };
            #[cfg(not(feature = "hardware"))]
            let factor = {
                let mut scale = scale_ops::open_scale(&cfg)?;
                scale_ops::calibrate(
                    &mut scale,
                    known_weight,
                    cfg.scale.calibration_factor,
                    samples,
                    settle,
                    scale_ops::read_timeout(&cfg),
                )?
            };
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "event": "calibration", "calibration_factor": factor })
                );
            } else {
                println!("Put this in the [scale] section of your config:");
                println!("calibration_factor = {factor:.4}");
            }
        }
        Commands::SelfCheck => {
            let mut scale = scale_ops::open_scale(&cfg)?;
            let w = scale_ops::self_check(&mut scale, scale_ops::read_timeout(&cfg))?;
            if cli.json {
                println!("{}", serde_json::json!({ "status": "ok", "reading": w }));
            } else {
                println!("ok (reading {w})");
            }
        }
    }
    Ok(())
}

/// Console layer on stderr (stdout carries data) plus an optional JSON file layer.
fn init_tracing(
    json: bool,
    level: &str,
    logging: Option<&Logging>,
) -> Result<Option<WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let mut guard = None;
    let file = match logging.and_then(|l| l.file.as_deref().map(|f| (l, f))) {
        Some((l, path)) => {
            let path = Path::new(path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file must name a file"))?;
            let appender = match l.rotation {
                Rotation::Never => tracing_appender::rolling::never(dir, name),
                Rotation::Daily => tracing_appender::rolling::daily(dir, name),
                Rotation::Hourly => tracing_appender::rolling::hourly(dir, name),
            };
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            let file_level = l.level.as_deref().unwrap_or("info");
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(file_level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init logging: {e}"))?;
    Ok(guard)
}
