use anyhow::Result;
use clap::Parser;
use cngexport_cli::Cli;
use cngexport_config::{AppConfig, AppPaths, ConfigManager};
use cngexport_core::{native, Mode, RunOptions};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;

fn main() -> ExitCode {
    let cli = Cli::parse();
    // Argument errors are reported before config and logging are touched.
    let mode = match cngexport_core::resolve_mode(&cli.names, cli.long, &mut io::stderr()) {
        Ok(mode) => mode,
        Err(code) => return ExitCode::from(code),
    };
    match try_main(cli, mode) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn try_main(cli: Cli, mode: Mode) -> Result<u8> {
    let mut paths = AppPaths::new()?;
    if let Some(path) = &cli.config {
        anyhow::ensure!(path.exists(), "config file {} not found", path.display());
        paths = paths.with_config_file(path.clone());
    }
    let config_manager = ConfigManager::new(paths.clone());
    let config = config_manager.load(
        std::env::current_dir().ok().as_deref(),
        Some(cli.overrides()),
    )?;
    let _log_guard = init_logging(&config, &paths)?;
    tracing::debug!(
        provider = %config.provider.name,
        library = %config.provider.library,
        format = %config.export.format,
        "configuration loaded"
    );

    let options = RunOptions::from(&config);
    let mut out = io::stdout().lock();
    let mut err = io::stderr().lock();
    let code = cngexport_core::execute(
        &mode,
        &options,
        || native::load(&config.provider),
        &mut out,
        &mut err,
    );
    out.flush()?;
    Ok(code)
}

fn init_logging(
    config: &AppConfig,
    paths: &AppPaths,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let (file_layer, guard) = if config.logging.file {
        std::fs::create_dir_all(&paths.log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&paths.log_dir, "cngexport.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = if config.logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed()
        };
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // stdout carries key names and export results only.
    let stderr_layer = config.logging.stderr.then(|| {
        if config.logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .boxed()
        }
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}
