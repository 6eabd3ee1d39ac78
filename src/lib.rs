pub mod availability;
pub mod cli;
pub mod config;
pub mod constraints;
pub mod display;
pub mod error;
pub mod feed;
pub mod lifecycle;
pub mod server;
pub mod simulator;
pub mod snapshot;
pub mod startgg;
pub mod timeline;
pub mod types;

use clap::Parser;
use cli::Cli;
use config::*;
use std::fs;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Entry point ────────────────────────────────────────────────────────

pub fn run() -> i32 {
    load_env_file();
    let cli = Cli::parse();
    let quiet = cli.quiet;

    // File log always; stderr unless --quiet.
    let logs_dir = logs_dir();
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "matchcaller.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let stderr_layer = (!quiet).then(|| fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(stderr_layer)
        .init();
    info!("matchcaller starting");

    let config = match load_config_inner() {
        Ok(config) => config,
        Err(e) => {
            report_failure(&e, quiet);
            return 2;
        }
    };
    match cli::execute(cli.command, config) {
        Ok(()) => 0,
        Err(e) => {
            report_failure(&e, quiet);
            1
        }
    }
}

fn report_failure(e: &error::Error, quiet: bool) {
    error!("{e}");
    if quiet {
        eprintln!("error: {e}");
    }
}
