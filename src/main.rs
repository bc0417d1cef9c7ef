//! warden - fleet coordinator for reverse-proxy nodes.
//!
//! Main entry point for the warden CLI.

mod cli;
mod cmd_jobs;
mod cmd_run;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use warden_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig};

use crate::cli::{Cli, Commands, JobsAction};

/// Initialize tracing with console output, plus a daily file when
/// `logging.dir` is set.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let file_layer = match &logging.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("can't create log directory {}", dir.display()))?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("warden")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keeps the writer flushing until exit.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    ConfigLoader::load(path).with_context(|| format!("can't load {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => check_config(&cli.config),
        command => {
            let config = load_config(&cli.config)?;
            init_tracing(&config.logging)?;
            match command {
                Commands::Jobs { action: JobsAction::List } => cmd_jobs::list(&config),
                Commands::Jobs { action: JobsAction::Run { name } } => {
                    cmd_jobs::run(config, &name).await
                }
                _ => cmd_run::run(config).await,
            }
        }
    }
}

/// Print validation findings; fail on errors.
fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let result = ConfigValidator::validate(&config);

    for warning in &result.warnings {
        println!("warning: {}", warning);
    }
    for error in &result.errors {
        println!("error: {}", error);
    }

    if !result.is_valid() {
        anyhow::bail!("{} has {} errors", path.display(), result.errors.len());
    }
    println!("{} is valid", path.display());
    Ok(())
}
