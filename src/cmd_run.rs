//! The `run` subcommand.

use std::sync::Arc;

use tracing::info;

use warden_config::Config;
use warden_daemon::{Components, Coordinator, SignalHandler};

/// Run the coordinator until SIGTERM or SIGINT.
pub(crate) async fn run(config: Config) -> anyhow::Result<()> {
    info!("Starting warden v{}", env!("CARGO_PKG_VERSION"));

    let components = Components::from_config(&config).await?;
    let coordinator = Arc::new(Coordinator::new(config, components)?);

    let signals = SignalHandler::new();
    signals.setup_os_signals()?;

    coordinator.serve(&signals).await?;
    info!("warden stopped");
    Ok(())
}
