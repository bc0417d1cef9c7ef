//! The `jobs` subcommands.

use std::sync::Arc;

use tracing::info;

use warden_config::Config;
use warden_daemon::{Components, Coordinator};
use warden_scheduler::JobRegistry;

/// Print every valid job, grouped by plugin.
pub(crate) fn list(config: &Config) -> anyhow::Result<()> {
    let jobs = JobRegistry::new(config.scheduler.plugin_dirs.clone()).load();
    if jobs.values().all(Vec::is_empty) {
        println!("No jobs found.");
        return Ok(());
    }

    println!("{:<20} {:<32} {:<16} {:<8} {}", "PLUGIN", "JOB", "EVERY", "RELOAD", "FILE");
    println!("{}", "-".repeat(90));
    for (plugin_id, plugin_jobs) in &jobs {
        for job in plugin_jobs {
            println!(
                "{:<20} {:<32} {:<16} {:<8} {}",
                plugin_id,
                job.name,
                job.every.to_string(),
                job.reload,
                job.executable().display()
            );
        }
    }
    Ok(())
}

/// Run `name` once and distribute whatever it changed.
pub(crate) async fn run(config: Config, name: &str) -> anyhow::Result<()> {
    let components = Components::from_config(&config).await?;
    let coordinator = Arc::new(Coordinator::new(config, components)?);

    coordinator.seed_settings().await?;
    coordinator.refresh_static_instances().await?;

    info!("Running job {} ...", name);
    let success = coordinator.run_job(name).await;
    coordinator.shutdown().await;

    if !success {
        anyhow::bail!("job {} failed", name);
    }
    println!("Job {} succeeded", name);
    Ok(())
}
