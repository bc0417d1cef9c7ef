//! Job execution boundary.

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::descriptor::JobDescriptor;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to launch {path}: {message}")]
    Launch { path: String, message: String },
}

/// Runs one job to completion and returns its exit code.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(
        &self,
        job: &JobDescriptor,
        env: &BTreeMap<String, String>,
    ) -> Result<i32, ExecutorError>;
}

/// Interpretation of a job exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// `0`: nothing changed.
    NoChange,
    /// `1`: artifacts changed, distribution required.
    Changed,
    /// `>= 2`, or negative when the job could not be run.
    Failed(i32),
}

impl JobOutcome {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => JobOutcome::NoChange,
            1 => JobOutcome::Changed,
            other => JobOutcome::Failed(other),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, JobOutcome::Failed(_))
    }
}

/// Spawns `<plugin>/jobs/<file>` as a child process.
#[derive(Debug, Default, Clone)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobExecutor for ProcessExecutor {
    async fn execute(
        &self,
        job: &JobDescriptor,
        env: &BTreeMap<String, String>,
    ) -> Result<i32, ExecutorError> {
        let program = job.executable();
        debug!("Spawning {:?}", program);

        let mut cmd = Command::new(&program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .env_clear()
            .envs(env);

        if !env.contains_key("PATH") {
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
        }

        let status = cmd.status().await.map_err(|e| ExecutorError::Launch {
            path: program.display().to_string(),
            message: e.to_string(),
        })?;

        // Killed by a signal: no exit code.
        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
