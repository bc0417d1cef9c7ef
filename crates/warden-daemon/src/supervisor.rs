//! Long-lived loop supervision.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Call `tick` every `interval` until `stopping` is cancelled.
///
/// With `wait_first` the first call happens one interval after start.
/// The stop flag is checked before every call.
pub async fn run_repeatedly<F, Fut>(
    name: &str,
    interval: Duration,
    wait_first: bool,
    stopping: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    debug!("Loop {} started (interval: {:?})", name, interval);
    if wait_first && !sleep_or_stop(interval, &stopping).await {
        debug!("Loop {} stopped", name);
        return;
    }

    loop {
        if stopping.is_cancelled() {
            break;
        }
        tick().await;
        if !sleep_or_stop(interval, &stopping).await {
            break;
        }
    }
    debug!("Loop {} stopped", name);
}

/// Returns `false` if stopping was requested during the sleep.
async fn sleep_or_stop(duration: Duration, stopping: &CancellationToken) -> bool {
    tokio::select! {
        _ = stopping.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Named handles of every spawned long-lived task.
#[derive(Default)]
pub struct TaskSupervisor {
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<Fut>(&mut self, name: impl Into<String>, future: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!("Spawning task {}", name);
        self.tasks.push((name, tokio::spawn(future)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Join every task, waiting at most `timeout` for each. Returns the
    /// names of tasks that did not stop in time; those are aborted.
    pub async fn join_all(&mut self, timeout: Duration) -> Vec<String> {
        let mut stuck = Vec::new();
        for (name, mut handle) in self.tasks.drain(..) {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => debug!("Task {} stopped", name),
                Ok(Err(e)) => warn!("Task {} ended abnormally: {}", name, e),
                Err(_) => {
                    warn!("Task {} did not stop within {:?}, aborting it", name, timeout);
                    handle.abort();
                    stuck.push(name);
                }
            }
        }
        if stuck.is_empty() {
            info!("All tasks stopped");
        }
        stuck
    }
}
