//! Process-lifetime readiness signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A binary signal with async waiting.
#[derive(Debug, Default)]
pub struct Flag {
    state: AtomicBool,
    notify: Notify,
}

impl Flag {
    pub fn new(initial: bool) -> Self {
        Self {
            state: AtomicBool::new(initial),
            notify: Notify::new(),
        }
    }

    pub fn set(&self) {
        self.state.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.state.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    /// Wait until the flag is set.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent `set` is not missed.
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Wait until the flag is set, giving up after `timeout`.
    ///
    /// Returns whether the flag was observed set.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Wait for the flag and clear it in one atomic step.
    ///
    /// Of several concurrent callers only one observes each `set`.
    /// Returns `false` when `timeout` elapses first.
    pub async fn take_timeout(&self, timeout: Duration) -> bool {
        let take = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self
                    .state
                    .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, take).await.is_ok()
    }
}

/// The readiness signals shared by every long-lived component.
#[derive(Debug)]
pub struct Readiness {
    /// Process-wide stop request.
    pub stopping: CancellationToken,
    /// Set once the first scheduler reload has completed.
    pub scheduler_initialized: Flag,
    /// Set once the control API answered a ping. Later waits are skipped.
    pub api_reachable: Flag,
    /// Cleared while the scheduler is being rebuilt.
    pub not_reloading: Flag,
    /// Set while the membership listener holds a subscription.
    pub listening_for_dynamic_instances: Flag,
}

impl Readiness {
    pub fn new() -> Self {
        Self {
            stopping: CancellationToken::new(),
            scheduler_initialized: Flag::new(false),
            api_reachable: Flag::new(false),
            not_reloading: Flag::new(true),
            listening_for_dynamic_instances: Flag::new(false),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.is_cancelled()
    }

    pub fn request_stop(&self) {
        self.stopping.cancel();
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
