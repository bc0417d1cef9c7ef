//! OS signals turned into coordinator requests.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::DaemonError;

const SIGNAL_QUEUE: usize = 16;

/// What the coordinator is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Stop every loop and exit (SIGTERM, SIGINT).
    Shutdown,
    /// Rebuild the scheduler from the current settings (SIGHUP).
    Reload,
}

impl DaemonSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonSignal::Shutdown => "shutdown",
            DaemonSignal::Reload => "reload",
        }
    }
}

impl std::fmt::Display for DaemonSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fans requests out to every subscriber. Requests sent while nobody
/// listens are lost.
#[derive(Clone)]
pub struct SignalHandler {
    sender: broadcast::Sender<DaemonSignal>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(SIGNAL_QUEUE).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonSignal> {
        self.sender.subscribe()
    }

    /// Deliver `signal` as if the OS had raised it.
    pub fn send(&self, signal: DaemonSignal) {
        let receivers = self.sender.send(signal).unwrap_or(0);
        debug!(receivers, "Dispatched {} request", signal);
    }

    /// Forward SIGTERM and SIGINT as [`DaemonSignal::Shutdown`], SIGHUP as
    /// [`DaemonSignal::Reload`]. Must run inside a tokio runtime.
    #[cfg(unix)]
    pub fn setup_os_signals(&self) -> Result<(), DaemonError> {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name, request) in [
            (SignalKind::terminate(), "SIGTERM", DaemonSignal::Shutdown),
            (SignalKind::interrupt(), "SIGINT", DaemonSignal::Shutdown),
            (SignalKind::hangup(), "SIGHUP", DaemonSignal::Reload),
        ] {
            let mut stream = signal(kind)
                .map_err(|e| DaemonError::SignalSetup(format!("{}: {}", name, e)))?;
            let handler = self.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!("Caught {}, requesting {}", name, request);
                    handler.send(request);
                }
            });
        }
        Ok(())
    }

    /// Ctrl+C is the only stop request off Unix.
    #[cfg(not(unix))]
    pub fn setup_os_signals(&self) -> Result<(), DaemonError> {
        let handler = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Caught Ctrl+C, requesting shutdown");
                handler.send(DaemonSignal::Shutdown);
            }
        });
        Ok(())
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_sees_reload() {
        let handler = SignalHandler::new();
        let mut coordinator = handler.subscribe();
        let mut other = handler.subscribe();

        handler.send(DaemonSignal::Reload);

        assert_eq!(coordinator.recv().await.unwrap(), DaemonSignal::Reload);
        assert_eq!(other.recv().await.unwrap(), DaemonSignal::Reload);
    }

    #[test]
    fn test_request_before_subscribe_is_lost() {
        let handler = SignalHandler::new();
        handler.send(DaemonSignal::Shutdown);
        assert!(handler.subscribe().try_recv().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_os_handlers_install() {
        SignalHandler::new().setup_os_signals().unwrap();
    }
}
