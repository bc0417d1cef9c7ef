//! Run-status reporting to the control API.
//!
//! Reports are queued on a bounded channel and delivered by one
//! background task, so a slow or busy control API never delays a job.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::ReporterConfig;
use crate::error::SchedulerError;

/// Outcome of one job execution.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
    pub job_name: String,
    pub success: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl JobRun {
    /// Request body with dates as fractional Unix seconds.
    pub fn body(&self) -> serde_json::Value {
        json!({
            "success": self.success,
            "start_date": unix_seconds(self.start_date),
            "end_date": unix_seconds(self.end_date),
        })
    }
}

fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted,
    /// Backpressure; retry after the given delay.
    Busy(Duration),
    Failed(String),
}

/// Destination for run reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn submit(&self, run: &JobRun) -> SubmitOutcome;
}

/// Parse a `Retry-After` value in (fractional) seconds, defaulting to 1s.
pub fn parse_retry_after(value: Option<&str>) -> Duration {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(1))
}

/// `POST {endpoint}/jobs/{name}/status?method=core`.
pub struct HttpReportSink {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpReportSink {
    pub fn new(config: &ReporterConfig) -> Result<Self, SchedulerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("warden")
            .build()
            .map_err(|e| SchedulerError::Reporter(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn submit(&self, run: &JobRun) -> SubmitOutcome {
        let url = format!("{}/jobs/{}/status", self.endpoint, run.job_name);
        let mut request = self
            .client
            .post(&url)
            .query(&[("method", "core")])
            .json(&run.body());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return SubmitOutcome::Failed(format!("can't reach {}: {}", url, e)),
        };

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok());
            return SubmitOutcome::Busy(parse_retry_after(retry_after));
        }
        if status.is_success() {
            return SubmitOutcome::Accepted;
        }

        let body = response.text().await.unwrap_or_default();
        SubmitOutcome::Failed(format!("{} answered {}: {}", url, status, body))
    }
}

/// Reports queued or being delivered.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Cloneable handle onto the reporting queue.
#[derive(Clone)]
pub struct RunReporter {
    tx: mpsc::Sender<JobRun>,
    in_flight: Arc<InFlight>,
}

impl RunReporter {
    /// Start the delivery task. It exits once every handle is dropped and
    /// the queue is drained.
    pub fn spawn(
        sink: Arc<dyn ReportSink>,
        capacity: usize,
        max_retries: u32,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<JobRun>(capacity.max(1));
        let in_flight = Arc::new(InFlight::default());
        let tracker = in_flight.clone();
        let handle = tokio::spawn(async move {
            while let Some(run) = rx.recv().await {
                deliver(sink.as_ref(), &run, max_retries).await;
                tracker.done();
            }
            debug!("Run reporter stopped");
        });
        (Self { tx, in_flight }, handle)
    }

    /// Queue a report without waiting.
    pub fn report(&self, run: JobRun) {
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(run) {
            Ok(()) => {}
            Err(TrySendError::Full(run)) => {
                self.in_flight.done();
                warn!(
                    "Run report queue is full, dropping report for job {}",
                    run.job_name
                );
            }
            Err(TrySendError::Closed(run)) => {
                self.in_flight.done();
                debug!("Run reporter stopped, dropping report for job {}", run.job_name);
            }
        }
    }

    /// Number of reports not yet delivered or dropped.
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until every queued report is handled. `false` on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let idle = self.in_flight.idle.notified();
                if self.pending() == 0 {
                    return;
                }
                idle.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

async fn deliver(sink: &dyn ReportSink, run: &JobRun, max_retries: u32) {
    let mut retries = 0;
    loop {
        match sink.submit(run).await {
            SubmitOutcome::Accepted => {
                debug!("Reported run of job {}", run.job_name);
                return;
            }
            SubmitOutcome::Busy(delay) => {
                if retries >= max_retries {
                    error!(
                        "Control API still busy after {} retries, dropping report for job {}",
                        retries, run.job_name
                    );
                    return;
                }
                retries += 1;
                warn!(
                    "Control API busy, retrying report for job {} in {:?}",
                    run.job_name, delay
                );
                tokio::time::sleep(delay).await;
            }
            SubmitOutcome::Failed(message) => {
                error!(
                    "Can't report run of job {}, the run history will not be updated: {}",
                    run.job_name, message
                );
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "reporter_tests.rs"]
mod tests;
