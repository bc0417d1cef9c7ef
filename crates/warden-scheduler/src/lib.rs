//! # Warden Scheduler
//!
//! Discovers plugin jobs, schedules them on fixed cadences or cron
//! expressions, and runs them as child processes with bounded
//! concurrency.
//!
//! ## Components
//!
//! - [`JobRegistry`] - Reads and validates plugin manifests
//! - [`Task`] - One scheduled job with its next fire time
//! - [`Scheduler`] - Schedule engine and run coordinator
//! - [`JobExecutor`] - Process boundary for running a job file
//! - [`RunReporter`] - Buffered run-status reporting

pub mod clock;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ReporterConfig, SchedulerConfig};
pub use descriptor::{Every, JobDescriptor};
pub use error::SchedulerError;
pub use executor::{ExecutorError, JobExecutor, JobOutcome, ProcessExecutor};
pub use registry::{JobMap, JobRegistry};
pub use reporter::{HttpReportSink, JobRun, ReportSink, RunReporter, SubmitOutcome};
pub use scheduler::Scheduler;
pub use task::Task;
