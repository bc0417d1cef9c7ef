//! # Warden Daemon
//!
//! The [`Coordinator`] context that owns every component of the fleet
//! coordinator, supervises the long-lived loops and shuts them down.

pub mod components;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod signal;
pub mod supervisor;

pub use components::Components;
pub use control::ControlApi;
pub use coordinator::Coordinator;
pub use error::DaemonError;
pub use signal::{DaemonSignal, SignalHandler};
pub use supervisor::{run_repeatedly, TaskSupervisor};
