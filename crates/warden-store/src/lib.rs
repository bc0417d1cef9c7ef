//! # Warden Store
//!
//! Implementations of [`FleetStore`](warden_protocols::FleetStore) and
//! [`SettingsStore`](warden_protocols::SettingsStore).
//!
//! - [`MemoryStore`] keeps everything in process memory.
//! - [`SqliteStore`] persists to a SQLite file via `tokio-rusqlite`.

mod memory;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
