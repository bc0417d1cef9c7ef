//! # Warden Protocols
//!
//! Shared domain types and trait seams for the warden fleet coordinator.
//! Contains only interface definitions and plain data - no I/O.
//!
//! ## Core Traits
//!
//! - [`FleetStore`] - Durable list of known proxy nodes
//! - [`SettingsStore`] - Persisted settings, custom configs and plugin bundles
//! - [`NodeTransport`] - Per-node control API (ping, actions, uploads)
//! - [`Subscriber`] - Transport-agnostic pub/sub subscription

pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod pubsub;
pub mod store;
pub mod transport;

pub use error::{PubSubError, StoreError, TransportError};
pub use instance::{Instance, InstanceMethod, NodeEndpoint, UpsertOutcome};
pub use lifecycle::{Flag, Readiness};
pub use pubsub::{MessageStream, Subscriber};
pub use store::{CustomConfig, FleetStore, PluginBundle, SettingsStore};
pub use transport::{DistributionKind, NodeTransport, Targets};
