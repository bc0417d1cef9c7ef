//! # Warden Fleet
//!
//! Everything that talks to proxy nodes: the HTTP control transport,
//! concurrent fan-out, artifact generation and upload, the health
//! monitor and the dynamic membership listener.

pub mod archive;
pub mod artifacts;
pub mod broadcaster;
pub mod config;
pub mod error;
pub mod generator;
pub mod health;
pub mod http;
pub mod membership;
pub mod pubsub;
pub mod reload;

pub use artifacts::ArtifactBuilder;
pub use broadcaster::{BroadcastReport, Broadcaster};
pub use config::{ArtifactPaths, HttpTransportConfig, MembershipConfig};
pub use error::FleetError;
pub use generator::{ConfigGenerator, ProcessGenerator};
pub use health::{HealthMonitor, SweepReport};
pub use http::HttpTransport;
pub use membership::{Announcement, Bootstrapper, MembershipListener, RejectReason};
pub use pubsub::{ChannelSubscriber, RedisSubscriber};
pub use reload::ReloadCoordinator;
