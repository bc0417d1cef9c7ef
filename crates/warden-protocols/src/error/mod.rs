//! Error types shared across the warden crates.

mod pubsub;
mod store;
mod transport;

pub use pubsub::*;
pub use store::*;
pub use transport::*;
