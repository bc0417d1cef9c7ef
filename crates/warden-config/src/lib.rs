//! # Warden Config
//!
//! Configuration management for the warden coordinator: TOML schema,
//! loading with environment substitution, validation and static
//! instance parsing.

mod error;
mod instances;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use instances::{parse_static_instances, StaticInstances};
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
