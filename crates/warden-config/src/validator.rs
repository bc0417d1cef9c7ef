//! Configuration validation.

use crate::instances::parse_static_instances;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A validation warning.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_fleet(config, &mut result);
        Self::validate_redis(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if !(1..=65535).contains(&config.server.listen_port) {
            result.add_error(ValidationError::new(
                "server.listen_port",
                format!(
                    "Port must be between 1 and 65535, got {}",
                    config.server.listen_port
                ),
            ));
        }

        let control_api = config.server.control_api();
        match url::Url::parse(&control_api) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(_) => result.add_error(ValidationError::new(
                "server.control_api_url",
                "control API URL must start with http:// or https://",
            )),
            Err(e) => result.add_error(ValidationError::new(
                "server.control_api_url",
                format!("Invalid control API URL '{}': {}", control_api, e),
            )),
        }

        if config.server.token.as_deref().is_none_or(str::is_empty) {
            result.add_warning(ValidationWarning::new(
                "server.token",
                "No control API token set, run reports are sent unauthenticated",
            ));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;

        let interval = scheduler.wait_retry_interval_secs;
        if interval.is_nan() || interval <= 0.0 {
            result.add_error(ValidationError::new(
                "scheduler.wait_retry_interval_secs",
                "wait_retry_interval_secs must be greater than 0",
            ));
        }

        if scheduler.pending_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "scheduler.pending_interval_ms",
                "pending_interval_ms must be greater than 0",
            ));
        }

        if scheduler.max_workers == Some(0) {
            result.add_error(ValidationError::new(
                "scheduler.max_workers",
                "max_workers must be greater than 0",
            ));
        }

        if scheduler.report_queue_capacity == 0 {
            result.add_error(ValidationError::new(
                "scheduler.report_queue_capacity",
                "report_queue_capacity must be greater than 0",
            ));
        }

        if scheduler.plugin_dirs.is_empty() {
            result.add_warning(ValidationWarning::new(
                "scheduler.plugin_dirs",
                "No plugin directories configured, no jobs will be scheduled",
            ));
        }

        for dir in &scheduler.plugin_dirs {
            if !dir.exists() {
                result.add_warning(ValidationWarning::new(
                    "scheduler.plugin_dirs",
                    format!("Plugin directory does not exist: {:?}", dir),
                ));
            }
        }
    }

    fn validate_fleet(config: &Config, result: &mut ValidationResult) {
        let fleet = &config.fleet;

        for (path, value) in [
            ("fleet.healthcheck_interval_secs", fleet.healthcheck_interval_secs),
            ("fleet.ping_timeout_secs", fleet.ping_timeout_secs),
            ("fleet.action_timeout_secs", fleet.action_timeout_secs),
        ] {
            if value == 0 {
                result.add_error(ValidationError::new(path, "must be greater than 0"));
            }
        }

        if fleet.default_api_port == 0 {
            result.add_error(ValidationError::new(
                "fleet.default_api_port",
                "Port cannot be 0",
            ));
        }

        let parsed = parse_static_instances(fleet);
        for warning in parsed.warnings {
            result.add_warning(warning);
        }
    }

    fn validate_redis(config: &Config, result: &mut ValidationResult) {
        let redis = &config.redis;
        if !redis.enabled {
            return;
        }

        if redis.host.is_empty() {
            result.add_error(ValidationError::new("redis.host", "Host cannot be empty"));
        }

        if !(1..=65535).contains(&redis.port) {
            result.add_error(ValidationError::new(
                "redis.port",
                format!("Port must be between 1 and 65535, got {}", redis.port),
            ));
        }

        if redis.database > 15 {
            result.add_error(ValidationError::new(
                "redis.database",
                format!("Database must be between 0 and 15, got {}", redis.database),
            ));
        }

        if redis.topic.is_empty() {
            result.add_error(ValidationError::new("redis.topic", "Topic cannot be empty"));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
