//! Job descriptors and their cadence.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, Utc};
use cron::Schedule;
use regex::Regex;
use serde_json::Value;

use crate::error::SchedulerError;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w.-]{1,128}$").expect("static regex is valid"))
}

fn file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w./-]{1,256}$").expect("static regex is valid"))
}

/// How often a job runs.
#[derive(Debug, Clone)]
pub enum Every {
    /// Only as part of `run_once`.
    Once,
    Minute,
    Hour,
    Day,
    Week,
    Cron {
        expression: String,
        schedule: Box<Schedule>,
    },
}

impl Every {
    /// Parse a keyword or a cron expression.
    ///
    /// Five-field expressions get a `0` seconds column prepended.
    pub fn parse(value: &str) -> Result<Self, SchedulerError> {
        match value {
            "once" => return Ok(Every::Once),
            "minute" => return Ok(Every::Minute),
            "hour" => return Ok(Every::Hour),
            "day" => return Ok(Every::Day),
            "week" => return Ok(Every::Week),
            _ => {}
        }

        let fields = value.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {}", value.trim()),
            6 | 7 => value.trim().to_string(),
            _ => {
                return Err(SchedulerError::InvalidCron {
                    expression: value.to_string(),
                    message: format!("expected 5 fields, got {}", fields),
                });
            }
        };

        let schedule =
            Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
                expression: value.to_string(),
                message: e.to_string(),
            })?;

        Ok(Every::Cron {
            expression: value.to_string(),
            schedule: Box::new(schedule),
        })
    }

    pub fn is_once(&self) -> bool {
        matches!(self, Every::Once)
    }

    /// First fire time strictly after `now`. `None` for `Once` and for cron
    /// expressions with no future occurrence.
    ///
    /// Cron fields are matched against the host's local time.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Every::Once => None,
            Every::Minute => Some(now + Duration::minutes(1)),
            Every::Hour => Some(now + Duration::hours(1)),
            Every::Day => Some(now + Duration::days(1)),
            Every::Week => Some(now + Duration::weeks(1)),
            Every::Cron { schedule, .. } => schedule
                .after(&now.with_timezone(&Local))
                .next()
                .map(|next| next.with_timezone(&Utc)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Every::Once => "once",
            Every::Minute => "minute",
            Every::Hour => "hour",
            Every::Day => "day",
            Every::Week => "week",
            Every::Cron { expression, .. } => expression,
        }
    }
}

impl PartialEq for Every {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Every {}

impl std::fmt::Display for Every {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated job declared by a plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub plugin_id: String,
    pub name: String,
    /// Relative to `<path>/jobs/`.
    pub file: String,
    pub every: Every,
    /// A change reported by this job requires regenerating the proxy config.
    pub reload: bool,
    /// Plugin directory.
    pub path: PathBuf,
}

impl JobDescriptor {
    /// Validate one entry of a manifest `jobs` array.
    pub fn from_manifest_entry(
        plugin_id: &str,
        plugin_dir: &Path,
        entry: &Value,
    ) -> Result<Self, SchedulerError> {
        let object = entry.as_object().ok_or_else(|| {
            SchedulerError::InvalidDescriptor("job entry must be an object".to_string())
        })?;

        let label = object
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>");

        let missing: Vec<&str> = ["name", "file", "every", "reload"]
            .into_iter()
            .filter(|key| !object.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(SchedulerError::InvalidDescriptor(format!(
                "job {} is missing keys {}, must have name, file, every and reload",
                label,
                missing.join(", ")
            )));
        }

        let name = object["name"]
            .as_str()
            .filter(|name| name_pattern().is_match(name))
            .ok_or_else(|| {
                SchedulerError::InvalidDescriptor(format!(
                    "invalid name for job {} (letters, digits, '_', '.', '-', 1 to 128 characters)",
                    label
                ))
            })?;

        let file = object["file"]
            .as_str()
            .filter(|file| file_pattern().is_match(file))
            .ok_or_else(|| {
                SchedulerError::InvalidDescriptor(format!(
                    "invalid file for job {} (letters, digits, '_', '.', '-', '/', 1 to 256 characters)",
                    name
                ))
            })?;

        let every = object["every"].as_str().ok_or_else(|| {
            SchedulerError::InvalidDescriptor(format!("every for job {} must be a string", name))
        })?;
        let every = Every::parse(every).map_err(|e| {
            SchedulerError::InvalidDescriptor(format!(
                "invalid every for job {} (once, minute, hour, day, week or a cron expression): {}",
                name, e
            ))
        })?;

        let reload = object["reload"].as_bool().ok_or_else(|| {
            SchedulerError::InvalidDescriptor(format!(
                "invalid reload for job {} (must be true or false)",
                name
            ))
        })?;

        Ok(Self {
            plugin_id: plugin_id.to_string(),
            name: name.to_string(),
            file: file.to_string(),
            every,
            reload,
            path: plugin_dir.to_path_buf(),
        })
    }

    /// Path of the file executed for this job.
    pub fn executable(&self) -> PathBuf {
        self.path.join("jobs").join(&self.file)
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
