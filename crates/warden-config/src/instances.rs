//! Static instance list parsing.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use warden_protocols::{Instance, InstanceMethod};

use crate::schema::FleetConfig;
use crate::validator::ValidationWarning;

fn instance_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<hostname>[^:@\s]+)(?::(?P<port>\d+))?(?:@(?P<server_name>\S+))?$")
            .expect("static regex is valid")
    })
}

/// Parsed static instances plus one warning per skipped entry.
#[derive(Debug, Default)]
pub struct StaticInstances {
    pub instances: Vec<Instance>,
    pub warnings: Vec<ValidationWarning>,
}

/// Parse `fleet.instances` entries of the form `hostname[:port][@server_name]`.
///
/// Invalid entries and repeated hostnames are skipped with a warning.
pub fn parse_static_instances(fleet: &FleetConfig) -> StaticInstances {
    let mut parsed = StaticInstances::default();
    let mut seen = HashSet::new();

    for raw in &fleet.instances {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        let Some(caps) = instance_pattern().captures(entry) else {
            parsed.warnings.push(ValidationWarning::new(
                "fleet.instances",
                format!("Invalid instance '{}', expected hostname[:port][@server_name]", entry),
            ));
            continue;
        };

        let hostname = caps["hostname"].to_string();
        let port = match caps.name("port") {
            None => fleet.default_api_port,
            Some(port) => match port.as_str().parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    parsed.warnings.push(ValidationWarning::new(
                        "fleet.instances",
                        format!("Invalid port in instance '{}'", entry),
                    ));
                    continue;
                }
            },
        };
        let server_name = caps
            .name("server_name")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| fleet.default_server_name.clone());

        if hostname.chars().count() > 256 || server_name.chars().count() > 256 {
            parsed.warnings.push(ValidationWarning::new(
                "fleet.instances",
                format!("Instance '{}' exceeds 256 characters", entry),
            ));
            continue;
        }

        if !seen.insert(hostname.clone()) {
            parsed.warnings.push(ValidationWarning::new(
                "fleet.instances",
                format!("Duplicate instance hostname '{}', ignoring", hostname),
            ));
            continue;
        }

        parsed
            .instances
            .push(Instance::new(hostname, port, server_name, InstanceMethod::Static));
    }

    parsed
}
