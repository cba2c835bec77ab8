//! The public snapshot document served to clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::entities::{ConfigRecord, FlagRecord};

/// Flag and config values visible in one environment at one instant.
///
/// Maps are ordered so that two builds over the same rows serialize to the
/// same bytes apart from `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicSnapshot {
    pub project: String,
    pub environment: String,
    pub flags: BTreeMap<String, bool>,
    pub configs: BTreeMap<String, Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl PublicSnapshot {
    pub fn assemble(
        project: &str,
        environment: &str,
        flags: Vec<FlagRecord>,
        configs: Vec<ConfigRecord>,
        timestamp: OffsetDateTime,
    ) -> Self {
        let flags = flags
            .into_iter()
            .map(|flag| (flag.key, flag.enabled))
            .collect();
        let configs = configs
            .into_iter()
            .map(|config| {
                let value = parse_config_value(config.value.as_deref());
                (config.key, value)
            })
            .collect();

        Self {
            project: project.to_string(),
            environment: environment.to_string(),
            flags,
            configs,
            timestamp,
        }
    }
}

/// Typed view of a stored config value.
///
/// Text that is not valid JSON is returned as a JSON string holding the raw
/// text; a missing value is `null`.
pub fn parse_config_value(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
    }
}
