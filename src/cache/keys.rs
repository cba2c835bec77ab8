//! Cache key derivation.
//!
//! Slugs are reduced to `[A-Za-z0-9_-]` before being joined with `:`, so a
//! component can never contain the separator and no slug pair can forge
//! another pair's key.

use std::fmt;

const KEY_PREFIX: &str = "public";
const KEY_SEPARATOR: char = ':';
const SUBSTITUTE: char = '_';

/// Canonical cache key for one environment's public snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey(String);

impl SnapshotKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                SUBSTITUTE
            }
        })
        .collect()
}

pub fn derive_key(project_slug: &str, environment_slug: &str) -> SnapshotKey {
    let project = sanitize_component(project_slug);
    let environment = sanitize_component(environment_slug);
    SnapshotKey(format!(
        "{KEY_PREFIX}{KEY_SEPARATOR}{project}{KEY_SEPARATOR}{environment}"
    ))
}
