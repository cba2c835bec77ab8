//! Content validators for conditional responses.

use std::fmt;

use sha2::{Digest, Sha256};

const ETAG_HEX_LEN: usize = 16;

/// Strong entity tag rendered as a quoted, truncated SHA-256 hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETag(String);

impl ETag {
    /// Digest the exact bytes that will be served.
    pub fn compute(body: &[u8]) -> Self {
        let digest = Sha256::digest(body);
        let hex = hex::encode(digest.as_slice());
        Self(format!("\"{}\"", &hex[..ETAG_HEX_LEN]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Evaluate an `If-None-Match` header value against this tag.
    ///
    /// Accepts `*`, a single tag, or a comma-separated list; weak tags
    /// (`W/"..."`) compare by their opaque part.
    pub fn matches_if_none_match(&self, header: Option<&str>) -> bool {
        let Some(header) = header else {
            return false;
        };
        header.split(',').map(str::trim).any(|candidate| {
            candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == self.0
        })
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
