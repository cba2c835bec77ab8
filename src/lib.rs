//! Feature-flag and config distribution service.
//!
//! Serves one JSON snapshot per project environment, cached with a TTL,
//! validated by a content ETag and invalidated after every admin write.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
