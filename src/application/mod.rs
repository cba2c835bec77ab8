//! Application services layer.

pub mod admin;
pub mod error;
pub mod public;
pub mod repos;
pub mod snapshot;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
