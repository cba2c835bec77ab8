use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "figflag_public_cache_hit_total",
            Unit::Count,
            "Public snapshot requests answered from the freshness cache."
        );
        describe_counter!(
            "figflag_public_cache_miss_total",
            Unit::Count,
            "Public snapshot requests that rebuilt the snapshot from the record store."
        );
        describe_counter!(
            "figflag_public_not_modified_total",
            Unit::Count,
            "Public snapshot requests answered with 304 Not Modified."
        );
        describe_counter!(
            "figflag_cache_error_total",
            Unit::Count,
            "Freshness cache operations that failed and were degraded to a miss or skipped."
        );
        describe_counter!(
            "figflag_cache_invalidate_total",
            Unit::Count,
            "Snapshot cache entries invalidated after an administrative write."
        );
        describe_histogram!(
            "figflag_snapshot_build_ms",
            Unit::Milliseconds,
            "Time spent assembling a snapshot from the record store."
        );
    });
}
