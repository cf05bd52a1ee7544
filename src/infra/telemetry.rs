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
            "readthrough_cache_hit_total",
            Unit::Count,
            "Reads answered from a fresh cache entry."
        );
        describe_counter!(
            "readthrough_cache_miss_total",
            Unit::Count,
            "Reads that fell through to the source fetcher."
        );
        describe_counter!(
            "readthrough_cache_stale_total",
            Unit::Count,
            "Cache entries found past their expiry on read."
        );
        describe_counter!(
            "readthrough_cache_decode_error_total",
            Unit::Count,
            "Stored entries that could not be decoded and were treated as a miss."
        );
        describe_counter!(
            "readthrough_cache_store_error_total",
            Unit::Count,
            "Cache store operations that failed."
        );
        describe_counter!(
            "readthrough_cache_invalidate_total",
            Unit::Count,
            "Cache entries deleted by invalidation."
        );
        describe_histogram!(
            "readthrough_cache_fetch_ms",
            Unit::Milliseconds,
            "Source fetch latency on cache misses in milliseconds."
        );
    });
}
