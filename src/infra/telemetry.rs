use std::sync::Once;

use metrics::{Unit, describe_counter};
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
            "farmgate_settings_cache_hit_total",
            Unit::Count,
            "Settings reads served from a fresh cached value."
        );
        describe_counter!(
            "farmgate_settings_cache_miss_total",
            Unit::Count,
            "Settings reads that found the cache cold, stale, or inside the forced-refresh window."
        );
        describe_counter!(
            "farmgate_settings_cache_refresh_total",
            Unit::Count,
            "Backend fetches started by the settings cache."
        );
        describe_counter!(
            "farmgate_settings_cache_refresh_failed_total",
            Unit::Count,
            "Settings cache refreshes that failed and fell back."
        );
        describe_counter!(
            "farmgate_settings_cache_invalidate_total",
            Unit::Count,
            "Explicit settings cache invalidations."
        );
        describe_counter!(
            "farmgate_rate_limit_rejected_total",
            Unit::Count,
            "Requests rejected by a fixed-window rate limiter."
        );
    });
}
