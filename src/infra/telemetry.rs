use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::feed::{METRIC_INDEX_CACHE_HIT, METRIC_INDEX_CACHE_MISS};
use crate::config::{LogFormat, LoggingSettings};
use crate::infra::http::{METRIC_HTTP_CLIENT_ERRORS, METRIC_HTTP_SERVER_ERRORS};

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
            METRIC_INDEX_CACHE_HIT,
            Unit::Count,
            "Home feed requests served from the cached snapshot."
        );
        describe_counter!(
            METRIC_INDEX_CACHE_MISS,
            Unit::Count,
            "Home feed requests that reloaded the snapshot from the store."
        );
        describe_counter!(
            METRIC_HTTP_CLIENT_ERRORS,
            Unit::Count,
            "Responses with a 4xx status."
        );
        describe_counter!(
            METRIC_HTTP_SERVER_ERRORS,
            Unit::Count,
            "Responses with a 5xx status."
        );
    });
}
