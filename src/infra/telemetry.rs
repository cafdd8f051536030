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
            "pagepress_publish_total",
            Unit::Count,
            "Total number of publish attempts that entered the publishing state."
        );
        describe_counter!(
            "pagepress_publish_failed_total",
            Unit::Count,
            "Total number of publish attempts that ended in the failed state."
        );
        describe_histogram!(
            "pagepress_artifact_upload_ms",
            Unit::Milliseconds,
            "Artifact upload latency in milliseconds, labelled by outcome."
        );
        describe_counter!(
            "pagepress_artifact_upload_timeout_total",
            Unit::Count,
            "Total number of artifact uploads abandoned at the deadline."
        );
        describe_counter!(
            "pagepress_route_update_failed_total",
            Unit::Count,
            "Total number of route table updates that failed after a publish."
        );
        describe_counter!(
            "pagepress_sweep_superseded_total",
            Unit::Count,
            "Total number of version artifacts pruned by retention sweeps."
        );
        describe_counter!(
            "pagepress_sweep_failed_total",
            Unit::Count,
            "Total number of per-version retention failures."
        );
        describe_counter!(
            "pagepress_compensation_delete_total",
            Unit::Count,
            "Total number of artifacts deleted to compensate a failed publish."
        );
    });
}
