// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{describe_counter, increment_counter};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {
        $( let _ = &$label_value; )*
    };
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{describe_counter, increment_counter};

/// Initializes the descriptions for all the metrics of the SDK.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "sugar_aggregator_calls_total",
        "Aggregator operations served, by operation."
    );
    describe_counter!(
        "sugar_degraded_resolutions_total",
        "Fields that fell back to their sentinel value, by field."
    );
    describe_counter!(
        "sugar_upstream_failures_total",
        "Calls aborted because a primary source was unavailable, by source."
    );
}

pub fn record_aggregator_call(operation: &'static str) {
    increment_counter!("sugar_aggregator_calls_total", "operation" => operation);
}

pub fn record_degraded(field: &'static str) {
    increment_counter!("sugar_degraded_resolutions_total", "field" => field);
}

pub fn record_upstream_failure(origin: &'static str) {
    increment_counter!("sugar_upstream_failures_total", "source" => origin);
}

/// Installs the Prometheus exporter on `listen` (e.g. `0.0.0.0:9000`).
#[cfg(feature = "observability")]
pub fn install_prometheus(listen: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;
    describe_metrics();
    Ok(())
}
