//! Relay client metrics.

use keyway_core::ErrorKind;
use metrics::{Counter, Histogram};
use metrics_derive::Metrics;
use tokio::time::Duration;

/// Records the latency of one relay request, tagged by JSON-RPC method.
pub fn record_rpc_latency(method: &str, latency: Duration) {
    metrics::histogram!("keyway_bundler_rpc_latency", "method" => method.to_string())
        .record(latency.as_secs_f64());
}

/// Counts a classified relay failure, tagged by kind.
pub fn record_error(kind: ErrorKind) {
    metrics::counter!("keyway_bundler_errors", "kind" => kind.as_str()).increment(1);
}

/// Metrics for the `keyway_bundler` component.
/// Conventions:
/// - Durations are recorded in seconds (histograms).
/// - Counters are monotonic event counts.
#[derive(Metrics, Clone)]
#[metrics(scope = "keyway_bundler")]
pub struct Metrics {
    #[metric(describe = "Duration of submit_and_wait, retries included")]
    pub submit_and_wait_duration: Histogram,

    #[metric(describe = "Receipt lookups issued per poll loop")]
    pub receipt_polls: Histogram,

    #[metric(describe = "Number of submit and poll attempts that were retried")]
    pub retries: Counter,
}
