//! Prometheus metrics recording.
//!
//! HTTP metrics are labelled by method, path and status; store metrics by
//! operation, database and collection.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::store::Namespace;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const STORE_OPERATION_DURATION: &str = "store_operation_duration_seconds";
pub const STORE_OPERATION_ERRORS: &str = "store_operation_errors_total";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder once per process.
///
/// If another recorder is already installed, a detached handle is returned
/// so rendering still works.
pub fn install_recorder() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(_) => PrometheusBuilder::new().build_recorder().handle(),
        })
        .clone()
}

/// Records `http_requests_total` and `http_request_duration_seconds`
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(HTTP_REQUEST_DURATION, &labels).record(duration.as_secs_f64());
}

fn store_labels(operation: &str, ns: &Namespace) -> [(&'static str, String); 3] {
    [
        ("operation", operation.to_string()),
        ("database", ns.database.clone()),
        ("collection", ns.collection.clone()),
    ]
}

/// Records `store_operation_duration_seconds`
pub fn record_store_operation(operation: &str, ns: &Namespace, duration: Duration) {
    histogram!(STORE_OPERATION_DURATION, &store_labels(operation, ns)).record(duration.as_secs_f64());
}

/// Records `store_operation_errors_total`
pub fn record_store_error(operation: &str, ns: &Namespace) {
    counter!(STORE_OPERATION_ERRORS, &store_labels(operation, ns)).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_render() {
        let handle = install_recorder();
        let ns = Namespace::new("metrics_db", "metrics_coll");
        record_request("POST", "/api/find", 200, Duration::from_millis(3));
        record_store_operation("find", &ns, Duration::from_millis(2));
        record_store_error("find", &ns);

        let rendered = handle.render();
        assert!(rendered.contains(STORE_OPERATION_ERRORS));
        assert!(rendered.contains("collection=\"metrics_coll\""));
    }
}
