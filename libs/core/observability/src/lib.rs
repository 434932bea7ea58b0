//! Prometheus metrics for the expiry monitoring service.
//!
//! - recorder installation and the `/metrics` handler
//! - [`ExpiryMetrics`] for scan runs and mail delivery
//! - [`http_metrics`] middleware for request counters
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, ExpiryMetrics};
//!
//! init_metrics()?;
//! ExpiryMetrics::record_notification_created("domain", 7);
//!
//! let app = Router::new().route("/metrics", get(metrics_handler));
//! ```

pub mod expiry;
pub mod middleware;

pub use expiry::{ExpiryMetrics, ScanTimer};
pub use middleware::http_metrics;

pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Safe to call more than once; later calls
/// return the handle installed by the first.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();
        Ok(handle)
    })
}

/// Get the metrics handle (None until [`init_metrics`] succeeded)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for /metrics endpoint
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    describe_counter!("expiry_scans_total", "Expiry scan runs by outcome");
    describe_histogram!(
        "expiry_scan_duration_seconds",
        "Expiry scan duration in seconds"
    );
    describe_gauge!(
        "expiry_clients_scanned_last_run",
        "Clients examined by the last scan"
    );
    describe_counter!(
        "expiry_notifications_created_total",
        "Notifications persisted by service type and threshold"
    );
    describe_counter!(
        "expiry_duplicates_suppressed_total",
        "Expiry events dropped because a notification already existed"
    );
    describe_counter!(
        "expiry_mail_deliveries_total",
        "Reminder emails by provider and final status"
    );
    describe_counter!(
        "expiry_mail_attempts_total",
        "Individual send attempts by provider and result"
    );
}
