//! Metrics for scan runs and reminder delivery.

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Expiry metrics recorder
pub struct ExpiryMetrics;

impl ExpiryMetrics {
    pub fn record_scan_started(trigger: &str) {
        counter!(
            "expiry_scans_total",
            "trigger" => trigger.to_string(),
            "status" => "started"
        )
        .increment(1);
    }

    /// Record a finished scan run
    pub fn record_scan_completed(
        trigger: &str,
        clients_scanned: usize,
        created: usize,
        duration_secs: f64,
    ) {
        counter!(
            "expiry_scans_total",
            "trigger" => trigger.to_string(),
            "status" => "completed"
        )
        .increment(1);
        histogram!("expiry_scan_duration_seconds", "trigger" => trigger.to_string())
            .record(duration_secs);
        gauge!("expiry_clients_scanned_last_run").set(clients_scanned as f64);

        tracing::info!(
            trigger = trigger,
            clients_scanned = clients_scanned,
            created = created,
            duration_secs = duration_secs,
            "Expiry scan completed"
        );
    }

    pub fn record_scan_failed(trigger: &str, error: &str) {
        counter!(
            "expiry_scans_total",
            "trigger" => trigger.to_string(),
            "status" => "failed"
        )
        .increment(1);

        tracing::error!(trigger = trigger, error = error, "Expiry scan failed");
    }

    pub fn record_notification_created(service_type: &str, threshold_day: i32) {
        counter!(
            "expiry_notifications_created_total",
            "service_type" => service_type.to_string(),
            "threshold" => threshold_day.to_string()
        )
        .increment(1);
    }

    pub fn record_duplicate_suppressed(service_type: &str) {
        counter!(
            "expiry_duplicates_suppressed_total",
            "service_type" => service_type.to_string()
        )
        .increment(1);
    }

    /// Record one transport call; `result` is `ok`, `transient` or `permanent`
    pub fn record_mail_attempt(provider: &str, result: &str) {
        counter!(
            "expiry_mail_attempts_total",
            "provider" => provider.to_string(),
            "result" => result.to_string()
        )
        .increment(1);
    }

    /// Record the final state of a dispatch
    pub fn record_mail_delivery(provider: &str, delivered: bool, attempts: usize) {
        let status = if delivered { "sent" } else { "failed" };
        counter!(
            "expiry_mail_deliveries_total",
            "provider" => provider.to_string(),
            "status" => status
        )
        .increment(1);

        tracing::debug!(
            provider = provider,
            status = status,
            attempts = attempts,
            "Mail dispatch finished"
        );
    }
}

/// Measures a scan run; call [`ScanTimer::finish`] with the run totals.
pub struct ScanTimer {
    trigger: &'static str,
    start: Instant,
}

impl ScanTimer {
    pub fn start(trigger: &'static str) -> Self {
        ExpiryMetrics::record_scan_started(trigger);
        Self {
            trigger,
            start: Instant::now(),
        }
    }

    pub fn finish(self, clients_scanned: usize, created: usize) {
        ExpiryMetrics::record_scan_completed(
            self.trigger,
            clients_scanned,
            created,
            self.start.elapsed().as_secs_f64(),
        );
    }

    pub fn fail(self, error: &str) {
        ExpiryMetrics::record_scan_failed(self.trigger, error);
    }
}
