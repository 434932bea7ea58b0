//! Cron-driven scan runs.

use chrono::Utc;
use domain_expiry::ScanOrchestrator;
use eyre::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

pub const DEFAULT_CRON: &str = "0 0 6 * * *";

/// Clears the running flag when a scheduled scan ends, even on panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Register the scan job and start the scheduler.
///
/// A tick that fires while the previous scan is still running is skipped.
pub async fn start(orchestrator: Arc<ScanOrchestrator>, cron_expr: &str) -> Result<JobScheduler> {
    info!(cron = cron_expr, "Starting scheduled expiry scans");

    let sched = JobScheduler::new().await?;
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron_expr, move |_uuid, _l| {
        let orchestrator = orchestrator.clone();
        let running = running.clone();

        Box::pin(async move {
            if running.swap(true, Ordering::SeqCst) {
                warn!("Previous expiry scan still running, skipping this tick");
                return;
            }
            let _guard = RunningGuard(running);

            info!("Running scheduled expiry scan");
            match orchestrator.run_triggered("cron", Utc::now()).await {
                Ok(summary) => {
                    info!(
                        created = summary.created,
                        emails_sent = summary.emails_sent,
                        emails_failed = summary.emails_failed,
                        redelivered = summary.redelivered,
                        "Scheduled expiry scan complete"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Scheduled expiry scan failed");
                }
            }
        })
    })?;

    sched.add(job).await?;
    sched.start().await?;
    info!("Scheduler started, waiting for jobs...");

    Ok(sched)
}

/// Run scheduled scans until SIGINT/SIGTERM.
pub async fn run_until_shutdown(orchestrator: Arc<ScanOrchestrator>, cron_expr: &str) -> Result<()> {
    let mut sched = start(orchestrator, cron_expr).await?;

    axum_helpers::shutdown_signal().await;
    info!("Stopping scheduler");
    sched.shutdown().await?;
    Ok(())
}
