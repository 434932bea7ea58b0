//! One scan run: load clients, evaluate thresholds, admit, persist, dispatch.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use observability::{ExpiryMetrics, ScanTimer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ExpiryConfig;
use crate::dedup::{Admission, DedupGate};
use crate::dispatcher::{MailDispatcher, ReminderRequest};
use crate::error::{ExpiryError, ExpiryResult};
use crate::models::{
    Client, DeliveryOutcome, DeliveryRecord, ExpiringService, Notification, ScanPhase,
    ScanSummary, ServiceType, parse_expiry_date,
};
use crate::repository::{ClientRegistry, NotificationStore};
use crate::scanner;

/// Per-client totals folded into the run summary.
#[derive(Debug, Default)]
struct ClientReport {
    created: Vec<Uuid>,
    emails_sent: usize,
    emails_failed: usize,
    duplicates: usize,
    skipped: bool,
}

/// What happened to one notification's email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Sent,
    Failed,
    /// Another run holds the claim or already finished it
    NotClaimed,
}

#[derive(Debug, Default)]
struct RunTotals {
    summary: ScanSummary,
    created_ids: HashSet<Uuid>,
}

impl RunTotals {
    fn absorb(mut self, report: ClientReport) -> Self {
        self.summary.clients_scanned += 1;
        self.summary.created += report.created.len();
        self.summary.emails_sent += report.emails_sent;
        self.summary.emails_failed += report.emails_failed;
        self.summary.duplicates_suppressed += report.duplicates;
        if report.skipped {
            self.summary.clients_skipped += 1;
        }
        self.created_ids.extend(report.created);
        self
    }
}

pub struct ScanOrchestrator {
    registry: Arc<dyn ClientRegistry>,
    store: Arc<dyn NotificationStore>,
    gate: DedupGate,
    dispatcher: MailDispatcher,
    config: ExpiryConfig,
}

impl ScanOrchestrator {
    pub fn new(
        registry: Arc<dyn ClientRegistry>,
        store: Arc<dyn NotificationStore>,
        dispatcher: MailDispatcher,
        config: ExpiryConfig,
    ) -> Self {
        Self {
            gate: DedupGate::new(store.clone()),
            registry,
            store,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &ExpiryConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &MailDispatcher {
        &self.dispatcher
    }

    pub async fn run_scan(&self) -> ExpiryResult<ScanSummary> {
        self.run_triggered("manual", Utc::now()).await
    }

    pub async fn run_scan_at(&self, now: DateTime<Utc>) -> ExpiryResult<ScanSummary> {
        self.run_triggered("manual", now).await
    }

    /// Run a scan and label its metrics with `trigger` (`cron`, `http`, `manual`).
    ///
    /// Only registry or store outages abort the run. Malformed client data and
    /// mail failures are counted in the summary.
    #[instrument(skip(self))]
    pub async fn run_triggered(
        &self,
        trigger: &'static str,
        now: DateTime<Utc>,
    ) -> ExpiryResult<ScanSummary> {
        let timer = ScanTimer::start(trigger);
        match self.execute(now).await {
            Ok(summary) => {
                timer.finish(summary.clients_scanned, summary.created);
                Ok(summary)
            }
            Err(e) => {
                timer.fail(&e.to_string());
                Err(e)
            }
        }
    }

    async fn execute(&self, now: DateTime<Utc>) -> ExpiryResult<ScanSummary> {
        let started_at = Utc::now();
        debug!(phase = %ScanPhase::LoadingClients, "Scan phase");
        let clients = self.registry.list_clients().await?;

        let concurrency = self.config.scan_concurrency.max(1);
        let totals = stream::iter(clients.iter())
            .map(|client| self.process_client(client, now))
            .buffer_unordered(concurrency)
            .boxed()
            .try_fold(RunTotals::default(), |totals, report| async move {
                Ok(totals.absorb(report))
            })
            .await?;

        debug!(phase = %ScanPhase::Redelivering, "Scan phase");
        let mut summary = totals.summary;
        self.redeliver(&clients, &totals.created_ids, started_at, &mut summary)
            .await?;

        debug!(phase = %ScanPhase::Done, "Scan phase");
        info!(
            created = summary.created,
            emails_sent = summary.emails_sent,
            emails_failed = summary.emails_failed,
            clients_scanned = summary.clients_scanned,
            clients_skipped = summary.clients_skipped,
            duplicates = summary.duplicates_suppressed,
            redelivered = summary.redelivered,
            redelivery_failed = summary.redelivery_failed,
            "Expiry scan finished"
        );
        Ok(summary)
    }

    async fn process_client(
        &self,
        client: &Client,
        now: DateTime<Utc>,
    ) -> ExpiryResult<ClientReport> {
        let mut report = ClientReport::default();

        debug!(phase = %ScanPhase::Scanning, client_id = %client.id, "Scan phase");
        for candidate in scanner::scan(client, now, &self.config.thresholds) {
            let event = match candidate {
                Ok(event) => event,
                Err(e) => {
                    warn!(client_id = %client.id, error = %e, "Skipping service with bad expiry data");
                    report.skipped = true;
                    continue;
                }
            };

            debug!(phase = %ScanPhase::Deduping, client_id = %client.id, service = %event.service_type, threshold = event.threshold_day, "Scan phase");
            let admission = match self.gate.persist(&event, &client.name).await {
                Ok(admission) => admission,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(client_id = %client.id, error = %e, "Failed to admit expiry event");
                    report.skipped = true;
                    continue;
                }
            };

            let notification = match admission {
                Admission::Duplicate => {
                    ExpiryMetrics::record_duplicate_suppressed(event.service_type.as_ref());
                    report.duplicates += 1;
                    continue;
                }
                Admission::Created(notification) => notification,
            };

            debug!(phase = %ScanPhase::Persisting, notification_id = %notification.id, "Scan phase");
            ExpiryMetrics::record_notification_created(
                notification.service_type.as_ref(),
                notification.threshold_day,
            );
            report.created.push(notification.id);

            debug!(phase = %ScanPhase::Dispatching, notification_id = %notification.id, "Scan phase");
            match self.deliver(&notification, client).await? {
                Delivery::Sent => report.emails_sent += 1,
                Delivery::Failed => report.emails_failed += 1,
                Delivery::NotClaimed => {}
            }
        }

        Ok(report)
    }

    /// Claim one notification, send its email and record the outcome.
    ///
    /// Only store outages are returned as errors.
    async fn deliver(
        &self,
        notification: &Notification,
        client: &Client,
    ) -> ExpiryResult<Delivery> {
        let now = Utc::now();
        let stale_before = now
            .checked_sub_signed(self.config.delivery_claim_timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        match self
            .store
            .claim_delivery(notification.id, now, stale_before)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(notification_id = %notification.id, "Delivery claimed elsewhere, skipping");
                return Ok(Delivery::NotClaimed);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(notification_id = %notification.id, error = %e, "Failed to claim delivery");
                return Ok(Delivery::NotClaimed);
            }
        }

        let outcome = self.dispatcher.send(notification, client).await;
        let record = DeliveryRecord::from_outcome(&outcome, Utc::now());
        if let Err(e) = self.store.record_delivery(notification.id, record).await {
            warn!(
                notification_id = %notification.id,
                error = %e,
                "Failed to record delivery outcome"
            );
        }
        Ok(if outcome.is_delivered() {
            Delivery::Sent
        } else {
            Delivery::Failed
        })
    }

    /// Re-send notifications from earlier runs that never got a successful delivery.
    ///
    /// Records created after `started_at` belong to this run or to one running
    /// alongside it and are left to their owner.
    async fn redeliver(
        &self,
        clients: &[Client],
        created_this_run: &HashSet<Uuid>,
        started_at: DateTime<Utc>,
        summary: &mut ScanSummary,
    ) -> ExpiryResult<()> {
        let pending: Vec<Notification> = self
            .store
            .list_undelivered(self.config.max_delivery_attempts)
            .await?
            .into_iter()
            .filter(|n| !created_this_run.contains(&n.id) && n.created_at <= started_at)
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        let by_id: HashMap<&str, &Client> = clients.iter().map(|c| (c.id.as_str(), c)).collect();
        for notification in pending {
            let client = match by_id.get(notification.client_id.as_str()) {
                Some(client) => (*client).clone(),
                None => match self.registry.get_client_by_id(&notification.client_id).await? {
                    Some(client) => client,
                    None => {
                        warn!(
                            notification_id = %notification.id,
                            client_id = %notification.client_id,
                            "Client gone, cannot redeliver"
                        );
                        continue;
                    }
                },
            };

            match self.deliver(&notification, &client).await? {
                Delivery::Sent => summary.redelivered += 1,
                Delivery::Failed => summary.redelivery_failed += 1,
                Delivery::NotClaimed => {}
            }
        }

        Ok(())
    }

    /// Render and send a reminder for one client without touching the store.
    #[instrument(skip(self))]
    pub async fn send_ad_hoc(
        &self,
        client_id: &str,
        service_type: ServiceType,
        days_until_expiry: i32,
    ) -> ExpiryResult<DeliveryOutcome> {
        if days_until_expiry < 0 {
            return Err(ExpiryError::Validation(
                "daysUntilExpiry must not be negative".to_string(),
            ));
        }

        let client = self
            .registry
            .get_client_by_id(client_id)
            .await?
            .ok_or_else(|| ExpiryError::ClientNotFound(client_id.to_string()))?;

        let expiry_date = match client.expiry_raw(service_type) {
            Some(raw) => parse_expiry_date(raw).ok_or_else(|| ExpiryError::InvalidExpiryDate {
                client_id: client.id.clone(),
                service: service_type,
                value: raw.to_string(),
            })?,
            None => Utc::now()
                .date_naive()
                .checked_add_days(chrono::Days::new(days_until_expiry.unsigned_abs().into()))
                .ok_or_else(|| {
                    ExpiryError::Validation(format!(
                        "daysUntilExpiry {} is out of range",
                        days_until_expiry
                    ))
                })?,
        };

        Ok(self
            .dispatcher
            .dispatch(ReminderRequest {
                notification_id: None,
                client: &client,
                service_type,
                days_until_expiry,
                expiry_date,
            })
            .await)
    }

    /// Services expiring within `within_days` of `now`, already expired included.
    pub async fn expiring_services(
        &self,
        within_days: i64,
        now: DateTime<Utc>,
    ) -> ExpiryResult<Vec<ExpiringService>> {
        let clients = self.registry.list_clients().await?;

        let mut services: Vec<ExpiringService> = clients
            .iter()
            .flat_map(|client| {
                ServiceType::iter().filter_map(move |service| {
                    let date = parse_expiry_date(client.expiry_raw(service)?)?;
                    let days = scanner::days_until(date, now);
                    (days <= within_days).then(|| ExpiringService {
                        client_id: client.id.clone(),
                        client_name: client.name.clone(),
                        service_type: service,
                        expiry_date: date,
                        days_until_expiry: days,
                    })
                })
            })
            .collect();

        services.sort_by(|a, b| {
            a.days_until_expiry
                .cmp(&b.days_until_expiry)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });
        Ok(services)
    }

    pub async fn list_for_client(
        &self,
        client_id: &str,
        unread_only: bool,
    ) -> ExpiryResult<Vec<Notification>> {
        self.store.list_for_client(client_id, unread_only).await
    }

    pub async fn mark_read(&self, id: Uuid) -> ExpiryResult<()> {
        if self.store.mark_read(id).await? {
            Ok(())
        } else {
            Err(ExpiryError::NotificationNotFound(id))
        }
    }

    pub async fn get_notification(&self, id: Uuid) -> ExpiryResult<Notification> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(ExpiryError::NotificationNotFound(id))
    }
}
