//! Scan run behaviour against in-memory adapters and a fake mail transport.
//!
//! Covers idempotence across runs, threshold catch-up, delivery failure
//! isolation, bad client data, redelivery and concurrent runs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use domain_expiry::*;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Transport that either accepts everything or fails every call transiently.
#[derive(Default)]
struct FakeTransport {
    failing: AtomicBool,
    calls: AtomicUsize,
    delivered: Mutex<Vec<OutboundMail>>,
}

impl FakeTransport {
    fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn delivered(&self) -> Vec<OutboundMail> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn send_mail(&self, mail: &OutboundMail) -> Result<SentMail, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Transient("connection refused".to_string()));
        }
        self.delivered.lock().unwrap().push(mail.clone());
        Ok(SentMail {
            message_id: Some(format!("fake-{}", self.calls())),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct DownRegistry;

#[async_trait]
impl ClientRegistry for DownRegistry {
    async fn list_clients(&self) -> ExpiryResult<Vec<Client>> {
        Err(ExpiryError::RegistryUnavailable("connection refused".to_string()))
    }

    async fn get_client_by_id(&self, _id: &str) -> ExpiryResult<Option<Client>> {
        Err(ExpiryError::RegistryUnavailable("connection refused".to_string()))
    }
}

struct Harness {
    registry: InMemoryClientRegistry,
    store: InMemoryNotificationStore,
    transport: Arc<FakeTransport>,
    orchestrator: ScanOrchestrator,
}

fn config() -> ExpiryConfig {
    ExpiryConfig::default().with_retry(RetryPolicy::immediate(3))
}

fn harness_with(clients: Vec<Client>, transport: FakeTransport, config: ExpiryConfig) -> Harness {
    let registry = InMemoryClientRegistry::with_clients(clients);
    let store = InMemoryNotificationStore::new();
    let transport = Arc::new(transport);
    let dispatcher = MailDispatcher::new(
        transport.clone(),
        TemplateEngine::new().unwrap(),
        config.retry.clone(),
        "Hostly",
    );
    let orchestrator = ScanOrchestrator::new(
        Arc::new(registry.clone()),
        Arc::new(store.clone()),
        dispatcher,
        config,
    );

    Harness {
        registry,
        store,
        transport,
        orchestrator,
    }
}

fn harness(clients: Vec<Client>) -> Harness {
    harness_with(clients, FakeTransport::default(), config())
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
}

/// Calendar date `days` after `now()`
fn in_days(days: i64) -> String {
    (now().date_naive() + Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

#[tokio::test]
async fn test_second_run_creates_nothing() {
    let h = harness(vec![
        Client::new("c1", "Acme", "ops@acme.test").with_domain_expiry(in_days(5)),
        Client::new("c2", "Globex", "it@globex.test").with_hosting_expiry(in_days(0)),
    ]);

    let first = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(first.created, 2);
    assert_eq!(first.emails_sent, 2);
    assert_eq!(first.emails_failed, 0);
    assert_eq!(first.clients_scanned, 2);

    let second = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.emails_sent, 0);
    assert_eq!(second.duplicates_suppressed, 2);
    assert_eq!(second.redelivered, 0);

    assert_eq!(h.store.len().await, 2);
    assert_eq!(h.transport.calls(), 2);
}

#[tokio::test]
async fn test_threshold_walk_notifies_each_band_once() {
    let expiry = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
    let h = harness(vec![
        Client::new("c1", "Acme", "ops@acme.test").with_domain_expiry("2026-12-31"),
    ]);

    let mut created_per_run = Vec::new();
    for days in [31, 20, 10, 8, 2, 0] {
        let at = expiry.and_hms_opt(9, 0, 0).unwrap().and_utc() - Duration::days(days);
        let summary = h.orchestrator.run_scan_at(at).await.unwrap();
        created_per_run.push(summary.created);
    }
    assert_eq!(created_per_run, vec![0, 1, 1, 0, 1, 1]);

    let mut thresholds: Vec<i32> = h
        .store
        .all()
        .await
        .iter()
        .map(|n| n.threshold_day)
        .collect();
    thresholds.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(thresholds, vec![14, 7, 1, 0]);
}

#[tokio::test]
async fn test_mail_outage_keeps_notifications() {
    let h = harness_with(
        vec![
            Client::new("c1", "Acme", "ops@acme.test").with_domain_expiry(in_days(1)),
            Client::new("c2", "Globex", "it@globex.test").with_hosting_expiry(in_days(12)),
        ],
        FakeTransport::failing(),
        config(),
    );

    let summary = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(summary.created, 2);
    assert_eq!(summary.emails_failed, summary.created);
    assert_eq!(summary.emails_sent, 0);

    let stored = h.store.all().await;
    assert_eq!(stored.len(), 2);
    for notification in stored {
        assert_eq!(notification.delivery_status, DeliveryStatus::Failed);
        assert_eq!(notification.delivery_attempts, 3);
        assert_eq!(
            notification.last_delivery_error.as_deref(),
            Some("connection refused")
        );
    }
    assert_eq!(h.transport.calls(), 6);
}

#[tokio::test]
async fn test_malformed_client_does_not_block_others() {
    let h = harness(vec![
        Client::new("bad", "Broken Co", "x@broken.test").with_domain_expiry("next tuesday"),
        Client::new("good", "Acme", "ops@acme.test").with_domain_expiry(in_days(7)),
    ]);

    let summary = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(summary.clients_scanned, 2);
    assert_eq!(summary.clients_skipped, 1);
    assert_eq!(summary.created, 1);

    let stored = h.store.all().await;
    assert_eq!(stored[0].client_id, "good");
    assert_eq!(stored[0].threshold_day, 7);
}

#[tokio::test]
async fn test_bad_date_on_one_service_keeps_the_other() {
    let h = harness(vec![
        Client::new("c1", "Acme", "ops@acme.test")
            .with_domain_expiry("31/12/2026")
            .with_hosting_expiry(in_days(3)),
    ]);

    let summary = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.clients_skipped, 1);
    assert_eq!(h.store.all().await[0].service_type, ServiceType::Hosting);
}

#[tokio::test]
async fn test_domain_and_hosting_are_independent() {
    let h = harness(vec![
        Client::new("c1", "Acme", "ops@acme.test")
            .with_domain_expiry(in_days(6))
            .with_hosting_expiry(in_days(6)),
    ]);

    let summary = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(summary.created, 2);

    let mut services: Vec<ServiceType> =
        h.store.all().await.iter().map(|n| n.service_type).collect();
    services.sort();
    assert_eq!(services, vec![ServiceType::Domain, ServiceType::Hosting]);

    let subjects: Vec<String> = h.transport.delivered().into_iter().map(|m| m.subject).collect();
    assert!(subjects.contains(&"Your domain expires in 6 days".to_string()));
    assert!(subjects.contains(&"Your hosting plan expires in 6 days".to_string()));

    // Hosting renewed, domain still due: nothing new for either
    h.registry
        .upsert(
            Client::new("c1", "Acme", "ops@acme.test")
                .with_domain_expiry(in_days(6))
                .with_hosting_expiry(in_days(400)),
        )
        .await;
    let again = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.duplicates_suppressed, 1);
}

#[tokio::test]
async fn test_failed_email_redelivered_on_next_run() {
    let h = harness_with(
        vec![Client::new("c1", "Acme", "ops@acme.test").with_domain_expiry(in_days(14))],
        FakeTransport::failing(),
        config(),
    );

    let first = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(first.emails_failed, 1);
    assert_eq!(first.redelivery_failed, 0);

    h.transport.set_failing(false);
    let second = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.emails_failed, 0);
    assert_eq!(second.redelivered, 1);

    let stored = h.store.all().await;
    assert_eq!(stored[0].delivery_status, DeliveryStatus::Sent);
    assert_eq!(stored[0].delivery_attempts, 4);
    assert!(stored[0].delivered_at.is_some());

    let third = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(third.redelivered, 0);
    assert_eq!(h.transport.delivered().len(), 1);
}

#[tokio::test]
async fn test_redelivery_stops_at_attempt_cap() {
    let mut config = config();
    config.max_delivery_attempts = 6;
    let h = harness_with(
        vec![Client::new("c1", "Acme", "ops@acme.test").with_hosting_expiry(in_days(1))],
        FakeTransport::failing(),
        config,
    );

    h.orchestrator.run_scan_at(now()).await.unwrap();
    let second = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(second.redelivery_failed, 1);

    // 6 attempts recorded; the cap excludes it from now on
    let third = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(third.redelivery_failed, 0);
    assert_eq!(h.transport.calls(), 6);
}

#[tokio::test]
async fn test_rejected_address_is_not_retried() {
    let h = harness(vec![
        Client::new("c1", "Acme", "  ").with_domain_expiry(in_days(7)),
    ]);

    let first = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(first.emails_failed, 1);

    let stored = h.store.all().await;
    assert_eq!(stored[0].delivery_status, DeliveryStatus::Rejected);
    assert_eq!(stored[0].delivery_attempts, 1);

    let second = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(second.redelivered, 0);
    assert_eq!(second.redelivery_failed, 0);
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_overlapping_runs_redeliver_once() {
    let registry =
        InMemoryClientRegistry::with_clients([Client::new("c1", "Acme", "ops@acme.test")]);
    let store = InMemoryNotificationStore::new();

    let earlier = store
        .create(NewNotification {
            client_id: "c1".to_string(),
            service_type: ServiceType::Domain,
            threshold_day: 7,
            days_until_expiry: 5,
            expiry_date: now().date_naive() + Duration::days(5),
            message: "Acme's domain expires in 5 days".to_string(),
        })
        .await
        .unwrap();
    store
        .record_delivery(
            earlier.id,
            DeliveryRecord {
                status: DeliveryStatus::Failed,
                attempts: 3,
                error: Some("connection refused".to_string()),
                delivered_at: None,
            },
        )
        .await
        .unwrap();

    let transport_a = Arc::new(FakeTransport::default());
    let transport_b = Arc::new(FakeTransport::default());
    let build = |transport: Arc<FakeTransport>| {
        ScanOrchestrator::new(
            Arc::new(registry.clone()),
            Arc::new(store.clone()),
            MailDispatcher::new(
                transport,
                TemplateEngine::new().unwrap(),
                RetryPolicy::no_retry(),
                "Hostly",
            ),
            config(),
        )
    };
    let a = build(transport_a.clone());
    let b = build(transport_b.clone());

    let (ra, rb) = tokio::join!(a.run_scan_at(now()), b.run_scan_at(now()));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.redelivered + rb.redelivered, 1);
    assert_eq!(ra.redelivery_failed + rb.redelivery_failed, 0);
    assert_eq!(
        transport_a.delivered().len() + transport_b.delivered().len(),
        1
    );

    let stored = store.get_by_id(earlier.id).await.unwrap().unwrap();
    assert_eq!(stored.delivery_status, DeliveryStatus::Sent);
    assert_eq!(stored.delivery_attempts, 4);
}

#[tokio::test]
async fn test_registry_outage_aborts_run() {
    let transport: Arc<dyn MailTransport> = Arc::new(FakeTransport::default());
    let orchestrator = ScanOrchestrator::new(
        Arc::new(DownRegistry),
        Arc::new(InMemoryNotificationStore::new()),
        MailDispatcher::new(
            transport,
            TemplateEngine::new().unwrap(),
            RetryPolicy::no_retry(),
            "Hostly",
        ),
        config(),
    );

    let err = orchestrator.run_scan_at(now()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, ExpiryError::RegistryUnavailable(_)));
}

#[tokio::test]
async fn test_concurrent_runs_share_one_notification_per_event() {
    let clients: Vec<Client> = (0..20)
        .map(|i| {
            Client::new(format!("c{:02}", i), format!("Client {}", i), "ops@client.test")
                .with_domain_expiry(in_days(i % 10))
        })
        .collect();
    let registry = InMemoryClientRegistry::with_clients(clients);
    let store = InMemoryNotificationStore::new();

    let build = || {
        ScanOrchestrator::new(
            Arc::new(registry.clone()),
            Arc::new(store.clone()),
            MailDispatcher::new(
                Arc::new(FakeTransport::default()),
                TemplateEngine::new().unwrap(),
                RetryPolicy::no_retry(),
                "Hostly",
            ),
            config().with_scan_concurrency(4),
        )
    };
    let a = build();
    let b = build();

    let (ra, rb) = tokio::join!(a.run_scan_at(now()), b.run_scan_at(now()));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.created + rb.created, 20);
    assert_eq!(ra.duplicates_suppressed + rb.duplicates_suppressed, 20);
    assert_eq!(store.len().await, 20);
}

#[tokio::test]
async fn test_ad_hoc_send_leaves_store_untouched() {
    let h = harness(vec![
        Client::new("c1", "Acme", "ops@acme.test").with_domain_expiry(in_days(90)),
    ]);

    let outcome = h
        .orchestrator
        .send_ad_hoc("c1", ServiceType::Domain, 3)
        .await
        .unwrap();
    assert!(outcome.is_delivered());
    assert!(h.store.is_empty().await);

    let mail = &h.transport.delivered()[0];
    assert_eq!(mail.to, "ops@acme.test");
    assert_eq!(mail.subject, "Your domain expires in 3 days");

    let missing = h
        .orchestrator
        .send_ad_hoc("nope", ServiceType::Domain, 3)
        .await
        .unwrap_err();
    assert!(matches!(missing, ExpiryError::ClientNotFound(_)));
}

#[tokio::test]
async fn test_ad_hoc_send_rejects_unrepresentable_expiry() {
    let h = harness(vec![Client::new("c1", "Acme", "ops@acme.test")]);

    let err = h
        .orchestrator
        .send_ad_hoc("c1", ServiceType::Domain, i32::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, ExpiryError::Validation(_)));
    assert_eq!(h.transport.calls(), 0);
}

#[tokio::test]
async fn test_expiring_services_includes_expired() {
    let h = harness(vec![
        Client::new("c1", "Acme", "ops@acme.test")
            .with_domain_expiry(in_days(-3))
            .with_hosting_expiry(in_days(45)),
        Client::new("c2", "Globex", "it@globex.test").with_domain_expiry(in_days(10)),
        Client::new("c3", "Initech", "it@initech.test").with_domain_expiry("garbage"),
    ]);

    let services = h.orchestrator.expiring_services(30, now()).await.unwrap();
    let summary: Vec<(&str, ServiceType, i64)> = services
        .iter()
        .map(|s| (s.client_id.as_str(), s.service_type, s.days_until_expiry))
        .collect();
    assert_eq!(
        summary,
        vec![("c1", ServiceType::Domain, -3), ("c2", ServiceType::Domain, 10)]
    );

    // Expired dates are counted but never notified
    let run = h.orchestrator.run_scan_at(now()).await.unwrap();
    assert_eq!(run.created, 1);
}

#[tokio::test]
async fn test_mark_read_filters_unread() {
    let h = harness(vec![
        Client::new("c1", "Acme", "ops@acme.test")
            .with_domain_expiry(in_days(1))
            .with_hosting_expiry(in_days(2)),
    ]);
    h.orchestrator.run_scan_at(now()).await.unwrap();

    let all = h.orchestrator.list_for_client("c1", false).await.unwrap();
    assert_eq!(all.len(), 2);

    h.orchestrator.mark_read(all[0].id).await.unwrap();
    let unread = h.orchestrator.list_for_client("c1", true).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_ne!(unread[0].id, all[0].id);

    let missing = h.orchestrator.mark_read(uuid::Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(missing, ExpiryError::NotificationNotFound(_)));
}
