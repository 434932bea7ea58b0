//! Domain types for expiry scanning and reminder delivery.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Service whose expiry the CRM tracks per client.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceType {
    Domain,
    Hosting,
}

impl ServiceType {
    /// Wording used in reminder emails
    pub fn label(&self) -> &'static str {
        match self {
            ServiceType::Domain => "domain",
            ServiceType::Hosting => "hosting plan",
        }
    }
}

/// Client snapshot from the registry.
///
/// Expiry dates are kept exactly as the CRM stored them (`YYYY-MM-DD` or an
/// RFC 3339 timestamp); see [`parse_expiry_date`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: String,
    pub domain_expiry_date: Option<String>,
    pub hosting_expiry_date: Option<String>,
}

impl Client {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            domain_expiry_date: None,
            hosting_expiry_date: None,
        }
    }

    pub fn with_domain_expiry(mut self, date: impl Into<String>) -> Self {
        self.domain_expiry_date = Some(date.into());
        self
    }

    pub fn with_hosting_expiry(mut self, date: impl Into<String>) -> Self {
        self.hosting_expiry_date = Some(date.into());
        self
    }

    /// Raw stored value for `service`; blank strings count as absent
    pub fn expiry_raw(&self, service: ServiceType) -> Option<&str> {
        let raw = match service {
            ServiceType::Domain => self.domain_expiry_date.as_deref(),
            ServiceType::Hosting => self.hosting_expiry_date.as_deref(),
        };
        raw.map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Parse a stored expiry date. Timestamps are reduced to their UTC calendar date.
pub fn parse_expiry_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|ts| ts.with_timezone(&Utc).date_naive())
        })
}

/// A threshold crossing computed by the scanner. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryEvent {
    pub client_id: String,
    pub service_type: ServiceType,
    pub expiry_date: NaiveDate,
    pub threshold_day: i32,
    pub days_until_expiry: i32,
}

/// Email delivery state tracked alongside a notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    /// Claimed by a run that is sending right now
    Sending,
    Sent,
    Failed,
    /// Failed permanently; never retried
    Rejected,
}

/// Durable record of an admitted expiry event.
///
/// Event fields never change after creation; `is_read` and the delivery
/// columns are the only mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub client_id: String,
    pub service_type: ServiceType,
    pub threshold_day: i32,
    pub days_until_expiry: i32,
    pub expiry_date: NaiveDate,
    pub message: String,
    pub is_read: bool,
    pub delivery_status: DeliveryStatus,
    pub delivery_attempts: i32,
    pub last_delivery_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the current or last delivery claim was taken
    pub delivery_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_new(input: NewNotification) -> Self {
        Self {
            id: Uuid::now_v7(),
            client_id: input.client_id,
            service_type: input.service_type,
            threshold_day: input.threshold_day,
            days_until_expiry: input.days_until_expiry,
            expiry_date: input.expiry_date,
            message: input.message,
            is_read: false,
            delivery_status: DeliveryStatus::Pending,
            delivery_attempts: 0,
            last_delivery_error: None,
            delivered_at: None,
            delivery_claimed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether a run may take the delivery claim now.
    ///
    /// A `sending` claim older than `stale_before` is treated as abandoned.
    pub fn is_claimable(&self, stale_before: DateTime<Utc>) -> bool {
        match self.delivery_status {
            DeliveryStatus::Pending | DeliveryStatus::Failed => true,
            DeliveryStatus::Sending => self
                .delivery_claimed_at
                .is_none_or(|claimed_at| claimed_at < stale_before),
            DeliveryStatus::Sent | DeliveryStatus::Rejected => false,
        }
    }

    /// Take the delivery claim if [`Self::is_claimable`]
    pub fn claim(&mut self, claimed_at: DateTime<Utc>, stale_before: DateTime<Utc>) -> bool {
        if !self.is_claimable(stale_before) {
            return false;
        }
        self.delivery_status = DeliveryStatus::Sending;
        self.delivery_claimed_at = Some(claimed_at);
        true
    }

    /// Apply a finished dispatch to the delivery columns
    pub fn apply_delivery(&mut self, record: &DeliveryRecord) {
        self.delivery_status = record.status;
        self.delivery_attempts = self.delivery_attempts.saturating_add(record.attempts);
        self.last_delivery_error = record.error.clone();
        if record.delivered_at.is_some() {
            self.delivered_at = record.delivered_at;
        }
    }
}

/// Fields for creating a notification
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub client_id: String,
    pub service_type: ServiceType,
    pub threshold_day: i32,
    pub days_until_expiry: i32,
    pub expiry_date: NaiveDate,
    pub message: String,
}

impl NewNotification {
    pub fn from_event(event: &ExpiryEvent, client_name: &str) -> Self {
        Self {
            client_id: event.client_id.clone(),
            service_type: event.service_type,
            threshold_day: event.threshold_day,
            days_until_expiry: event.days_until_expiry,
            expiry_date: event.expiry_date,
            message: reminder_message(
                client_name,
                event.service_type,
                event.days_until_expiry,
                event.expiry_date,
            ),
        }
    }
}

/// In-app text stored on the notification
pub fn reminder_message(
    client_name: &str,
    service: ServiceType,
    days_until_expiry: i32,
    expiry_date: NaiveDate,
) -> String {
    format!(
        "{}'s {} expires {} ({})",
        client_name,
        service.label(),
        days_label(days_until_expiry),
        expiry_date.format("%Y-%m-%d")
    )
}

/// `today`, `tomorrow` or `in N days`
pub fn days_label(days_until_expiry: i32) -> String {
    match days_until_expiry {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {} days", n),
    }
}

/// Result of a single transport call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttemptResult {
    Success,
    Failure,
}

/// One transport call inside a dispatch. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAttempt {
    /// None for ad-hoc sends that bypass the store
    pub notification_id: Option<Uuid>,
    pub attempt_number: u32,
    pub outcome: AttemptResult,
    pub error: Option<String>,
}

/// Terminal state of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        message_id: Option<String>,
        attempts: Vec<DeliveryAttempt>,
    },
    Failed {
        error: String,
        /// Retrying later cannot help (bad address, broken template)
        permanent: bool,
        attempts: Vec<DeliveryAttempt>,
    },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> &[DeliveryAttempt] {
        match self {
            DeliveryOutcome::Delivered { attempts, .. } | DeliveryOutcome::Failed { attempts, .. } => {
                attempts
            }
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Delivered { .. } => None,
            DeliveryOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Delivery columns written back after a dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryRecord {
    pub status: DeliveryStatus,
    /// Transport calls made by this dispatch; added to the stored count
    pub attempts: i32,
    pub error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    pub fn from_outcome(outcome: &DeliveryOutcome, now: DateTime<Utc>) -> Self {
        let attempts = i32::try_from(outcome.attempts().len()).unwrap_or(i32::MAX);
        match outcome {
            DeliveryOutcome::Delivered { .. } => Self {
                status: DeliveryStatus::Sent,
                attempts,
                error: None,
                delivered_at: Some(now),
            },
            // Failures that never reached the transport still count once
            DeliveryOutcome::Failed { error, permanent, .. } => Self {
                status: if *permanent {
                    DeliveryStatus::Rejected
                } else {
                    DeliveryStatus::Failed
                },
                attempts: attempts.max(1),
                error: Some(error.clone()),
                delivered_at: None,
            },
        }
    }
}

/// Totals reported by one scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    /// Notifications persisted by this run
    pub created: usize,
    /// Emails delivered for this run's notifications
    pub emails_sent: usize,
    /// Emails that failed for this run's notifications
    pub emails_failed: usize,
    pub clients_scanned: usize,
    /// Clients with at least one unparsable expiry date
    pub clients_skipped: usize,
    pub duplicates_suppressed: usize,
    /// Earlier notifications whose email went out on this run
    pub redelivered: usize,
    pub redelivery_failed: usize,
}

/// Progress of a scan run, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanPhase {
    LoadingClients,
    Scanning,
    Deduping,
    Persisting,
    Dispatching,
    Redelivering,
    Done,
}

/// Dashboard row: a service expiring inside the requested window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExpiringService {
    pub client_id: String,
    pub client_name: String,
    pub service_type: ServiceType,
    pub expiry_date: NaiveDate,
    /// Negative when already expired
    pub days_until_expiry: i64,
}
