//! Expiry monitoring and reminder dispatch for CRM clients.
//!
//! A scan run walks every client, works out which reminder band each
//! domain or hosting expiry has entered, records one notification per
//! `(client, service, threshold)` and emails the client.
//!
//! ```text
//! ┌──────────────────┐
//! │ ScanOrchestrator │  ← run_scan, ad-hoc send, dashboard queries
//! └───┬─────┬─────┬──┘
//!     │     │     │
//!     │     │  ┌──▼─────────────┐
//!     │     │  │ MailDispatcher │  ← render + bounded retry over MailTransport
//!     │     │  └────────────────┘
//!     │  ┌──▼────────┐
//!     │  │ DedupGate │  ← NotificationStore uniqueness
//!     │  └───────────┘
//!  ┌──▼──────┐
//!  │ scanner │  ← pure threshold evaluation
//!  └─────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_expiry::{
//!     ExpiryConfig, InMemoryClientRegistry, InMemoryNotificationStore, MailDispatcher,
//!     ScanOrchestrator, TemplateEngine, handlers, providers::LogTransport,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExpiryConfig::default();
//! let dispatcher = MailDispatcher::new(
//!     Arc::new(LogTransport),
//!     TemplateEngine::new()?,
//!     config.retry.clone(),
//!     config.company_name.clone(),
//! );
//! let orchestrator = ScanOrchestrator::new(
//!     Arc::new(InMemoryClientRegistry::new()),
//!     Arc::new(InMemoryNotificationStore::new()),
//!     dispatcher,
//!     config,
//! );
//!
//! let router = handlers::router(Arc::new(orchestrator));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod postgres;
pub mod providers;
pub mod repository;
pub mod scanner;
pub mod templates;

pub use config::{DEFAULT_THRESHOLDS, ExpiryConfig, RetryPolicy, Thresholds};
pub use dedup::{Admission, DedupGate};
pub use dispatcher::{MailDispatcher, ReminderRequest};
pub use error::{ExpiryError, ExpiryResult};
pub use models::{
    AttemptResult, Client, DeliveryAttempt, DeliveryOutcome, DeliveryRecord, DeliveryStatus,
    ExpiringService, ExpiryEvent, NewNotification, Notification, ScanPhase, ScanSummary,
    ServiceType,
};
pub use orchestrator::ScanOrchestrator;
pub use postgres::{PgClientRegistry, PgNotificationStore};
pub use providers::{MailTransport, OutboundMail, SentMail, TransportError};
pub use repository::{
    ClientRegistry, InMemoryClientRegistry, InMemoryNotificationStore, NotificationStore,
};
pub use templates::TemplateEngine;
