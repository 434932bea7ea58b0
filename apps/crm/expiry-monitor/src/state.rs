use core_config::FromEnv;
use database::postgres::DatabaseConnection;
use domain_expiry::{
    MailDispatcher, MailTransport, PgClientRegistry, PgNotificationStore, ScanOrchestrator,
    TemplateEngine,
    providers::{LogTransport, SendGridConfig, SendGridTransport, SmtpConfig, SmtpTransport},
};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, MailProvider};

/// Shared handles for the HTTP server, scheduler and one-shot commands.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabaseConnection,
    pub orchestrator: Arc<ScanOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, db: DatabaseConnection) -> eyre::Result<Self> {
        let transport = build_transport(config.mail_provider)?;
        info!(provider = transport.name(), "Mail transport configured");

        let dispatcher = MailDispatcher::new(
            transport,
            TemplateEngine::new()?,
            config.expiry.retry.clone(),
            config.expiry.company_name.clone(),
        );
        let orchestrator = ScanOrchestrator::new(
            Arc::new(PgClientRegistry::new(db.clone())),
            Arc::new(PgNotificationStore::new(db.clone())),
            dispatcher,
            config.expiry.clone(),
        );

        Ok(Self {
            config,
            db,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

/// Provider settings are only read for the selected provider.
fn build_transport(provider: MailProvider) -> eyre::Result<Arc<dyn MailTransport>> {
    let transport: Arc<dyn MailTransport> = match provider {
        MailProvider::Smtp => Arc::new(SmtpTransport::new(SmtpConfig::from_env()?)?),
        MailProvider::SendGrid => Arc::new(SendGridTransport::new(SendGridConfig::from_env()?)?),
        MailProvider::Log => Arc::new(LogTransport),
    };
    Ok(transport)
}
