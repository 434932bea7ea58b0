//! Expiry Monitor
//!
//! Scans CRM clients for upcoming domain and hosting expiries, records one
//! notification per reminder band and emails the client. Runs as an HTTP
//! service, a cron scheduler or a one-shot command.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_expiry::ServiceType;
use eyre::{Result, WrapErr};
use migration::Migrator;
use std::time::Duration;
use tracing::info;

mod api;
mod config;
mod openapi;
mod scheduler;
mod state;

use config::Config;
use state::AppState;

#[derive(Parser)]
#[command(name = "expiry-monitor")]
#[command(about = "Monitor client domain/hosting expiry dates and send reminders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API; also runs scheduled scans when EXPIRY_CRON is set
    Serve,

    /// Run a single scan and print the summary as JSON
    Scan,

    /// Run scans on a cron schedule
    Schedule {
        /// Cron expression with seconds (default: daily at 06:00 UTC)
        #[arg(short, long, default_value = scheduler::DEFAULT_CRON)]
        cron: String,
    },

    /// Send a reminder to one client without recording a notification
    Send {
        #[arg(long)]
        client_id: String,

        /// domain or hosting
        #[arg(long)]
        service: ServiceType,

        /// Days until expiry shown in the email
        #[arg(long)]
        days: i32,
    },

    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    observability::init_metrics().wrap_err("Failed to install metrics recorder")?;

    let cli = Cli::parse();

    info!("Connecting to database...");
    let db = database::postgres::connect_from_config_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("Database connection failed: {}", e))?;

    if matches!(cli.command, Commands::Migrate) || config.run_migrations {
        database::postgres::run_migrations::<Migrator>(&db, config.app.name)
            .await
            .map_err(|e| eyre::eyre!("Migration failed: {}", e))?;
        if matches!(cli.command, Commands::Migrate) {
            return Ok(());
        }
    }

    let state = AppState::new(config, db)?;

    match cli.command {
        Commands::Serve => serve(state).await?,

        Commands::Scan => {
            let summary = state.orchestrator.run_triggered("manual", chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Schedule { cron } => {
            scheduler::run_until_shutdown(state.orchestrator.clone(), &cron).await?;
        }

        Commands::Send {
            client_id,
            service,
            days,
        } => {
            let outcome = state.orchestrator.send_ad_hoc(&client_id, service, days).await?;
            match outcome.error() {
                None => info!(client_id = %client_id, "Reminder sent"),
                Some(error) => eyre::bail!("Reminder to {} not delivered: {}", client_id, error),
            }
        }

        Commands::Migrate => {}
    }

    Ok(())
}

async fn serve(state: AppState) -> Result<()> {
    let scheduler = match state.config.cron.as_deref() {
        Some(cron) => Some(scheduler::start(state.orchestrator.clone(), cron).await?),
        None => None,
    };

    let app = api::app(&state);

    info!("Starting expiry monitor with graceful shutdown (30s timeout)");
    let server = state.config.server.clone();
    axum_helpers::create_production_app(app, &server, Duration::from_secs(30), async move {
        if let Some(mut scheduler) = scheduler {
            match scheduler.shutdown().await {
                Ok(_) => info!("Scheduler stopped"),
                Err(e) => tracing::error!("Error stopping scheduler: {}", e),
            }
        }

        match state.db.close().await {
            Ok(_) => info!("PostgreSQL connection closed successfully"),
            Err(e) => tracing::error!("Error closing PostgreSQL: {}", e),
        }
    })
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("Expiry monitor shutdown complete");
    Ok(())
}
