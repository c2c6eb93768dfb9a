#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod services;
pub mod telemetry;

use crate::adapters::database::{self, PgMessageLedger};
use crate::adapters::ledger::{InMemoryLedger, MessageLedger};
use crate::adapters::transport::Transport;
use crate::api::ServiceContainer;
use crate::config::{Config, ConfigError, LedgerBackend};
use crate::services::bulk_service::BulkService;
use crate::services::gateway_service::GatewayService;
use crate::services::health_service::HealthService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Fully wired services, ready to be mounted on routers.
#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
}

/// Wires the services on top of an already-built ledger and transport.
#[must_use]
pub fn build_app(config: &Config, ledger: Arc<dyn MessageLedger>, transport: Arc<dyn Transport>) -> App {
    let gateway_service = GatewayService::new(
        Arc::clone(&ledger),
        transport,
        config.system_identity().to_string(),
        config.ledger.legacy_response_lookup,
    );
    let bulk_service = BulkService::new(
        gateway_service.clone(),
        config.bulk.max_concurrency,
        Duration::from_secs(config.bulk.timeout_secs),
    );
    let health_service = HealthService::new(ledger, Duration::from_millis(config.ledger.ping_timeout_ms));

    App { services: ServiceContainer { gateway_service, bulk_service }, health_service }
}

/// Opens the configured ledger. For Postgres this connects and applies migrations.
///
/// # Errors
/// Returns an error if the database is unreachable or a migration fails.
pub async fn build_ledger(config: &Config) -> anyhow::Result<Arc<dyn MessageLedger>> {
    match config.ledger.backend {
        LedgerBackend::Postgres => {
            let url = config.ledger.database_url.as_deref().ok_or(ConfigError::Missing("database-url"))?;
            let pool = database::init_pool(&config.ledger, url).await?;
            database::run_migrations(&pool).await?;
            tracing::info!("Postgres ledger ready");
            Ok(Arc::new(PgMessageLedger::new(pool)))
        }
        LedgerBackend::Memory => {
            tracing::warn!("Using the in-memory ledger; records are lost on restart");
            Ok(Arc::new(InMemoryLedger::new()))
        }
    }
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining connections");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the structured log.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(panic.location = %location, panic.message = %payload, "Thread panicked");
    }));
}
