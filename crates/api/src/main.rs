use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pass_engine_api::app::{create_app, AppState, Channels, StoreBackend};
use pass_engine_api::config::Config;
use pass_engine_api::jobs::JobScheduler;
use pass_engine_api::middleware::{init_metrics, logging::init_logging};
use pass_engine_api::services::{EmailService, TelegramService};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_logging(&config.logging);
    init_metrics().context("Failed to install Prometheus recorder")?;

    info!("Starting pass engine v{}", env!("CARGO_PKG_VERSION"));

    let db_config: persistence::db::DatabaseConfig = (&config.database).into();
    let pool = persistence::db::create_pool(&db_config).await?;
    persistence::db::run_migrations(&pool).await?;

    let channels = Channels {
        email: Arc::new(EmailService::new(config.email.clone())?),
        telegram: Arc::new(TelegramService::new(config.telegram.clone())),
    };

    let mut scheduler = JobScheduler::new();
    let state = AppState::new(
        config.clone(),
        StoreBackend::postgres(pool),
        channels,
        scheduler.status(),
    )?;

    // Refuses to start when a trigger is misaligned with its bucket
    state.register_jobs(&mut scheduler);
    scheduler.start()?;

    let app = create_app(state);
    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping background jobs");
    scheduler.shutdown();
    scheduler
        .wait_for_shutdown(Duration::from_secs(config.server.shutdown_timeout_secs))
        .await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
