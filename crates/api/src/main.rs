use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use gateway_api::app;
use gateway_api::config::Config;
use gateway_api::jobs::{DeviceLivenessJob, JobScheduler, PoolMetricsJob, TaskTickJob};
use gateway_api::middleware;
use gateway_api::services::{bark, HttpDeviceClient, Services};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics()?;

    info!("Starting GSM gateway v{}", env!("CARGO_PKG_VERSION"));

    let db_config: persistence::db::DatabaseConfig = (&config.database).into();
    let pool = persistence::db::create_pool(&db_config).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let stores = persistence::pg_stores(pool.clone());
    let client = Arc::new(HttpDeviceClient::new()?);
    let notifier = bark::notifier_from_config(&config.notification);
    let services = Services::new(&config, stores.clone(), client, notifier);

    let mut jobs = JobScheduler::new();
    jobs.register(PoolMetricsJob::new(pool));
    jobs.register(DeviceLivenessJob::new(
        services.registry.clone(),
        config.device.offline_after_secs,
    ));
    if config.scheduler.internal_ticker {
        jobs.register(TaskTickJob::new(
            services.scheduler.clone(),
            Duration::from_secs(config.scheduler.tick_interval_secs),
        ));
    } else {
        info!("Internal ticker disabled; tasks run when /api/cron is called");
    }
    jobs.start();

    let addr = config.socket_addr()?;
    let app = app::create_app(config, stores, services);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    jobs.shutdown();
    jobs.wait_for_shutdown(Duration::from_secs(10)).await;

    Ok(())
}

async fn shutdown_signal() {
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
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
