use std::sync::Arc;
use std::time::Duration;

use academy_notify::config::{GatewayConfig, NotifyConfig};
use academy_notify::gateway::AlimTalkClient;
use academy_notify::store::PgNotificationStore;
use academy_notify::worker::{DeliveryWorker, RetrySweeper};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for an in-flight sweep after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "academy_worker=debug,academy_notify=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let notify_config = NotifyConfig::from_env().expect("Invalid notification configuration");
    let gateway_config = GatewayConfig::from_env().expect("Invalid gateway configuration");
    tracing::info!(
        interval_secs = notify_config.sweep_interval.as_secs(),
        max_attempts = notify_config.retry.max_attempts,
        batch_size = notify_config.sweep_batch_size,
        "Loaded worker configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = academy_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    academy_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    academy_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Sweeper ---
    let store = Arc::new(PgNotificationStore::new(pool));
    let gateway =
        Arc::new(AlimTalkClient::new(&gateway_config).expect("Failed to build AlimTalk client"));
    let worker = Arc::new(DeliveryWorker::new(store, gateway, &notify_config));
    let sweeper = RetrySweeper::new(worker, notify_config.sweep_interval);

    let cancel = CancellationToken::new();
    let sweeper_cancel = cancel.clone();
    let mut handle = tokio::spawn(async move {
        sweeper.run(sweeper_cancel).await;
    });

    tokio::select! {
        () = shutdown_signal() => {}
        res = &mut handle => {
            if let Err(e) = res {
                tracing::error!(error = %e, "Retry sweeper task ended unexpectedly");
            }
            return;
        }
    }

    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
        tracing::warn!("Retry sweeper did not stop within the grace period");
    }
    tracing::info!("Worker stopped");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
