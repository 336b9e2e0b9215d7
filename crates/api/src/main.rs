//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use commerce::HttpCommerceClient;
use queue::InMemoryJobQueue;
use store::{
    InMemoryAssociationStore, InMemoryOrderLogStore, InMemoryStockStore, PgAssociationStore,
    PgOrderLogStore, PgStockStore,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.webhook_secret.is_empty() {
        tracing::warn!("WEBHOOK_SECRET is empty; webhook deliveries cannot be verified");
    }

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire stores: Postgres when DATABASE_URL is set, in-memory otherwise
    let queue = Arc::new(InMemoryJobQueue::new(chrono::Duration::seconds(
        config.lock_timeout_secs,
    )));
    let client = Arc::new(HttpCommerceClient::new(config.platform()));

    let state = match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .expect("failed to connect to Postgres");
            store::run_migrations(&pool)
                .await
                .expect("failed to run migrations");
            tracing::info!("using Postgres-backed stores");
            api::create_state(
                Arc::new(PgStockStore::new(pool.clone())),
                Arc::new(PgAssociationStore::new(pool.clone())),
                Arc::new(PgOrderLogStore::new(pool)),
                queue,
                client,
                config.clone(),
            )
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stores");
            api::create_state(
                Arc::new(InMemoryStockStore::new()),
                Arc::new(InMemoryAssociationStore::new()),
                Arc::new(InMemoryOrderLogStore::new()),
                queue,
                client,
                config.clone(),
            )
        }
    };

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
