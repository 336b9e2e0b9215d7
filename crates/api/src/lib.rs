//! HTTP surface for the blank-stock sync service.
//!
//! One webhook endpoint drives the whole pipeline; the rest is operator
//! tooling: manual stock override, order-log forensics, ledger inspection,
//! health, and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use commerce::CommerceClient;
use engine::OrderProcessor;
use metrics_exporter_prometheus::PrometheusHandle;
use queue::JobQueue;
use store::{AssociationStore, OrderLogStore, StockStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<C: CommerceClient> {
    pub processor: OrderProcessor<C>,
    pub stock: Arc<dyn StockStore>,
    pub logs: Arc<dyn OrderLogStore>,
    pub config: Config,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<C: CommerceClient + 'static>(
    state: Arc<AppState<C>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/webhooks/orders/paid", post(routes::webhook::orders_paid::<C>))
        .route("/stock/override", post(routes::stock::override_stock::<C>))
        .route(
            "/stock/{blank_key}/{size}/{color}",
            get(routes::stock::get_record::<C>),
        )
        .route("/orders/{order_id}/log", get(routes::orders::log::<C>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires an application state from the given stores and platform client.
pub fn create_state<C: CommerceClient>(
    stock: Arc<dyn StockStore>,
    associations: Arc<dyn AssociationStore>,
    logs: Arc<dyn OrderLogStore>,
    queue: Arc<dyn JobQueue>,
    client: Arc<C>,
    config: Config,
) -> Arc<AppState<C>> {
    let processor = OrderProcessor::new(
        stock.clone(),
        associations,
        logs.clone(),
        queue,
        client,
        config.engine_settings(),
    );
    Arc::new(AppState {
        processor,
        stock,
        logs,
        config,
    })
}
