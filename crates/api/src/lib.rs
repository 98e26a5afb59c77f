//! HTTP API server with observability for the storefront order engine.
//!
//! Provides REST endpoints for checkout, order status changes, back-office
//! order management and the payment webhook, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{OrderService, OrderServiceConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{Catalog, OrderStore};
use payments::PaymentReconciler;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C>(state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + 'static,
    C: Catalog + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route(
            "/orders",
            post(routes::orders::create::<S, C>).get(routes::orders::list::<S, C>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S, C>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S, C>),
        )
        .route("/admin/orders", get(routes::admin::list::<S, C>))
        .route(
            "/admin/orders/{id}",
            axum::routing::delete(routes::admin::delete::<S, C>),
        )
        .route(
            "/admin/orders/{id}/status",
            patch(routes::admin::update_status::<S, C>),
        )
        .route(
            "/admin/orders/{id}/cancel",
            post(routes::admin::cancel::<S, C>),
        )
        .route(
            "/webhooks/payments",
            post(routes::webhooks::payments::<S, C>),
        )
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

/// Creates the application state over a store that also serves catalog lookups.
pub fn create_default_state<S>(store: S, config: OrderServiceConfig) -> Arc<AppState<S, S>>
where
    S: OrderStore + Catalog + Clone + 'static,
{
    let order_service = Arc::new(OrderService::with_config(store.clone(), store, config));
    let reconciler = PaymentReconciler::new(Arc::clone(&order_service));

    Arc::new(AppState {
        order_service,
        reconciler,
    })
}
