//! HTTP front for the kitchen.
//!
//! Places orders onto the bus, exposes the cashier's outstanding orders and
//! payment, and reports the monitor snapshot alongside Prometheus metrics.

pub mod config;
pub mod error;
pub mod kitchen;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::{ApiError, KitchenError};
pub use kitchen::{Kitchen, KitchenConfig};
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::observability::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/monitor", get(routes::observability::monitor))
        .route("/orders", post(routes::orders::place))
        .route("/orders/outstanding", get(routes::orders::outstanding))
        .route("/orders/{reference}/pay", post(routes::orders::pay))
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

/// Wraps a kitchen into shared handler state.
pub fn create_state(kitchen: Arc<Kitchen>) -> Arc<AppState> {
    Arc::new(AppState { kitchen })
}
