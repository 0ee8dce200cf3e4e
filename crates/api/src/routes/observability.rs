//! Prometheus scrape endpoint and the monitor snapshot.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use message_bus::Reading;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use super::orders::AppState;

/// GET /metrics: Prometheus text exposition.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}

#[derive(Serialize)]
pub struct MonitorResponse {
    pub live_sagas: usize,
    pub readings: Vec<Reading>,
}

/// GET /monitor: current queue depths, processed counts and live sagas.
pub async fn monitor(State(state): State<Arc<AppState>>) -> Json<MonitorResponse> {
    Json(MonitorResponse {
        live_sagas: state.kitchen.live_sagas(),
        readings: state.kitchen.readings(),
    })
}
