//! Order intake and payment endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{OrderDocument, OrderEnvelope};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::kitchen::Kitchen;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub kitchen: Arc<Kitchen>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    /// Generated when absent.
    pub reference: Option<String>,
    pub lines: Vec<OrderLineRequest>,
    /// Arbitrary fields carried on the document untouched.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub name: String,
    pub qty: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderAcceptedResponse {
    pub reference: String,
    pub correlation_id: String,
    pub message_id: String,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub correlation_id: String,
    pub message_id: String,
    pub order: OrderDocument,
}

// -- Handlers --

/// POST /orders: place an order and start its fulfilment flow.
///
/// A reference that is still in flight is refused with 409.
#[tracing::instrument(skip(state, req))]
pub async fn place(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderAcceptedResponse>), ApiError> {
    if req.lines.is_empty() {
        return Err(ApiError::BadRequest("An order needs at least one line".to_string()));
    }
    if let Some(line) = req.lines.iter().find(|line| line.qty == 0) {
        return Err(ApiError::BadRequest(format!(
            "Line '{}' has zero quantity",
            line.name
        )));
    }

    let reference = match req.reference {
        Some(reference) if reference.trim().is_empty() => {
            return Err(ApiError::BadRequest("Reference must not be blank".to_string()));
        }
        Some(reference) => reference,
        None => uuid::Uuid::new_v4().to_string(),
    };

    let mut order = OrderDocument::new(reference.clone());
    for line in req.lines {
        order.add_line(line.name, line.qty);
    }
    for (name, value) in req.extra {
        order.set_field(name, value);
    }

    let placed = state.kitchen.place_order(order)?;
    metrics::counter!("api_orders_accepted_total").increment(1);
    Ok((
        StatusCode::CREATED,
        Json(OrderAcceptedResponse {
            reference,
            correlation_id: placed.correlation_id.to_string(),
            message_id: placed.message_id.to_string(),
        }),
    ))
}

/// GET /orders/outstanding: priced orders waiting for payment.
pub async fn outstanding(State(state): State<Arc<AppState>>) -> Json<Vec<OrderDocument>> {
    Json(state.kitchen.outstanding_orders())
}

/// POST /orders/{reference}/pay: settle an outstanding order.
#[tracing::instrument(skip(state))]
pub async fn pay(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let paid = state.kitchen.pay(&reference).inspect_err(|err| {
        metrics::counter!("api_payment_rejections_total").increment(1);
        tracing::warn!(error = %err, "payment rejected");
    })?;
    Ok(Json(payment_response(paid)?))
}

fn payment_response(paid: OrderEnvelope) -> Result<PaymentResponse, ApiError> {
    let correlation_id = paid.correlation_id.to_string();
    let message_id = paid.message_id.to_string();
    let order = paid
        .payload
        .into_order()
        .ok_or_else(|| ApiError::Internal("Payment produced no order".to_string()))?;
    Ok(PaymentResponse {
        correlation_id,
        message_id,
        order,
    })
}
