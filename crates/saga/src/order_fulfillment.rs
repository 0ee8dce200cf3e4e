//! Order fulfillment saga: drives one order through cook, price and pay.
//!
//! ```text
//! OrderPlaced ──► CookFood (+ CookTimedOut after retry_after)
//! CookTimedOut ─► CookFood again, unless already cooked
//! FoodCooked ───► PriceOrder
//! OrderPriced ──► TakePayment
//! OrderPaid ────► OrderCompleted
//! ```
//!
//! There is no phase field: the arriving message kind says where the order
//! is. Every step is recorded per order reference, so repeated deliveries of
//! the same event are absorbed and the completion is emitted once.

use std::collections::HashSet;
use std::sync::Arc;

use domain::{OrderDocument, OrderEnvelope, OrderMessage, topics};
use message_bus::{Bus, Envelope};

use crate::config::SagaConfig;
use crate::router::SagaRouter;
use crate::saga::{Emission, Saga};

/// The saga type identifier for order fulfillment.
pub const SAGA_TYPE: &str = "OrderFulfillment";

/// Router specialized to order fulfillment.
pub type OrderRouter = SagaRouter<OrderMessage, OrderFulfillment>;

/// Builds a router creating one [`OrderFulfillment`] per placed order.
pub fn order_router(bus: Arc<Bus<OrderEnvelope>>, config: SagaConfig) -> OrderRouter {
    SagaRouter::new(bus, move |_: &OrderEnvelope| OrderFulfillment::new(config))
}

/// Steps an order passes through, as recorded in the dedup set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Placed,
    Cooked,
    Priced,
    Paid,
}

#[derive(Debug)]
pub struct OrderFulfillment {
    config: SagaConfig,
    done: HashSet<(Stage, String)>,
}

impl OrderFulfillment {
    pub fn new(config: SagaConfig) -> Self {
        Self {
            config,
            done: HashSet::new(),
        }
    }

    /// True if `stage` was already reached for `reference`.
    pub fn reached(&self, stage: Stage, reference: &str) -> bool {
        self.done.contains(&(stage, reference.to_string()))
    }

    /// Records `stage`; returns false if it was already recorded.
    fn mark(&mut self, stage: Stage, reference: &str) -> bool {
        self.done.insert((stage, reference.to_string()))
    }

    fn on_order_placed(
        &mut self,
        message: &OrderEnvelope,
        order: &OrderDocument,
    ) -> Vec<Emission<OrderMessage>> {
        if self.reached(Stage::Cooked, &order.reference)
            || !self.mark(Stage::Placed, &order.reference)
        {
            tracing::debug!(reference = %order.reference, "duplicate flow start");
            return Vec::new();
        }
        self.request_cooking(message, order)
    }

    fn on_cook_timed_out(
        &mut self,
        message: &OrderEnvelope,
        order: &OrderDocument,
    ) -> Vec<Emission<OrderMessage>> {
        if self.reached(Stage::Cooked, &order.reference) {
            return Vec::new();
        }
        metrics::counter!("saga_retries_total").increment(1);
        tracing::warn!(reference = %order.reference, "cook timed out; retrying");
        self.request_cooking(message, order)
    }

    fn on_food_cooked(
        &mut self,
        message: &OrderEnvelope,
        order: &OrderDocument,
    ) -> Vec<Emission<OrderMessage>> {
        if !self.mark(Stage::Cooked, &order.reference) {
            return Vec::new();
        }
        vec![forward(message, OrderMessage::PriceOrder(order.clone()))]
    }

    fn on_order_priced(
        &mut self,
        message: &OrderEnvelope,
        order: &OrderDocument,
    ) -> Vec<Emission<OrderMessage>> {
        if !self.mark(Stage::Priced, &order.reference) {
            return Vec::new();
        }
        vec![forward(message, OrderMessage::TakePayment(order.clone()))]
    }

    fn on_order_paid(
        &mut self,
        message: &OrderEnvelope,
        order: &OrderDocument,
    ) -> Vec<Emission<OrderMessage>> {
        if !self.mark(Stage::Paid, &order.reference) {
            return Vec::new();
        }
        vec![forward(message, OrderMessage::OrderCompleted(order.clone()))]
    }

    /// Schedules the timeout first, then sends the forward command.
    fn request_cooking(
        &self,
        message: &OrderEnvelope,
        order: &OrderDocument,
    ) -> Vec<Emission<OrderMessage>> {
        let timeout = Envelope::caused_by(message, OrderMessage::CookTimedOut(order.clone()));
        vec![
            forward(
                message,
                OrderMessage::delay(self.config.retry_after, topics::COOK_TIMED_OUT, timeout),
            ),
            forward(message, OrderMessage::CookFood(order.clone())),
        ]
    }
}

/// Wraps `payload` as caused by `cause`, addressed to its natural topic.
fn forward(cause: &OrderEnvelope, payload: OrderMessage) -> Emission<OrderMessage> {
    Emission::new(payload.topic(), Envelope::caused_by(cause, payload))
}

impl Saga<OrderMessage> for OrderFulfillment {
    fn handle(&mut self, message: &OrderEnvelope) -> Vec<Emission<OrderMessage>> {
        match &message.payload {
            OrderMessage::OrderPlaced(order) => self.on_order_placed(message, order),
            OrderMessage::CookTimedOut(order) => self.on_cook_timed_out(message, order),
            OrderMessage::FoodCooked(order) => self.on_food_cooked(message, order),
            OrderMessage::OrderPriced(order) => self.on_order_priced(message, order),
            OrderMessage::OrderPaid(order) => self.on_order_paid(message, order),
            OrderMessage::CookFood(_)
            | OrderMessage::PriceOrder(_)
            | OrderMessage::TakePayment(_)
            | OrderMessage::DelayPublish(_)
            | OrderMessage::OrderCompleted(_) => Vec::new(),
        }
    }
}
