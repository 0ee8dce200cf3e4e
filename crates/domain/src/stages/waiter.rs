use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use message_bus::{Bus, Envelope, Handler};

use crate::document::OrderDocument;
use crate::error::{DomainError, Result};
use crate::messages::{OrderEnvelope, OrderMessage, topics};

/// Starts a new flow for every order it takes.
///
/// Keeps the references of orders in flight so a reference is never used by
/// two flows at once. Bound to `order_completed`, it forgets a reference
/// when its flow completes.
pub struct Waiter {
    bus: Arc<Bus<OrderEnvelope>>,
    open: Mutex<HashSet<String>>,
}

impl Waiter {
    pub fn new(bus: Arc<Bus<OrderEnvelope>>) -> Self {
        Self {
            bus,
            open: Mutex::new(HashSet::new()),
        }
    }

    /// Publishes `OrderPlaced` with a fresh correlation id and returns it.
    ///
    /// Fails with [`DomainError::DuplicateOrder`] while an order with the same
    /// reference is still in flight.
    #[tracing::instrument(skip(self, order), fields(reference = %order.reference))]
    pub fn place_order(&self, order: OrderDocument) -> Result<OrderEnvelope> {
        if !self.lock().insert(order.reference.clone()) {
            tracing::warn!("reference already in flight");
            return Err(DomainError::DuplicateOrder(order.reference));
        }

        let placed = Envelope::start(OrderMessage::OrderPlaced(order));
        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(correlation_id = %placed.correlation_id, "order placed");
        self.bus.publish(topics::ORDER_PLACED, placed.clone());
        Ok(placed)
    }

    /// Number of orders placed and not yet completed.
    pub fn open_orders(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Handler<OrderEnvelope> for Waiter {
    fn handle(&self, message: OrderEnvelope) -> message_bus::Result<()> {
        if let OrderMessage::OrderCompleted(order) = &message.payload {
            self.lock().remove(&order.reference);
        }
        Ok(())
    }

    fn name(&self) -> String {
        "waiter".to_string()
    }
}
