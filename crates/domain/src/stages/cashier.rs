use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use message_bus::{Bus, Envelope, Handler, Payload, Probe, Reading};

use crate::document::OrderDocument;
use crate::error::{DomainError, Result};
use crate::messages::{OrderEnvelope, OrderMessage, topics};

#[derive(Default)]
struct Till {
    /// `TakePayment` commands by order reference.
    orders: HashMap<String, OrderEnvelope>,
    /// References in arrival order.
    arrivals: Vec<String>,
    processed: u64,
}

/// Holds orders awaiting payment and announces `OrderPaid` when paid.
///
/// Receives `TakePayment` from its worker thread and `pay` calls from the
/// driver, so the till is locked; publication happens after the lock is
/// released. `OrderCompleted` retires the paid order so the till only holds
/// orders in flight.
pub struct Cashier {
    bus: Arc<Bus<OrderEnvelope>>,
    till: Mutex<Till>,
}

impl Cashier {
    pub fn new(bus: Arc<Bus<OrderEnvelope>>) -> Self {
        Self {
            bus,
            till: Mutex::new(Till::default()),
        }
    }

    /// Marks the order paid and publishes `OrderPaid`.
    #[tracing::instrument(skip(self))]
    pub fn pay(&self, reference: &str) -> Result<OrderEnvelope> {
        let paid = {
            let mut till = self.lock();
            let command = till
                .orders
                .get_mut(reference)
                .ok_or_else(|| DomainError::UnknownOrder(reference.to_string()))?;
            let OrderMessage::TakePayment(order) = &mut command.payload else {
                return Err(DomainError::UnknownOrder(reference.to_string()));
            };
            if order.paid {
                return Err(DomainError::AlreadyPaid(reference.to_string()));
            }
            order.paid = true;
            let order = order.clone();
            let paid = Envelope::caused_by(command, OrderMessage::OrderPaid(order));
            till.processed += 1;
            paid
        };

        metrics::counter!("orders_paid_total").increment(1);
        tracing::info!(correlation_id = %paid.correlation_id, "order paid");
        self.bus.publish(topics::ORDER_PAID, paid.clone());
        Ok(paid)
    }

    /// Orders received for payment and not yet paid, in arrival order.
    pub fn outstanding_orders(&self) -> Vec<OrderDocument> {
        let till = self.lock();
        till.arrivals
            .iter()
            .filter_map(|reference| till.orders.get(reference))
            .filter_map(|command| command.payload.order())
            .filter(|order| !order.paid)
            .cloned()
            .collect()
    }

    /// Forgets a settled order.
    ///
    /// Only paid orders are dropped; an order still awaiting payment stays.
    pub fn retire(&self, reference: &str) -> bool {
        let mut till = self.lock();
        let paid = till
            .orders
            .get(reference)
            .and_then(|command| command.payload.order())
            .is_some_and(|order| order.paid);
        if paid {
            till.orders.remove(reference);
            till.arrivals.retain(|r| r != reference);
        }
        paid
    }

    /// Number of orders held, paid or not.
    pub fn held(&self) -> usize {
        self.lock().orders.len()
    }

    /// Number of payments taken.
    pub fn processed(&self) -> u64 {
        self.lock().processed
    }

    fn lock(&self) -> MutexGuard<'_, Till> {
        self.till.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Handler<OrderEnvelope> for Cashier {
    fn handle(&self, message: OrderEnvelope) -> message_bus::Result<()> {
        match &message.payload {
            OrderMessage::TakePayment(order) => {
                let reference = order.reference.clone();
                let mut till = self.lock();
                if till.orders.contains_key(&reference) {
                    tracing::debug!(%reference, "payment already requested; ignoring");
                    return Ok(());
                }
                tracing::debug!(%reference, total = %order.total(), "awaiting payment");
                till.arrivals.push(reference.clone());
                till.orders.insert(reference, message);
                Ok(())
            }
            OrderMessage::OrderCompleted(order) => {
                self.retire(&order.reference);
                Ok(())
            }
            other => Err(DomainError::UnexpectedMessage {
                stage: "cashier",
                kind: other.kind(),
            }
            .into()),
        }
    }

    fn name(&self) -> String {
        "cashier".to_string()
    }
}

impl Probe for Cashier {
    fn probe_name(&self) -> String {
        "cashier".to_string()
    }

    fn reading(&self) -> Reading {
        Reading {
            probe: self.probe_name(),
            measure: "processed",
            value: self.processed(),
        }
    }
}
