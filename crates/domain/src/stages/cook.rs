use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use message_bus::{Bus, Envelope, Handler, Payload};

use crate::document::{Ingredient, OrderDocument};
use crate::error::DomainError;
use crate::messages::{OrderEnvelope, OrderMessage, topics};

/// Cooking time written on every cooked order.
pub const RECIPE_COOK_TIME_SECS: u32 = 600;

enum Claim {
    Fresh,
    InProgress,
    Done(OrderDocument),
}

/// Orders already taken by any cook, shared by all cooks of a kitchen.
///
/// `None` marks an order being cooked; `Some` holds the cooked result.
/// Bound to `order_completed`, the ledger drops entries of finished flows.
#[derive(Clone, Default)]
pub struct CookedLedger {
    entries: Arc<Mutex<HashMap<String, Option<OrderDocument>>>>,
}

impl CookedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cooked(&self, reference: &str) -> bool {
        matches!(self.lock().get(reference), Some(Some(_)))
    }

    /// Number of orders taken so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets an order once its flow has completed.
    pub fn retire(&self, reference: &str) -> bool {
        self.lock().remove(reference).is_some()
    }

    fn claim(&self, reference: &str) -> Claim {
        let mut entries = self.lock();
        match entries.get(reference) {
            Some(Some(cooked)) => Claim::Done(cooked.clone()),
            Some(None) => Claim::InProgress,
            None => {
                entries.insert(reference.to_string(), None);
                Claim::Fresh
            }
        }
    }

    fn finish(&self, order: &OrderDocument) {
        self.lock()
            .insert(order.reference.clone(), Some(order.clone()));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Option<OrderDocument>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Handler<OrderEnvelope> for CookedLedger {
    fn handle(&self, message: OrderEnvelope) -> message_bus::Result<()> {
        if let OrderMessage::OrderCompleted(order) = &message.payload
            && self.retire(&order.reference)
        {
            tracing::debug!(reference = %order.reference, "ledger entry retired");
        }
        Ok(())
    }

    fn name(&self) -> String {
        "cooked-ledger".to_string()
    }
}

/// Cooks an order (blocking for its cook time) and announces `FoodCooked`.
///
/// Idempotent per order reference: a repeated `CookFood` for an order that is
/// still being cooked is ignored; one for an order already cooked re-announces
/// the cooked result without cooking again.
pub struct Cook {
    name: String,
    cook_time: Duration,
    bus: Arc<Bus<OrderEnvelope>>,
    ledger: CookedLedger,
}

impl Cook {
    pub fn new(
        name: impl Into<String>,
        cook_time: Duration,
        bus: Arc<Bus<OrderEnvelope>>,
        ledger: CookedLedger,
    ) -> Self {
        Self {
            name: name.into(),
            cook_time,
            bus,
            ledger,
        }
    }

    fn announce(&self, command: &OrderEnvelope, order: OrderDocument) {
        let cooked = Envelope::caused_by(command, OrderMessage::FoodCooked(order));
        self.bus.publish(topics::ORDER_COOKED, cooked);
    }
}

impl Handler<OrderEnvelope> for Cook {
    #[tracing::instrument(skip(self, message), fields(cook = %self.name))]
    fn handle(&self, message: OrderEnvelope) -> message_bus::Result<()> {
        let OrderMessage::CookFood(order) = &message.payload else {
            return Err(DomainError::UnexpectedMessage {
                stage: "cook",
                kind: message.payload.kind(),
            }
            .into());
        };

        match self.ledger.claim(&order.reference) {
            Claim::InProgress => {
                tracing::debug!(reference = %order.reference, "already cooking; ignoring");
                return Ok(());
            }
            Claim::Done(cooked) => {
                metrics::counter!("cook_duplicates_total").increment(1);
                tracing::info!(reference = %order.reference, "already cooked; re-announcing");
                self.announce(&message, cooked);
                return Ok(());
            }
            Claim::Fresh => {}
        }

        thread::sleep(self.cook_time);

        let mut order = order.clone();
        order.ingredients = vec![Ingredient::new("cheese", 3), Ingredient::new("mustard", 5)];
        order.cook_time_secs = Some(RECIPE_COOK_TIME_SECS);
        order.cooked_by = Some(self.name.clone());
        order.cooked = true;
        self.ledger.finish(&order);

        metrics::counter!("orders_cooked_total", "cook" => self.name.clone()).increment(1);
        tracing::info!(reference = %order.reference, "food cooked");
        self.announce(&message, order);
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
