use std::sync::Arc;

use message_bus::{Bus, Envelope, Handler, Payload};

use crate::document::Money;
use crate::error::DomainError;
use crate::messages::{OrderEnvelope, OrderMessage, topics};

/// Unit price applied to every line.
pub const LINE_PRICE: Money = Money::from_cents(1200);

/// Prices every line of an order and announces `OrderPriced`.
pub struct AssistantManager {
    bus: Arc<Bus<OrderEnvelope>>,
}

impl AssistantManager {
    pub fn new(bus: Arc<Bus<OrderEnvelope>>) -> Self {
        Self { bus }
    }
}

impl Handler<OrderEnvelope> for AssistantManager {
    fn handle(&self, message: OrderEnvelope) -> message_bus::Result<()> {
        let OrderMessage::PriceOrder(order) = &message.payload else {
            return Err(DomainError::UnexpectedMessage {
                stage: "assistant-manager",
                kind: message.payload.kind(),
            }
            .into());
        };

        let mut order = order.clone();
        for line in &mut order.lines {
            line.price = Some(LINE_PRICE);
        }
        tracing::debug!(reference = %order.reference, total = %order.total(), "order priced");

        let priced = Envelope::caused_by(&message, OrderMessage::OrderPriced(order));
        self.bus.publish(topics::ORDER_PRICED, priced);
        Ok(())
    }

    fn name(&self) -> String {
        "assistant-manager".to_string()
    }
}
