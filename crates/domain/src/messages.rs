//! Commands and events exchanged by the kitchen.

use std::time::Duration;

use message_bus::{Deferred, Envelope, MessageClass, Payload};
use serde::{Deserialize, Serialize};

use crate::document::OrderDocument;

/// Bus topic names.
pub mod topics {
    pub const ORDER_PLACED: &str = "order_placed";
    pub const COOK_FOOD: &str = "cook_food";
    pub const ORDER_COOKED: &str = "order_cooked";
    pub const PRICE_ORDER: &str = "price_order";
    pub const ORDER_PRICED: &str = "order_priced";
    pub const TAKE_PAYMENT: &str = "take_payment";
    pub const ORDER_PAID: &str = "order_paid";
    pub const COOK_TIMED_OUT: &str = "cook_timed_out";
    pub const ORDER_COMPLETED: &str = "order_completed";
    pub const DELAY_PUBLISH: &str = "delay_publish";
}

/// Every message kind the kitchen understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderMessage {
    // Commands
    CookFood(OrderDocument),
    PriceOrder(OrderDocument),
    TakePayment(OrderDocument),
    DelayPublish(Deferred<OrderEnvelope>),

    // Events
    OrderPlaced(OrderDocument),
    FoodCooked(OrderDocument),
    OrderPriced(OrderDocument),
    OrderPaid(OrderDocument),
    CookTimedOut(OrderDocument),
    OrderCompleted(OrderDocument),
}

/// An [`OrderMessage`] with its identity and causal metadata.
pub type OrderEnvelope = Envelope<OrderMessage>;

impl OrderMessage {
    /// Wraps `message` in a request to publish it on `topic` after `delay`.
    pub fn delay(delay: Duration, topic: impl Into<String>, message: OrderEnvelope) -> Self {
        OrderMessage::DelayPublish(Deferred::new(delay, topic, message))
    }

    /// Topic this message is normally published on.
    pub fn topic(&self) -> &'static str {
        match self {
            OrderMessage::CookFood(_) => topics::COOK_FOOD,
            OrderMessage::PriceOrder(_) => topics::PRICE_ORDER,
            OrderMessage::TakePayment(_) => topics::TAKE_PAYMENT,
            OrderMessage::DelayPublish(_) => topics::DELAY_PUBLISH,
            OrderMessage::OrderPlaced(_) => topics::ORDER_PLACED,
            OrderMessage::FoodCooked(_) => topics::ORDER_COOKED,
            OrderMessage::OrderPriced(_) => topics::ORDER_PRICED,
            OrderMessage::OrderPaid(_) => topics::ORDER_PAID,
            OrderMessage::CookTimedOut(_) => topics::COOK_TIMED_OUT,
            OrderMessage::OrderCompleted(_) => topics::ORDER_COMPLETED,
        }
    }

    /// The order carried by order-based messages.
    pub fn order(&self) -> Option<&OrderDocument> {
        match self {
            OrderMessage::CookFood(order)
            | OrderMessage::PriceOrder(order)
            | OrderMessage::TakePayment(order)
            | OrderMessage::OrderPlaced(order)
            | OrderMessage::FoodCooked(order)
            | OrderMessage::OrderPriced(order)
            | OrderMessage::OrderPaid(order)
            | OrderMessage::CookTimedOut(order)
            | OrderMessage::OrderCompleted(order) => Some(order),
            OrderMessage::DelayPublish(_) => None,
        }
    }

    /// Consumes the message, returning its order.
    pub fn into_order(self) -> Option<OrderDocument> {
        match self {
            OrderMessage::CookFood(order)
            | OrderMessage::PriceOrder(order)
            | OrderMessage::TakePayment(order)
            | OrderMessage::OrderPlaced(order)
            | OrderMessage::FoodCooked(order)
            | OrderMessage::OrderPriced(order)
            | OrderMessage::OrderPaid(order)
            | OrderMessage::CookTimedOut(order)
            | OrderMessage::OrderCompleted(order) => Some(order),
            OrderMessage::DelayPublish(_) => None,
        }
    }

    /// Reference of the carried order.
    pub fn reference(&self) -> Option<&str> {
        self.order().map(|order| order.reference.as_str())
    }
}

impl Payload for OrderMessage {
    fn kind(&self) -> &'static str {
        match self {
            OrderMessage::CookFood(_) => "CookFood",
            OrderMessage::PriceOrder(_) => "PriceOrder",
            OrderMessage::TakePayment(_) => "TakePayment",
            OrderMessage::DelayPublish(_) => "DelayPublish",
            OrderMessage::OrderPlaced(_) => "OrderPlaced",
            OrderMessage::FoodCooked(_) => "FoodCooked",
            OrderMessage::OrderPriced(_) => "OrderPriced",
            OrderMessage::OrderPaid(_) => "OrderPaid",
            OrderMessage::CookTimedOut(_) => "CookTimedOut",
            OrderMessage::OrderCompleted(_) => "OrderCompleted",
        }
    }

    fn class(&self) -> MessageClass {
        match self {
            OrderMessage::CookFood(_)
            | OrderMessage::PriceOrder(_)
            | OrderMessage::TakePayment(_)
            | OrderMessage::DelayPublish(_) => MessageClass::Command,
            OrderMessage::OrderPlaced(_)
            | OrderMessage::FoodCooked(_)
            | OrderMessage::OrderPriced(_)
            | OrderMessage::OrderPaid(_)
            | OrderMessage::CookTimedOut(_)
            | OrderMessage::OrderCompleted(_) => MessageClass::Event,
        }
    }

    fn deferred(&self) -> Option<&Deferred<OrderEnvelope>> {
        match self {
            OrderMessage::DelayPublish(deferred) => Some(deferred),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pizza() -> OrderDocument {
        OrderDocument::new("ABC-1").with_line("Cheese Pizza", 1)
    }

    #[test]
    fn test_commands_and_events_are_tagged() {
        assert_eq!(OrderMessage::CookFood(pizza()).class(), MessageClass::Command);
        assert_eq!(OrderMessage::OrderPlaced(pizza()).class(), MessageClass::Event);
        assert_eq!(OrderMessage::FoodCooked(pizza()).topic(), topics::ORDER_COOKED);
        assert_eq!(OrderMessage::FoodCooked(pizza()).kind(), "FoodCooked");
    }

    #[test]
    fn test_delay_publish_exposes_the_wrapped_message() {
        let placed = Envelope::start(OrderMessage::OrderPlaced(pizza()));
        let timeout = Envelope::caused_by(&placed, OrderMessage::CookTimedOut(pizza()));
        let delay = Envelope::caused_by(
            &placed,
            OrderMessage::delay(Duration::from_secs(5), topics::COOK_TIMED_OUT, timeout.clone()),
        );

        assert_eq!(delay.payload.reference(), None);
        let deferred = delay.payload.deferred().unwrap();
        assert_eq!(deferred.topic, topics::COOK_TIMED_OUT);
        assert_eq!(deferred.delay, Duration::from_secs(5));
        assert_eq!(deferred.message.message_id, timeout.message_id);
        assert_eq!(deferred.message.correlation_id, placed.correlation_id);
    }

    #[test]
    fn test_envelope_serialization() {
        let placed = Envelope::start(OrderMessage::OrderPlaced(pizza()));
        let json = serde_json::to_value(&placed).unwrap();

        assert_eq!(json["payload"]["type"], "OrderPlaced");
        assert_eq!(json["payload"]["data"]["reference"], "ABC-1");

        let back: OrderEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back.message_id, placed.message_id);
        assert_eq!(back.payload.reference(), Some("ABC-1"));
    }
}
