//! Kitchen domain: the order document, the messages exchanged about it and
//! the business stages that enrich it.
//!
//! - `OrderDocument` with priced lines and pass-through fields
//! - `OrderMessage`, the closed set of commands and events, and topic names
//! - Stages: waiter, cooks, assistant manager, cashier, printer

pub mod document;
pub mod error;
pub mod messages;
pub mod stages;

pub use document::{Ingredient, Money, OrderDocument, OrderLine};
pub use error::DomainError;
pub use messages::{OrderEnvelope, OrderMessage, topics};
pub use stages::{
    AssistantManager, Cashier, Cook, CookedLedger, LINE_PRICE, OrderPrinter, Waiter,
};
