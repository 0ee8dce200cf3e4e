//! Saga (process manager) layer for correlated workflows.
//!
//! A [`SagaRouter`] creates one saga instance per flow-start message, binds
//! it to the bus under the flow's correlation id and discards it when the
//! flow completes. [`OrderFulfillment`] drives an order through cooking,
//! pricing and payment, retrying cooking on timeout and absorbing repeated
//! deliveries.

pub mod config;
pub mod error;
pub mod order_fulfillment;
pub mod router;
pub mod saga;

pub use config::SagaConfig;
pub use error::{Result, SagaError};
pub use order_fulfillment::{OrderFulfillment, OrderRouter, Stage, order_router};
pub use router::SagaRouter;
pub use saga::{Emission, Saga};
