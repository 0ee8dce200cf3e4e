//! Shared types used across the bus, domain and saga crates.

pub mod types;

pub use types::{CorrelationId, MessageId};
