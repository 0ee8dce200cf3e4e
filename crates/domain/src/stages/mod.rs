//! Business stages of the kitchen.
//!
//! Each stage handles one command and publishes the follow-up event. Stages
//! that keep state are meant to sit behind exactly one queue worker; the
//! cashier is also called from the driver and guards its own table.

mod assistant_manager;
mod cashier;
mod cook;
mod printer;
mod waiter;

pub use assistant_manager::{AssistantManager, LINE_PRICE};
pub use cashier::Cashier;
pub use cook::{Cook, CookedLedger, RECIPE_COOK_TIME_SECS};
pub use printer::OrderPrinter;
pub use waiter::Waiter;
