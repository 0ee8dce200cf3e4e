pub mod health;
pub mod observability;
pub mod orders;
