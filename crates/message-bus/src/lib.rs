//! In-process message bus for correlated workflows.
//!
//! Messages are published on a topic and delivered synchronously to every
//! handler subscribed to that topic, then to every handler subscribed to the
//! message's correlation id. Queue workers turn that synchronous fan-out into
//! asynchronous, serialized execution on dedicated threads; dispatch
//! strategies spread work across several workers; the alarm clock provides
//! delayed delivery for timeout-driven retries.

pub mod alarm;
pub mod bus;
#[cfg(any(test, feature = "chaos"))]
pub mod chaos;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod journal;
pub mod monitor;
pub mod processor;
pub mod topology;
pub mod worker;

pub use alarm::AlarmClock;
pub use bus::{Bus, Delivery, Route};
#[cfg(any(test, feature = "chaos"))]
pub use chaos::Chaos;
pub use common::{CorrelationId, MessageId};
pub use dispatch::{Broadcast, LoadAware, RoundRobin};
pub use envelope::{Deferred, Envelope, Message, MessageClass, Payload};
pub use error::{BusError, Result};
pub use handler::{FnHandler, Handler, SharedHandler, handler_fn};
pub use journal::{InMemoryJournal, JournalEntry, MessageJournal};
pub use monitor::{Monitor, Probe, Reading};
pub use processor::{Lifecycle, Processor};
pub use topology::Topology;
pub use worker::{CapacitySignal, QueueWorker};
