//! Saga instance contract.

use message_bus::Envelope;

/// A message a saga wants published, and where.
#[derive(Debug, Clone)]
pub struct Emission<P> {
    pub topic: String,
    pub message: Envelope<P>,
}

impl<P> Emission<P> {
    pub fn new(topic: impl Into<String>, message: Envelope<P>) -> Self {
        Self {
            topic: topic.into(),
            message,
        }
    }
}

/// One in-flight workflow.
///
/// A saga sees every message of its workflow and answers with the messages
/// to publish next. It never publishes itself: the router publishes the
/// emissions after releasing the instance, so the saga's own follow-ups can
/// come back to it through the bus without deadlocking. Messages a saga does
/// not react to yield no emissions.
pub trait Saga<P>: Send + 'static {
    fn handle(&mut self, message: &Envelope<P>) -> Vec<Emission<P>>;
}
