//! Message envelope: identity and causal metadata carried by every message.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{CorrelationId, MessageId};
use serde::{Deserialize, Serialize};

/// Whether a message asks for something to happen or records that it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageClass {
    /// Imperative, addressed to one logical stage.
    Command,
    /// A fact that already happened.
    Event,
}

impl std::fmt::Display for MessageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageClass::Command => write!(f, "Command"),
            MessageClass::Event => write!(f, "Event"),
        }
    }
}

/// A request to publish `message` on `topic` once `delay` has elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deferred<M> {
    /// How long to wait before publishing.
    pub delay: Duration,
    /// Topic the message is published on when it fires.
    pub topic: String,
    /// The message to publish.
    pub message: Box<M>,
}

impl<M> Deferred<M> {
    /// Creates a delayed delivery request.
    pub fn new(delay: Duration, topic: impl Into<String>, message: M) -> Self {
        Self {
            delay,
            topic: topic.into(),
            message: Box::new(message),
        }
    }
}

/// The closed set of message kinds a deployment exchanges.
///
/// Implemented by an enum in the domain layer; the bus only needs the kind
/// name, the command/event tag and access to delayed-delivery requests.
pub trait Payload: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Stable kind name (e.g. `"CookFood"`).
    fn kind(&self) -> &'static str;

    /// Command or event.
    fn class(&self) -> MessageClass;

    /// Returns the delayed-delivery request carried by this payload, if any.
    fn deferred(&self) -> Option<&Deferred<Envelope<Self>>> {
        None
    }
}

/// Capability every routed message exposes to the bus.
pub trait Message: Clone + Send + Sync + 'static {
    fn message_id(&self) -> MessageId;
    fn correlation_id(&self) -> CorrelationId;
    fn causation_id(&self) -> Option<MessageId>;
    fn kind(&self) -> &'static str;
}

/// Envelope around a payload with its identity and causal chain.
///
/// Invariant: every envelope except a flow start has a causation id, and
/// following causation ids back always ends at exactly one flow start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Unique identifier for this message.
    pub message_id: MessageId,

    /// Workflow this message belongs to.
    pub correlation_id: CorrelationId,

    /// Message whose handling produced this one (absent for a flow start).
    pub causation_id: Option<MessageId>,

    /// When the envelope was created.
    pub created_at: DateTime<Utc>,

    /// The command or event itself.
    pub payload: P,
}

impl<P> Envelope<P> {
    /// Starts a new flow: fresh correlation id and no causation.
    pub fn start(payload: P) -> Self {
        Self {
            message_id: MessageId::new(),
            correlation_id: CorrelationId::new(),
            causation_id: None,
            created_at: Utc::now(),
            payload,
        }
    }

    /// Creates a message produced while handling `cause`.
    pub fn caused_by<Q>(cause: &Envelope<Q>, payload: P) -> Self {
        Self {
            message_id: MessageId::new(),
            correlation_id: cause.correlation_id,
            causation_id: Some(cause.message_id),
            created_at: Utc::now(),
            payload,
        }
    }

    /// Overrides the generated message id.
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = message_id;
        self
    }

    /// Returns true if this message started its flow.
    pub fn is_flow_start(&self) -> bool {
        self.causation_id.is_none()
    }
}

impl<P: Payload> Envelope<P> {
    /// Stable kind name of the payload.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// Command or event.
    pub fn class(&self) -> MessageClass {
        self.payload.class()
    }
}

impl<P: Payload> Message for Envelope<P> {
    fn message_id(&self) -> MessageId {
        self.message_id
    }

    fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    fn causation_id(&self) -> Option<MessageId> {
        self.causation_id
    }

    fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}
