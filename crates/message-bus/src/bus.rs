//! Topic- and correlation-keyed synchronous multicast bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::CorrelationId;

use crate::envelope::Message;
use crate::handler::{SharedHandler, invoke, same_handler};
use crate::journal::MessageJournal;

/// Key a handler subscribes under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// A named topic such as `"cook_food"`.
    Topic(String),
    /// Every message of one workflow.
    Correlation(CorrelationId),
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Topic(topic) => write!(f, "{topic}"),
            Route::Correlation(id) => write!(f, "correlation:{id}"),
        }
    }
}

impl From<&str> for Route {
    fn from(topic: &str) -> Self {
        Route::Topic(topic.to_string())
    }
}

impl From<String> for Route {
    fn from(topic: String) -> Self {
        Route::Topic(topic)
    }
}

impl From<CorrelationId> for Route {
    fn from(id: CorrelationId) -> Self {
        Route::Correlation(id)
    }
}

/// Outcome of one publication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that processed the message.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl Delivery {
    /// Total number of handlers the message was offered to.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

type Registry<M> = HashMap<Route, Vec<SharedHandler<M>>>;

/// In-process publish/subscribe bus.
///
/// `publish` runs every matching handler synchronously on the calling thread:
/// first the handlers of the topic, then the handlers of the message's
/// correlation id. The registry lock is only held to copy the handler list,
/// never while a handler runs, so handlers may publish, subscribe and
/// unsubscribe re-entrantly.
pub struct Bus<M> {
    registry: RwLock<Registry<M>>,
    journal: Option<Arc<dyn MessageJournal<M>>>,
}

impl<M: Message> Default for Bus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message> Bus<M> {
    /// Creates a bus without a journal.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            journal: None,
        }
    }

    /// Creates a bus that records every publication in `journal` first.
    pub fn with_journal(journal: Arc<dyn MessageJournal<M>>) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            journal: Some(journal),
        }
    }

    /// Registers `handler` under `route`.
    ///
    /// Returns false (and changes nothing) if this handler instance is already
    /// registered for the route.
    pub fn subscribe(&self, route: impl Into<Route>, handler: SharedHandler<M>) -> bool {
        let route = route.into();
        let mut registry = self.write();
        let added = add_binding(&mut registry, route.clone(), handler);
        if !added {
            tracing::debug!(%route, "handler already subscribed");
        }
        added
    }

    /// Removes `handler` from `route`. Returns false if it was not registered.
    pub fn unsubscribe(&self, route: impl Into<Route>, handler: &SharedHandler<M>) -> bool {
        let route = route.into();
        let mut registry = self.write();
        let Some(handlers) = registry.get_mut(&route) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|h| !same_handler(h, handler));
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            registry.remove(&route);
        }
        removed
    }

    /// Registers a batch of bindings under a single registry write.
    ///
    /// Returns the number of bindings that were added (duplicates are skipped).
    pub fn install(&self, bindings: Vec<(Route, SharedHandler<M>)>) -> usize {
        let mut registry = self.write();
        bindings
            .into_iter()
            .filter(|(route, handler)| add_binding(&mut registry, route.clone(), handler.clone()))
            .count()
    }

    /// Publishes `message` on `topic` and on the message's correlation id.
    ///
    /// A failing or panicking handler is logged and counted; delivery to the
    /// remaining handlers continues.
    pub fn publish(&self, topic: &str, message: M) -> Delivery {
        let kind = message.kind();
        let correlation_id = message.correlation_id();
        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        tracing::debug!(topic, kind, %correlation_id, message_id = %message.message_id(), "publish");

        if let Some(journal) = &self.journal
            && let Err(err) = journal.append(topic, &message)
        {
            tracing::warn!(topic, kind, error = %err, "journal append failed");
        }

        let mut delivery = Delivery::default();

        let topic_handlers = self.handlers_for(&Route::Topic(topic.to_string()));
        deliver(&topic_handlers, &message, topic, &mut delivery);

        // Read after the topic phase: a handler above may have just subscribed
        // to this correlation id (a saga router creating an instance).
        let correlation_handlers = self.handlers_for(&Route::Correlation(correlation_id));
        deliver(&correlation_handlers, &message, topic, &mut delivery);

        delivery
    }

    /// Number of routes with at least one handler.
    pub fn route_count(&self) -> usize {
        self.read().len()
    }

    /// Number of handlers registered under `route`.
    pub fn handler_count(&self, route: impl Into<Route>) -> usize {
        self.read().get(&route.into()).map_or(0, Vec::len)
    }

    /// Drops every registration.
    ///
    /// Components usually hold the bus and the bus holds them; clearing at
    /// shutdown breaks those cycles.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn handlers_for(&self, route: &Route) -> Vec<SharedHandler<M>> {
        self.read().get(route).cloned().unwrap_or_default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry<M>> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry<M>> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn add_binding<M>(registry: &mut Registry<M>, route: Route, handler: SharedHandler<M>) -> bool {
    let handlers = registry.entry(route).or_default();
    if handlers.iter().any(|h| same_handler(h, &handler)) {
        return false;
    }
    handlers.push(handler);
    true
}

fn deliver<M: Message>(
    handlers: &[SharedHandler<M>],
    message: &M,
    topic: &str,
    delivery: &mut Delivery,
) {
    for handler in handlers {
        match invoke(handler.as_ref(), message.clone()) {
            Ok(()) => delivery.delivered += 1,
            Err(err) => {
                delivery.failed += 1;
                metrics::counter!("bus_handler_failures_total", "topic" => topic.to_string())
                    .increment(1);
                tracing::error!(
                    topic,
                    handler = %handler.name(),
                    kind = message.kind(),
                    correlation_id = %message.correlation_id(),
                    error = %err,
                    "handler failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::envelope::fixtures::*;
    use crate::envelope::{Envelope, Message as _};
    use crate::error::Result;
    use crate::handler::recording::{Failing, Panicking, Recorder};
    use crate::handler::{Handler, handler_fn};
    use crate::journal::InMemoryJournal;

    type Msg = Envelope<Ping>;

    fn shared(handler: Arc<Recorder<Msg>>) -> SharedHandler<Msg> {
        handler
    }

    #[test]
    fn publish_to_topic_without_subscribers_is_noop() {
        let bus: Bus<Msg> = Bus::new();
        let delivery = bus.publish("nobody", ping(1));
        assert_eq!(delivery, Delivery::default());
    }

    #[test]
    fn publish_reaches_topic_then_correlation_handlers() {
        let bus: Bus<Msg> = Bus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let message = ping(1);

        let o = order.clone();
        bus.subscribe(
            message.correlation_id,
            Arc::new(handler_fn("by-correlation", move |_: Msg| {
                o.lock().unwrap().push("correlation");
                Ok(())
            })),
        );
        let o = order.clone();
        bus.subscribe(
            "topic",
            Arc::new(handler_fn("by-topic", move |_: Msg| {
                o.lock().unwrap().push("topic");
                Ok(())
            })),
        );

        let delivery = bus.publish("topic", message);
        assert_eq!(delivery.delivered, 2);
        assert_eq!(*order.lock().unwrap(), vec!["topic", "correlation"]);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus: Bus<Msg> = Bus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let o = order.clone();
            bus.subscribe(
                "t",
                Arc::new(handler_fn(name, move |_: Msg| {
                    o.lock().unwrap().push(name);
                    Ok(())
                })),
            );
        }
        bus.publish("t", ping(1));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn duplicate_subscribe_is_rejected() {
        let bus: Bus<Msg> = Bus::new();
        let recorder = Recorder::new("r");
        let handler = shared(recorder.clone());

        assert!(bus.subscribe("t", handler.clone()));
        assert!(!bus.subscribe("t", handler.clone()));
        assert_eq!(bus.handler_count("t"), 1);

        bus.publish("t", ping(1));
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let bus: Bus<Msg> = Bus::new();
        let a = Recorder::new("a");
        let b = Recorder::new("b");
        let a_shared = shared(a.clone());
        bus.subscribe("t", a_shared.clone());
        bus.subscribe("t", shared(b.clone()));

        assert!(bus.unsubscribe("t", &a_shared));
        assert!(!bus.unsubscribe("t", &a_shared));
        bus.publish("t", ping(1));

        assert_eq!(a.count(), 0);
        assert_eq!(b.count(), 1);
    }

    #[test]
    fn unsubscribing_last_handler_drops_the_route() {
        let bus: Bus<Msg> = Bus::new();
        let a = shared(Recorder::new("a"));
        let cid = CorrelationId::new();
        bus.subscribe(cid, a.clone());
        assert_eq!(bus.route_count(), 1);

        bus.unsubscribe(cid, &a);
        assert_eq!(bus.route_count(), 0);
        assert!(!bus.unsubscribe("never-registered", &a));
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_block_others() {
        let bus: Bus<Msg> = Bus::new();
        let after = Recorder::new("after");
        bus.subscribe("t", Arc::new(Failing));
        bus.subscribe("t", Arc::new(Panicking));
        bus.subscribe("t", shared(after.clone()));

        let delivery = bus.publish("t", ping(1));
        assert_eq!(delivery.failed, 2);
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.attempted(), 3);
        assert_eq!(after.count(), 1);
    }

    /// Subscribes a recorder to the correlation id of whatever it sees.
    struct SubscribesOnSight {
        bus: Arc<Bus<Msg>>,
        follower: SharedHandler<Msg>,
    }

    impl Handler<Msg> for SubscribesOnSight {
        fn handle(&self, message: Msg) -> Result<()> {
            self.bus
                .subscribe(message.correlation_id(), self.follower.clone());
            Ok(())
        }
    }

    #[test]
    fn correlation_subscription_made_during_topic_phase_sees_the_message() {
        let bus = Arc::new(Bus::<Msg>::new());
        let follower = Recorder::new("follower");
        bus.subscribe(
            "start",
            Arc::new(SubscribesOnSight {
                bus: bus.clone(),
                follower: shared(follower.clone()),
            }),
        );

        let start = ping(1);
        bus.publish("start", start.clone());
        bus.publish("other", Envelope::caused_by(&start, Ping::Ping(2)));

        let seen: Vec<_> = follower.seen().iter().filter_map(value).collect();
        assert_eq!(seen, vec![1, 2]);
        bus.clear();
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = Arc::new(Bus::<Msg>::new());
        let sink = Recorder::new("sink");
        bus.subscribe("sink", shared(sink.clone()));

        let inner = bus.clone();
        bus.subscribe(
            "relay",
            Arc::new(handler_fn("relay", move |m: Msg| {
                inner.publish("sink", Envelope::caused_by(&m, Ping::Ping(99)));
                Ok(())
            })),
        );

        bus.publish("relay", ping(1));
        assert_eq!(sink.count(), 1);
        bus.clear();
    }

    #[test]
    fn journal_records_before_fan_out() {
        let journal = InMemoryJournal::new();
        let bus: Bus<Msg> = Bus::with_journal(Arc::new(journal.clone()));
        bus.publish("nobody-listens", ping(1));
        bus.publish("nobody-listens", ping(2));

        let entries = journal.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].topic, "nobody-listens");
    }

    #[test]
    fn concurrent_publish_and_subscribe_do_not_race() {
        let bus = Arc::new(Bus::<Msg>::new());
        let recorder = Recorder::new("r");
        bus.subscribe("t", shared(recorder.clone()));

        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        bus.publish("t", ping(n));
                    }
                })
            })
            .collect();
        let churn = {
            let bus = bus.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let h = shared(Recorder::new("churn"));
                    bus.subscribe("t", h.clone());
                    bus.unsubscribe("t", &h);
                }
            })
        };

        for p in publishers {
            p.join().unwrap();
        }
        churn.join().unwrap();
        assert_eq!(recorder.count(), 400);
        assert_eq!(bus.handler_count("t"), 1);
    }
}
