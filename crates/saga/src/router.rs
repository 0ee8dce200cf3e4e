//! Saga router: one saga instance per workflow, bound to the bus by
//! correlation id for the workflow's lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use common::CorrelationId;
use message_bus::{Bus, Envelope, Handler, Payload, Probe, Reading, SharedHandler};

use crate::error::{Result, SagaError};
use crate::saga::Saga;

type Instances<S> = HashMap<CorrelationId, Arc<Mutex<S>>>;
type Factory<P, S> = Box<dyn Fn(&Envelope<P>) -> S + Send + Sync>;

struct RouterInner<P: Payload, S> {
    bus: Arc<Bus<Envelope<P>>>,
    factory: Factory<P, S>,
    instances: Mutex<Instances<S>>,
    /// The one relay handler, subscribed once per live correlation id.
    relay: SharedHandler<Envelope<P>>,
}

/// Creates a saga for every flow-start message, relays each later message of
/// that flow to it, and discards it when the flow completes.
///
/// Cloning yields another handle to the same router.
pub struct SagaRouter<P: Payload, S> {
    inner: Arc<RouterInner<P, S>>,
}

impl<P: Payload, S> Clone for SagaRouter<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, S> SagaRouter<P, S>
where
    P: Payload,
    S: Saga<P>,
{
    /// Creates a router that builds instances with `factory`.
    pub fn new<F>(bus: Arc<Bus<Envelope<P>>>, factory: F) -> Self
    where
        F: Fn(&Envelope<P>) -> S + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<RouterInner<P, S>>| RouterInner {
            bus,
            factory: Box::new(factory),
            instances: Mutex::new(HashMap::new()),
            relay: Arc::new(Relay {
                router: weak.clone(),
            }),
        });
        Self { inner }
    }

    /// Creates and binds a saga for the flow `message` starts.
    ///
    /// Returns `Ok(false)` if a saga for this correlation id is already live,
    /// so a duplicated flow start is absorbed.
    #[tracing::instrument(skip(self, message), fields(correlation_id = %message.correlation_id))]
    pub fn handle_start(&self, message: &Envelope<P>) -> Result<bool> {
        if !message.is_flow_start() {
            return Err(SagaError::NotAFlowStart {
                kind: message.kind(),
            });
        }

        let correlation_id = message.correlation_id;
        {
            let mut instances = self.inner.lock();
            if instances.contains_key(&correlation_id) {
                tracing::debug!("saga already live; ignoring flow start");
                return Ok(false);
            }
            let saga = (self.inner.factory)(message);
            instances.insert(correlation_id, Arc::new(Mutex::new(saga)));
            metrics::gauge!("sagas_active").set(instances.len() as f64);
        }

        self.inner
            .bus
            .subscribe(correlation_id, self.inner.relay.clone());
        metrics::counter!("sagas_started_total").increment(1);
        tracing::info!("saga started");
        Ok(true)
    }

    /// Forwards `message` to its flow's saga and publishes what it emits.
    ///
    /// A message for a flow with no live saga is dropped silently: the flow
    /// has already completed.
    pub fn relay(&self, message: Envelope<P>) {
        self.inner.relay(message);
    }

    /// Discards the saga of the completed flow and its subscription.
    ///
    /// Returns false if no saga was live for the flow.
    #[tracing::instrument(skip(self, message), fields(correlation_id = %message.correlation_id))]
    pub fn handle_completion(&self, message: &Envelope<P>) -> bool {
        let correlation_id = message.correlation_id;
        let removed = {
            let mut instances = self.inner.lock();
            let removed = instances.remove(&correlation_id).is_some();
            metrics::gauge!("sagas_active").set(instances.len() as f64);
            removed
        };
        if !removed {
            tracing::debug!("no live saga for completed flow");
            return false;
        }

        self.inner
            .bus
            .unsubscribe(correlation_id, &self.inner.relay);
        metrics::counter!("sagas_completed_total").increment(1);
        tracing::info!("saga completed");
        true
    }

    /// Number of live sagas.
    pub fn count(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn contains(&self, correlation_id: CorrelationId) -> bool {
        self.inner.lock().contains_key(&correlation_id)
    }

    /// Handler that starts sagas; subscribe it to the flow-start topic.
    pub fn start_handler(&self) -> SharedHandler<Envelope<P>> {
        Arc::new(StartHandler {
            router: Arc::downgrade(&self.inner),
        })
    }

    /// Handler that ends sagas; subscribe it to the completion topic.
    pub fn completion_handler(&self) -> SharedHandler<Envelope<P>> {
        Arc::new(CompletionHandler {
            router: Arc::downgrade(&self.inner),
        })
    }

    fn from_inner(inner: Arc<RouterInner<P, S>>) -> Self {
        Self { inner }
    }
}

impl<P: Payload, S: Saga<P>> RouterInner<P, S> {
    fn lock(&self) -> MutexGuard<'_, Instances<S>> {
        self.instances.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn relay(&self, message: Envelope<P>) {
        let Some(saga) = self.lock().get(&message.correlation_id).cloned() else {
            tracing::trace!(
                correlation_id = %message.correlation_id,
                kind = message.kind(),
                "no live saga; dropping"
            );
            return;
        };

        let emissions = saga
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handle(&message);

        for emission in emissions {
            self.bus.publish(&emission.topic, emission.message);
        }
    }
}

/// Bound to each live correlation id; holds the router weakly so the bus
/// registry never keeps the router alive.
struct Relay<P: Payload, S> {
    router: Weak<RouterInner<P, S>>,
}

impl<P: Payload, S: Saga<P>> Handler<Envelope<P>> for Relay<P, S> {
    fn handle(&self, message: Envelope<P>) -> message_bus::Result<()> {
        if let Some(router) = self.router.upgrade() {
            router.relay(message);
        }
        Ok(())
    }

    fn name(&self) -> String {
        "saga-relay".to_string()
    }
}

struct StartHandler<P: Payload, S> {
    router: Weak<RouterInner<P, S>>,
}

impl<P: Payload, S: Saga<P>> Handler<Envelope<P>> for StartHandler<P, S> {
    fn handle(&self, message: Envelope<P>) -> message_bus::Result<()> {
        if let Some(inner) = self.router.upgrade() {
            SagaRouter::from_inner(inner).handle_start(&message)?;
        }
        Ok(())
    }

    fn name(&self) -> String {
        "saga-start".to_string()
    }
}

struct CompletionHandler<P: Payload, S> {
    router: Weak<RouterInner<P, S>>,
}

impl<P: Payload, S: Saga<P>> Handler<Envelope<P>> for CompletionHandler<P, S> {
    fn handle(&self, message: Envelope<P>) -> message_bus::Result<()> {
        if let Some(inner) = self.router.upgrade() {
            SagaRouter::from_inner(inner).handle_completion(&message);
        }
        Ok(())
    }

    fn name(&self) -> String {
        "saga-completion".to_string()
    }
}

impl<P: Payload, S: Saga<P>> Probe for SagaRouter<P, S> {
    fn probe_name(&self) -> String {
        "sagas".to_string()
    }

    fn reading(&self) -> Reading {
        Reading {
            probe: self.probe_name(),
            measure: "live",
            value: self.count() as u64,
        }
    }
}
