//! Kitchen assembly: stages, workers, dispatch, saga router and alarm clock
//! wired onto one bus.

use std::sync::Arc;
use std::time::Duration;

use domain::{
    AssistantManager, Cashier, Cook, CookedLedger, DomainError, OrderDocument, OrderEnvelope,
    OrderPrinter, Waiter, topics,
};
use message_bus::{
    AlarmClock, Bus, Lifecycle, LoadAware, Monitor, Probe, QueueWorker, Reading, SharedHandler,
    Topology,
};
use saga::{OrderRouter, SagaConfig, order_router};

use crate::error::KitchenError;

/// Kitchen settings.
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Cook names and how long each takes per order.
    pub cooks: Vec<(String, Duration)>,
    pub cook_queue_limit: usize,
    pub retry_after: Duration,
    pub worker_poll: Duration,
    pub alarm_tick: Duration,
    pub monitor_interval: Duration,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            cooks: vec![
                ("Cook 1".to_string(), Duration::from_millis(100)),
                ("Cook 2".to_string(), Duration::from_millis(300)),
                ("Cook 3".to_string(), Duration::from_millis(500)),
            ],
            cook_queue_limit: 5,
            retry_after: Duration::from_secs(5),
            worker_poll: Duration::from_secs(1),
            alarm_tick: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(5),
        }
    }
}

/// A fully wired kitchen.
///
/// Every stateful stage sits behind its own queue worker. Cooks are fed by a
/// load-aware dispatcher which itself runs on a queue worker, so a full
/// kitchen never blocks the publisher.
pub struct Kitchen {
    bus: Arc<Bus<OrderEnvelope>>,
    waiter: Arc<Waiter>,
    cashier: Arc<Cashier>,
    router: OrderRouter,
    monitor: Arc<Monitor>,
    lifecycles: Vec<Arc<dyn Lifecycle>>,
}

impl Kitchen {
    pub fn new(config: KitchenConfig) -> Result<Self, KitchenError> {
        Self::with_cook_intake(config, |intake| intake)
    }

    /// Builds the kitchen, letting `decorate` wrap the handler bound to the
    /// cook-food topic (fault injection in tests).
    pub fn with_cook_intake<F>(config: KitchenConfig, decorate: F) -> Result<Self, KitchenError>
    where
        F: FnOnce(SharedHandler<OrderEnvelope>) -> SharedHandler<OrderEnvelope>,
    {
        let saga_config = SagaConfig::with_retry_after(config.retry_after)?;
        let bus: Arc<Bus<OrderEnvelope>> = Arc::new(Bus::new());
        let ledger = CookedLedger::new();

        let cooks: Vec<Arc<QueueWorker<OrderEnvelope>>> = config
            .cooks
            .iter()
            .enumerate()
            .map(|(n, (name, cook_time))| {
                let cook = Cook::new(name.clone(), *cook_time, bus.clone(), ledger.clone());
                Arc::new(
                    QueueWorker::new(format!("cook-{}", n + 1), cook)
                        .with_poll_interval(config.worker_poll),
                )
            })
            .collect();
        let dispatch = LoadAware::new(cooks.clone(), config.cook_queue_limit)?;
        let dispatch_worker = Arc::new(
            QueueWorker::new("cook-dispatch", dispatch).with_poll_interval(config.worker_poll),
        );

        let pricing = Arc::new(
            QueueWorker::new("assistant-manager", AssistantManager::new(bus.clone()))
                .with_poll_interval(config.worker_poll),
        );
        let cashier = Arc::new(Cashier::new(bus.clone()));
        let cashier_worker = Arc::new(
            QueueWorker::new("cashier", cashier.clone()).with_poll_interval(config.worker_poll),
        );
        let alarm = Arc::new(AlarmClock::new(&bus).with_tick(config.alarm_tick));
        let router = order_router(bus.clone(), saga_config);
        let waiter = Arc::new(Waiter::new(bus.clone()));

        let intake: SharedHandler<OrderEnvelope> = dispatch_worker.clone();
        let bound = Topology::<OrderEnvelope>::new()
            .bind(topics::COOK_FOOD, decorate(intake))
            .bind(topics::PRICE_ORDER, pricing.clone())
            .bind(topics::TAKE_PAYMENT, cashier_worker.clone())
            .bind(topics::ORDER_PAID, Arc::new(OrderPrinter))
            .bind(topics::ORDER_PLACED, router.start_handler())
            .bind(topics::ORDER_COMPLETED, router.completion_handler())
            .bind(topics::ORDER_COMPLETED, waiter.clone())
            .bind(topics::ORDER_COMPLETED, cashier.clone())
            .bind(topics::ORDER_COMPLETED, Arc::new(ledger))
            .bind(topics::DELAY_PUBLISH, alarm.clone())
            .install(&bus);
        tracing::debug!(bound, cooks = cooks.len(), "kitchen wired");

        let mut probes: Vec<Arc<dyn Probe>> = Vec::new();
        for cook in &cooks {
            probes.push(cook.clone());
        }
        probes.push(dispatch_worker.clone());
        probes.push(pricing.clone());
        probes.push(cashier_worker.clone());
        probes.push(cashier.clone());
        probes.push(Arc::new(router.clone()));
        probes.push(bus.clone());
        let monitor =
            Arc::new(Monitor::new(probes).with_interval(config.monitor_interval));

        let mut lifecycles: Vec<Arc<dyn Lifecycle>> = Vec::new();
        for cook in cooks {
            lifecycles.push(cook);
        }
        lifecycles.push(dispatch_worker);
        lifecycles.push(pricing);
        lifecycles.push(cashier_worker);
        lifecycles.push(alarm);
        lifecycles.push(monitor.clone());

        Ok(Self {
            waiter,
            bus,
            cashier,
            router,
            monitor,
            lifecycles,
        })
    }

    /// Starts every worker, the alarm clock and the monitor.
    pub fn start(&self) -> Result<(), KitchenError> {
        for lifecycle in &self.lifecycles {
            lifecycle.start()?;
        }
        tracing::info!(components = self.lifecycles.len(), "kitchen started");
        Ok(())
    }

    /// Stops every component, waits for their threads and unwires the bus.
    pub fn shutdown(&self) {
        for lifecycle in &self.lifecycles {
            lifecycle.stop();
        }
        for lifecycle in &self.lifecycles {
            lifecycle.join();
        }
        self.bus.clear();
        tracing::info!(live_sagas = self.router.count(), "kitchen stopped");
    }

    /// Starts a flow for `order`; a reference still in flight is refused.
    pub fn place_order(&self, order: OrderDocument) -> Result<OrderEnvelope, DomainError> {
        self.waiter.place_order(order)
    }

    pub fn pay(&self, reference: &str) -> Result<OrderEnvelope, DomainError> {
        self.cashier.pay(reference)
    }

    pub fn outstanding_orders(&self) -> Vec<OrderDocument> {
        self.cashier.outstanding_orders()
    }

    /// Number of orders still in flight.
    pub fn live_sagas(&self) -> usize {
        self.router.count()
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.monitor.snapshot()
    }

    pub fn bus(&self) -> &Arc<Bus<OrderEnvelope>> {
        &self.bus
    }
}
