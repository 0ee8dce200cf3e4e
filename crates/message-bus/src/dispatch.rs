//! Dispatch strategies: composite handlers that choose where a message goes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{BusError, Result};
use crate::handler::{Handler, SharedHandler};
use crate::worker::{CapacitySignal, QueueWorker};

/// Hands a clone of every message to each handler in order.
///
/// Every handler is attempted; the first failure is reported.
pub struct Broadcast<M> {
    handlers: Vec<SharedHandler<M>>,
}

impl<M> Broadcast<M> {
    pub fn new(handlers: Vec<SharedHandler<M>>) -> Result<Self> {
        if handlers.is_empty() {
            return Err(BusError::NoHandlers);
        }
        Ok(Self { handlers })
    }
}

impl<M: Clone + Send> Handler<M> for Broadcast<M> {
    fn handle(&self, message: M) -> Result<()> {
        let mut first_error = None;
        for handler in &self.handlers {
            if let Err(err) = handler.handle(message.clone())
                && first_error.is_none()
            {
                first_error = Some(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn name(&self) -> String {
        "broadcast".to_string()
    }
}

/// Hands each message to exactly one handler, rotating through them.
pub struct RoundRobin<M> {
    handlers: Mutex<VecDeque<SharedHandler<M>>>,
}

impl<M> RoundRobin<M> {
    pub fn new(handlers: Vec<SharedHandler<M>>) -> Result<Self> {
        if handlers.is_empty() {
            return Err(BusError::NoHandlers);
        }
        Ok(Self {
            handlers: Mutex::new(handlers.into()),
        })
    }

    fn next(&self) -> Option<SharedHandler<M>> {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let next = handlers.pop_front()?;
        handlers.push_back(next.clone());
        Some(next)
    }
}

impl<M: Send> Handler<M> for RoundRobin<M> {
    fn handle(&self, message: M) -> Result<()> {
        // The rotation lock is released before the handler runs.
        let handler = self.next().ok_or(BusError::NoHandlers)?;
        handler.handle(message)
    }

    fn name(&self) -> String {
        "round-robin".to_string()
    }
}

/// How long `LoadAware` sleeps between capacity checks when no signal arrives.
pub const DEFAULT_CAPACITY_WAIT: Duration = Duration::from_millis(100);

/// Hands each message to the first worker whose queue is below `limit`.
///
/// When every queue is full the caller blocks until a worker dequeues.
/// Routing decisions are serialized so two concurrent callers never both
/// fill the last free slot of the same worker.
pub struct LoadAware<M> {
    workers: Vec<Arc<QueueWorker<M>>>,
    limit: usize,
    signal: Arc<CapacitySignal>,
    routing: Mutex<()>,
    wait: Duration,
}

impl<M: Send + 'static> LoadAware<M> {
    /// `limit` below one is treated as one.
    pub fn new(workers: Vec<Arc<QueueWorker<M>>>, limit: usize) -> Result<Self> {
        if workers.is_empty() {
            return Err(BusError::NoHandlers);
        }
        let signal = CapacitySignal::new();
        for worker in &workers {
            worker.attach_capacity_signal(signal.clone());
        }
        Ok(Self {
            workers,
            limit: limit.max(1),
            signal,
            routing: Mutex::new(()),
            wait: DEFAULT_CAPACITY_WAIT,
        })
    }

    pub fn with_capacity_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn available(&self) -> Option<&Arc<QueueWorker<M>>> {
        self.workers.iter().find(|w| w.queue_size() < self.limit)
    }
}

impl<M: Send + 'static> Handler<M> for LoadAware<M> {
    fn handle(&self, message: M) -> Result<()> {
        loop {
            let seen = self.signal.generation();
            {
                let _routing = self.routing.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(worker) = self.available() {
                    return worker.handle(message);
                }
            }

            // Nobody will ever drain the queues.
            if !self.workers.iter().any(|w| w.is_running()) {
                tracing::warn!(limit = self.limit, "all workers full and none running");
                return Err(BusError::NoRunningWorkers);
            }

            metrics::counter!("dispatch_backpressure_waits_total").increment(1);
            self.signal.wait_for_change(seen, self.wait);
        }
    }

    fn name(&self) -> String {
        "load-aware".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::handler::recording::{Failing, Recorder};
    use crate::handler::handler_fn;
    use crate::processor::Lifecycle;

    const POLL: Duration = Duration::from_millis(20);

    #[test]
    fn empty_strategies_are_rejected() {
        assert!(matches!(
            Broadcast::<u32>::new(Vec::new()),
            Err(BusError::NoHandlers)
        ));
        assert!(matches!(
            RoundRobin::<u32>::new(Vec::new()),
            Err(BusError::NoHandlers)
        ));
        assert!(matches!(
            LoadAware::<u32>::new(Vec::new(), 5),
            Err(BusError::NoHandlers)
        ));
    }

    #[test]
    fn broadcast_reaches_every_handler_even_after_a_failure() {
        let a = Recorder::new("a");
        let b = Recorder::new("b");
        let handlers: Vec<SharedHandler<u32>> = vec![a.clone(), Arc::new(Failing), b.clone()];
        let broadcast = Broadcast::new(handlers).unwrap();

        assert!(broadcast.handle(7).is_err());
        assert_eq!(a.seen(), vec![7]);
        assert_eq!(b.seen(), vec![7]);
    }

    #[test]
    fn round_robin_rotates() {
        let a = Recorder::new("a");
        let b = Recorder::new("b");
        let c = Recorder::new("c");
        let handlers: Vec<SharedHandler<u32>> = vec![a.clone(), b.clone(), c.clone()];
        let rr = RoundRobin::new(handlers).unwrap();

        for n in 1..=7 {
            rr.handle(n).unwrap();
        }

        assert_eq!(a.seen(), vec![1, 4, 7]);
        assert_eq!(b.seen(), vec![2, 5]);
        assert_eq!(c.seen(), vec![3, 6]);
    }

    #[test]
    fn load_aware_prefers_the_first_worker_with_room() {
        let first = Arc::new(QueueWorker::new("first", Recorder::<u32>::new("a")));
        let second = Arc::new(QueueWorker::new("second", Recorder::<u32>::new("b")));
        let dispatch = LoadAware::new(vec![first.clone(), second.clone()], 2).unwrap();

        for n in 0..4 {
            dispatch.handle(n).unwrap();
        }

        assert_eq!(first.queue_size(), 2);
        assert_eq!(second.queue_size(), 2);
    }

    #[test]
    fn load_aware_fails_fast_when_full_and_stopped() {
        let worker = Arc::new(QueueWorker::new("only", Recorder::<u32>::new("a")));
        let dispatch = LoadAware::new(vec![worker.clone()], 1).unwrap();

        dispatch.handle(1).unwrap();
        assert!(matches!(dispatch.handle(2), Err(BusError::NoRunningWorkers)));
        assert_eq!(worker.queue_size(), 1);
    }

    #[test]
    fn load_aware_blocks_until_capacity_frees() {
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().unwrap();
        let processed = Arc::new(AtomicUsize::new(0));

        let worker_gate = gate.clone();
        let count = processed.clone();
        let worker = Arc::new(
            QueueWorker::new(
                "slow",
                handler_fn("slow", move |_: u32| {
                    let _pass = worker_gate.lock().unwrap();
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .with_poll_interval(POLL),
        );
        let dispatch = Arc::new(
            LoadAware::new(vec![worker.clone()], 1)
                .unwrap()
                .with_capacity_wait(POLL),
        );
        worker.start().unwrap();

        // First message is taken by the worker and blocks on the gate;
        // the second fills the queue.
        dispatch.handle(1).unwrap();
        let start = Instant::now();
        while worker.queue_size() != 0 && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        dispatch.handle(2).unwrap();

        let producer = {
            let dispatch = dispatch.clone();
            thread::spawn(move || dispatch.handle(3))
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!producer.is_finished());
        assert!(worker.queue_size() <= 1);

        drop(held);
        producer.join().unwrap().unwrap();

        let start = Instant::now();
        while processed.load(Ordering::SeqCst) < 3 && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(processed.load(Ordering::SeqCst), 3);
        worker.shutdown();
    }
}
