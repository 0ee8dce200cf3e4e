//! Queue-backed worker: decouples publication from execution.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::Result;
use crate::handler::{Handler, invoke};
use crate::processor::{Lifecycle, Processor};

/// How long a worker waits for a message before re-checking its stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Unbounded FIFO with a blocking, bounded-wait `pop`.
///
/// Closing the mailbox releases a waiting `pop` at once; messages stay queued
/// until it is reopened.
struct Mailbox<M> {
    queue: Mutex<Slots<M>>,
    ready: Condvar,
}

struct Slots<M> {
    messages: VecDeque<M>,
    closed: bool,
}

impl<M> Mailbox<M> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Slots {
                messages: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<M>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, message: M) -> usize {
        let mut slots = self.lock();
        slots.messages.push_back(message);
        let depth = slots.messages.len();
        drop(slots);
        self.ready.notify_one();
        depth
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<M> {
        let slots = self.lock();
        let (mut slots, _) = self
            .ready
            .wait_timeout_while(slots, timeout, |s| s.messages.is_empty() && !s.closed)
            .unwrap_or_else(|e| e.into_inner());
        if slots.closed {
            return None;
        }
        slots.messages.pop_front()
    }

    fn len(&self) -> usize {
        self.lock().messages.len()
    }

    fn open(&self) {
        self.lock().closed = false;
    }

    fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }
}

/// Raised whenever an attached worker frees a queue slot.
///
/// Waiters read the generation, re-check their condition and then wait for
/// the generation to move, so a notification between the check and the wait
/// is never lost.
#[derive(Default)]
pub struct CapacitySignal {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl CapacitySignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn notify(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.changed.notify_all();
    }

    /// Waits until the generation differs from `seen` or `timeout` elapses.
    /// Returns true if the generation moved.
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) -> bool {
        let generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        let (generation, _) = self
            .changed
            .wait_timeout_while(generation, timeout, |g| *g == seen)
            .unwrap_or_else(|e| e.into_inner());
        *generation != seen
    }
}

/// Wraps one downstream handler with its own unbounded queue and thread.
///
/// `handle` only enqueues and returns immediately; the worker thread feeds
/// queued messages to the downstream handler one at a time. The worker owns
/// its handler, so a stateful handler wired through exactly one worker is
/// only ever called from that worker's thread.
pub struct QueueWorker<M> {
    name: String,
    mailbox: Arc<Mailbox<M>>,
    handler: Arc<dyn Handler<M>>,
    signals: Arc<Mutex<Vec<Arc<CapacitySignal>>>>,
    poll_interval: Duration,
    processor: Processor,
}

impl<M: Send + 'static> QueueWorker<M> {
    /// Creates a stopped worker around `handler`.
    pub fn new(name: impl Into<String>, handler: impl Handler<M> + 'static) -> Self {
        let name = name.into();
        Self {
            processor: Processor::new(name.clone()),
            name,
            mailbox: Arc::new(Mailbox::new()),
            handler: Arc::new(handler),
            signals: Arc::new(Mutex::new(Vec::new())),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the bounded wait used by the dequeue loop.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Current number of queued messages.
    pub fn queue_size(&self) -> usize {
        self.mailbox.len()
    }

    pub fn is_running(&self) -> bool {
        self.processor.is_running()
    }

    /// Registers a signal raised after every dequeue.
    pub fn attach_capacity_signal(&self, signal: Arc<CapacitySignal>) {
        self.signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(signal);
    }

    fn record_depth(name: &str, depth: usize) {
        metrics::gauge!("worker_queue_depth", "worker" => name.to_string()).set(depth as f64);
    }
}

impl<M: Send + 'static> Handler<M> for QueueWorker<M> {
    fn handle(&self, message: M) -> Result<()> {
        let depth = self.mailbox.push(message);
        Self::record_depth(&self.name, depth);
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl<M: Send + 'static> Lifecycle for QueueWorker<M> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start(&self) -> Result<()> {
        let name = self.name.clone();
        let mailbox = self.mailbox.clone();
        let handler = self.handler.clone();
        let signals = self.signals.clone();
        let poll_interval = self.poll_interval;

        self.mailbox.open();
        self.processor.start(move || {
            let Some(message) = mailbox.pop_timeout(poll_interval) else {
                return;
            };
            Self::record_depth(&name, mailbox.len());
            for signal in signals.lock().unwrap_or_else(|e| e.into_inner()).iter() {
                signal.notify();
            }

            if let Err(err) = invoke(handler.as_ref(), message) {
                metrics::counter!("worker_handler_failures_total", "worker" => name.clone())
                    .increment(1);
                tracing::warn!(worker = %name, error = %err, "worker handler failed");
            }
        })?;
        tracing::info!(worker = %self.name, "queue worker started");
        Ok(())
    }

    fn stop(&self) {
        self.processor.stop();
        self.mailbox.close();
    }

    fn join(&self) {
        self.processor.join();
    }
}
