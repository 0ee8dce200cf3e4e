//! Delayed delivery: holds deferred messages and republishes them when due.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::bus::Bus;
use crate::envelope::{Envelope, Payload};
use crate::error::{BusError, Result};
use crate::handler::Handler;
use crate::processor::{Lifecycle, Processor};

/// Default granularity of the firing loop.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

struct Alarm<P> {
    due: Instant,
    topic: String,
    message: Envelope<P>,
}

type Pending<P> = Arc<Mutex<Vec<Alarm<P>>>>;

/// Accepts delay-publish requests and publishes the wrapped message on its
/// target topic once the delay has elapsed.
///
/// Nothing is persisted: pending alarms are lost when the process exits.
/// Delivery is not earlier than the requested delay and may be later by up
/// to one tick.
pub struct AlarmClock<P> {
    bus: Weak<Bus<Envelope<P>>>,
    pending: Pending<P>,
    tick: Duration,
    processor: Processor,
}

impl<P: Payload> AlarmClock<P> {
    pub fn new(bus: &Arc<Bus<Envelope<P>>>) -> Self {
        Self {
            bus: Arc::downgrade(bus),
            pending: Arc::new(Mutex::new(Vec::new())),
            tick: DEFAULT_TICK,
            processor: Processor::new("alarm-clock"),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Number of alarms waiting to fire.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Publishes every alarm due at `now`, earliest first. Returns how many fired.
    pub fn fire_due(&self, now: Instant) -> usize {
        fire_due(&self.bus, &self.pending, now)
    }
}

fn lock<P>(pending: &Pending<P>) -> MutexGuard<'_, Vec<Alarm<P>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

fn fire_due<P: Payload>(bus: &Weak<Bus<Envelope<P>>>, pending: &Pending<P>, now: Instant) -> usize {
    let mut due: Vec<Alarm<P>> = {
        let mut pending = lock(pending);
        let (due, waiting): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|alarm| alarm.due <= now);
        *pending = waiting;
        due
    };
    if due.is_empty() {
        return 0;
    }
    due.sort_by_key(|alarm| alarm.due);

    let Some(bus) = bus.upgrade() else {
        tracing::warn!(dropped = due.len(), "bus gone; dropping due alarms");
        return 0;
    };
    let fired = due.len();
    for alarm in due {
        tracing::debug!(
            topic = %alarm.topic,
            kind = alarm.message.kind(),
            correlation_id = %alarm.message.correlation_id,
            "alarm fired"
        );
        bus.publish(&alarm.topic, alarm.message);
    }
    metrics::counter!("alarm_clock_fired_total").increment(fired as u64);
    fired
}

impl<P: Payload> Handler<Envelope<P>> for AlarmClock<P> {
    fn handle(&self, message: Envelope<P>) -> Result<()> {
        let Some(deferred) = message.payload.deferred() else {
            return Err(BusError::NotDeferred(message.kind()));
        };
        let due = Instant::now()
            .checked_add(deferred.delay)
            .ok_or(BusError::DelayOutOfRange(deferred.delay))?;
        let alarm = Alarm {
            due,
            topic: deferred.topic.clone(),
            message: (*deferred.message).clone(),
        };
        tracing::debug!(topic = %alarm.topic, delay = ?deferred.delay, "alarm scheduled");
        lock(&self.pending).push(alarm);
        Ok(())
    }

    fn name(&self) -> String {
        "alarm-clock".to_string()
    }
}

impl<P: Payload> Lifecycle for AlarmClock<P> {
    fn name(&self) -> String {
        "alarm-clock".to_string()
    }

    fn start(&self) -> Result<()> {
        let bus = self.bus.clone();
        let pending = self.pending.clone();
        let tick = self.tick;
        self.processor.start(move || {
            thread::sleep(tick);
            fire_due(&bus, &pending, Instant::now());
        })
    }

    fn stop(&self) {
        self.processor.stop();
    }

    fn join(&self) {
        self.processor.join();
    }
}
