//! Periodic observation of queue depths and live-instance counts.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::bus::Bus;
use crate::envelope::Message;
use crate::error::Result;
use crate::processor::{Lifecycle, Processor};
use crate::worker::QueueWorker;

/// Default interval between monitor sweeps.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// One observed quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    pub probe: String,
    pub measure: &'static str,
    pub value: u64,
}

/// Something the monitor can observe.
pub trait Probe: Send + Sync {
    fn probe_name(&self) -> String;
    fn reading(&self) -> Reading;
}

impl<M: Send + 'static> Probe for QueueWorker<M> {
    fn probe_name(&self) -> String {
        crate::handler::Handler::name(self)
    }

    fn reading(&self) -> Reading {
        Reading {
            probe: self.probe_name(),
            measure: "queue_depth",
            value: self.queue_size() as u64,
        }
    }
}

impl<M: Message> Probe for Bus<M> {
    fn probe_name(&self) -> String {
        "bus".to_string()
    }

    fn reading(&self) -> Reading {
        Reading {
            probe: self.probe_name(),
            measure: "routes",
            value: self.route_count() as u64,
        }
    }
}

/// Samples every registered probe on its own thread and logs the readings.
pub struct Monitor {
    probes: Arc<Vec<Arc<dyn Probe>>>,
    interval: Duration,
    processor: Processor,
}

impl Monitor {
    pub fn new(probes: Vec<Arc<dyn Probe>>) -> Self {
        Self {
            probes: Arc::new(probes),
            interval: DEFAULT_INTERVAL,
            processor: Processor::new("monitor"),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Current readings of every probe, in registration order.
    pub fn snapshot(&self) -> Vec<Reading> {
        sample(&self.probes)
    }
}

fn sample(probes: &[Arc<dyn Probe>]) -> Vec<Reading> {
    probes.iter().map(|probe| probe.reading()).collect()
}

fn report(readings: &[Reading]) {
    for reading in readings {
        metrics::gauge!(
            "monitor_reading",
            "probe" => reading.probe.clone(),
            "measure" => reading.measure
        )
        .set(reading.value as f64);
        tracing::info!(
            probe = %reading.probe,
            measure = reading.measure,
            value = reading.value,
            "monitor"
        );
    }
}

impl Lifecycle for Monitor {
    fn name(&self) -> String {
        "monitor".to_string()
    }

    fn start(&self) -> Result<()> {
        let probes = self.probes.clone();
        let interval = self.interval;
        self.processor.start(move || {
            thread::sleep(interval);
            report(&sample(&probes));
        })
    }

    fn stop(&self) {
        self.processor.stop();
    }

    fn join(&self) {
        self.processor.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::envelope::fixtures::*;
    use crate::handler::Handler;
    use crate::handler::recording::Recorder;

    #[test]
    fn snapshot_reads_every_probe() {
        let bus: Arc<Bus<Envelope<Ping>>> = Arc::new(Bus::new());
        bus.subscribe("t", Recorder::<Envelope<Ping>>::new("r"));
        let worker = Arc::new(QueueWorker::new("cook-1", Recorder::<u32>::new("r")));
        worker.handle(1).unwrap();
        worker.handle(2).unwrap();

        let probes: Vec<Arc<dyn Probe>> = vec![bus.clone(), worker.clone()];
        let monitor = Monitor::new(probes);
        let readings = monitor.snapshot();

        assert_eq!(
            readings,
            vec![
                Reading {
                    probe: "bus".to_string(),
                    measure: "routes",
                    value: 1
                },
                Reading {
                    probe: "cook-1".to_string(),
                    measure: "queue_depth",
                    value: 2
                },
            ]
        );
    }

    #[test]
    fn monitor_thread_starts_and_stops() {
        let monitor = Monitor::new(Vec::new()).with_interval(Duration::from_millis(10));
        monitor.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        monitor.shutdown();
    }
}
