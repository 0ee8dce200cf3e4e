//! Named background thread driven by a cooperative stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::{BusError, Result};

/// Runs a `run_once` step in a loop on its own OS thread until stopped.
///
/// Cancellation is cooperative: `stop` clears the flag and the loop exits
/// after the step in progress returns, so each step must block for a bounded
/// time only.
pub struct Processor {
    name: String,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Processor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true between `start` and the loop observing `stop`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawns the loop thread.
    pub fn start<F>(&self, mut run_once: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        // Holding the slot serializes concurrent `start` calls.
        let mut slot = self.thread.lock().unwrap_or_else(|e| e.into_inner());
        if self.running.load(Ordering::Acquire) {
            return Err(BusError::AlreadyRunning(self.name.clone()));
        }
        // A previous run may still be finishing its last step.
        if let Some(previous) = slot.take() {
            let _ = previous.join();
        }
        self.running.store(true, Ordering::Release);

        let running = self.running.clone();
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                tracing::debug!(processor = %name, "processor started");
                while running.load(Ordering::Acquire) {
                    run_once();
                }
                tracing::debug!(processor = %name, "processor stopped");
            })
            .map_err(|source| {
                self.running.store(false, Ordering::Release);
                BusError::Spawn {
                    name: self.name.clone(),
                    source,
                }
            })?;
        *slot = Some(handle);
        Ok(())
    }

    /// Asks the loop to exit after its current step.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Waits for the loop thread to exit. Call `stop` first.
    pub fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!(processor = %self.name, "processor thread panicked");
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Anything with a start/stop lifecycle backed by a [`Processor`].
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> String;
    fn start(&self) -> Result<()>;
    fn stop(&self);
    fn join(&self);

    /// Stops and waits for the thread to exit.
    fn shutdown(&self) {
        self.stop();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[test]
    fn runs_until_stopped() {
        let processor = Processor::new("ticker");
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        processor
            .start(move || {
                t.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            })
            .unwrap();
        assert!(processor.is_running());

        thread::sleep(Duration::from_millis(30));
        processor.stop();
        processor.join();

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
        assert!(!processor.is_running());
    }

    #[test]
    fn double_start_is_rejected() {
        let processor = Processor::new("twice");
        processor
            .start(|| thread::sleep(Duration::from_millis(1)))
            .unwrap();
        let second = processor.start(|| {});
        assert!(matches!(second, Err(BusError::AlreadyRunning(name)) if name == "twice"));
        processor.stop();
        processor.join();
    }

    #[test]
    fn can_restart_after_stop() {
        let processor = Processor::new("again");
        processor
            .start(|| thread::sleep(Duration::from_millis(1)))
            .unwrap();
        processor.stop();
        processor.join();
        processor
            .start(|| thread::sleep(Duration::from_millis(1)))
            .unwrap();
        assert!(processor.is_running());
        processor.stop();
        processor.join();
    }
}
