//! Fault injection for tests: drops or duplicates messages at configured rates.
//!
//! Only compiled for tests or with the `chaos` feature.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{BusError, Result};
use crate::handler::{Handler, SharedHandler};

/// What happened to one message passing through [`Chaos`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Dropped,
    Duplicated,
    Delivered,
}

/// Wraps a handler and, per message, drops it with probability `loose`,
/// delivers it twice with probability `duplication`, otherwise once.
pub struct Chaos<M> {
    inner: SharedHandler<M>,
    loose: f64,
    duplication: f64,
    rng: Mutex<StdRng>,
}

impl<M> Chaos<M> {
    pub fn new(inner: SharedHandler<M>, loose: f64, duplication: f64) -> Result<Self> {
        Self::with_rng(inner, loose, duplication, StdRng::from_entropy())
    }

    /// Same as [`Chaos::new`] with a reproducible random sequence.
    pub fn with_seed(
        inner: SharedHandler<M>,
        loose: f64,
        duplication: f64,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(inner, loose, duplication, StdRng::seed_from_u64(seed))
    }

    fn with_rng(inner: SharedHandler<M>, loose: f64, duplication: f64, rng: StdRng) -> Result<Self> {
        let in_range = |r: f64| (0.0..=1.0).contains(&r);
        if !in_range(loose) || !in_range(duplication) || loose + duplication > 1.0 {
            return Err(BusError::InvalidChaosRatios { loose, duplication });
        }
        Ok(Self {
            inner,
            loose,
            duplication,
            rng: Mutex::new(rng),
        })
    }

    fn roll(&self) -> Fate {
        let r: f64 = self.rng.lock().unwrap_or_else(|e| e.into_inner()).r#gen();
        if r < self.loose {
            Fate::Dropped
        } else if r < self.loose + self.duplication {
            Fate::Duplicated
        } else {
            Fate::Delivered
        }
    }
}

impl<M: Clone + Send> Handler<M> for Chaos<M> {
    fn handle(&self, message: M) -> Result<()> {
        match self.roll() {
            Fate::Dropped => {
                tracing::debug!(handler = %self.inner.name(), "chaos dropped message");
                Ok(())
            }
            Fate::Duplicated => {
                tracing::debug!(handler = %self.inner.name(), "chaos duplicated message");
                let first = self.inner.handle(message.clone());
                let second = self.inner.handle(message);
                first.and(second)
            }
            Fate::Delivered => self.inner.handle(message),
        }
    }

    fn name(&self) -> String {
        format!("chaos({})", self.inner.name())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::handler::recording::Recorder;

    fn chaos(recorder: &Arc<Recorder<u32>>, loose: f64, duplication: f64) -> Chaos<u32> {
        Chaos::<u32>::with_seed(recorder.clone(), loose, duplication, 7).unwrap()
    }

    #[test]
    fn full_loss_delivers_nothing() {
        let recorder = Recorder::new("r");
        let chaos = chaos(&recorder, 1.0, 0.0);
        for n in 0..20 {
            chaos.handle(n).unwrap();
        }
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn full_duplication_delivers_twice() {
        let recorder = Recorder::new("r");
        let chaos = chaos(&recorder, 0.0, 1.0);
        chaos.handle(4).unwrap();
        assert_eq!(recorder.seen(), vec![4, 4]);
    }

    #[test]
    fn duplicate_is_delivered_even_when_the_first_copy_fails() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use crate::handler::handler_fn;

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let flaky: SharedHandler<u32> = Arc::new(handler_fn("flaky", move |_: u32| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(BusError::handler("flaky", "first call fails"));
            }
            Ok(())
        }));
        let chaos = Chaos::<u32>::with_seed(flaky, 0.0, 1.0, 7).unwrap();

        let result = chaos.handle(1);

        assert!(matches!(result, Err(BusError::Handler { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_faults_is_transparent() {
        let recorder = Recorder::new("r");
        let chaos = chaos(&recorder, 0.0, 0.0);
        for n in 0..10 {
            chaos.handle(n).unwrap();
        }
        assert_eq!(recorder.seen(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn mixed_ratios_land_in_range() {
        let recorder = Recorder::new("r");
        let chaos = chaos(&recorder, 0.3, 0.3);
        for n in 0..1000 {
            chaos.handle(n).unwrap();
        }
        // Expected 1000 * (0.4 + 0.3 * 2) = 1000.
        let delivered = recorder.count();
        assert!((800..=1200).contains(&delivered), "delivered {delivered}");
    }

    #[test]
    fn invalid_ratios_are_rejected() {
        let recorder = Recorder::new("r");
        for (loose, duplication) in [(-0.1, 0.0), (0.0, 1.5), (0.6, 0.6)] {
            let result = Chaos::new(recorder.clone() as SharedHandler<u32>, loose, duplication);
            assert!(matches!(result, Err(BusError::InvalidChaosRatios { .. })));
        }
    }
}
