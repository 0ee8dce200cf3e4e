//! Declarative wiring: the full set of bindings is built first, then installed
//! on the bus in one step.

use crate::bus::{Bus, Route};
use crate::envelope::Message;
use crate::handler::SharedHandler;

pub struct Topology<M> {
    bindings: Vec<(Route, SharedHandler<M>)>,
}

impl<M> Default for Topology<M> {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }
}

impl<M: Message> Topology<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding.
    pub fn bind(mut self, route: impl Into<Route>, handler: SharedHandler<M>) -> Self {
        self.bindings.push((route.into(), handler));
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Routes in binding order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.bindings.iter().map(|(route, _)| route)
    }

    /// Installs every binding under a single registry write, consuming the
    /// topology. Returns the number of bindings added.
    pub fn install(self, bus: &Bus<M>) -> usize {
        let requested = self.bindings.len();
        let added = bus.install(self.bindings);
        tracing::info!(requested, added, "topology installed");
        added
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::envelope::Envelope;
    use crate::envelope::fixtures::*;
    use crate::handler::recording::Recorder;

    type Msg = Envelope<Ping>;

    #[test]
    fn installs_all_bindings_at_once() {
        let bus: Bus<Msg> = Bus::new();
        let a: Arc<Recorder<Msg>> = Recorder::new("a");
        let b: Arc<Recorder<Msg>> = Recorder::new("b");

        let topology = Topology::<Msg>::new()
            .bind("one", a.clone())
            .bind("two", b.clone())
            .bind("two", a.clone());
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.install(&bus), 3);

        bus.publish("two", ping(1));
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert_eq!(bus.route_count(), 2);
    }

    #[test]
    fn duplicate_bindings_are_skipped() {
        let bus: Bus<Msg> = Bus::new();
        let a: Arc<Recorder<Msg>> = Recorder::new("a");
        let topology = Topology::<Msg>::new().bind("one", a.clone()).bind("one", a.clone());

        assert_eq!(topology.install(&bus), 1);
        bus.publish("one", ping(1));
        assert_eq!(a.count(), 1);
    }
}
