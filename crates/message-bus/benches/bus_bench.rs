use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use message_bus::{
    Bus, Envelope, MessageClass, Payload, RoundRobin, SharedHandler, handler_fn,
};

#[derive(Debug, Clone)]
struct Tick(u64);

impl Payload for Tick {
    fn kind(&self) -> &'static str {
        "Tick"
    }

    fn class(&self) -> MessageClass {
        MessageClass::Event
    }
}

type Msg = Envelope<Tick>;

fn counting_handler(counter: &Arc<AtomicU64>) -> SharedHandler<Msg> {
    let counter = counter.clone();
    Arc::new(handler_fn("count", move |msg: Msg| {
        counter.fetch_add(msg.payload.0, Ordering::Relaxed);
        Ok(())
    }))
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus/fan_out");
    for subscribers in [1usize, 4, 16] {
        let bus: Bus<Msg> = Bus::new();
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..subscribers {
            bus.subscribe("ticks", counting_handler(&counter));
        }
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| bus.publish(black_box("ticks"), Envelope::start(Tick(1))));
            },
        );
    }
    group.finish();
}

fn bench_correlation_route(c: &mut Criterion) {
    let bus: Bus<Msg> = Bus::new();
    let counter = Arc::new(AtomicU64::new(0));
    let start = Envelope::start(Tick(1));
    bus.subscribe(start.correlation_id, counting_handler(&counter));

    c.bench_function("bus/correlation_route", |b| {
        b.iter(|| bus.publish("unbound", Envelope::caused_by(&start, Tick(1))));
    });
}

fn bench_round_robin(c: &mut Criterion) {
    let counter = Arc::new(AtomicU64::new(0));
    let handlers = (0..3).map(|_| counting_handler(&counter)).collect();
    let dispatch = RoundRobin::new(handlers).unwrap();

    c.bench_function("dispatch/round_robin", |b| {
        b.iter(|| {
            message_bus::Handler::handle(&dispatch, Envelope::start(Tick(1))).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_fan_out,
    bench_correlation_route,
    bench_round_robin
);
criterion_main!(benches);
