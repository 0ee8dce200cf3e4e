use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use domain::{AssistantManager, OrderDocument, OrderEnvelope, OrderMessage};
use message_bus::{Bus, Envelope, Handler};

fn big_order() -> OrderDocument {
    let mut order = OrderDocument::new("BENCH-1");
    for n in 0..20 {
        order.add_line(format!("Dish {n}"), 2);
    }
    order.set_field("table", 12);
    order
}

fn bench_document_json(c: &mut Criterion) {
    let order = big_order();

    c.bench_function("domain/document_to_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&order)).unwrap());
    });

    let json = serde_json::to_string(&order).unwrap();
    c.bench_function("domain/document_from_json", |b| {
        b.iter(|| serde_json::from_str::<OrderDocument>(black_box(&json)).unwrap());
    });
}

fn bench_pricing(c: &mut Criterion) {
    let bus: Arc<Bus<OrderEnvelope>> = Arc::new(Bus::new());
    let manager = AssistantManager::new(bus);
    let placed = Envelope::start(OrderMessage::OrderPlaced(big_order()));

    c.bench_function("domain/price_order", |b| {
        b.iter(|| {
            let cmd = Envelope::caused_by(&placed, OrderMessage::PriceOrder(big_order()));
            manager.handle(cmd).unwrap();
        });
    });
}

criterion_group!(benches, bench_document_json, bench_pricing);
criterion_main!(benches);
