/// Messenger Performance Benchmarks using Criterion
///
/// Run with: cargo bench --bench dispatch_benchmark
///
/// Benchmarks cover:
/// - Emit + pump throughput between two contexts
/// - Dispatch fan-out to many handlers of one tag
/// - Origin-rejected message overhead
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crossframe_core::{
    event_map, BrowsingContext, Handler, MessageEvent, Messenger, MessengerConfig, TargetOrigin,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub seq: u64,
    pub label: String,
}

event_map! {
    pub BenchEvents {
        TickEvent("tick") => Tick,
    }
}

fn counting_handler(counter: &Arc<AtomicU64>) -> Handler<Tick> {
    let counter = Arc::clone(counter);
    Handler::new(move |tick: Tick| {
        counter.fetch_add(black_box(tick.seq) & 1, Ordering::Relaxed);
    })
}

/// Benchmark: emit N events from a frame and pump them through the parent
fn bench_emit_and_pump(c: &mut Criterion) {
    let mut group = c.benchmark_group("messenger_emit_and_pump");

    for event_count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*event_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(event_count),
            event_count,
            |b, &count| {
                let parent = BrowsingContext::new("https://parent.example").unwrap();
                let child = parent.embed_frame("https://child.example").unwrap();
                let receiver: Messenger<BenchEvents> =
                    Messenger::new(parent.clone(), parent.proxy_to(&child));
                let sender: Messenger<BenchEvents> =
                    Messenger::new(child.clone(), child.parent().unwrap());
                let counter = Arc::new(AtomicU64::new(0));
                receiver.on::<TickEvent>(&counting_handler(&counter)).unwrap();

                b.iter(|| {
                    for seq in 0..count as u64 {
                        sender
                            .emit::<TickEvent>(&Tick {
                                seq,
                                label: "bench".to_string(),
                            })
                            .unwrap();
                    }
                    black_box(parent.pump());
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: one inbound message fanned out to many handlers
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("messenger_fan_out");

    for handler_count in [1, 8, 64].iter() {
        group.throughput(Throughput::Elements(*handler_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(handler_count),
            handler_count,
            |b, &handlers| {
                let parent = BrowsingContext::new("https://parent.example").unwrap();
                let child = parent.embed_frame("https://child.example").unwrap();
                let messenger: Messenger<BenchEvents> =
                    Messenger::new(parent.clone(), parent.proxy_to(&child));
                let counter = Arc::new(AtomicU64::new(0));
                for _ in 0..handlers {
                    messenger
                        .on::<TickEvent>(&counting_handler(&counter))
                        .unwrap();
                }
                let event = MessageEvent::new(
                    serde_json::json!({"type": "tick", "payload": {"seq": 1, "label": "x"}}),
                    "https://child.example",
                );

                b.iter(|| black_box(messenger.handle_message(&event)));
            },
        );
    }
    group.finish();
}

/// Benchmark: cost of discarding messages from the wrong origin
fn bench_origin_rejection(c: &mut Criterion) {
    let parent = BrowsingContext::new("https://parent.example").unwrap();
    let child = parent.embed_frame("https://child.example").unwrap();
    let config = MessengerConfig::from(parent.proxy_to(&child))
        .with_target_origin(TargetOrigin::parse("https://child.example").unwrap());
    let messenger: Messenger<BenchEvents> = Messenger::new(parent.clone(), config);
    let counter = Arc::new(AtomicU64::new(0));
    messenger
        .on::<TickEvent>(&counting_handler(&counter))
        .unwrap();
    let forged = MessageEvent::new(
        serde_json::json!({"type": "tick", "payload": {"seq": 1, "label": "x"}}),
        "https://rogue.example",
    );

    c.bench_function("messenger_origin_rejection", |b| {
        b.iter(|| black_box(messenger.handle_message(&forged)))
    });
}

criterion_group!(
    benches,
    bench_emit_and_pump,
    bench_fan_out,
    bench_origin_rejection,
);
criterion_main!(benches);
