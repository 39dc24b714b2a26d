//! Fan-out benchmarks for the AMA live-update core.

use ama_bench::{drain, populate};
use ama_core::{Broadcaster, Event, Registry, RoomId, Subscriber};
use ama_transport::MemoryConnection;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

/// Benchmark one broadcast against rooms of increasing size.
fn bench_broadcast(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("broadcast");

    for subscribers in [1usize, 10, 100, 1000] {
        let registry = Arc::new(Registry::new());
        let room = RoomId::new_v4();
        let mut peers = populate(&registry, &room, subscribers);
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let event = Event::question_created(room, "0190b3c4-question", "How does fan-out scale?");

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.to_async(&runtime)
                    .iter(|| async { black_box(broadcaster.broadcast(&event).await) });
            },
        );
        drain(&mut peers);
    }

    group.finish();
}

/// Benchmark register + unregister.
fn bench_registry_churn(c: &mut Criterion) {
    let registry = Registry::new();
    let room = RoomId::new_v4();
    let _peers = populate(&registry, &room, 100);
    let (conn, _peer) = MemoryConnection::pair();

    c.bench_function("registry_churn", |b| {
        b.iter(|| {
            let subscriber = Subscriber::new(conn.clone());
            let id = subscriber.id();
            registry.register(&room, subscriber);
            black_box(registry.unregister(&room, id))
        });
    });
}

/// Benchmark snapshots of a busy room.
fn bench_snapshot(c: &mut Criterion) {
    let registry = Registry::new();
    let room = RoomId::new_v4();
    let _peers = populate(&registry, &room, 100);

    c.bench_function("snapshot_100", |b| {
        b.iter(|| black_box(registry.snapshot(black_box(&room))))
    });
}

criterion_group!(benches, bench_broadcast, bench_registry_churn, bench_snapshot);
criterion_main!(benches);
