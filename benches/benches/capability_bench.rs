//! # Capability Table Benchmarks
//!
//! Measures register/publish/fetch cost and fan-out wakeups.
//!
//! Run: `cargo bench --bench capability_bench`

use std::sync::Arc;
use std::thread;
use cassandra_orchestration::{CapabilityTable, EventBus};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

fn sealed_table(capabilities: usize) -> CapabilityTable {
    let table = CapabilityTable::new();
    for i in 0..capabilities {
        let name = format!("cap-{i}");
        let _ = table.register(&name, "producer");
        let _ = table.publish(&name, "producer", json!(i));
    }
    table.close_registration();
    table
}

/// Register + publish de N capacidades numa tabela nova
fn bench_register_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("register_publish");

    for count in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| black_box(sealed_table(count)))
        });
    }

    group.bench_function("with_event_bus_100", |b| {
        let bus = Arc::new(EventBus::new());
        let _sub = bus.subscribe();
        b.iter(|| {
            let table = CapabilityTable::with_events(Arc::clone(&bus));
            for i in 0..100 {
                let name = format!("cap-{i}");
                let _ = table.register(&name, "producer");
                let _ = table.publish(&name, "producer", json!(i));
            }
            black_box(table.len())
        })
    });

    group.finish();
}

/// Fetch de uma capacidade já publicada (caminho sem lock)
fn bench_fetch_ready(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_ready");
    let table = sealed_table(1000);

    group.bench_function("single", |b| {
        b.iter(|| black_box(table.fetch("cap-500", "consumer", None)))
    });

    group.bench_function("missing", |b| {
        b.iter(|| black_box(table.fetch("nope", "consumer", None)))
    });

    group.finish();
}

/// N consumidores bloqueados acordados por um único publish
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    group.sample_size(20);

    for waiters in [2, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(waiters), &waiters, |b, &waiters| {
            b.iter(|| {
                let table = CapabilityTable::new();
                let _ = table.register("temp", "producer");
                table.close_registration();

                thread::scope(|scope| {
                    for _ in 0..waiters {
                        scope.spawn(|| black_box(table.fetch("temp", "consumer", None)));
                    }
                    let _ = table.publish("temp", "producer", json!({ "kelvin": 300 }));
                });
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_register_publish, bench_fetch_ready, bench_fan_out);
criterion_main!(benches);
