//! # Scheduler Benchmarks
//!
//! Measures end-to-end run cost: thread spawn, registration barrier and
//! capability handoff between components.
//!
//! Run: `cargo bench --bench scheduler_bench`

use cassandra_core::prelude::*;
use cassandra_orchestration::{ComponentSlot, Scheduler};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

/// Busca a capacidade do estágio anterior e publica a sua
struct Stage {
    input: Option<String>,
    output: String,
}

impl Component for Stage {
    fn kind(&self) -> &str {
        "Stage"
    }

    fn initialize(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<()> {
        ctx.register(&self.output)?;
        Ok(())
    }

    fn run(&mut self, ctx: &dyn CapabilityContext) -> ComponentResult<i32> {
        let value = match &self.input {
            Some(input) => ctx.fetch(input)?.as_u64().unwrap_or(0) + 1,
            None => 0,
        };
        ctx.publish(&self.output, json!(value))?;
        Ok(EXIT_SUCCESS)
    }
}

fn chain(length: usize) -> Vec<ComponentSlot> {
    (0..length)
        .map(|i| {
            let stage = Stage {
                input: (i > 0).then(|| format!("stage-{}", i - 1)),
                output: format!("stage-{i}"),
            };
            ComponentSlot::new(&format!("s{i}"), Box::new(stage))
        })
        .collect()
}

/// Cadeia linear: cada componente espera o anterior
fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    group.sample_size(20);

    for length in [2, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &length| {
            b.iter(|| black_box(Scheduler::default().run(chain(length))))
        });
    }

    group.finish();
}

/// Estrela: um produtor, N consumidores
fn bench_star(c: &mut Criterion) {
    let mut group = c.benchmark_group("star");
    group.sample_size(20);

    for consumers in [4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(consumers), &consumers, |b, &consumers| {
            b.iter(|| {
                let mut slots = vec![ComponentSlot::new(
                    "hub",
                    Box::new(Stage { input: None, output: "hub".into() }),
                )];
                for i in 0..consumers {
                    slots.push(ComponentSlot::new(
                        &format!("leaf{i}"),
                        Box::new(Stage {
                            input: Some("hub".into()),
                            output: format!("leaf-{i}"),
                        }),
                    ));
                }
                black_box(Scheduler::default().run(slots))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain, bench_star);
criterion_main!(benches);
