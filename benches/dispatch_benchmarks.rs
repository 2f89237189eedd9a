//! Performance benchmarks for the planning and payload paths that run once
//! per chunk on the dispatcher side

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::num::NonZeroUsize;

use chunkloop::capture::{CallerScope, ScopeCapture, ScopeDefinition};
use chunkloop::expr::parse_expression;
use chunkloop::loop_spec::IteratorSpec;
use chunkloop::packages::PackageRegistry;
use chunkloop::plan::{enumerate_bindings, plan_chunks};
use chunkloop::task::payload;
use chunkloop::task::worker::handle_payload;
use chunkloop::task::TaskBuilder;

fn caller(registry: &PackageRegistry) -> CallerScope {
    let definitions = vec![
        ScopeDefinition {
            name: "rate".to_string(),
            value: "3".to_string(),
        },
        ScopeDefinition {
            name: "scale".to_string(),
            value: "fn(x) { math::max(x * rate, 10) }".to_string(),
        },
    ];
    CallerScope::from_definitions(&definitions, registry).unwrap()
}

/// Benchmark chunk planning for growing loops
fn bench_plan_chunks(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_chunks");

    for total in [100, 10_000, 1_000_000] {
        group.bench_with_input(BenchmarkId::from_parameter(total), &total, |b, &total| {
            let chunk_size = NonZeroUsize::new(64).unwrap();
            b.iter(|| black_box(plan_chunks(black_box(total), chunk_size).count()));
        });
    }

    group.finish();
}

/// Benchmark building, encoding and evaluating task payloads
fn bench_payloads(c: &mut Criterion) {
    let registry = PackageRegistry::standard();
    let caller = caller(&registry);
    let expression = parse_expression("scale(i)").unwrap();
    let scope = ScopeCapture::new(&caller, &registry)
        .loop_variables(&["i".to_string()])
        .capture(&expression)
        .unwrap();

    let mut group = c.benchmark_group("payloads");

    for chunk_size in [1, 32, 256] {
        let bindings = enumerate_bindings(&[IteratorSpec::range("i", 0, 1024)]).unwrap();
        let builder = TaskBuilder::new(
            expression.clone(),
            scope.clone(),
            bindings,
            NonZeroUsize::new(chunk_size).unwrap(),
        );
        let task = builder.tasks().next().unwrap();
        let encoded = payload::encode(&task).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", chunk_size), &task, |b, task| {
            b.iter(|| black_box(payload::encode(task).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("worker_round_trip", chunk_size), &encoded, |b, bytes| {
            b.iter(|| black_box(handle_payload(bytes, &registry)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan_chunks, bench_payloads);
criterion_main!(benches);
