//! Performance benchmarks for snapshot materialization and refetch fan-out.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livedoc::memory::evaluate;
use livedoc::{Direction, Document, Query, RefetchRegistry, Snapshot};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn transaction_fields(i: usize) -> Map<String, Value> {
    match json!({
        "amount": i * 3 % 97,
        "createdAt": i,
        "symbol": format!("SYM{}", i % 20),
        "meta": {"source": "bench", "batch": i / 100},
    }) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Benchmark converting a snapshot into records
fn bench_snapshot_to_records(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_to_records");

    for size in [10, 100, 1000] {
        let snapshot = Snapshot::new(
            (0..size)
                .map(|i| Document::new(format!("t{}", i), transaction_fields(i)))
                .collect(),
        );

        group.bench_with_input(BenchmarkId::new("documents", size), &snapshot, |b, snapshot| {
            b.iter(|| black_box(snapshot.to_records()));
        });
    }

    group.finish();
}

/// Benchmark evaluating an ordered, limited query over an in-memory collection
fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    let query = Query::collection("users/u1/transactions")
        .unwrap()
        .order_by("createdAt", Direction::Desc)
        .limit(10);

    for size in [100, 1000, 10000] {
        let collection: Vec<(String, Map<String, Value>)> = (0..size)
            .map(|i| (format!("t{}", i), transaction_fields(i)))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("collection_size", size),
            &collection,
            |b, collection| {
                b.iter(|| {
                    black_box(evaluate(&query, collection.iter().map(|(id, fields)| (id, fields))))
                });
            },
        );
    }

    group.finish();
}

/// Benchmark refetch_all across many registered callbacks
fn bench_refetch_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("refetch_all");

    for registered in [1, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("registered", registered),
            &registered,
            |b, &registered| {
                let registry = RefetchRegistry::new();
                let hits = Arc::new(AtomicUsize::new(0));
                for _ in 0..registered {
                    let hits = Arc::clone(&hits);
                    registry.add(move || {
                        hits.fetch_add(1, Ordering::Relaxed);
                    });
                }

                b.iter(|| black_box(registry.refetch_all()));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_snapshot_to_records,
    bench_evaluate,
    bench_refetch_all
);
criterion_main!(benches);
