//! Benchmarks for regfind
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use regfind::search::{
    format_percent, CancellationToken, CollectingSink, EngineOptions, MatchFlags, Query,
    SearchEngine, Strategy,
};
use regfind::store::{KeySnapshot, MemoryStore, Store, ValueData};
use std::sync::Arc;
use std::time::Duration;

fn tree(fanout: usize, depth: usize) -> KeySnapshot {
    let mut key = KeySnapshot::new(format!("key{}", depth))
        .with_value("Version", ValueData::Dword(depth as u32))
        .with_value("Path", ValueData::Sz(r"C:\Program Files\Vendor".into()));
    if depth > 0 {
        for i in 0..fanout {
            let mut child = tree(fanout, depth - 1);
            child.name = format!("{}_{}", child.name, i);
            key = key.with_child(child);
        }
    }
    key
}

fn benchmark_query_matching(c: &mut Criterion) {
    let literal = Query::literal("vendor", MatchFlags::default());
    let regex = Query::regex(r"^run(once)?(ex)?$", MatchFlags::default()).unwrap();

    c.bench_function("query_literal_match", |b| {
        b.iter(|| black_box(literal.is_match(black_box("SoftwareVendorSettings"))))
    });
    c.bench_function("query_regex_match", |b| {
        b.iter(|| black_box(regex.is_match(black_box("RunOnceEx"))))
    });
}

fn benchmark_search(c: &mut Criterion) {
    let snapshot = tree(6, 4);
    let root = snapshot.name.clone();
    let store: Arc<dyn Store> = Arc::new(MemoryStore::from_snapshot(snapshot).unwrap());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let query = Query::literal("key1", MatchFlags::default());

    for strategy in [Strategy::ParallelDepthFirst, Strategy::BreadthFirst] {
        let engine = SearchEngine::new(
            Arc::clone(&store),
            EngineOptions {
                strategy,
                ..EngineOptions::default()
            },
        );
        c.bench_function(&format!("search_in_process_{:?}", strategy), |b| {
            b.iter(|| {
                let sink = CollectingSink::new();
                runtime
                    .block_on(engine.search(&root, 100.0, &query, &sink, &CancellationToken::new()))
                    .unwrap();
                black_box(sink.total_weight())
            })
        });
    }
}

fn benchmark_format_percent(c: &mut Criterion) {
    c.bench_function("format_percent", |b| {
        b.iter(|| {
            black_box(format_percent(
                black_box(37.5),
                100.0,
                Duration::from_secs(12),
            ))
        })
    });
}

criterion_group!(
    benches,
    benchmark_query_matching,
    benchmark_search,
    benchmark_format_percent
);
criterion_main!(benches);
