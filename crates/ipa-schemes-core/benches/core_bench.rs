//! Criterion benchmarks for ipa-schemes-core.
//!
//! These exercise the pure-Rust merge paths on synthetic datasets; no
//! archives or Python runtime are involved.
//!
//! ## Benchmark groups
//!
//! 1. **reconcile**: merging N overlapping runs.
//! 2. **scheme_index**: deriving and unioning scheme indices.
//! 3. **render**: scheme index rendering.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/ipa-schemes-core/Cargo.toml
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use _ipa_schemes_core::store::dataset::render_scheme_index;
use _ipa_schemes_core::{index_from_records, merge_indices, reconcile, AppRecord};

/// `n` records; every third one shares a scheme with its neighbour and every
/// tenth carries a conflicting name when `variant` is non-zero.
fn synthetic_run(n: usize, variant: usize) -> Vec<AppRecord> {
    (0..n)
        .map(|i| {
            let name = if variant > 0 && i % 10 == 0 {
                format!("App {i} (run {variant})")
            } else {
                format!("App {i}")
            };
            AppRecord {
                bundle_id: format!("com.bench.app{i}"),
                version: Some(format!("{}.0", i % 4)),
                item_id: (100_000 + i).to_string(),
                name,
                url_schemes: [format!("app{i}"), format!("shared{}", i / 3)]
                    .into_iter()
                    .collect(),
                ..AppRecord::default()
            }
        })
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    for &size in &[100usize, 1_000, 10_000] {
        let runs: Vec<Vec<AppRecord>> = (0..4).map(|v| synthetic_run(size, v)).collect();
        group.bench_with_input(BenchmarkId::new("four_runs", size), &runs, |b, runs| {
            b.iter(|| reconcile(black_box(runs)))
        });
    }
    group.finish();
}

fn bench_scheme_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheme_index");
    for &size in &[1_000usize, 10_000] {
        let records = synthetic_run(size, 0);
        group.bench_with_input(BenchmarkId::new("derive", size), &records, |b, records| {
            b.iter(|| index_from_records(black_box(records)))
        });

        let indices: Vec<_> = (0..4)
            .map(|v| index_from_records(&synthetic_run(size, v)))
            .collect();
        group.bench_with_input(BenchmarkId::new("union", size), &indices, |b, indices| {
            b.iter(|| merge_indices(black_box(indices)))
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let index = index_from_records(&synthetic_run(10_000, 0));
    c.bench_function("render/10000", |b| {
        b.iter(|| render_scheme_index(black_box(&index)).unwrap())
    });
}

criterion_group!(benches, bench_reconcile, bench_scheme_index, bench_render);
criterion_main!(benches);
