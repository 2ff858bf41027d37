//! Microbenchmarks for the `insert()` path and restore.
//!
//! Every insert appends one line to the backing file, so these measure
//! encoding plus a write syscall per record.
//!
//! Run with: `cargo bench -p logdb -- insert`

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use logdb::{LabelSpec, Record, Store, StoreConfig};
use tempfile::tempdir;

fn sensor_labels(count: u32) -> LabelSpec {
    LabelSpec::flat((0..count).map(|i| format!("sens{i}")))
}

/// Creates a store backed by a fresh file.
fn setup_store(label_count: u32, delta: bool) -> (Store, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::new(sensor_labels(label_count))
        .with_path(temp_dir.path().join("bench.csv"))
        .with_max_records(10_000)
        .with_delta(delta);

    (Store::open(config).unwrap(), temp_dir)
}

fn positional(label_count: u32, seed: u32) -> Record {
    Record::positional(
        (0..label_count)
            .map(|i| f64::from((i + seed) % 7) * 0.5)
            .collect(),
    )
}

fn bench_insert_single(c: &mut Criterion) {
    let (mut store, _dir) = setup_store(3, false);
    let record = positional(3, 0);
    let mut ts = 1_700_000_000.0;

    c.bench_function("insert/absolute_3_labels", |b| {
        b.iter(|| {
            ts += 1.0;
            store.insert_at(black_box(&record), black_box(ts)).unwrap();
        });
    });
}

fn bench_insert_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert/labels");

    for count in [3, 10, 30] {
        for delta in [false, true] {
            let (mut store, _dir) = setup_store(count, delta);
            let records: Vec<Record> = (0..16).map(|seed| positional(count, seed)).collect();
            let mut ts = 1_700_000_000.0;
            let mut next = 0;

            let id = format!("{count}/{}", if delta { "delta" } else { "absolute" });
            group.bench_with_input(BenchmarkId::from_parameter(id), &count, |b, _| {
                b.iter(|| {
                    ts += 1.0;
                    next = (next + 1) % records.len();
                    store.insert_at(black_box(&records[next]), black_box(ts)).unwrap();
                });
            });
        }
    }

    group.finish();
}

fn bench_restore(c: &mut Criterion) {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::new(sensor_labels(10))
        .with_path(temp_dir.path().join("restore.csv"))
        .with_delta(true);

    {
        let mut store = Store::open(config.clone()).unwrap();
        for i in 0..50_000u32 {
            store.insert_at(&positional(10, i), f64::from(i)).unwrap();
        }
        store.close().unwrap();
    }

    let mut group = c.benchmark_group("restore/max_records");
    for max_records in [1_000, 10_000, 50_000] {
        let config = config.clone().with_max_records(max_records);
        group.bench_with_input(BenchmarkId::from_parameter(max_records), &max_records, |b, _| {
            b.iter(|| {
                let store = Store::open(black_box(config.clone())).unwrap();
                black_box(store.resident_count());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert_single, bench_insert_encoding, bench_restore);
criterion_main!(benches);
