//! Benchmark for the slot-indexed storage layer (L1).
//!
//! Measures:
//! - Sequential insert throughput (the `next_write_pos` scan path)
//! - Positional find / update on a warm mapping
//! - Cost of crossing the load-ratio threshold and triggering an extend

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shmap_core::config::SlotStoreConfig;
use shmap_core::storage::SlotStore;
use tempfile::tempdir;

#[repr(C)]
#[derive(Clone, Copy)]
struct Record {
    a: u64,
    b: u64,
    c: u64,
    d: u64,
}

fn open_store(capacity: usize) -> (tempfile::TempDir, SlotStore<Record>) {
    let dir = tempdir().expect("tempdir");
    let store = SlotStore::open(
        dir.path().join("data.dat"),
        dir.path().join("data.bit"),
        SlotStoreConfig {
            initial_capacity: capacity,
            load_ratio: 2.0,
            extend_size: 10 * 1024 * 1024,
            mode: shmap_core::config::StorageMode::ReadWrite,
        },
    )
    .expect("open slot store");
    (dir, store)
}

fn bench_sequential_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_store_insert");
    for count in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_with_large_drop(|| {
                let (_dir, mut store) = open_store(count + 16);
                for i in 0..count {
                    let rec = Record {
                        a: i as u64,
                        b: 0,
                        c: 0,
                        d: 0,
                    };
                    black_box(store.insert(&rec, None).unwrap());
                }
                store
            });
        });
    }
    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let (_dir, mut store) = open_store(10_000);
    let mut positions = Vec::new();
    for i in 0..10_000u64 {
        positions.push(
            store
                .insert(
                    &Record {
                        a: i,
                        b: 0,
                        c: 0,
                        d: 0,
                    },
                    None,
                )
                .unwrap(),
        );
    }

    c.bench_function("slot_store_find_warm", |b| {
        b.iter(|| {
            for pos in &positions {
                black_box(store.find(*pos).unwrap());
            }
        });
    });
}

fn bench_extend(c: &mut Criterion) {
    c.bench_function("slot_store_extend", |b| {
        b.iter_with_large_drop(|| {
            let dir = tempdir().expect("tempdir");
            let mut store: SlotStore<Record> = SlotStore::open(
                dir.path().join("data.dat"),
                dir.path().join("data.bit"),
                SlotStoreConfig {
                    initial_capacity: 16,
                    load_ratio: 0.8,
                    extend_size: 4096,
                    mode: shmap_core::config::StorageMode::ReadWrite,
                },
            )
            .unwrap();
            for i in 0..14u64 {
                store
                    .insert(
                        &Record {
                            a: i,
                            b: 0,
                            c: 0,
                            d: 0,
                        },
                        None,
                    )
                    .unwrap();
            }
            (dir, store)
        });
    });
}

criterion_group!(benches, bench_sequential_insert, bench_find, bench_extend);
criterion_main!(benches);
