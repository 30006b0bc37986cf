//! Benchmark for the separate-chaining hash map (L2).
//!
//! Measures:
//! - `map()` top-K insertion under an empty vs. already-populated key
//! - `get()` lookup latency once postings are warm
//! - `HashSet` insert/has throughput for comparison against the map path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shmap_core::config::HashTableConfig;
use shmap_core::hash::{HashMap, HashSet};
use tempfile::tempdir;

#[repr(C)]
#[derive(Clone, Copy)]
struct Doc {
    id: u64,
}

fn bench_map_insert_new_keys(c: &mut Criterion) {
    c.bench_function("hash_map_insert_new_keys", |b| {
        b.iter_with_large_drop(|| {
            let dir = tempdir().expect("tempdir");
            let mut map: HashMap<50, 8, Doc> = HashMap::open(
                dir.path(),
                HashTableConfig {
                    bucket_count: 4096,
                    ..HashTableConfig::default()
                },
            )
            .unwrap();
            for i in 0..2_000u64 {
                let key = format!("key-{i}");
                let slot = map.insert_doc(&Doc { id: i }).unwrap();
                black_box(map.map(&key, slot, (i % 256) as u8).unwrap());
            }
            (dir, map)
        });
    });
}

fn bench_map_topk_churn(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    let mut map: HashMap<50, 8, Doc> = HashMap::open(
        dir.path(),
        HashTableConfig {
            bucket_count: 1024,
            ..HashTableConfig::default()
        },
    )
    .unwrap();

    c.bench_function("hash_map_topk_churn", |b| {
        b.iter(|| {
            for score in 0..8u8 {
                let slot = map.insert_doc(&Doc { id: u64::from(score) }).unwrap();
                black_box(map.map("hot-key", slot, score).unwrap());
            }
        });
    });
}

fn bench_map_get(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    let mut map: HashMap<50, 8, Doc> = HashMap::open(
        dir.path(),
        HashTableConfig {
            bucket_count: 4096,
            ..HashTableConfig::default()
        },
    )
    .unwrap();
    for i in 0..2_000u64 {
        let key = format!("key-{i}");
        let slot = map.insert_doc(&Doc { id: i }).unwrap();
        map.map(&key, slot, (i % 256) as u8).unwrap();
    }

    c.bench_function("hash_map_get_warm", |b| {
        b.iter(|| {
            for i in 0..2_000u64 {
                let key = format!("key-{i}");
                black_box(map.get(&key).unwrap());
            }
        });
    });
}

fn bench_set_insert_and_has(c: &mut Criterion) {
    c.bench_function("hash_set_insert_and_has", |b| {
        b.iter_with_large_drop(|| {
            let dir = tempdir().expect("tempdir");
            let mut set: HashSet<50> = HashSet::open(
                dir.path(),
                HashTableConfig {
                    bucket_count: 4096,
                    ..HashTableConfig::default()
                },
            )
            .unwrap();
            for i in 0..2_000u64 {
                let key = format!("key-{i}");
                set.insert(&key).unwrap();
                black_box(set.has(&key).unwrap());
            }
            (dir, set)
        });
    });
}

criterion_group!(
    benches,
    bench_map_insert_new_keys,
    bench_map_topk_churn,
    bench_map_get,
    bench_set_insert_and_has
);
criterion_main!(benches);
