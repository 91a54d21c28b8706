//! HNSW insert/search benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use maia_core::{HnswConfig, HnswIndex, VectorIndex};
use tokio_util::sync::CancellationToken;

const DIM: usize = 128;

fn pseudo_vector(seed: u64) -> Vec<f32> {
    // Cheap deterministic vector without pulling a PRNG into the bench loop.
    let mut v: Vec<f32> = (0..DIM as u64)
        .map(|i| {
            let mixed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(i.wrapping_mul(1442695040888963407));
            ((mixed >> 33) as f32 / u32::MAX as f32) - 0.5
        })
        .collect();
    maia_core::normalize(&mut v);
    v
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("hnsw_insert_1000", |b| {
        b.iter(|| {
            let index = HnswIndex::new(HnswConfig::new(DIM));
            let cancel = CancellationToken::new();
            for i in 0..1000u64 {
                index
                    .add(&format!("m{i}"), &pseudo_vector(i), &cancel)
                    .unwrap();
            }
            black_box(index.size().unwrap())
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let index = HnswIndex::new(HnswConfig::new(DIM));
    let cancel = CancellationToken::new();
    for i in 0..5000u64 {
        index
            .add(&format!("m{i}"), &pseudo_vector(i), &cancel)
            .unwrap();
    }
    let query = pseudo_vector(999_999);
    c.bench_function("hnsw_search_k10_of_5000", |b| {
        b.iter(|| black_box(index.search(&query, 10, &cancel).unwrap()))
    });

    let brute = VectorIndex::brute_force(DIM);
    for i in 0..5000u64 {
        brute
            .add(&format!("m{i}"), &pseudo_vector(i), &cancel)
            .unwrap();
    }
    c.bench_function("brute_search_k10_of_5000", |b| {
        b.iter(|| black_box(brute.search(&query, 10, &cancel).unwrap()))
    });
}

criterion_group!(benches, bench_insert, bench_search);
criterion_main!(benches);
