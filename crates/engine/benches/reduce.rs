//! Benchmarks for the batched game transformations
//!
//! Measures reduce (the pairwise-dominance hot path) and shift over a
//! training-sized batch.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use rand::SeedableRng;

use hironaka_engine::{random_batch, PointSet, PointsOptions};

fn bench_reduce(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let batch = random_batch(256, 20, 3, 50, &PointsOptions::default(), &mut rng).unwrap();

    c.bench_function("points_reduce_256x20x3", |b| {
        b.iter(|| {
            let reduced = black_box(&batch).reduced();
            black_box(reduced)
        })
    });
}

fn bench_shift(c: &mut Criterion) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let batch = random_batch(256, 20, 3, 50, &PointsOptions::default(), &mut rng).unwrap();
    let coords = Array2::from_elem((256, 3), 1.0f32);
    let axes = vec![0usize; 256];

    c.bench_function("points_shift_256x20x3", |b| {
        b.iter(|| {
            let shifted = black_box(&batch).shifted(&coords, &axes).unwrap();
            black_box(shifted)
        })
    });
}

criterion_group!(benches, bench_reduce, bench_shift);
criterion_main!(benches);
