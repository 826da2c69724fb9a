use centrack::matching::{GreedyMatcher, HungarianMatcher, MatchingStrategy};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use rand::prelude::*;

fn generate_random_cost_matrix(rows: usize, cols: usize) -> Array2<f32> {
    let mut rng = thread_rng();
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0.0..100.0))
}

fn bench_greedy_small(c: &mut Criterion) {
    let cost_matrix = generate_random_cost_matrix(10, 10);

    c.bench_function("greedy_10x10", |b| {
        b.iter(|| GreedyMatcher.assign(black_box(cost_matrix.view()), black_box(50.0)))
    });
}

fn bench_greedy_large(c: &mut Criterion) {
    let cost_matrix = generate_random_cost_matrix(100, 100);

    c.bench_function("greedy_100x100", |b| {
        b.iter(|| GreedyMatcher.assign(black_box(cost_matrix.view()), black_box(50.0)))
    });
}

fn bench_hungarian_small(c: &mut Criterion) {
    let cost_matrix = generate_random_cost_matrix(10, 10);
    let matcher = HungarianMatcher::default();

    c.bench_function("hungarian_10x10", |b| {
        b.iter(|| matcher.assign(black_box(cost_matrix.view()), black_box(50.0)))
    });
}

fn bench_hungarian_medium(c: &mut Criterion) {
    let cost_matrix = generate_random_cost_matrix(50, 50);
    let matcher = HungarianMatcher::default();

    c.bench_function("hungarian_50x50", |b| {
        b.iter(|| matcher.assign(black_box(cost_matrix.view()), black_box(50.0)))
    });
}

criterion_group!(
    benches,
    bench_greedy_small,
    bench_greedy_large,
    bench_hungarian_small,
    bench_hungarian_medium
);
criterion_main!(benches);
