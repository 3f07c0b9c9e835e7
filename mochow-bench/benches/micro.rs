//! Criterion microbenchmarks for the per-query scoring path.
//!
//! Run with: `cargo bench --bench micro`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mochow_bench::dataset::synthetic::{exact_neighbors, DataGen};
use mochow_bench::dataset::vecs;
use mochow_bench::metric::{percentile, recall};
use mochow_bench::runner::l2_normalize;
use tempfile::TempDir;

fn bench_recall(c: &mut Criterion) {
    let mut group = c.benchmark_group("recall");

    for k in [10usize, 100] {
        let truth: Vec<i64> = (0..k as i64).collect();
        // Half the predictions hit.
        let returned: Vec<i64> = (0..k as i64).map(|i| if i % 2 == 0 { i } else { -i }).collect();
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, &k| {
            b.iter(|| recall(black_box(k), black_box(&truth), black_box(&returned)));
        });
    }
    group.finish();
}

fn bench_percentile(c: &mut Criterion) {
    let mut group = c.benchmark_group("p99");

    for n in [1_000usize, 10_000] {
        let mut gen = DataGen::new(42);
        let samples: Vec<f64> = gen
            .random_vector(n)
            .into_iter()
            .map(|x| x.abs() as f64)
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &samples, |b, s| {
            b.iter(|| percentile(black_box(s), 99.0));
        });
    }
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("l2_normalize");

    for dim in [128usize, 768, 1536] {
        let mut gen = DataGen::new(7);
        let base: Vec<f32> = gen.random_vector(dim).iter().map(|x| x * 3.0).collect();
        group.bench_with_input(BenchmarkId::from_parameter(dim), &base, |b, base| {
            b.iter(|| {
                let mut v = base.clone();
                l2_normalize(&mut v);
                v
            });
        });
    }
    group.finish();
}

fn bench_ground_truth(c: &mut Criterion) {
    let mut gen = DataGen::new(1);
    let base = gen.random_vectors(10_000, 128);
    let query = gen.random_vector(128);

    c.bench_function("exact_neighbors/10k_x_128", |b| {
        b.iter(|| exact_neighbors(black_box(&base), black_box(&query), 100));
    });
}

fn bench_fvecs_read(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("train.fvecs");
    let mut gen = DataGen::new(3);
    vecs::write_all(&path, &gen.random_vectors(10_000, 768)).unwrap();

    c.bench_function("fvecs_read/10k_x_768", |b| {
        b.iter(|| {
            let rows = vecs::VecsReader::<f32>::open(&path).unwrap();
            vecs::VecsBatches::new(rows, 1000).map(|b| b.unwrap().len()).sum::<usize>()
        });
    });
}

criterion_group!(
    benches,
    bench_recall,
    bench_percentile,
    bench_normalize,
    bench_ground_truth,
    bench_fvecs_read
);
criterion_main!(benches);
