use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dmkit_core::{RealColumn, Sample};
use dmkit_ml::{Canonical, Clustering, ClusteringConfig};
use dmkit_stats::{Distribution, Normal, Univariate};

fn blobs(n: usize, centers: &[(f64, f64)], seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut g = Normal::standard();
    g.set_seed(seed);
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for &(cx, cy) in centers {
        xs.extend(g.simulate(n).into_iter().map(|v| v + cx));
        ys.extend(g.simulate(n).into_iter().map(|v| v + cy));
    }
    (xs, ys)
}

fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering");
    group.sample_size(10); // structural search runs many EM fits

    let (xs, ys) = blobs(500, &[(0.0, 0.0), (8.0, 0.0), (0.0, 8.0)], 42);
    let x = RealColumn::from_reals("x", &xs).unwrap();
    let y = RealColumn::from_reals("y", &ys).unwrap();
    let config = ClusteringConfig::default();

    group.bench_function("1500_pts_2d", |b| {
        b.iter(|| {
            Clustering::new(Sample::uniform(xs.len()), black_box(vec![&x, &y]), &config).unwrap()
        })
    });

    let clustering = Clustering::new(Sample::uniform(xs.len()), vec![&x, &y], &config).unwrap();
    group.bench_function("canonical", |b| {
        b.iter(|| Canonical::new(black_box(&clustering)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_clustering);
criterion_main!(benches);
