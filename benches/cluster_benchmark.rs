use clusterbench_rs::{AbortSignal, DataSetGenerator, DbscanEngine, DbscanParams, KMeansEngine, KMeansParams};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rayon::ThreadPoolBuilder;
use std::time::Duration;

const CORES: usize = 4;

fn benchmark_kmeans_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans_strategies");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let cluster_count = 8;
    let sizes = [256, 1024, 4096];

    for size in sizes.iter() {
        let dataset = DataSetGenerator::new(42).random_blobs(&vec![*size; cluster_count], 4);
        let params = KMeansParams::new(cluster_count).with_seed(42).with_eps(1e-3);
        let engine = KMeansEngine::new(params, AbortSignal::new());
        let n = dataset.len();
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("sequential", n), &dataset, |b, dataset| {
            let mut labels = vec![u16::MAX; n];
            b.iter(|| engine.run(&mut labels, black_box(&dataset.data.view())).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("pool", n), &dataset, |b, dataset| {
            let mut labels = vec![u16::MAX; n];
            b.iter(|| {
                engine
                    .run_parallel(&mut labels, black_box(&dataset.data.view()), CORES)
                    .unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("rayon", n), &dataset, |b, dataset| {
            let pool = ThreadPoolBuilder::new().num_threads(CORES).build().unwrap();
            let mut labels = vec![u16::MAX; n];
            b.iter(|| {
                pool.install(|| {
                    let data = dataset.data.view();
                    let mut assigner = clusterbench_rs::kmeans::RayonAssigner::new(data);
                    engine.run_with(&mut labels, black_box(&data), &mut assigner).unwrap()
                })
            });
        });
    }
    group.finish();
}

fn benchmark_dbscan_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("dbscan_strategies");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let cluster_count = 4;
    let features = 2;
    let sizes = [256, 1024, 2048];

    for size in sizes.iter() {
        let dataset = DataSetGenerator::new(7).random_blobs(&vec![*size; cluster_count], features);
        let params = DbscanParams::new((features as f32).sqrt(), 10 * features);
        let engine = DbscanEngine::new(params, AbortSignal::new());
        let n = dataset.len();
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("sequential", n), &dataset, |b, dataset| {
            let mut labels = vec![u16::MAX; n];
            b.iter(|| engine.run(&mut labels, black_box(&dataset.data.view())).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("pool", n), &dataset, |b, dataset| {
            let mut labels = vec![u16::MAX; n];
            b.iter(|| {
                engine
                    .run_parallel(&mut labels, black_box(&dataset.data.view()), CORES)
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn benchmark_pool_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmeans_pool_width");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let dataset = DataSetGenerator::new(3).random_blobs(&[2048; 6], 4);
    let engine = KMeansEngine::new(KMeansParams::new(6).with_seed(3), AbortSignal::new());
    let n = dataset.len();

    for cores in [1usize, 2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(cores), cores, |b, &cores| {
            let mut labels = vec![u16::MAX; n];
            b.iter(|| {
                engine
                    .run_parallel(&mut labels, black_box(&dataset.data.view()), cores)
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_kmeans_strategies,
    benchmark_dbscan_strategies,
    benchmark_pool_width,
);

criterion_main!(benches);
