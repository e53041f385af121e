//! Compare the CPU variants with the CUDA backend on growing datasets
//!
//! Run with: cargo run --example gpu_benchmark --features cuda --release

use clusterbench_rs::backend::cuda::CudaBackend;
use clusterbench_rs::{enumerate_devices, ComputeBackend, DataSetGenerator, DbscanParams, KMeansParams, LocalBackend};
use std::time::Instant;

fn main() {
    println!("=== clusterbench-rs CPU vs CUDA ===\n");

    let devices = enumerate_devices();
    if devices.is_empty() {
        println!("No CUDA device found");
        return;
    }
    for device in &devices {
        println!("Found {}", device);
    }
    println!();

    let gpu = match CudaBackend::new(0) {
        Ok(gpu) => gpu,
        Err(e) => {
            println!("CUDA not available: {}", e);
            return;
        }
    };
    let cpu = LocalBackend::new();
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

    // (clusters, points per cluster, features)
    let configs = [(4, 1024, 2), (8, 2048, 4), (8, 8192, 8)];

    for (clusters, size, features) in configs {
        println!("Configuration: {} clusters of {} points, {} features", clusters, size, features);
        let dataset = DataSetGenerator::new(42).random_blobs(&vec![size; clusters], features);
        let data = dataset.data.view();

        let kmeans = KMeansParams::new(clusters).with_seed(42);
        let dbscan = DbscanParams::new((features as f32).sqrt(), 10 * features);

        let mut cpu_labels = vec![u16::MAX; data.nrows()];
        let start = Instant::now();
        cpu.kmeans(&mut cpu_labels, &data, &kmeans, Some(cores));
        let cpu_time = start.elapsed();

        let mut gpu_labels = vec![u16::MAX; data.nrows()];
        let start = Instant::now();
        let output = gpu.kmeans(&mut gpu_labels, &data, &kmeans, None);
        let gpu_time = start.elapsed();

        println!("  k-means CPU ({} threads): {:>8.3}s", cores, cpu_time.as_secs_f64());
        println!(
            "  k-means CUDA:              {:>8.3}s (device {:.3}s)",
            gpu_time.as_secs_f64(),
            output.exclusive_time.unwrap_or_default().as_secs_f64()
        );
        println!("  k-means labels identical:  {}", cpu_labels == gpu_labels);

        let start = Instant::now();
        cpu.dbscan(&mut cpu_labels, &data, &dbscan, Some(cores));
        let cpu_time = start.elapsed();

        let start = Instant::now();
        let output = gpu.dbscan(&mut gpu_labels, &data, &dbscan, None);
        let gpu_time = start.elapsed();

        println!("  DBSCAN CPU ({} threads):  {:>8.3}s", cores, cpu_time.as_secs_f64());
        println!(
            "  DBSCAN CUDA:               {:>8.3}s (device {:.3}s)",
            gpu_time.as_secs_f64(),
            output.exclusive_time.unwrap_or_default().as_secs_f64()
        );
        println!("  DBSCAN labels identical:   {}", cpu_labels == gpu_labels);
        println!();
    }

    println!("=== Done ===");
}
