//! Run every CPU variant on the same three blobs and compare the results
//!
//! Run with: cargo run --example basic --release

use clusterbench_rs::{BackendSet, DataSetGenerator, DbscanParams, KMeansParams, Variant};
use ndarray::array;
use std::time::Instant;

fn main() {
    println!("=== clusterbench-rs example ===\n");

    let centers = array![[-5.0f32, -5.0], [0.0, 5.0], [5.0, -5.0]];
    let dataset = DataSetGenerator::new(42).blobs_around(&centers.view(), &[100, 100, 100], 0.8);
    let data = dataset.data.view();

    println!("Generated {} samples with {} features", dataset.len(), dataset.features());
    println!("True cluster centers:");
    for (i, center) in centers.outer_iter().enumerate() {
        println!("  Cluster {}: ({:.2}, {:.2})", i, center[0], center[1]);
    }
    println!();

    let backends = BackendSet::cpu_only();
    let cores = 4;
    let kmeans = KMeansParams::new(3).with_seed(42).with_eps(1e-4);
    let dbscan = DbscanParams::new(1.0, 5);

    let variants = [
        Variant::LocalSingle,
        Variant::LocalMulti,
        Variant::NativeSingle,
        Variant::NativeMulti,
    ];
    let mut kmeans_labels = Vec::new();
    let mut dbscan_labels = Vec::new();

    println!("{:<12} {:>10} {:>12} {:>10} {:>12}", "variant", "k-means", "time (ms)", "dbscan", "time (ms)");
    for variant in variants {
        let backend = backends.get(variant.backend()).unwrap();
        let threads = variant.threads(cores);

        let mut labels = vec![u16::MAX; data.nrows()];
        let start = Instant::now();
        let km = backend.kmeans(&mut labels, &data, &kmeans, threads);
        let km_time = start.elapsed();
        kmeans_labels.push(labels);

        let mut labels = vec![u16::MAX; data.nrows()];
        let start = Instant::now();
        let db = backend.dbscan(&mut labels, &data, &dbscan, threads);
        let db_time = start.elapsed();
        dbscan_labels.push(labels);

        println!(
            "{:<12} {:>10} {:>12.3} {:>10} {:>12.3}",
            variant.to_string(),
            km.signed_count(),
            km_time.as_secs_f64() * 1e3,
            db.signed_count(),
            db_time.as_secs_f64() * 1e3
        );
    }
    println!();

    let kmeans_agree = kmeans_labels.windows(2).all(|w| w[0] == w[1]);
    let dbscan_agree = dbscan_labels.windows(2).all(|w| w[0] == w[1]);
    println!("k-means labels identical across variants: {}", kmeans_agree);
    println!("DBSCAN labels identical across variants:  {}", dbscan_agree);

    let mut cluster_counts = vec![0usize; 4];
    for &label in &dbscan_labels[0] {
        if let Some(count) = cluster_counts.get_mut(label as usize) {
            *count += 1;
        }
    }
    println!("\nDBSCAN distribution:");
    println!("  Noise: {} samples", cluster_counts[0]);
    for (i, count) in cluster_counts.iter().enumerate().skip(1) {
        println!("  Cluster {}: {} samples", i, count);
    }

    println!("\n=== Done! ===");
}
