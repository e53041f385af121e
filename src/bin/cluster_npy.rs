//! Run one clustering variant on a dataset stored as .npy
//!
//! Reads an `(n_samples, n_features)` float32 array, clusters it and saves
//! the u16 labels to another .npy file.
//!
//! Usage: `cluster-npy <input.npy> <output.npy> <kmeans|dbscan> <variant> <param> [min_neighbors] [cores]`
//!
//! `variant` is one of `local`, `local-mt`, `native`, `native-mt`, `gpu`.
//! `param` is the cluster count for k-means and eps for DBSCAN.

use anyhow::{bail, Context, Result};
use clusterbench_rs::{BackendSet, ComputeBackend, DbscanParams, KMeansParams, Variant};
use ndarray::{Array1, Array2};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

fn parse_variant(name: &str) -> Result<Variant> {
    Ok(match name {
        "local" => Variant::LocalSingle,
        "local-mt" => Variant::LocalMulti,
        "native" => Variant::NativeSingle,
        "native-mt" => Variant::NativeMulti,
        "gpu" => Variant::NativeGpu,
        other => bail!("unknown variant {other:?}"),
    })
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 6 || args.len() > 8 {
        eprintln!(
            "Usage: {} <input.npy> <output.npy> <kmeans|dbscan> <variant> <param> [min_neighbors] [cores]",
            args[0]
        );
        std::process::exit(1);
    }

    let input_path = &args[1];
    let output_path = &args[2];
    let algorithm = args[3].as_str();
    let variant = parse_variant(&args[4])?;
    let cores: usize = match args.get(7) {
        Some(c) => c.parse()?,
        None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    };

    let reader = BufReader::new(File::open(input_path).with_context(|| format!("cannot open {input_path}"))?);
    let data: Array2<f32> = Array2::read_npy(reader)?;
    eprintln!("Loaded data: {} samples x {} features", data.nrows(), data.ncols());

    let backends = BackendSet::detect(variant == Variant::NativeGpu, 0);
    let backend = backends
        .get(variant.backend())
        .with_context(|| format!("{variant} backend is not available in this build"))?;
    let threads = variant.threads(cores);

    let mut labels = vec![u16::MAX; data.nrows()];
    let start = Instant::now();
    let output = match algorithm {
        "kmeans" => {
            let k: usize = args[5].parse()?;
            let params = KMeansParams::new(k).with_seed(0);
            backend.kmeans(&mut labels, &data.view(), &params, threads)
        }
        "dbscan" => {
            let eps: f32 = args[5].parse()?;
            let min_neighbors: usize = match args.get(6) {
                Some(m) => m.parse()?,
                None => 10 * data.ncols(),
            };
            backend.dbscan(&mut labels, &data.view(), &DbscanParams::new(eps, min_neighbors), threads)
        }
        other => bail!("unknown algorithm {other:?}"),
    };
    let elapsed = start.elapsed();

    let clusters = output.clusters.with_context(|| format!("{algorithm} with {variant} failed"))?;
    eprintln!("{} clusters in {:.4}s", clusters, elapsed.as_secs_f64());
    if let Some(exclusive) = output.exclusive_time {
        eprintln!("Exclusive time: {:.4}s", exclusive.as_secs_f64());
    }

    let writer = File::create(output_path)?;
    Array1::from_vec(labels).write_npy(writer)?;
    eprintln!("Saved labels to {}", output_path);

    Ok(())
}
