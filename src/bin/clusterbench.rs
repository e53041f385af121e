//! Benchmark runner
//!
//! Runs the k-means/DBSCAN benchmark matrix and writes one `;`-separated
//! record per pass, to a file or to stdout.
//!
//! Usage: `clusterbench [--config run.json] [--mode dynamic --passes 5] [-o results.csv]`

use anyhow::{Context, Result};
use clap::Parser;
use clusterbench_rs::telemetry::init_subscriber;
use clusterbench_rs::{
    enumerate_devices, BackendSet, BenchmarkConfig, BenchmarkDriver, CsvRecordSink, MismatchReport, RecordSink,
    RunMode,
};
use ndarray::Array1;
use ndarray_npy::WriteNpyExt;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "clusterbench", about = "Benchmark concurrent k-means and DBSCAN variants")]
struct Args {
    /// JSON configuration file; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<RunMode>,

    #[arg(long)]
    passes: Option<usize>,

    #[arg(long)]
    kmeans_eps: Option<f32>,

    /// DBSCAN radius (0 = sqrt(features))
    #[arg(long)]
    dbscan_eps: Option<f32>,

    /// DBSCAN core point threshold (0 = 10 * features)
    #[arg(long)]
    min_neighbors: Option<usize>,

    /// Worker threads for the multi-threaded variants (0 = all cores)
    #[arg(long)]
    cores: Option<usize>,

    /// Include the GPU variant, on the given device
    #[arg(long)]
    accelerator: Option<usize>,

    /// Clusters per dataset in dynamic mode (0 = random)
    #[arg(long)]
    clusters: Option<usize>,

    /// Points per cluster in dynamic mode (0 = random)
    #[arg(long)]
    cluster_size: Option<usize>,

    /// Features per point in dynamic mode (0 = random)
    #[arg(long)]
    features: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Results file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Replace the results file instead of appending to it
    #[arg(long)]
    overwrite: bool,

    /// Append log output to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    time_limit: Option<u64>,

    /// Dump the dataset and DBSCAN labels here when variants disagree
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// List accelerator devices and exit
    #[arg(long)]
    list_devices: bool,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> Result<BenchmarkConfig> {
        let mut config = match &self.config {
            Some(path) => BenchmarkConfig::from_json_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => BenchmarkConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(passes) = self.passes {
            config.passes = passes;
        }
        if let Some(eps) = self.kmeans_eps {
            config.kmeans_eps = eps;
        }
        if let Some(eps) = self.dbscan_eps {
            config.dbscan_eps = eps;
        }
        if let Some(min_neighbors) = self.min_neighbors {
            config.dbscan_min_neighbors = min_neighbors;
        }
        if let Some(cores) = self.cores {
            config.cores = cores;
        }
        if let Some(device) = self.accelerator {
            config = config.with_accelerator(device);
        }
        if let Some(clusters) = self.clusters {
            config.cluster_count = clusters;
        }
        if let Some(size) = self.cluster_size {
            config.cluster_size = size;
        }
        if let Some(features) = self.features {
            config.features = features;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if self.overwrite {
            config.append_results = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn dump_mismatch(dir: &Path, report: &MismatchReport<'_>) -> Result<()> {
    fs::create_dir_all(dir)?;

    let data_path = dir.join(format!("pass{:04}_data.npy", report.pass));
    report.data.write_npy(BufWriter::new(File::create(&data_path)?))?;

    for (variant, labels) in report.labels {
        let path = dir.join(format!("pass{:04}_{}.npy", report.pass, variant));
        Array1::from_vec(labels.clone()).write_npy(BufWriter::new(File::create(&path)?))?;
    }

    info!(pass = report.pass, dir = %dir.display(), "dumped mismatching pass");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_subscriber(args.verbose, args.log_file.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    if args.list_devices {
        let devices = enumerate_devices();
        if devices.is_empty() {
            println!("No accelerator devices found");
        }
        for device in devices {
            println!("{device}");
        }
        return Ok(());
    }

    let config = args.to_config()?;
    let backends = BackendSet::detect(config.accelerator, config.accelerator_device);

    let mut driver = BenchmarkDriver::new(config.clone(), backends)
        .with_progress(|p| info!("pass {}/{}", p.current, p.total));
    if let Some(dir) = args.dump_dir.clone() {
        driver = driver.with_mismatch_handler(move |report| {
            if let Err(e) = dump_mismatch(&dir, report) {
                error!(error = %e, "failed to dump mismatching pass");
            }
        });
    }

    if let Some(seconds) = args.time_limit {
        let canceller = driver.canceller();
        thread::Builder::new()
            .name("time-limit".to_string())
            .spawn(move || {
                thread::sleep(Duration::from_secs(seconds));
                canceller.cancel();
            })
            .context("failed to start the time limit watchdog")?;
    }

    let mut sink: Box<dyn RecordSink> = match &args.output {
        Some(path) => Box::new(
            CsvRecordSink::create(path, config.append_results)
                .with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => Box::new(CsvRecordSink::from_writer(io::stdout())),
    };

    let summary = driver.run(sink.as_mut())?;

    eprintln!(
        "{} of {} passes completed in {:.2}s ({} mismatches, {} failed{})",
        summary.completed,
        summary.planned,
        summary.elapsed.as_secs_f64(),
        summary.mismatches,
        summary.failures.len(),
        if summary.cancelled { ", cancelled" } else { "" }
    );
    for failure in &summary.failures {
        eprintln!(
            "  pass {}: {} {} failed: {}",
            failure.pass, failure.variant, failure.algorithm, failure.reason
        );
    }

    Ok(())
}
