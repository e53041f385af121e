//! # clusterbench-rs
//!
//! Concurrent k-means and DBSCAN engines plus a benchmark driver that runs
//! them through several execution strategies on synthetic data and checks
//! that they agree.
//!
//! ## Features
//!
//! - **Lloyd's k-means and DBSCAN**: single-threaded or on a persistent
//!   worker pool with barrier rounds
//! - **Cooperative cancellation**: one [`AbortSignal`] observed at round
//!   boundaries, no thread is ever killed
//! - **Pluggable backends**: this crate's engines, rayon kernels, and CUDA
//!   kernels behind the `cuda` feature, all behind [`ComputeBackend`]
//! - **Cross-validation**: every DBSCAN variant must produce the same labels
//! - **CSV records**: one `;`-separated row of timings per benchmark pass
//!
//! ## Example
//!
//! ```rust
//! use clusterbench_rs::{AbortSignal, DataSetGenerator, DbscanEngine, DbscanParams};
//! use ndarray::array;
//!
//! let centers = array![[0.0f32, 0.0], [20.0, 0.0]];
//! let dataset = DataSetGenerator::new(42).blobs_around(&centers.view(), &[100, 100], 0.5);
//! let data = dataset.data.view();
//!
//! let engine = DbscanEngine::new(DbscanParams::new(1.0, 5), AbortSignal::new());
//!
//! let mut single = vec![u16::MAX; data.nrows()];
//! let mut multi = vec![u16::MAX; data.nrows()];
//! let a = engine.run(&mut single, &data).unwrap();
//! let b = engine.run_parallel(&mut multi, &data, 4).unwrap();
//!
//! assert_eq!(a.n_clusters, 2);
//! assert_eq!(b.n_clusters, 2);
//! assert_eq!(single, multi);
//! ```
//!
//! ## Running the benchmark
//!
//! ```rust
//! use clusterbench_rs::{BackendSet, BenchmarkConfig, BenchmarkDriver, CsvRecordSink, RunMode};
//!
//! let config = BenchmarkConfig::new(RunMode::Dynamic, 2)
//!     .with_shape(3, 128, 2)
//!     .with_seed(7);
//! let driver = BenchmarkDriver::new(config, BackendSet::cpu_only())
//!     .with_progress(|p| eprintln!("pass {}/{}", p.current, p.total));
//!
//! let mut sink = CsvRecordSink::from_writer(Vec::new());
//! let summary = driver.run(&mut sink).unwrap();
//!
//! assert_eq!(summary.completed, 2);
//! assert_eq!(summary.mismatches, 0);
//! ```
//!
//! ## GPU
//!
//! ```toml
//! clusterbench-rs = { version = "0.1", features = ["cuda"] }
//! ```

pub mod abort;
pub mod backend;
pub mod config;
pub mod dbscan;
pub mod distance;
pub mod driver;
pub mod error;
pub mod generator;
pub mod kmeans;
pub mod pool;
pub mod record;
pub mod telemetry;

pub use abort::AbortSignal;
pub use backend::{
    enumerate_devices, BackendKind, BackendOutput, BackendSet, ComputeBackend, DeviceInfo, DeviceType, LocalBackend,
    NativeBackend,
};
pub use config::{BenchmarkConfig, RunMode};
pub use dbscan::{DbscanEngine, DbscanParams, DbscanResult, NeighborScan, PointState, PointStatus, MAX_CLUSTER_ID};
pub use driver::{
    plan_passes, Algorithm, BenchmarkDriver, MismatchReport, PassFailure, PassPlan, PassProgress, RunCanceller,
    RunSummary, Variant,
};
pub use error::{BenchmarkError, ClusterError};
pub use generator::{DataSetGenerator, GeneratedDataset};
pub use kmeans::{Assigner, KMeansEngine, KMeansParams, KMeansResult};
pub use pool::{partition, PoolError, WorkerPool};
pub use record::{BenchmarkRecord, CsvRecordSink, RecordSink};
