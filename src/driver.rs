//! Benchmark driver.
//!
//! A run is a list of passes ([`plan_passes`]). Every pass generates one
//! synthetic dataset, runs k-means and then DBSCAN on it with every
//! [`Variant`] in a freshly shuffled order, checks that all DBSCAN label
//! buffers agree and writes one [`BenchmarkRecord`] to the sink.
//!
//! Failure handling per variant call:
//!
//! | outcome                          | effect                                   |
//! |----------------------------------|------------------------------------------|
//! | success                          | wall-clock and exclusive times recorded  |
//! | `Aborted`                        | run stops, no record for the pass        |
//! | `IdSpaceExhausted` or a panic    | pass dropped, run continues              |
//! | any other error                  | logged, times left unmeasured            |

use crate::abort::AbortSignal;
use crate::backend::{BackendKind, BackendSet, ComputeBackend};
use crate::config::{BenchmarkConfig, RunMode};
use crate::dbscan::DbscanParams;
use crate::error::{BenchmarkError, ClusterError};
use crate::generator::{DataSetGenerator, GeneratedDataset};
use crate::kmeans::KMeansParams;
use crate::record::{BenchmarkRecord, RecordSink};
use ndarray::ArrayView2;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Feature counts of the fixed sweep.
pub const FIXED_FEATURES: [usize; 3] = [1, 2, 4];
/// Cluster counts of the fixed sweep.
pub const FIXED_CLUSTER_COUNTS: [usize; 4] = [2, 4, 6, 8];
/// Per-cluster sizes of the fixed sweep.
pub const FIXED_CLUSTER_SIZES: [usize; 5] = [128, 256, 512, 1024, 2048];

const DYNAMIC_MAX_CLUSTERS: usize = 8;
const DYNAMIC_MAX_FEATURES: usize = 8;
const DYNAMIC_SIZE_STEP: usize = 128;
const DYNAMIC_MAX_SIZE_STEPS: usize = 16;

/// Note written to the sink when a run is cancelled.
pub const CANCELLED_NOTE: &str = "Job cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    KMeans,
    Dbscan,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::KMeans => f.write_str("k-means"),
            Algorithm::Dbscan => f.write_str("dbscan"),
        }
    }
}

/// One backend in one threading mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    LocalSingle,
    NativeSingle,
    NativeGpu,
    LocalMulti,
    NativeMulti,
}

impl Variant {
    /// Every variant, in record column order.
    pub const ALL: [Variant; 5] = [
        Variant::LocalSingle,
        Variant::NativeSingle,
        Variant::NativeGpu,
        Variant::LocalMulti,
        Variant::NativeMulti,
    ];

    /// Wall-clock column of this variant in a record.
    pub fn column(self) -> usize {
        match self {
            Variant::LocalSingle => 0,
            Variant::NativeSingle => 1,
            Variant::NativeGpu => 2,
            Variant::LocalMulti => 3,
            Variant::NativeMulti => 4,
        }
    }

    /// Exclusive-time column, for the variants that report one.
    pub fn exclusive_column(self) -> Option<usize> {
        match self {
            Variant::NativeGpu => Some(0),
            Variant::LocalMulti => Some(1),
            Variant::NativeMulti => Some(2),
            Variant::LocalSingle | Variant::NativeSingle => None,
        }
    }

    pub fn backend(self) -> BackendKind {
        match self {
            Variant::LocalSingle | Variant::LocalMulti => BackendKind::Local,
            Variant::NativeSingle | Variant::NativeMulti => BackendKind::Native,
            Variant::NativeGpu => BackendKind::Gpu,
        }
    }

    /// Worker count handed to the backend.
    pub fn threads(self, cores: usize) -> Option<usize> {
        match self {
            Variant::LocalMulti | Variant::NativeMulti => Some(cores),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variant::LocalSingle => "local",
            Variant::NativeSingle => "native",
            Variant::NativeGpu => "native-gpu",
            Variant::LocalMulti => "local-mt",
            Variant::NativeMulti => "native-mt",
        };
        f.write_str(name)
    }
}

/// Shape and DBSCAN parameters of one pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassPlan {
    /// Points per generated cluster
    pub cluster_sizes: Vec<usize>,
    pub features: usize,
    pub dbscan_eps: f32,
    pub min_neighbors: usize,
}

impl PassPlan {
    pub fn cluster_count(&self) -> usize {
        self.cluster_sizes.len()
    }

    /// Total number of points.
    pub fn size(&self) -> usize {
        self.cluster_sizes.iter().sum()
    }

    fn new(config: &BenchmarkConfig, cluster_sizes: Vec<usize>, features: usize) -> Self {
        Self {
            cluster_sizes,
            features,
            dbscan_eps: config.dbscan_eps_for(features),
            min_neighbors: config.min_neighbors_for(features),
        }
    }
}

/// Build the pass list of a run.
///
/// Fixed mode sweeps every combination of [`FIXED_FEATURES`],
/// [`FIXED_CLUSTER_COUNTS`] and [`FIXED_CLUSTER_SIZES`] `passes` times and
/// shuffles the result. Dynamic mode draws `passes` shapes, replacing every
/// zero in the configured shape with a random value.
pub fn plan_passes<R: Rng + ?Sized>(config: &BenchmarkConfig, rng: &mut R) -> Vec<PassPlan> {
    match config.mode {
        RunMode::Fixed => {
            let mut plan = Vec::with_capacity(
                config.passes * FIXED_FEATURES.len() * FIXED_CLUSTER_COUNTS.len() * FIXED_CLUSTER_SIZES.len(),
            );
            for _ in 0..config.passes {
                for &features in &FIXED_FEATURES {
                    for &clusters in &FIXED_CLUSTER_COUNTS {
                        for &size in &FIXED_CLUSTER_SIZES {
                            plan.push(PassPlan::new(config, vec![size; clusters], features));
                        }
                    }
                }
            }
            plan.shuffle(rng);
            plan
        }
        RunMode::Dynamic => (0..config.passes)
            .map(|_| {
                let clusters = match config.cluster_count {
                    0 => rng.gen_range(1..=DYNAMIC_MAX_CLUSTERS),
                    n => n,
                };
                let features = match config.features {
                    0 => rng.gen_range(1..=DYNAMIC_MAX_FEATURES),
                    n => n,
                };
                let sizes = (0..clusters)
                    .map(|_| match config.cluster_size {
                        0 => rng.gen_range(1..=DYNAMIC_MAX_SIZE_STEPS) * DYNAMIC_SIZE_STEP,
                        n => n,
                    })
                    .collect();
                PassPlan::new(config, sizes, features)
            })
            .collect(),
    }
}

/// Position of the pass that just started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassProgress {
    /// 1-based
    pub current: usize,
    pub total: usize,
}

/// A pass dropped by a pass-fatal condition
#[derive(Debug, Clone, PartialEq)]
pub struct PassFailure {
    /// 1-based pass index
    pub pass: usize,
    pub variant: Variant,
    pub algorithm: Algorithm,
    pub reason: String,
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Passes in the plan
    pub planned: usize,
    /// Passes that produced a record
    pub completed: usize,
    /// Records whose DBSCAN buffers disagreed
    pub mismatches: usize,
    pub failures: Vec<PassFailure>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Stops a running benchmark from any thread.
#[derive(Clone)]
pub struct RunCanceller {
    signal: AbortSignal,
    backends: Vec<Arc<dyn ComputeBackend>>,
}

impl RunCanceller {
    /// Raise the run signal and abort every backend.
    ///
    /// The in-flight variant returns at its next round boundary and the run
    /// ends without a record for the current pass.
    pub fn cancel(&self) {
        info!("cancelling benchmark run");
        self.signal.abort();
        for backend in &self.backends {
            backend.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_aborted()
    }
}

/// DBSCAN label buffers of a pass that did not all agree
pub struct MismatchReport<'a> {
    /// 1-based pass index
    pub pass: usize,
    pub data: ArrayView2<'a, f32>,
    pub labels: &'a [(Variant, Vec<u16>)],
    pub disagreeing: &'a [(Variant, Variant)],
}

type ProgressCallback = Box<dyn Fn(PassProgress) + Send + Sync>;
type MismatchCallback = Box<dyn Fn(&MismatchReport<'_>) + Send + Sync>;

enum PassOutcome {
    Completed(BenchmarkRecord),
    Cancelled,
    Failed(PassFailure),
}

struct Measured {
    wall: Option<Duration>,
    exclusive: Option<Duration>,
    clusters: Option<usize>,
}

/// Runs the benchmark matrix and writes its records.
///
/// # Example
///
/// ```
/// use clusterbench_rs::{BackendSet, BenchmarkConfig, BenchmarkDriver, BenchmarkRecord, RunMode};
///
/// let config = BenchmarkConfig::new(RunMode::Dynamic, 1)
///     .with_shape(2, 128, 2)
///     .with_cores(2)
///     .with_seed(1);
/// let driver = BenchmarkDriver::new(config, BackendSet::cpu_only());
///
/// let mut records: Vec<BenchmarkRecord> = Vec::new();
/// let summary = driver.run(&mut records).unwrap();
///
/// assert_eq!(summary.completed, 1);
/// assert_eq!(records[0].size, 256);
/// ```
pub struct BenchmarkDriver {
    config: BenchmarkConfig,
    backends: BackendSet,
    variants: Vec<Variant>,
    signal: AbortSignal,
    progress: Option<ProgressCallback>,
    on_mismatch: Option<MismatchCallback>,
}

impl BenchmarkDriver {
    pub fn new(config: BenchmarkConfig, backends: BackendSet) -> Self {
        let variants: Vec<Variant> = Variant::ALL
            .into_iter()
            .filter(|v| match v.backend() {
                BackendKind::Gpu => config.accelerator && backends.has_gpu(),
                _ => true,
            })
            .collect();

        if config.accelerator && !backends.has_gpu() {
            info!("accelerator requested but unavailable, skipping the GPU variant");
        }

        Self {
            config,
            backends,
            variants,
            signal: AbortSignal::new(),
            progress: None,
            on_mismatch: None,
        }
    }

    /// Call `callback` at the start of every pass.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(PassProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Call `handler` whenever the DBSCAN buffers of a pass disagree.
    pub fn with_mismatch_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&MismatchReport<'_>) + Send + Sync + 'static,
    {
        self.on_mismatch = Some(Box::new(handler));
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Variants in the matrix, in column order.
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn canceller(&self) -> RunCanceller {
        RunCanceller {
            signal: self.signal.clone(),
            backends: self.backends.all(),
        }
    }

    /// Execute the whole plan, writing one record per completed pass.
    ///
    /// Only configuration and sink errors are returned; clustering failures
    /// end up in the [`RunSummary`].
    pub fn run(&self, sink: &mut dyn RecordSink) -> Result<RunSummary, BenchmarkError> {
        self.config.validate()?;
        let start = Instant::now();

        self.signal.resume();
        for backend in self.backends.all() {
            backend.resume();
        }

        let mut rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let plan = plan_passes(&self.config, &mut rng);
        let cores = self.config.effective_cores();

        info!(
            mode = ?self.config.mode,
            passes = plan.len(),
            cores,
            variants = self.variants.len(),
            "starting benchmark run"
        );
        sink.write_header()?;

        let mut summary = RunSummary {
            planned: plan.len(),
            ..Default::default()
        };
        let mut order = self.variants.clone();

        for (index, pass) in plan.iter().enumerate() {
            if self.signal.is_aborted() {
                summary.cancelled = true;
                break;
            }

            let current = index + 1;
            if let Some(progress) = &self.progress {
                progress(PassProgress {
                    current,
                    total: plan.len(),
                });
            }

            order.shuffle(&mut rng);
            let dataset = DataSetGenerator::new(rng.gen()).random_blobs(&pass.cluster_sizes, pass.features);
            let kmeans_seed = rng.gen();

            info!(
                pass = current,
                size = pass.size(),
                clusters = pass.cluster_count(),
                features = pass.features,
                "starting pass"
            );

            match self.run_pass(current, pass, &dataset, &order, cores, kmeans_seed) {
                PassOutcome::Completed(record) => {
                    if record.dbscan_mismatch {
                        summary.mismatches += 1;
                    }
                    sink.write_record(&record)?;
                    summary.completed += 1;
                }
                PassOutcome::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
                PassOutcome::Failed(failure) => {
                    error!(
                        pass = failure.pass,
                        variant = %failure.variant,
                        algorithm = %failure.algorithm,
                        reason = %failure.reason,
                        "pass dropped"
                    );
                    summary.failures.push(failure);
                }
            }
        }

        if summary.cancelled {
            warn!(completed = summary.completed, planned = summary.planned, "benchmark run cancelled");
            sink.write_note(CANCELLED_NOTE)?;
        }

        summary.elapsed = start.elapsed();
        info!(
            completed = summary.completed,
            failed = summary.failures.len(),
            mismatches = summary.mismatches,
            elapsed_s = summary.elapsed.as_secs_f64(),
            "benchmark run finished"
        );
        Ok(summary)
    }

    fn run_pass(
        &self,
        pass: usize,
        plan: &PassPlan,
        dataset: &GeneratedDataset,
        order: &[Variant],
        cores: usize,
        kmeans_seed: u64,
    ) -> PassOutcome {
        let data = dataset.data.view();
        let n = data.nrows();
        let mut record = BenchmarkRecord::new(cores, n, plan.cluster_count(), plan.features);

        let kmeans = KMeansParams::new(plan.cluster_count())
            .with_eps(self.config.kmeans_eps)
            .with_max_rounds(self.config.max_kmeans_rounds)
            .with_seed(kmeans_seed);

        for &variant in order {
            let mut labels = vec![u16::MAX; n];
            let measured = match self.execute(pass, variant, Algorithm::KMeans, cores, |backend, threads| {
                backend.kmeans(&mut labels, &data, &kmeans, threads)
            }) {
                Ok(measured) => measured,
                Err(outcome) => return outcome,
            };

            record.kmeans_wall[variant.column()] = measured.wall;
            if let Some(slot) = variant.exclusive_column() {
                record.kmeans_exclusive[slot] = measured.exclusive;
            }
            if let Some(clusters) = measured.clusters {
                log_cluster_sizes(variant, Algorithm::KMeans, &labels, clusters);
            }
        }

        let dbscan = DbscanParams::new(plan.dbscan_eps, plan.min_neighbors);
        let mut buffers: Vec<(Variant, Vec<u16>)> = Vec::with_capacity(order.len());

        for &variant in order {
            let mut labels = vec![u16::MAX; n];
            let measured = match self.execute(pass, variant, Algorithm::Dbscan, cores, |backend, threads| {
                backend.dbscan(&mut labels, &data, &dbscan, threads)
            }) {
                Ok(measured) => measured,
                Err(outcome) => return outcome,
            };

            record.dbscan_wall[variant.column()] = measured.wall;
            if let Some(slot) = variant.exclusive_column() {
                record.dbscan_exclusive[slot] = measured.exclusive;
            }
            if let Some(clusters) = measured.clusters {
                // noise lives in slot 0
                log_cluster_sizes(variant, Algorithm::Dbscan, &labels, clusters + 1);
                buffers.push((variant, labels));
            }
        }

        let disagreeing = disagreeing_pairs(&buffers);
        if !disagreeing.is_empty() {
            record.dbscan_mismatch = true;
            for (a, b) in &disagreeing {
                warn!(pass, first = %a, second = %b, "dbscan label buffers differ");
            }
            if let Some(handler) = &self.on_mismatch {
                handler(&MismatchReport {
                    pass,
                    data,
                    labels: &buffers,
                    disagreeing: &disagreeing,
                });
            }
        }

        PassOutcome::Completed(record)
    }

    /// Time one backend call and classify its outcome.
    fn execute<F>(
        &self,
        pass: usize,
        variant: Variant,
        algorithm: Algorithm,
        cores: usize,
        call: F,
    ) -> Result<Measured, PassOutcome>
    where
        F: FnOnce(&dyn ComputeBackend, Option<usize>) -> crate::backend::BackendOutput,
    {
        if self.signal.is_aborted() {
            return Err(PassOutcome::Cancelled);
        }

        let fail = |reason: String| {
            PassOutcome::Failed(PassFailure {
                pass,
                variant,
                algorithm,
                reason,
            })
        };

        let Some(backend) = self.backends.get(variant.backend()) else {
            return Err(fail(format!("no {} backend registered", variant.backend())));
        };
        let threads = variant.threads(cores);

        let start = Instant::now();
        let output = panic::catch_unwind(AssertUnwindSafe(|| call(backend.as_ref(), threads)))
            .map_err(|payload| fail(format!("backend panicked: {}", panic_message(payload.as_ref()))))?;
        let wall = start.elapsed();

        match output.clusters {
            Ok(clusters) => {
                info!(
                    pass,
                    %variant,
                    %algorithm,
                    clusters,
                    wall_ms = wall.as_secs_f64() * 1e3,
                    "variant finished"
                );
                Ok(Measured {
                    wall: Some(wall),
                    exclusive: output.exclusive_time,
                    clusters: Some(clusters),
                })
            }
            Err(ClusterError::Aborted) => Err(PassOutcome::Cancelled),
            Err(e) if e.is_pass_fatal() => Err(fail(e.to_string())),
            Err(e) => {
                warn!(pass, %variant, %algorithm, code = e.code(), error = %e, "variant failed");
                Ok(Measured {
                    wall: None,
                    exclusive: None,
                    clusters: None,
                })
            }
        }
    }
}

/// Points per label value in `0..slots`, plus the number of labels outside
/// that range.
pub fn cluster_sizes(labels: &[u16], slots: usize) -> (Vec<usize>, usize) {
    let mut sizes = vec![0usize; slots];
    let mut out_of_range = 0;
    for &label in labels {
        match sizes.get_mut(label as usize) {
            Some(count) => *count += 1,
            None => out_of_range += 1,
        }
    }
    (sizes, out_of_range)
}

/// Every pair of buffers that differ, in buffer order.
pub fn disagreeing_pairs(buffers: &[(Variant, Vec<u16>)]) -> Vec<(Variant, Variant)> {
    let mut pairs = Vec::new();
    for (i, (a, first)) in buffers.iter().enumerate() {
        for (b, second) in &buffers[i + 1..] {
            if first != second {
                pairs.push((*a, *b));
            }
        }
    }
    pairs
}

fn log_cluster_sizes(variant: Variant, algorithm: Algorithm, labels: &[u16], slots: usize) {
    let (sizes, out_of_range) = cluster_sizes(labels, slots);
    debug!(%variant, %algorithm, ?sizes, "cluster sizes");
    if out_of_range > 0 {
        error!(%variant, %algorithm, out_of_range, slots, "labels outside the reported cluster range");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_plan_size() {
        let config = BenchmarkConfig::new(RunMode::Fixed, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let plan = plan_passes(&config, &mut rng);

        assert_eq!(plan.len(), 120);
        let largest = plan.iter().filter(|p| p.features == 4 && p.cluster_count() == 8 && p.size() == 8 * 2048);
        assert_eq!(largest.count(), 2);
    }

    #[test]
    fn test_fixed_plan_is_shuffled() {
        let config = BenchmarkConfig::new(RunMode::Fixed, 1);
        let plan = plan_passes(&config, &mut ChaCha8Rng::seed_from_u64(5));

        let sorted = plan.windows(2).all(|w| w[0].features <= w[1].features);
        assert!(!sorted);
    }

    #[test]
    fn test_dynamic_plan_ranges() {
        let config = BenchmarkConfig::new(RunMode::Dynamic, 200);
        let plan = plan_passes(&config, &mut ChaCha8Rng::seed_from_u64(1));

        assert_eq!(plan.len(), 200);
        for pass in &plan {
            assert!((1..=DYNAMIC_MAX_CLUSTERS).contains(&pass.cluster_count()));
            assert!((1..=DYNAMIC_MAX_FEATURES).contains(&pass.features));
            for &size in &pass.cluster_sizes {
                assert_eq!(size % DYNAMIC_SIZE_STEP, 0);
                assert!((DYNAMIC_SIZE_STEP..=DYNAMIC_SIZE_STEP * DYNAMIC_MAX_SIZE_STEPS).contains(&size));
            }
            assert_eq!(pass.min_neighbors, 10 * pass.features);
            assert!((pass.dbscan_eps - (pass.features as f32).sqrt()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dynamic_plan_respects_fixed_shape() {
        let config = BenchmarkConfig::new(RunMode::Dynamic, 3).with_shape(5, 300, 2);
        let plan = plan_passes(&config, &mut ChaCha8Rng::seed_from_u64(1));

        for pass in &plan {
            assert_eq!(pass.cluster_sizes, vec![300; 5]);
            assert_eq!(pass.features, 2);
        }
    }

    #[test]
    fn test_variant_columns() {
        let columns: Vec<usize> = Variant::ALL.iter().map(|v| v.column()).collect();
        assert_eq!(columns, vec![0, 1, 2, 3, 4]);

        assert_eq!(Variant::LocalMulti.threads(6), Some(6));
        assert_eq!(Variant::NativeSingle.threads(6), None);
        assert_eq!(Variant::NativeGpu.exclusive_column(), Some(0));
        assert_eq!(Variant::LocalSingle.exclusive_column(), None);
    }

    #[test]
    fn test_gpu_variant_needs_backend() {
        let config = BenchmarkConfig::default().with_accelerator(0);
        let driver = BenchmarkDriver::new(config, BackendSet::cpu_only());

        assert_eq!(driver.variants().len(), 4);
        assert!(!driver.variants().contains(&Variant::NativeGpu));
    }

    #[test]
    fn test_cluster_sizes() {
        let (sizes, out_of_range) = cluster_sizes(&[0, 1, 1, 2, 7], 3);
        assert_eq!(sizes, vec![1, 2, 1]);
        assert_eq!(out_of_range, 1);
    }

    #[test]
    fn test_disagreeing_pairs() {
        let buffers = vec![
            (Variant::LocalSingle, vec![1, 1, 0]),
            (Variant::LocalMulti, vec![1, 1, 0]),
            (Variant::NativeSingle, vec![1, 2, 0]),
        ];

        let pairs = disagreeing_pairs(&buffers);
        assert_eq!(
            pairs,
            vec![
                (Variant::LocalSingle, Variant::NativeSingle),
                (Variant::LocalMulti, Variant::NativeSingle)
            ]
        );
        assert!(disagreeing_pairs(&buffers[..2]).is_empty());
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("kernel exploded")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "kernel exploded");
    }
}
