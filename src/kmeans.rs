use crate::abort::AbortSignal;
use crate::distance::{assign_range, centroid_shift, nearest_centroid, par_assign, squared_distance};
use crate::error::ClusterError;
use crate::pool::{settle, WorkerPool};
use ndarray::{Array1, Array2, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default cap on Lloyd rounds.
pub const MAX_ROUNDS: usize = 100_000;

/// Largest cluster count representable in a `u16` label buffer.
pub const MAX_CLUSTER_COUNT: usize = u16::MAX as usize + 1;

/// Parameters of one k-means invocation
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    /// Number of centroids
    pub cluster_count: usize,

    /// Convergence threshold on the summed centroid displacement
    pub eps: f32,

    /// Maximum number of rounds
    pub max_rounds: usize,

    /// Seed for centroid initialization (entropy when `None`)
    pub seed: Option<u64>,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            cluster_count: 8,
            eps: 1e-3,
            max_rounds: MAX_ROUNDS,
            seed: None,
        }
    }
}

impl KMeansParams {
    pub fn new(cluster_count: usize) -> Self {
        Self {
            cluster_count,
            ..Default::default()
        }
    }

    pub fn with_eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Result of a successful k-means invocation
#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub centroids: Array2<f32>,
    pub n_rounds: usize,
    /// Sum of squared distances of every point to its centroid
    pub inertia: f64,
    /// Time spent in the Lloyd loop, excluding pool setup and teardown
    pub compute_time: Duration,
}

impl KMeansResult {
    /// Number of clusters found.
    pub fn clusters(&self) -> usize {
        self.centroids.nrows()
    }
}

/// Assignment step of a Lloyd round.
///
/// Implementations write, for every point, the index of its nearest centroid
/// using [`nearest_centroid`] semantics (strict comparison, first centroid
/// wins ties).
pub trait Assigner {
    fn assign(&mut self, centroids: &Array2<f32>, labels: &mut [u16]) -> Result<(), ClusterError>;
}

/// Single-threaded assignment on the calling thread.
pub struct SequentialAssigner<'a> {
    data: ArrayView2<'a, f32>,
}

impl<'a> SequentialAssigner<'a> {
    pub fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }
}

impl Assigner for SequentialAssigner<'_> {
    fn assign(&mut self, centroids: &Array2<f32>, labels: &mut [u16]) -> Result<(), ClusterError> {
        let centroids = centroids.view();
        for (i, label) in labels.iter_mut().enumerate() {
            *label = nearest_centroid(&self.data.row(i), &centroids) as u16;
        }
        Ok(())
    }
}

/// Data-parallel assignment in the current rayon pool.
pub struct RayonAssigner<'a> {
    data: ArrayView2<'a, f32>,
}

impl<'a> RayonAssigner<'a> {
    pub fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }
}

impl Assigner for RayonAssigner<'_> {
    fn assign(&mut self, centroids: &Array2<f32>, labels: &mut [u16]) -> Result<(), ClusterError> {
        par_assign(&self.data, centroids, labels);
        Ok(())
    }
}

/// Assignment spread over a worker pool; each worker labels its own range.
struct PoolAssigner<'p, 'scope> {
    pool: &'p mut WorkerPool<'scope, Array2<f32>, Vec<u16>>,
}

impl Assigner for PoolAssigner<'_, '_> {
    fn assign(&mut self, centroids: &Array2<f32>, labels: &mut [u16]) -> Result<(), ClusterError> {
        let partials = self.pool.round(centroids.clone())?;
        for (range, part) in self.pool.ranges().zip(partials) {
            labels[range].copy_from_slice(&part);
        }
        Ok(())
    }
}

/// Lloyd's k-means over a borrowed dataset.
///
/// The engine writes one cluster index per point into a caller-owned label
/// buffer. It observes its [`AbortSignal`] at every round boundary and
/// returns [`ClusterError::Aborted`] when it is raised, leaving the buffer
/// partially written.
///
/// # Example
///
/// ```
/// use clusterbench_rs::{AbortSignal, KMeansEngine, KMeansParams};
/// use ndarray::array;
///
/// let data = array![[0.0f32, 0.0], [0.1, 0.0], [10.0, 10.0], [10.1, 10.0]];
/// let mut labels = vec![0u16; 4];
///
/// let engine = KMeansEngine::new(KMeansParams::new(1).with_seed(7), AbortSignal::new());
/// let result = engine.run(&mut labels, &data.view()).unwrap();
///
/// assert_eq!(result.clusters(), 1);
/// assert!(labels.iter().all(|&l| l == 0));
/// ```
pub struct KMeansEngine {
    params: KMeansParams,
    abort: AbortSignal,
}

impl KMeansEngine {
    pub fn new(params: KMeansParams, abort: AbortSignal) -> Self {
        Self { params, abort }
    }

    pub fn params(&self) -> &KMeansParams {
        &self.params
    }

    /// Single-threaded run.
    pub fn run(&self, labels: &mut [u16], data: &ArrayView2<f32>) -> Result<KMeansResult, ClusterError> {
        let mut assigner = SequentialAssigner::new(data.view());
        self.run_with(labels, data, &mut assigner)
    }

    /// Run with the assignment step spread over `cores` pool workers.
    ///
    /// The pool lives for the whole call and is torn down before returning,
    /// on success, abort and error alike.
    pub fn run_parallel(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        cores: usize,
    ) -> Result<KMeansResult, ClusterError> {
        self.validate(labels, data)?;
        let view = data.view();

        thread::scope(|scope| {
            let mut pool = WorkerPool::spawn(scope, cores, view.nrows(), move |range, centroids: &Array2<f32>| {
                assign_range(&view, centroids, range)
            })?;

            let result = self.run_with(labels, data, &mut PoolAssigner { pool: &mut pool });
            let teardown = pool.shutdown();
            settle(result, teardown)
        })
    }

    /// Run Lloyd's algorithm with a caller-supplied assignment kernel.
    pub fn run_with<A: Assigner + ?Sized>(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        assigner: &mut A,
    ) -> Result<KMeansResult, ClusterError> {
        self.validate(labels, data)?;

        let start = Instant::now();
        let k = self.params.cluster_count;
        let mut rng = match self.params.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        debug!(
            samples = data.nrows(),
            features = data.ncols(),
            clusters = k,
            "starting k-means"
        );

        let mut centroids = initialize_centroids(data, k, &mut rng);
        let mut n_rounds = 0;

        loop {
            if self.abort.is_aborted() {
                warn!(round = n_rounds, "k-means aborted");
                return Err(ClusterError::Aborted);
            }

            assigner.assign(&centroids, labels)?;
            let updated = update_centroids(data, labels, &centroids);
            let shift = centroid_shift(&centroids.view(), &updated.view());
            centroids = updated;
            n_rounds += 1;

            trace!(round = n_rounds, shift, "k-means round");

            if shift <= f64::from(self.params.eps) {
                debug!(rounds = n_rounds, shift, "k-means converged");
                break;
            }
            if n_rounds >= self.params.max_rounds {
                debug!(rounds = n_rounds, shift, "k-means hit the round cap");
                break;
            }
        }

        let inertia = labels
            .iter()
            .enumerate()
            .map(|(i, &l)| f64::from(squared_distance(&data.row(i), &centroids.row(l as usize))))
            .sum();

        Ok(KMeansResult {
            centroids,
            n_rounds,
            inertia,
            compute_time: start.elapsed(),
        })
    }

    fn validate(&self, labels: &[u16], data: &ArrayView2<f32>) -> Result<(), ClusterError> {
        let k = self.params.cluster_count;
        if k == 0 || k > MAX_CLUSTER_COUNT {
            return Err(ClusterError::InvalidInput(format!(
                "cluster count must be in 1..={}, got {}",
                MAX_CLUSTER_COUNT, k
            )));
        }
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(ClusterError::InvalidInput("dataset is empty".to_string()));
        }
        if labels.len() != data.nrows() {
            return Err(ClusterError::InvalidInput(format!(
                "label buffer holds {} entries for {} points",
                labels.len(),
                data.nrows()
            )));
        }
        if self.params.eps.is_nan() || self.params.eps < 0.0 {
            return Err(ClusterError::InvalidInput(format!(
                "eps must be non-negative, got {}",
                self.params.eps
            )));
        }
        Ok(())
    }
}

/// Pick `k` starting centroids, each an independently sampled data point.
fn initialize_centroids(data: &ArrayView2<f32>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f32> {
    let n_samples = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));

    for mut centroid in centroids.outer_iter_mut() {
        let idx = rng.gen_range(0..n_samples);
        centroid.assign(&data.row(idx));
    }

    centroids
}

/// Mean of the points assigned to each centroid.
///
/// A centroid that received no point keeps its previous position.
fn update_centroids(data: &ArrayView2<f32>, labels: &[u16], previous: &Array2<f32>) -> Array2<f32> {
    let (k, n_features) = previous.dim();
    let mut sums: Array2<f64> = Array2::zeros((k, n_features));
    let mut counts: Array1<usize> = Array1::zeros(k);

    for (i, &label) in labels.iter().enumerate() {
        let cluster = label as usize;
        counts[cluster] += 1;
        for (sum, &x) in sums.row_mut(cluster).iter_mut().zip(data.row(i).iter()) {
            *sum += f64::from(x);
        }
    }

    let mut centroids = previous.clone();
    for cluster in 0..k {
        let count = counts[cluster];
        if count == 0 {
            continue;
        }
        for j in 0..n_features {
            centroids[[cluster, j]] = (sums[[cluster, j]] / count as f64) as f32;
        }
    }

    centroids
}
