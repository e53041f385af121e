//! Density-based clustering with explicit per-point state.
//!
//! The engine grows one cluster at a time from an unvisited core point. A
//! cluster is expanded by repeated passes over the whole dataset: every
//! point flagged as a candidate is visited, its neighborhood is scanned and,
//! when it is itself a core point, its neighbors become candidates too. A
//! pass that flags nothing new ends the expansion.
//!
//! Neighborhood scans go through the [`NeighborScan`] trait, so the same
//! driver runs sequentially, on a [`WorkerPool`](crate::pool::WorkerPool) or
//! on an external kernel and produces the same labels in every case.

use crate::abort::AbortSignal;
use crate::distance::{neighbors_within, par_neighbors_within};
use crate::error::ClusterError;
use crate::pool::{settle, WorkerPool};
use ndarray::ArrayView2;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Highest cluster id DBSCAN may hand out.
pub const MAX_CLUSTER_ID: u16 = 4095;

/// Cluster id of noise points.
pub const NOISE: u16 = 0;

/// Parameters of one DBSCAN invocation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbscanParams {
    /// Neighborhood radius
    pub eps: f32,

    /// Minimum neighborhood size (the point itself included) of a core point
    pub min_neighbors: usize,
}

impl DbscanParams {
    pub fn new(eps: f32, min_neighbors: usize) -> Self {
        Self { eps, min_neighbors }
    }

    #[inline]
    pub fn eps_squared(&self) -> f32 {
        self.eps * self.eps
    }
}

/// Traversal status of a point.
///
/// `Frontier` and `VisitedFlagged` carry the candidate flag of the current
/// neighborhood; `Visited` and `VisitedFlagged` mark points already scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointStatus {
    #[default]
    Unvisited,
    Frontier,
    Visited,
    VisitedFlagged,
}

impl PointStatus {
    #[inline]
    pub fn is_visited(self) -> bool {
        matches!(self, PointStatus::Visited | PointStatus::VisitedFlagged)
    }

    #[inline]
    pub fn is_candidate(self) -> bool {
        matches!(self, PointStatus::Frontier | PointStatus::VisitedFlagged)
    }

    fn visited(self) -> Self {
        match self {
            PointStatus::Unvisited => PointStatus::Visited,
            PointStatus::Frontier => PointStatus::VisitedFlagged,
            other => other,
        }
    }

    fn flagged(self) -> Self {
        match self {
            PointStatus::Unvisited => PointStatus::Frontier,
            PointStatus::Visited => PointStatus::VisitedFlagged,
            other => other,
        }
    }

    fn unflagged(self) -> Self {
        match self {
            PointStatus::Frontier => PointStatus::Unvisited,
            PointStatus::VisitedFlagged => PointStatus::Visited,
            other => other,
        }
    }
}

/// In-flight state of one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointState {
    pub status: PointStatus,
    /// Cluster id, [`NOISE`] until one is assigned
    pub cluster: u16,
}

/// Neighborhood query kernel.
///
/// `scan` replaces the contents of `out` with the indices of every point
/// within eps of `reference` (the reference itself included), in ascending
/// order.
pub trait NeighborScan {
    fn scan(&mut self, reference: usize, out: &mut Vec<usize>) -> Result<(), ClusterError>;
}

/// Linear scan on the calling thread.
pub struct SequentialScan<'a> {
    data: ArrayView2<'a, f32>,
    eps_sq: f32,
}

impl<'a> SequentialScan<'a> {
    pub fn new(data: ArrayView2<'a, f32>, params: &DbscanParams) -> Self {
        Self {
            data,
            eps_sq: params.eps_squared(),
        }
    }
}

impl NeighborScan for SequentialScan<'_> {
    fn scan(&mut self, reference: usize, out: &mut Vec<usize>) -> Result<(), ClusterError> {
        out.clear();
        neighbors_within(&self.data, reference, self.eps_sq, 0..self.data.nrows(), out);
        Ok(())
    }
}

/// Data-parallel scan in the current rayon pool.
pub struct RayonScan<'a> {
    data: ArrayView2<'a, f32>,
    eps_sq: f32,
}

impl<'a> RayonScan<'a> {
    pub fn new(data: ArrayView2<'a, f32>, params: &DbscanParams) -> Self {
        Self {
            data,
            eps_sq: params.eps_squared(),
        }
    }
}

impl NeighborScan for RayonScan<'_> {
    fn scan(&mut self, reference: usize, out: &mut Vec<usize>) -> Result<(), ClusterError> {
        par_neighbors_within(&self.data, reference, self.eps_sq, out);
        Ok(())
    }
}

/// One pool round per scan; partial neighbor lists arrive in partition
/// order, so concatenating them keeps the indices sorted.
struct PoolScan<'p, 'scope> {
    pool: &'p mut WorkerPool<'scope, usize, Vec<usize>>,
}

impl NeighborScan for PoolScan<'_, '_> {
    fn scan(&mut self, reference: usize, out: &mut Vec<usize>) -> Result<(), ClusterError> {
        let partials = self.pool.round(reference)?;
        out.clear();
        for part in partials {
            out.extend(part);
        }
        Ok(())
    }
}

/// Result of a successful DBSCAN invocation
#[derive(Debug, Clone, PartialEq)]
pub struct DbscanResult {
    /// Clusters found, noise excluded
    pub n_clusters: usize,
    pub n_noise: usize,
    /// Time spent clustering, excluding pool setup and teardown
    pub compute_time: Duration,
}

/// DBSCAN over a borrowed dataset.
///
/// Labels written on success are cluster ids in `1..=n_clusters`, or
/// [`NOISE`]. Cancellation is observed before each unvisited point of the
/// main loop and before each expansion pass.
pub struct DbscanEngine {
    params: DbscanParams,
    abort: AbortSignal,
}

impl DbscanEngine {
    pub fn new(params: DbscanParams, abort: AbortSignal) -> Self {
        Self { params, abort }
    }

    pub fn params(&self) -> &DbscanParams {
        &self.params
    }

    /// Single-threaded run.
    pub fn run(&self, labels: &mut [u16], data: &ArrayView2<f32>) -> Result<DbscanResult, ClusterError> {
        let mut scanner = SequentialScan::new(data.view(), &self.params);
        self.run_with(labels, data, &mut scanner)
    }

    /// Run with every neighborhood scan split across `cores` pool workers.
    pub fn run_parallel(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        cores: usize,
    ) -> Result<DbscanResult, ClusterError> {
        self.validate(labels, data)?;
        let view = data.view();
        let eps_sq = self.params.eps_squared();

        thread::scope(|scope| {
            let mut pool = WorkerPool::spawn(scope, cores, view.nrows(), move |range, reference: &usize| {
                let mut found = Vec::new();
                neighbors_within(&view, *reference, eps_sq, range, &mut found);
                found
            })?;

            let result = self.run_with(labels, data, &mut PoolScan { pool: &mut pool });
            let teardown = pool.shutdown();
            settle(result, teardown)
        })
    }

    /// Run with a caller-supplied neighborhood kernel.
    pub fn run_with<S: NeighborScan + ?Sized>(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        scanner: &mut S,
    ) -> Result<DbscanResult, ClusterError> {
        self.validate(labels, data)?;

        let start = Instant::now();
        debug!(
            samples = data.nrows(),
            eps = self.params.eps,
            min_neighbors = self.params.min_neighbors,
            "starting dbscan"
        );

        let mut states = vec![PointState::default(); data.nrows()];
        let n_clusters = self.cluster(&mut states, scanner)?;

        let mut n_noise = 0;
        for (label, state) in labels.iter_mut().zip(&states) {
            *label = state.cluster;
            if state.cluster == NOISE {
                n_noise += 1;
            }
        }

        debug!(clusters = n_clusters, noise = n_noise, "dbscan finished");
        Ok(DbscanResult {
            n_clusters: n_clusters as usize,
            n_noise,
            compute_time: start.elapsed(),
        })
    }

    fn cluster<S: NeighborScan + ?Sized>(
        &self,
        states: &mut [PointState],
        scanner: &mut S,
    ) -> Result<u16, ClusterError> {
        let mut neighbors = Vec::new();
        let mut cluster_id = NOISE;

        for point in 0..states.len() {
            if states[point].status.is_visited() {
                continue;
            }
            if self.abort.is_aborted() {
                warn!(point, clusters = cluster_id, "dbscan aborted");
                return Err(ClusterError::Aborted);
            }

            states[point].status = states[point].status.visited();
            scanner.scan(point, &mut neighbors)?;

            for state in states.iter_mut() {
                state.status = state.status.unflagged();
            }
            for &n in &neighbors {
                states[n].status = states[n].status.flagged();
            }

            if neighbors.len() < self.params.min_neighbors {
                states[point].cluster = NOISE;
                continue;
            }

            if cluster_id == MAX_CLUSTER_ID {
                warn!(max = MAX_CLUSTER_ID, "dbscan ran out of cluster ids");
                return Err(ClusterError::IdSpaceExhausted { max: MAX_CLUSTER_ID });
            }
            cluster_id += 1;
            self.expand(states, point, cluster_id, scanner, &mut neighbors)?;
        }

        Ok(cluster_id)
    }

    fn expand<S: NeighborScan + ?Sized>(
        &self,
        states: &mut [PointState],
        seed: usize,
        id: u16,
        scanner: &mut S,
        neighbors: &mut Vec<usize>,
    ) -> Result<(), ClusterError> {
        states[seed].cluster = id;
        let mut passes = 0usize;

        loop {
            if self.abort.is_aborted() {
                warn!(cluster = id, passes, "dbscan aborted during expansion");
                return Err(ClusterError::Aborted);
            }

            let mut grown = false;
            for point in 0..states.len() {
                let status = states[point].status;
                if !status.is_candidate() || status.is_visited() {
                    continue;
                }

                states[point].status = status.visited();
                scanner.scan(point, neighbors)?;

                if neighbors.len() >= self.params.min_neighbors {
                    for &n in neighbors.iter() {
                        if !states[n].status.is_candidate() {
                            states[n].status = states[n].status.flagged();
                            grown = true;
                        }
                    }
                }

                if states[point].cluster == NOISE {
                    states[point].cluster = id;
                }
            }

            passes += 1;
            if !grown {
                trace!(cluster = id, passes, "cluster expanded");
                return Ok(());
            }
        }
    }

    fn validate(&self, labels: &[u16], data: &ArrayView2<f32>) -> Result<(), ClusterError> {
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
