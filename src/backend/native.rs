use super::{BackendKind, BackendOutput, ComputeBackend};
use crate::abort::AbortSignal;
use crate::dbscan::{DbscanEngine, DbscanParams, RayonScan};
use crate::error::ClusterError;
use crate::kmeans::{KMeansEngine, KMeansParams, RayonAssigner};
use ndarray::ArrayView2;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Rayon data-parallel kernels.
///
/// Each call builds a dedicated rayon pool with one thread for the
/// single-threaded variant or `cores` threads otherwise, so runs never share
/// the global pool. The exclusive time is measured inside the pool.
#[derive(Debug, Clone, Default)]
pub struct NativeBackend {
    abort: AbortSignal,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(abort: AbortSignal) -> Self {
        Self { abort }
    }

    fn pool(&self, cores: Option<usize>) -> Result<ThreadPool, ClusterError> {
        let threads = cores.unwrap_or(1).max(1);
        debug!(threads, "building native pool");
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("native-worker-{i}"))
            .build()
            .map_err(|e| ClusterError::Backend(format!("failed to build rayon pool: {e}")))
    }
}

impl ComputeBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn name(&self) -> &str {
        "native"
    }

    fn kmeans(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        params: &KMeansParams,
        cores: Option<usize>,
    ) -> BackendOutput {
        let pool = match self.pool(cores) {
            Ok(pool) => pool,
            Err(e) => return BackendOutput::failed(e),
        };
        let engine = KMeansEngine::new(params.clone(), self.abort.clone());

        let result = pool.install(|| engine.run_with(labels, data, &mut RayonAssigner::new(data.view())));
        BackendOutput {
            exclusive_time: cores.and(result.as_ref().ok().map(|r| r.compute_time)),
            clusters: result.map(|r| r.clusters()),
        }
    }

    fn dbscan(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        params: &DbscanParams,
        cores: Option<usize>,
    ) -> BackendOutput {
        let pool = match self.pool(cores) {
            Ok(pool) => pool,
            Err(e) => return BackendOutput::failed(e),
        };
        let engine = DbscanEngine::new(*params, self.abort.clone());

        let result = pool.install(|| engine.run_with(labels, data, &mut RayonScan::new(data.view(), params)));
        BackendOutput {
            exclusive_time: cores.and(result.as_ref().ok().map(|r| r.compute_time)),
            clusters: result.map(|r| r.n_clusters),
        }
    }

    fn abort(&self) {
        self.abort.abort();
    }

    fn resume(&self) {
        self.abort.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use ndarray::Array2;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    #[test]
    fn test_native_matches_local() {
        let data = Array2::random((300, 3), Uniform::new(-4.0f32, 4.0));
        let kmeans = KMeansParams::new(4).with_seed(9);
        let dbscan = DbscanParams::new(1.0, 4);

        let local = LocalBackend::new();
        let native = NativeBackend::new();

        let mut expected = vec![u16::MAX; 300];
        let mut actual = vec![u16::MAX; 300];
        local.kmeans(&mut expected, &data.view(), &kmeans, None).clusters.unwrap();
        native.kmeans(&mut actual, &data.view(), &kmeans, Some(4)).clusters.unwrap();
        assert_eq!(actual, expected);

        let mut expected = vec![u16::MAX; 300];
        let mut actual = vec![u16::MAX; 300];
        local.dbscan(&mut expected, &data.view(), &dbscan, None).clusters.unwrap();
        let out = native.dbscan(&mut actual, &data.view(), &dbscan, Some(3));
        out.clusters.unwrap();
        assert!(out.exclusive_time.is_some());
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_single_threaded_has_no_exclusive_time() {
        let data = Array2::random((50, 2), Uniform::new(-1.0f32, 1.0));
        let mut labels = vec![0u16; 50];

        let out = NativeBackend::new().dbscan(&mut labels, &data.view(), &DbscanParams::new(0.3, 3), None);

        assert!(out.clusters.is_ok());
        assert!(out.exclusive_time.is_none());
    }
}
