use super::{BackendKind, BackendOutput, ComputeBackend};
use crate::abort::AbortSignal;
use crate::dbscan::{DbscanEngine, DbscanParams};
use crate::kmeans::{KMeansEngine, KMeansParams};
use ndarray::ArrayView2;

/// This crate's own engines.
///
/// The multi-threaded variant reports the engine's compute time, which
/// leaves out pool setup and teardown, as its exclusive time.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    abort: AbortSignal,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing abort signal.
    pub fn with_signal(abort: AbortSignal) -> Self {
        Self { abort }
    }
}

impl ComputeBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn name(&self) -> &str {
        "local"
    }

    fn kmeans(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        params: &KMeansParams,
        cores: Option<usize>,
    ) -> BackendOutput {
        let engine = KMeansEngine::new(params.clone(), self.abort.clone());
        match cores {
            None => BackendOutput {
                clusters: engine.run(labels, data).map(|r| r.clusters()),
                exclusive_time: None,
            },
            Some(cores) => {
                let result = engine.run_parallel(labels, data, cores);
                BackendOutput {
                    exclusive_time: result.as_ref().ok().map(|r| r.compute_time),
                    clusters: result.map(|r| r.clusters()),
                }
            }
        }
    }

    fn dbscan(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        params: &DbscanParams,
        cores: Option<usize>,
    ) -> BackendOutput {
        let engine = DbscanEngine::new(*params, self.abort.clone());
        match cores {
            None => BackendOutput {
                clusters: engine.run(labels, data).map(|r| r.n_clusters),
                exclusive_time: None,
            },
            Some(cores) => {
                let result = engine.run_parallel(labels, data, cores);
                BackendOutput {
                    exclusive_time: result.as_ref().ok().map(|r| r.compute_time),
                    clusters: result.map(|r| r.n_clusters),
                }
            }
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
    use crate::error::ClusterError;
    use ndarray::array;

    #[test]
    fn test_local_variants_agree() {
        let data = array![[0.0f32], [0.2], [0.4], [9.0], [9.2], [9.4], [30.0]];
        let backend = LocalBackend::new();
        let params = DbscanParams::new(0.5, 2);

        let mut single = vec![u16::MAX; 7];
        let out = backend.dbscan(&mut single, &data.view(), &params, None);
        assert_eq!(out.clusters.unwrap(), 2);
        assert!(out.exclusive_time.is_none());

        let mut multi = vec![u16::MAX; 7];
        let out = backend.dbscan(&mut multi, &data.view(), &params, Some(3));
        assert_eq!(out.clusters.unwrap(), 2);
        assert!(out.exclusive_time.is_some());

        assert_eq!(single, multi);
    }

    #[test]
    fn test_abort_and_resume() {
        let data = array![[0.0f32], [1.0], [2.0]];
        let backend = LocalBackend::new();
        let params = KMeansParams::new(2).with_seed(1);

        backend.abort();
        let mut labels = vec![0u16; 3];
        let out = backend.kmeans(&mut labels, &data.view(), &params, Some(2));
        assert!(matches!(out.clusters, Err(ClusterError::Aborted)));

        backend.resume();
        let out = backend.kmeans(&mut labels, &data.view(), &params, None);
        assert_eq!(out.clusters.unwrap(), 2);
    }
}
