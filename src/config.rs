use crate::error::BenchmarkError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::thread;

/// Largest cluster count accepted in dynamic mode.
pub const MAX_CLUSTERS: usize = 50;
/// Largest per-cluster size accepted in dynamic mode.
pub const MAX_CLUSTER_SIZE: usize = 100_000;
/// Largest feature count accepted in dynamic mode.
pub const MAX_FEATURES: usize = 10;

/// How the benchmark plan is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Fixed sweep over features, cluster counts and cluster sizes
    #[default]
    Fixed,
    /// One randomized dataset shape per pass
    Dynamic,
}

/// Configuration for a benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub mode: RunMode,

    /// Repetitions of the plan (fixed) or number of passes (dynamic)
    pub passes: usize,

    /// k-means convergence threshold on the summed centroid displacement
    pub kmeans_eps: f32,

    /// Cap on k-means rounds
    pub max_kmeans_rounds: usize,

    /// DBSCAN radius. 0 means `sqrt(features)`.
    pub dbscan_eps: f32,

    /// DBSCAN core point threshold. 0 means `10 * features`.
    pub dbscan_min_neighbors: usize,

    /// Threads for the multi-threaded variants. 0 means all available cores.
    pub cores: usize,

    /// Include the GPU variant when a device is available
    pub accelerator: bool,

    /// Device ordinal used for the GPU variant
    pub accelerator_device: usize,

    /// Dynamic mode only; 0 picks a random value per pass
    pub cluster_count: usize,

    /// Dynamic mode only; 0 picks a random value per cluster
    pub cluster_size: usize,

    /// Dynamic mode only; 0 picks a random value per pass
    pub features: usize,

    /// Seed of the run; entropy when unset
    pub seed: Option<u64>,

    /// Append to an existing results file instead of replacing it
    pub append_results: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Fixed,
            passes: 1,
            kmeans_eps: 0.01,
            max_kmeans_rounds: crate::kmeans::MAX_ROUNDS,
            dbscan_eps: 0.0,
            dbscan_min_neighbors: 0,
            cores: 0,
            accelerator: false,
            accelerator_device: 0,
            cluster_count: 0,
            cluster_size: 0,
            features: 0,
            seed: None,
            append_results: true,
        }
    }
}

impl BenchmarkConfig {
    /// Create a configuration for the given mode and number of passes
    pub fn new(mode: RunMode, passes: usize) -> Self {
        Self {
            mode,
            passes,
            ..Default::default()
        }
    }

    /// Load and validate a JSON configuration file.
    ///
    /// Missing fields take their default value.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, BenchmarkError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_kmeans_eps(mut self, eps: f32) -> Self {
        self.kmeans_eps = eps;
        self
    }

    pub fn with_max_kmeans_rounds(mut self, rounds: usize) -> Self {
        self.max_kmeans_rounds = rounds;
        self
    }

    pub fn with_dbscan_eps(mut self, eps: f32) -> Self {
        self.dbscan_eps = eps;
        self
    }

    pub fn with_dbscan_min_neighbors(mut self, min_neighbors: usize) -> Self {
        self.dbscan_min_neighbors = min_neighbors;
        self
    }

    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores;
        self
    }

    /// Request the GPU variant on device `device`
    pub fn with_accelerator(mut self, device: usize) -> Self {
        self.accelerator = true;
        self.accelerator_device = device;
        self
    }

    /// Fix the dataset shape of dynamic passes; zeros stay random
    pub fn with_shape(mut self, cluster_count: usize, cluster_size: usize, features: usize) -> Self {
        self.cluster_count = cluster_count;
        self.cluster_size = cluster_size;
        self.features = features;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_append_results(mut self, append: bool) -> Self {
        self.append_results = append;
        self
    }

    /// Reject out-of-range settings.
    pub fn validate(&self) -> Result<(), BenchmarkError> {
        let invalid = |msg: String| Err(BenchmarkError::InvalidConfig(msg));

        if self.passes == 0 {
            return invalid("passes must be greater than 0".to_string());
        }
        if !(self.kmeans_eps.is_finite() && self.kmeans_eps > 0.0) {
            return invalid(format!("kmeans_eps must be > 0, got {}", self.kmeans_eps));
        }
        if self.max_kmeans_rounds == 0 {
            return invalid("max_kmeans_rounds must be greater than 0".to_string());
        }
        if !(self.dbscan_eps.is_finite() && self.dbscan_eps >= 0.0) {
            return invalid(format!(
                "dbscan_eps must be >= 0 (0 = sqrt(features)), got {}",
                self.dbscan_eps
            ));
        }
        if self.cluster_count > MAX_CLUSTERS {
            return invalid(format!(
                "cluster_count must be in 0..={} (0 = random), got {}",
                MAX_CLUSTERS, self.cluster_count
            ));
        }
        if self.cluster_size > MAX_CLUSTER_SIZE {
            return invalid(format!(
                "cluster_size must be in 0..={} (0 = random), got {}",
                MAX_CLUSTER_SIZE, self.cluster_size
            ));
        }
        if self.features > MAX_FEATURES {
            return invalid(format!(
                "features must be in 0..={} (0 = random), got {}",
                MAX_FEATURES, self.features
            ));
        }
        Ok(())
    }

    /// Worker count for the multi-threaded variants.
    pub fn effective_cores(&self) -> usize {
        if self.cores > 0 {
            return self.cores;
        }
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    /// DBSCAN radius for a dataset with `features` columns.
    pub fn dbscan_eps_for(&self, features: usize) -> f32 {
        if self.dbscan_eps > 0.0 {
            self.dbscan_eps
        } else {
            (features as f32).sqrt()
        }
    }

    /// DBSCAN core point threshold for a dataset with `features` columns.
    pub fn min_neighbors_for(&self, features: usize) -> usize {
        if self.dbscan_min_neighbors > 0 {
            self.dbscan_min_neighbors
        } else {
            10 * features
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() {
        let config = BenchmarkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, RunMode::Fixed);
        assert!(config.effective_cores() >= 1);
    }

    #[test]
    fn test_builder() {
        let config = BenchmarkConfig::new(RunMode::Dynamic, 3)
            .with_cores(2)
            .with_shape(4, 256, 2)
            .with_seed(9)
            .with_accelerator(1);

        assert_eq!(config.passes, 3);
        assert_eq!(config.effective_cores(), 2);
        assert_eq!((config.cluster_count, config.cluster_size, config.features), (4, 256, 2));
        assert_eq!(config.seed, Some(9));
        assert!(config.accelerator);
        assert_eq!(config.accelerator_device, 1);
    }

    #[test]
    fn test_derived_dbscan_parameters() {
        let config = BenchmarkConfig::default();
        assert_relative_eq!(config.dbscan_eps_for(4), 2.0);
        assert_eq!(config.min_neighbors_for(3), 30);

        let config = config.with_dbscan_eps(0.75).with_dbscan_min_neighbors(5);
        assert_relative_eq!(config.dbscan_eps_for(4), 0.75);
        assert_eq!(config.min_neighbors_for(3), 5);
    }

    #[test]
    fn test_validation() {
        let bad = [
            BenchmarkConfig::new(RunMode::Fixed, 0),
            BenchmarkConfig::default().with_kmeans_eps(0.0),
            BenchmarkConfig::default().with_kmeans_eps(f32::NAN),
            BenchmarkConfig::default().with_dbscan_eps(-1.0),
            BenchmarkConfig::default().with_shape(51, 0, 0),
            BenchmarkConfig::default().with_shape(0, 100_001, 0),
            BenchmarkConfig::default().with_shape(0, 0, 11),
            BenchmarkConfig::default().with_max_kmeans_rounds(0),
        ];

        for config in &bad {
            assert!(
                matches!(config.validate(), Err(BenchmarkError::InvalidConfig(_))),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"mode": "dynamic", "passes": 5, "features": 3, "seed": 42}}"#).unwrap();

        let config = BenchmarkConfig::from_json_file(file.path()).unwrap();

        assert_eq!(config.mode, RunMode::Dynamic);
        assert_eq!(config.passes, 5);
        assert_eq!(config.features, 3);
        assert_eq!(config.seed, Some(42));
        assert_relative_eq!(config.kmeans_eps, 0.01);
    }

    #[test]
    fn test_from_json_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"passes": 0}}"#).unwrap();
        assert!(matches!(
            BenchmarkConfig::from_json_file(file.path()),
            Err(BenchmarkError::InvalidConfig(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        assert!(matches!(
            BenchmarkConfig::from_json_file(file.path()),
            Err(BenchmarkError::Json(_))
        ));
    }
}
