use crate::pool::PoolError;
use thiserror::Error;

/// Sentinel reported for a cancelled clustering call.
pub const ABORTED_CODE: i32 = -1;
/// Sentinel reported when the worker pool failed.
pub const POOL_FAILURE_CODE: i32 = -2;
/// Sentinel reported for rejected input.
pub const INVALID_INPUT_CODE: i32 = -3;
/// Sentinel reported when an accelerated backend failed.
pub const BACKEND_FAILURE_CODE: i32 = -20;
/// Sentinel reported when DBSCAN ran out of cluster ids.
pub const ID_SPACE_EXHAUSTED_CODE: i32 = -256;

/// Why a clustering call did not produce a cluster count.
///
/// Engines and backends never panic or unwind for these conditions; they are
/// returned as the error half of the cluster count.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The abort signal was raised and observed at a round boundary.
    #[error("clustering aborted")]
    Aborted,

    /// DBSCAN needed more cluster ids than the id space holds.
    #[error("cluster id space exhausted (more than {max} clusters)")]
    IdSpaceExhausted { max: u16 },

    /// The worker pool could not be started, lost a worker or failed teardown.
    #[error("worker pool failure: {0}")]
    Pool(#[from] PoolError),

    /// Parameters or buffers are inconsistent with the dataset.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An accelerated backend reported an error.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl ClusterError {
    /// Negative sentinel for this condition, as written to logs and records.
    pub fn code(&self) -> i32 {
        match self {
            ClusterError::Aborted => ABORTED_CODE,
            ClusterError::IdSpaceExhausted { .. } => ID_SPACE_EXHAUSTED_CODE,
            ClusterError::Pool(_) => POOL_FAILURE_CODE,
            ClusterError::InvalidInput(_) => INVALID_INPUT_CODE,
            ClusterError::Backend(_) => BACKEND_FAILURE_CODE,
        }
    }

    /// Whether this error ends the current benchmark pass.
    pub fn is_pass_fatal(&self) -> bool {
        matches!(self, ClusterError::IdSpaceExhausted { .. })
    }
}

/// Signed cluster count: the number of clusters or a negative sentinel.
pub fn signed_count(result: &Result<usize, ClusterError>) -> i64 {
    match result {
        Ok(n) => *n as i64,
        Err(e) => e.code() as i64,
    }
}

/// Error types for the benchmark driver, its configuration and record sinks
#[derive(Error, Debug)]
pub enum BenchmarkError {
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
