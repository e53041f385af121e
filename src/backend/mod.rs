//! Pluggable compute backends.
//!
//! Every backend runs the same two algorithms on the same label buffers:
//!
//! - [`LocalBackend`]: this crate's engines, single-threaded or on a
//!   [`WorkerPool`](crate::pool::WorkerPool)
//! - [`NativeBackend`]: rayon data-parallel kernels in a dedicated pool
//! - `CudaBackend`: GPU kernels through cudarc (`cuda` feature)
//!
//! The benchmark driver only sees [`ComputeBackend`] trait objects grouped in
//! a [`BackendSet`].

mod local;
mod native;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use local::LocalBackend;
pub use native::NativeBackend;

use crate::dbscan::DbscanParams;
use crate::error::{signed_count, ClusterError};
use crate::kmeans::KMeansParams;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Family of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Native,
    Gpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Local => "local",
            BackendKind::Native => "native",
            BackendKind::Gpu => "gpu",
        };
        f.write_str(name)
    }
}

/// Outcome of one backend call
#[derive(Debug)]
pub struct BackendOutput {
    /// Clusters found, or why none were
    pub clusters: Result<usize, ClusterError>,
    /// Time spent in the compute kernel proper, when the backend measures it
    pub exclusive_time: Option<Duration>,
}

impl BackendOutput {
    pub fn failed(error: ClusterError) -> Self {
        Self {
            clusters: Err(error),
            exclusive_time: None,
        }
    }

    /// Cluster count or negative sentinel.
    pub fn signed_count(&self) -> i64 {
        signed_count(&self.clusters)
    }
}

/// A clustering implementation the driver can time and cross-validate.
///
/// `cores` is `None` for the single-threaded variant and `Some(n)` for the
/// multi-threaded one. Implementations report every failure through
/// [`BackendOutput::clusters`]; `abort` must make an in-flight call return
/// [`ClusterError::Aborted`] at its next round boundary.
pub trait ComputeBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str;

    fn kmeans(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        params: &KMeansParams,
        cores: Option<usize>,
    ) -> BackendOutput;

    fn dbscan(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        params: &DbscanParams,
        cores: Option<usize>,
    ) -> BackendOutput;

    fn abort(&self);

    fn resume(&self);
}

/// Kind of compute device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Cpu,
    Gpu,
    Accelerator,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Cpu => "CPU",
            DeviceType::Gpu => "GPU",
            DeviceType::Accelerator => "Accelerator",
        };
        f.write_str(name)
    }
}

/// An accelerator device visible to this build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub platform: usize,
    pub device: usize,
    pub name: String,
    pub device_type: DeviceType,
    pub version: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}] {} ({}, {})",
            self.platform, self.device, self.name, self.device_type, self.version
        )
    }
}

/// List the accelerator devices this build can drive.
///
/// Always empty without the `cuda` feature.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    #[cfg(feature = "cuda")]
    {
        cuda::enumerate_devices()
    }
    #[cfg(not(feature = "cuda"))]
    {
        Vec::new()
    }
}

/// The backends a benchmark run draws its variants from
#[derive(Clone)]
pub struct BackendSet {
    local: Arc<dyn ComputeBackend>,
    native: Arc<dyn ComputeBackend>,
    gpu: Option<Arc<dyn ComputeBackend>>,
}

impl BackendSet {
    pub fn new(local: Arc<dyn ComputeBackend>, native: Arc<dyn ComputeBackend>) -> Self {
        Self {
            local,
            native,
            gpu: None,
        }
    }

    /// Local and native CPU backends, no accelerator.
    pub fn cpu_only() -> Self {
        Self::new(Arc::new(LocalBackend::new()), Arc::new(NativeBackend::new()))
    }

    /// CPU backends plus the accelerator on `device` when requested and
    /// available.
    pub fn detect(accelerator: bool, device: usize) -> Self {
        let set = Self::cpu_only();
        if !accelerator {
            return set;
        }

        match open_accelerator(device) {
            Some(gpu) => set.with_gpu(gpu),
            None => {
                info!(device, "no usable accelerator, GPU variant disabled");
                set
            }
        }
    }

    pub fn with_gpu(mut self, gpu: Arc<dyn ComputeBackend>) -> Self {
        self.gpu = Some(gpu);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn ComputeBackend>> {
        match kind {
            BackendKind::Local => Some(&self.local),
            BackendKind::Native => Some(&self.native),
            BackendKind::Gpu => self.gpu.as_ref(),
        }
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    /// Every registered backend.
    pub fn all(&self) -> Vec<Arc<dyn ComputeBackend>> {
        let mut backends = vec![Arc::clone(&self.local), Arc::clone(&self.native)];
        if let Some(gpu) = &self.gpu {
            backends.push(Arc::clone(gpu));
        }
        backends
    }
}

#[cfg(feature = "cuda")]
fn open_accelerator(device: usize) -> Option<Arc<dyn ComputeBackend>> {
    match cuda::CudaBackend::new(device) {
        Ok(gpu) => {
            info!(device, "using CUDA accelerator");
            Some(Arc::new(gpu))
        }
        Err(e) => {
            tracing::warn!(device, error = %e, "failed to open CUDA device");
            None
        }
    }
}

#[cfg(not(feature = "cuda"))]
fn open_accelerator(_device: usize) -> Option<Arc<dyn ComputeBackend>> {
    None
}
