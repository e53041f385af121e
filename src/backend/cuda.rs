//! CUDA backend
//!
//! Runs the assignment step of k-means and the neighborhood scan of DBSCAN
//! on the GPU; the control flow (centroid update, cluster expansion) stays on
//! the host in the shared engines. Distances are accumulated with
//! round-to-nearest intrinsics so the device computes exactly the same `f32`
//! values as the CPU kernels.
//!
//! Enable the `cuda` feature to use this functionality.
//!
//! # Example
//!
//! ```ignore
//! use clusterbench_rs::backend::cuda::CudaBackend;
//! use clusterbench_rs::{ComputeBackend, DbscanParams};
//! use ndarray::array;
//!
//! let data = array![[0.0f32, 0.0], [0.1, 0.0], [5.0, 5.0]];
//! let gpu = CudaBackend::new(0).unwrap();
//!
//! let mut labels = vec![0u16; 3];
//! let out = gpu.dbscan(&mut labels, &data.view(), &DbscanParams::new(0.5, 2), None);
//! println!("{:?} clusters in {:?}", out.clusters, out.exclusive_time);
//! ```

use super::{BackendKind, BackendOutput, ComputeBackend, DeviceInfo, DeviceType};
use crate::abort::AbortSignal;
use crate::dbscan::{DbscanEngine, DbscanParams, NeighborScan};
use crate::error::ClusterError;
use crate::kmeans::{Assigner, KMeansEngine, KMeansParams};
use cudarc::driver::{CudaDevice, CudaFunction, CudaSlice, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::compile_ptx;
use ndarray::{Array2, ArrayView2};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// CUDA kernels for both algorithms
const CUDA_KERNELS: &str = r#"
extern "C" __global__ void neighbor_mask(
    const float* data,
    unsigned char* mask,
    int n_samples,
    int n_features,
    int reference,
    float eps_sq
) {
    int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n_samples) {
        const float* row = data + idx * n_features;
        const float* center = data + reference * n_features;
        float sum = 0.0f;
        for (int j = 0; j < n_features; j++) {
            float d = __fsub_rn(row[j], center[j]);
            sum = __fadd_rn(sum, __fmul_rn(d, d));
        }
        mask[idx] = sum <= eps_sq ? 1 : 0;
    }
}

extern "C" __global__ void assign_nearest(
    const float* data,
    const float* centroids,
    unsigned int* labels,
    int n_samples,
    int n_centroids,
    int n_features
) {
    int idx = blockIdx.x * blockDim.x + threadIdx.x;
    if (idx < n_samples) {
        const float* row = data + idx * n_features;
        float best_dist = __int_as_float(0x7f800000);  // +inf
        unsigned int best_label = 0;

        for (int c = 0; c < n_centroids; c++) {
            const float* centroid = centroids + c * n_features;
            float sum = 0.0f;
            for (int j = 0; j < n_features; j++) {
                float d = __fsub_rn(row[j], centroid[j]);
                sum = __fadd_rn(sum, __fmul_rn(d, d));
            }
            if (sum < best_dist) {
                best_dist = sum;
                best_label = c;
            }
        }

        labels[idx] = best_label;
    }
}
"#;

const MODULE_NAME: &str = "cluster_kernels";
const BLOCK_SIZE: usize = 256;

fn launch_config(n_samples: usize) -> LaunchConfig {
    let grid_size = (n_samples + BLOCK_SIZE - 1) / BLOCK_SIZE;
    LaunchConfig {
        block_dim: (BLOCK_SIZE as u32, 1, 1),
        grid_dim: (grid_size as u32, 1, 1),
        shared_mem_bytes: 0,
    }
}

fn backend_error(context: &str, e: impl std::fmt::Display) -> ClusterError {
    ClusterError::Backend(format!("{context}: {e}"))
}

/// Row-major copy of the dataset, as the kernels expect it.
fn flatten(data: &ArrayView2<f32>) -> Vec<f32> {
    data.as_standard_layout().iter().cloned().collect()
}

/// GPU backend on one CUDA device.
///
/// `exclusive_time` covers kernel launches and the device transfers they
/// need, accumulated over the whole call.
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    ordinal: usize,
    name: String,
    abort: AbortSignal,
}

impl CudaBackend {
    /// Open CUDA device `ordinal` and compile the kernels.
    pub fn new(ordinal: usize) -> Result<Self, ClusterError> {
        let device = CudaDevice::new(ordinal)
            .map_err(|e| backend_error(&format!("Failed to initialize CUDA device {ordinal}"), e))?;

        let ptx = compile_ptx(CUDA_KERNELS).map_err(|e| backend_error("Failed to compile CUDA kernels", e))?;

        device
            .load_ptx(ptx, MODULE_NAME, &["neighbor_mask", "assign_nearest"])
            .map_err(|e| backend_error("Failed to load CUDA module", e))?;

        let name = device.name().unwrap_or_else(|_| format!("cuda:{ordinal}"));
        debug!(ordinal, %name, "CUDA device ready");

        Ok(Self {
            device,
            ordinal,
            name,
            abort: AbortSignal::new(),
        })
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    fn get_func(&self, name: &str) -> Result<CudaFunction, ClusterError> {
        self.device
            .get_func(MODULE_NAME, name)
            .ok_or_else(|| ClusterError::Backend(format!("Failed to get CUDA function: {}", name)))
    }

    fn upload(&self, data: &ArrayView2<f32>) -> Result<CudaSlice<f32>, ClusterError> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(ClusterError::InvalidInput("dataset is empty".to_string()));
        }
        self.device
            .htod_sync_copy(&flatten(data))
            .map_err(|e| backend_error("Failed to copy data to GPU", e))
    }
}

struct GpuAssigner<'b> {
    device: &'b Arc<CudaDevice>,
    func: CudaFunction,
    d_data: CudaSlice<f32>,
    d_labels: CudaSlice<u32>,
    n_samples: usize,
    n_features: usize,
    device_time: Duration,
}

impl Assigner for GpuAssigner<'_> {
    fn assign(&mut self, centroids: &Array2<f32>, labels: &mut [u16]) -> Result<(), ClusterError> {
        let start = Instant::now();

        let d_centroids = self
            .device
            .htod_sync_copy(&flatten(&centroids.view()))
            .map_err(|e| backend_error("Failed to copy centroids to GPU", e))?;

        unsafe {
            self.func.clone().launch(
                launch_config(self.n_samples),
                (
                    &self.d_data,
                    &d_centroids,
                    &mut self.d_labels,
                    self.n_samples as i32,
                    centroids.nrows() as i32,
                    self.n_features as i32,
                ),
            )
        }
        .map_err(|e| backend_error("Failed to launch kernel", e))?;

        let device_labels = self
            .device
            .dtoh_sync_copy(&self.d_labels)
            .map_err(|e| backend_error("Failed to copy labels", e))?;
        self.device_time += start.elapsed();

        for (label, &assigned) in labels.iter_mut().zip(&device_labels) {
            *label = assigned as u16;
        }
        Ok(())
    }
}

struct GpuScan<'b> {
    device: &'b Arc<CudaDevice>,
    func: CudaFunction,
    d_data: CudaSlice<f32>,
    d_mask: CudaSlice<u8>,
    n_samples: usize,
    n_features: usize,
    eps_sq: f32,
    device_time: Duration,
}

impl NeighborScan for GpuScan<'_> {
    fn scan(&mut self, reference: usize, out: &mut Vec<usize>) -> Result<(), ClusterError> {
        let start = Instant::now();

        unsafe {
            self.func.clone().launch(
                launch_config(self.n_samples),
                (
                    &self.d_data,
                    &mut self.d_mask,
                    self.n_samples as i32,
                    self.n_features as i32,
                    reference as i32,
                    self.eps_sq,
                ),
            )
        }
        .map_err(|e| backend_error("Failed to launch kernel", e))?;

        let mask = self
            .device
            .dtoh_sync_copy(&self.d_mask)
            .map_err(|e| backend_error("Failed to copy neighbor mask", e))?;
        self.device_time += start.elapsed();

        out.clear();
        out.extend(mask.iter().enumerate().filter(|(_, &m)| m != 0).map(|(i, _)| i));
        Ok(())
    }
}

impl ComputeBackend for CudaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kmeans(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        params: &KMeansParams,
        _cores: Option<usize>,
    ) -> BackendOutput {
        let prepared = self.upload(data).and_then(|d_data| {
            let d_labels = self
                .device
                .alloc_zeros::<u32>(data.nrows())
                .map_err(|e| backend_error("Failed to allocate labels", e))?;
            Ok(GpuAssigner {
                device: &self.device,
                func: self.get_func("assign_nearest")?,
                d_data,
                d_labels,
                n_samples: data.nrows(),
                n_features: data.ncols(),
                device_time: Duration::ZERO,
            })
        });
        let mut assigner = match prepared {
            Ok(assigner) => assigner,
            Err(e) => return BackendOutput::failed(e),
        };

        let engine = KMeansEngine::new(params.clone(), self.abort.clone());
        let clusters = engine.run_with(labels, data, &mut assigner).map(|r| r.clusters());
        BackendOutput {
            clusters,
            exclusive_time: Some(assigner.device_time),
        }
    }

    fn dbscan(
        &self,
        labels: &mut [u16],
        data: &ArrayView2<f32>,
        params: &DbscanParams,
        _cores: Option<usize>,
    ) -> BackendOutput {
        let prepared = self.upload(data).and_then(|d_data| {
            let d_mask = self
                .device
                .alloc_zeros::<u8>(data.nrows())
                .map_err(|e| backend_error("Failed to allocate neighbor mask", e))?;
            Ok(GpuScan {
                device: &self.device,
                func: self.get_func("neighbor_mask")?,
                d_data,
                d_mask,
                n_samples: data.nrows(),
                n_features: data.ncols(),
                eps_sq: params.eps_squared(),
                device_time: Duration::ZERO,
            })
        });
        let mut scanner = match prepared {
            Ok(scanner) => scanner,
            Err(e) => return BackendOutput::failed(e),
        };

        let engine = DbscanEngine::new(*params, self.abort.clone());
        let clusters = engine.run_with(labels, data, &mut scanner).map(|r| r.n_clusters);
        BackendOutput {
            clusters,
            exclusive_time: Some(scanner.device_time),
        }
    }

    fn abort(&self) {
        self.abort.abort();
    }

    fn resume(&self) {
        self.abort.resume();
    }
}

/// Every CUDA device the driver can open.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let count = match CudaDevice::count() {
        Ok(count) => count.max(0) as usize,
        Err(e) => {
            debug!(error = %e, "CUDA driver unavailable");
            return Vec::new();
        }
    };

    (0..count)
        .filter_map(|ordinal| {
            let device = CudaDevice::new(ordinal).ok()?;
            let name = device.name().unwrap_or_else(|_| format!("cuda:{ordinal}"));
            Some(DeviceInfo {
                platform: 0,
                device: ordinal,
                name,
                device_type: DeviceType::Gpu,
                version: "CUDA".to_string(),
            })
        })
        .collect()
}
