use std::sync::Arc;

use cudarc::driver::{
    CudaContext, CudaFunction, CudaModule, CudaSlice, CudaStream, DeviceRepr, LaunchConfig,
    PushKernelArg, ValidAsZeroBits,
};
use cudarc::nvrtc::compile_ptx;

use rmsdplus_core::error::{ForceError, ForceResult};
use rmsdplus_core::real::Real;
use rmsdplus_kernels::kernel_source;

/// Largest block the partial-reduction kernels accept; bounded by the
/// shared memory the widest row (13 values in double precision) needs.
pub const MAX_BLOCK_SIZE: usize = 256;

/// Scalar types the device kernels are compiled for.
pub trait DeviceReal: Real + DeviceRepr + ValidAsZeroBits + Default {
    const CUDA_TYPE: &'static str;
}

impl DeviceReal for f32 {
    const CUDA_TYPE: &'static str = "float";
}

impl DeviceReal for f64 {
    const CUDA_TYPE: &'static str = "double";
}

#[derive(Clone)]
pub struct GpuContext {
    inner: Arc<GpuContextInner>,
}

struct GpuContextInner {
    ctx: Arc<CudaContext>,
    stream: Arc<CudaStream>,
    ordinal: usize,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("ordinal", &self.inner.ordinal)
            .finish()
    }
}

struct Kernels {
    centroid_partial: Arc<CudaFunction>,
    correlation_partial: Arc<CudaFunction>,
    deviation_partial: Arc<CudaFunction>,
    project_rmsd: Arc<CudaFunction>,
    project_align: Arc<CudaFunction>,
}

impl Kernels {
    fn load(module: &Arc<CudaModule>) -> ForceResult<Self> {
        let load = |name: &str| -> ForceResult<Arc<CudaFunction>> {
            module
                .load_function(name)
                .map_err(|err| {
                    ForceError::Unsupported(format!("cuda kernel load '{name}' failed: {err}"))
                })
                .map(Arc::new)
        };
        Ok(Self {
            centroid_partial: load("rmsdplus_centroid_partial")?,
            correlation_partial: load("rmsdplus_correlation_partial")?,
            deviation_partial: load("rmsdplus_deviation_partial")?,
            project_rmsd: load("rmsdplus_project_rmsd")?,
            project_align: load("rmsdplus_project_align")?,
        })
    }
}

/// Host copies of the per-set tables the device pipeline keeps resident.
/// Coordinates are flattened `[x0, y0, z0, x1, ...]`.
pub struct GpuReference<'a, T> {
    pub alignment: &'a [T],
    pub alignment_weights: &'a [T],
    pub rmsd: &'a [T],
    pub rmsd_weights: &'a [T],
}

/// Device-resident buffers and compiled kernels for one force instance.
pub struct GpuPipeline<T: DeviceReal> {
    stream: Arc<CudaStream>,
    #[allow(dead_code)]
    module: Arc<CudaModule>,
    kernels: Kernels,
    block: u32,
    n_align: usize,
    n_rmsd: usize,
    align_ref: CudaSlice<T>,
    align_w: CudaSlice<T>,
    rmsd_ref: CudaSlice<T>,
    rmsd_w: CudaSlice<T>,
    align_pos: CudaSlice<T>,
    rmsd_pos: CudaSlice<T>,
    rot: CudaSlice<T>,
    gamma: CudaSlice<T>,
    align_force: CudaSlice<T>,
    rmsd_force: CudaSlice<T>,
    partial: CudaSlice<T>,
}

mod ops;

fn ceil_div(value: usize, block: u32) -> u32 {
    if value == 0 {
        1
    } else {
        ((value as u32) + block - 1) / block
    }
}

fn map_driver_err(err: cudarc::driver::DriverError) -> ForceError {
    ForceError::Unsupported(format!("cuda driver error: {err}"))
}

fn map_compile_err(err: cudarc::nvrtc::CompileError) -> ForceError {
    ForceError::Unsupported(format!("cuda compile error: {err}"))
}

fn launch_config<T>(n: usize, block: u32, row_width: usize) -> LaunchConfig {
    LaunchConfig {
        block_dim: (block, 1, 1),
        grid_dim: (ceil_div(n, block), 1, 1),
        shared_mem_bytes: ((block as usize) * row_width * std::mem::size_of::<T>()) as u32,
    }
}
