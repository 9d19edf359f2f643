use nalgebra::{Matrix3, Vector3};

use rmsdplus_core::error::ForceResult;
use rmsdplus_core::real::Real;

use crate::device::Device;
use crate::pipeline::project::{DeviationSums, Projection, ProjectionParams};
use crate::pipeline::reduce::Correlation;
use crate::pipeline::reference::NormalizedReference;
use crate::pipeline::rotation::{self, OptimalRotation};

mod cpu;
#[cfg(feature = "cuda")]
mod cuda;

pub use cpu::CpuBackend;
#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;

/// Imaged positions of both sets, in set order.
#[derive(Clone, Debug)]
pub struct SetPositions<T: Real> {
    pub alignment: Vec<Vector3<T>>,
    pub rmsd: Vec<Vector3<T>>,
}

impl<T: Real> Default for SetPositions<T> {
    fn default() -> Self {
        Self {
            alignment: Vec::new(),
            rmsd: Vec::new(),
        }
    }
}

impl<T: Real> SetPositions<T> {
    pub fn fill(&mut self, alignment: &[[f64; 3]], rmsd: &[[f64; 3]]) {
        let cast = |p: &[f64; 3]| Vector3::new(T::lit(p[0]), T::lit(p[1]), T::lit(p[2]));
        self.alignment.clear();
        self.alignment.extend(alignment.iter().map(cast));
        self.rmsd.clear();
        self.rmsd.extend(rmsd.iter().map(cast));
    }
}

/// One evaluation stage per method; the kernel calls them in order
/// `reduce`, `solve_rotation`, `measure`, `project_forces`.
///
/// Device backends may keep positions resident between stages, so a stage
/// may only be called after the ones before it in the same evaluation.
pub trait ForceBackend<T: Real> {
    fn name(&self) -> &'static str;

    /// Reloads reference tables after a parameter change. Set sizes never
    /// change here.
    fn load_reference(&mut self, reference: &NormalizedReference<T>) -> ForceResult<()>;

    fn reduce(
        &mut self,
        positions: &SetPositions<T>,
        reference: &NormalizedReference<T>,
    ) -> ForceResult<Correlation<T>>;

    fn solve_rotation(&mut self, correlation: &Correlation<T>) -> ForceResult<OptimalRotation<T>> {
        rotation::solve(&correlation.matrix)
    }

    fn measure(
        &mut self,
        positions: &SetPositions<T>,
        reference: &NormalizedReference<T>,
        rotation: &Matrix3<T>,
        center: &Vector3<T>,
    ) -> ForceResult<DeviationSums<T>>;

    fn project_forces(
        &mut self,
        positions: &SetPositions<T>,
        reference: &NormalizedReference<T>,
        params: &ProjectionParams<T>,
        out: &mut Projection<T>,
    ) -> ForceResult<()>;
}

/// Scalar types every backend can run.
#[cfg(feature = "cuda")]
pub trait BackendReal: rmsdplus_gpu::DeviceReal {}
#[cfg(feature = "cuda")]
impl<T: rmsdplus_gpu::DeviceReal> BackendReal for T {}

#[cfg(not(feature = "cuda"))]
pub trait BackendReal: Real {}
#[cfg(not(feature = "cuda"))]
impl<T: Real> BackendReal for T {}

/// The reference seeds device buffers; the CPU backend reads it per call.
#[cfg_attr(not(feature = "cuda"), allow(unused_variables))]
pub fn create_backend<T: BackendReal>(
    device: &Device,
    block_size: usize,
    reference: &NormalizedReference<T>,
) -> ForceResult<Box<dyn ForceBackend<T>>> {
    match device {
        Device::Cpu => Ok(Box::new(CpuBackend::new(block_size))),
        #[cfg(feature = "cuda")]
        Device::Cuda(ctx) => Ok(Box::new(CudaBackend::new(ctx, block_size, reference)?)),
    }
}
