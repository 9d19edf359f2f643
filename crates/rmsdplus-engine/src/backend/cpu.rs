use nalgebra::{Matrix3, Vector3};

use rmsdplus_core::error::ForceResult;
use rmsdplus_core::real::Real;

use super::{ForceBackend, SetPositions};
use crate::pipeline::project::{
    deviation_from_rows, deviation_partials, project_alignment, project_rmsd, DeviationSums,
    Projection, ProjectionParams,
};
use crate::pipeline::reduce::{reduce_blocks, Correlation};
use crate::pipeline::reference::NormalizedReference;

/// Host backend. Reductions are split into `block_size` chunks processed on
/// the rayon pool and combined in chunk order.
#[derive(Clone, Debug)]
pub struct CpuBackend {
    block_size: usize,
}

impl CpuBackend {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }
}

impl<T: Real> ForceBackend<T> for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn load_reference(&mut self, _reference: &NormalizedReference<T>) -> ForceResult<()> {
        Ok(())
    }

    fn reduce(
        &mut self,
        positions: &SetPositions<T>,
        reference: &NormalizedReference<T>,
    ) -> ForceResult<Correlation<T>> {
        reduce_blocks(
            &positions.alignment,
            &reference.alignment,
            &reference.alignment_weights,
            self.block_size,
        )
    }

    fn measure(
        &mut self,
        positions: &SetPositions<T>,
        reference: &NormalizedReference<T>,
        rotation: &Matrix3<T>,
        center: &Vector3<T>,
    ) -> ForceResult<DeviationSums<T>> {
        let rows = deviation_partials(
            &positions.rmsd,
            &reference.rmsd,
            &reference.rmsd_weights,
            rotation,
            center,
            self.block_size,
        );
        deviation_from_rows(&rows)
    }

    fn project_forces(
        &mut self,
        positions: &SetPositions<T>,
        reference: &NormalizedReference<T>,
        params: &ProjectionParams<T>,
        out: &mut Projection<T>,
    ) -> ForceResult<()> {
        project_rmsd(
            &positions.rmsd,
            &reference.rmsd,
            &reference.rmsd_weights,
            params,
            &mut out.rmsd,
        );
        project_alignment(
            &reference.alignment,
            &reference.alignment_weights,
            params,
            &mut out.alignment,
        );
        Ok(())
    }
}
