use nalgebra::{Matrix3, Vector3};

use rmsdplus_core::error::ForceResult;
use rmsdplus_gpu::{DeviceReal, GpuContext, GpuPipeline, GpuReference};

use super::{ForceBackend, SetPositions};
use crate::pipeline::project::{deviation_from_rows, DeviationSums, Projection, ProjectionParams};
use crate::pipeline::reduce::{center_from_rows, correlation_from_rows, Correlation};
use crate::pipeline::reference::{flatten, NormalizedReference};

/// Device backend. Positions are uploaded once per evaluation in `reduce`;
/// later stages reuse them and the rotation uploaded by `measure`.
pub struct CudaBackend<T: DeviceReal> {
    pipeline: GpuPipeline<T>,
}

impl<T: DeviceReal> CudaBackend<T> {
    pub fn new(
        ctx: &GpuContext,
        block_size: usize,
        reference: &NormalizedReference<T>,
    ) -> ForceResult<Self> {
        let (alignment, rmsd) = reference.flattened();
        let pipeline = ctx.pipeline(
            block_size,
            &GpuReference {
                alignment: &alignment,
                alignment_weights: &reference.alignment_weights,
                rmsd: &rmsd,
                rmsd_weights: &reference.rmsd_weights,
            },
        )?;
        Ok(Self { pipeline })
    }
}

fn row_major<T: DeviceReal>(m: &Matrix3<T>) -> [T; 9] {
    let mut out = [T::zero(); 9];
    for a in 0..3 {
        for b in 0..3 {
            out[3 * a + b] = m[(a, b)];
        }
    }
    out
}

fn unflatten<T: DeviceReal>(flat: &[T], out: &mut Vec<Vector3<T>>) {
    out.clear();
    out.extend(flat.chunks_exact(3).map(|c| Vector3::new(c[0], c[1], c[2])));
}

impl<T: DeviceReal> ForceBackend<T> for CudaBackend<T> {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn load_reference(&mut self, reference: &NormalizedReference<T>) -> ForceResult<()> {
        let (alignment, rmsd) = reference.flattened();
        self.pipeline.load_reference(&GpuReference {
            alignment: &alignment,
            alignment_weights: &reference.alignment_weights,
            rmsd: &rmsd,
            rmsd_weights: &reference.rmsd_weights,
        })
    }

    fn reduce(
        &mut self,
        positions: &SetPositions<T>,
        _reference: &NormalizedReference<T>,
    ) -> ForceResult<Correlation<T>> {
        self.pipeline
            .upload_positions(&flatten(&positions.alignment), &flatten(&positions.rmsd))?;
        let center = center_from_rows(&self.pipeline.centroid_partials()?)?;
        let rows = self
            .pipeline
            .correlation_partials([center.x, center.y, center.z])?;
        correlation_from_rows(&rows, center)
    }

    fn measure(
        &mut self,
        _positions: &SetPositions<T>,
        _reference: &NormalizedReference<T>,
        rotation: &Matrix3<T>,
        center: &Vector3<T>,
    ) -> ForceResult<DeviationSums<T>> {
        let rows = self
            .pipeline
            .deviation_partials(&row_major(rotation), [center.x, center.y, center.z])?;
        deviation_from_rows(&rows)
    }

    fn project_forces(
        &mut self,
        _positions: &SetPositions<T>,
        _reference: &NormalizedReference<T>,
        params: &ProjectionParams<T>,
        out: &mut Projection<T>,
    ) -> ForceResult<()> {
        let (alignment, rmsd) = self.pipeline.project(
            &row_major(&params.gamma),
            [params.h.x, params.h.y, params.h.z],
            params.inv_alignment_weight,
            params.scale,
            [params.center.x, params.center.y, params.center.z],
        )?;
        unflatten(&alignment, &mut out.alignment);
        unflatten(&rmsd, &mut out.rmsd);
        Ok(())
    }
}
