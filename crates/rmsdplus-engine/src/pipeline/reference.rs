use nalgebra::Vector3;

use rmsdplus_core::error::{ForceError, ForceResult};
use rmsdplus_core::real::Real;

use super::sets::ResolvedSets;

/// Reference tables in the precision of the pipeline.
///
/// Alignment entries are centered on the weighted alignment centroid; rmsd
/// entries are shifted by the same centroid so they live in the alignment
/// frame.
#[derive(Clone, Debug)]
pub struct NormalizedReference<T: Real> {
    pub center: [f64; 3],
    pub alignment: Vec<Vector3<T>>,
    pub alignment_weights: Vec<T>,
    pub rmsd: Vec<Vector3<T>>,
    pub rmsd_weights: Vec<T>,
    pub sum_norm_ref: T,
    pub alignment_weight: T,
    pub rmsd_weight: T,
}

impl<T: Real> NormalizedReference<T> {
    pub fn normalize(reference: &[[f64; 3]], sets: &ResolvedSets) -> ForceResult<Self> {
        if reference.len() != sets.n_particles {
            return Err(ForceError::InvalidConfiguration(format!(
                "reference has {} positions, expected {}",
                reference.len(),
                sets.n_particles
            )));
        }
        let involved = sets.alignment.indices.iter().chain(sets.rmsd.indices.iter());
        for &idx in involved {
            if reference[idx].iter().any(|v| !v.is_finite()) {
                return Err(ForceError::InvalidConfiguration(format!(
                    "reference position of particle {idx} is not finite"
                )));
            }
        }

        // Centroid and norms in f64, cast once at the end.
        let mut sum = [0.0f64; 3];
        let mut alignment_weight = 0.0f64;
        for (&idx, &w) in sets.alignment.indices.iter().zip(&sets.alignment_weights) {
            for k in 0..3 {
                sum[k] += w * reference[idx][k];
            }
            alignment_weight += w;
        }
        let center = [
            sum[0] / alignment_weight,
            sum[1] / alignment_weight,
            sum[2] / alignment_weight,
        ];
        let shift = |idx: usize| -> [f64; 3] {
            let r = reference[idx];
            [r[0] - center[0], r[1] - center[1], r[2] - center[2]]
        };
        let to_vec = |p: [f64; 3]| Vector3::new(T::lit(p[0]), T::lit(p[1]), T::lit(p[2]));

        let mut sum_norm_ref = 0.0f64;
        let mut alignment = Vec::with_capacity(sets.alignment.len());
        for (&idx, &w) in sets.alignment.indices.iter().zip(&sets.alignment_weights) {
            let p = shift(idx);
            sum_norm_ref += w * (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]);
            alignment.push(to_vec(p));
        }
        let rmsd = sets.rmsd.indices.iter().map(|&idx| to_vec(shift(idx))).collect();

        Ok(Self {
            center,
            alignment,
            alignment_weights: sets.alignment_weights.iter().map(|&w| T::lit(w)).collect(),
            rmsd,
            rmsd_weights: sets.rmsd_weights.iter().map(|&w| T::lit(w)).collect(),
            sum_norm_ref: T::lit(sum_norm_ref),
            alignment_weight: T::lit(alignment_weight),
            rmsd_weight: T::lit(sets.rmsd_weights.iter().sum()),
        })
    }

    /// Flattened `[x0, y0, z0, x1, ...]` copies of both coordinate tables.
    pub fn flattened(&self) -> (Vec<T>, Vec<T>) {
        (flatten(&self.alignment), flatten(&self.rmsd))
    }
}

pub(crate) fn flatten<T: Real>(points: &[Vector3<T>]) -> Vec<T> {
    let mut out = Vec::with_capacity(points.len() * 3);
    for p in points {
        out.extend_from_slice(&[p.x, p.y, p.z]);
    }
    out
}
