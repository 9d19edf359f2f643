use rmsdplus_core::error::{ForceError, ForceResult};
use rmsdplus_core::pbc::PeriodicBox;
use rmsdplus_core::selection::ParticleSet;
use rmsdplus_core::system::ParticleSystem;

use crate::force::{RmsdPlusForce, WeightMode};

pub const MIN_ALIGNMENT_PARTICLES: usize = 3;

/// Validated alignment and rmsd sets with their per-entry weights.
#[derive(Clone, Debug)]
pub struct ResolvedSets {
    pub n_particles: usize,
    pub alignment: ParticleSet,
    pub rmsd: ParticleSet,
    pub alignment_weights: Vec<f64>,
    pub rmsd_weights: Vec<f64>,
    /// Same indices in the same order.
    pub identical: bool,
}

impl ResolvedSets {
    pub fn resolve(force: &RmsdPlusForce, system: &ParticleSystem) -> ForceResult<Self> {
        let n_particles = system.n_particles();
        if force.reference_positions().len() != n_particles {
            return Err(ForceError::InvalidConfiguration(format!(
                "reference has {} positions but the system has {n_particles} particles",
                force.reference_positions().len()
            )));
        }
        let alignment = ParticleSet::new("alignment", force.alignment_particles(), n_particles)?;
        let rmsd = ParticleSet::new("rmsd", force.rmsd_particles(), n_particles)?;
        if alignment.len() < MIN_ALIGNMENT_PARTICLES {
            return Err(ForceError::InvalidConfiguration(format!(
                "alignment set needs at least {MIN_ALIGNMENT_PARTICLES} particles, got {}",
                alignment.len()
            )));
        }
        if rmsd.is_empty() {
            return Err(ForceError::InvalidConfiguration(
                "rmsd set is empty".into(),
            ));
        }

        let per_particle: &[f64] = match force.weights() {
            WeightMode::Uniform => &[],
            WeightMode::Mass => &system.masses,
            WeightMode::Explicit(weights) => {
                if weights.len() != n_particles {
                    return Err(ForceError::InvalidConfiguration(format!(
                        "explicit weights have {} entries, expected {n_particles}",
                        weights.len()
                    )));
                }
                weights
            }
        };
        let weight_of = |idx: usize| -> ForceResult<f64> {
            let w = per_particle.get(idx).copied().unwrap_or(1.0);
            if !w.is_finite() || w <= 0.0 {
                return Err(ForceError::InvalidConfiguration(format!(
                    "weight of particle {idx} must be finite and positive, got {w}"
                )));
            }
            Ok(w)
        };
        let alignment_weights = alignment
            .indices
            .iter()
            .map(|&idx| weight_of(idx))
            .collect::<ForceResult<Vec<_>>>()?;
        let rmsd_weights = rmsd
            .indices
            .iter()
            .map(|&idx| weight_of(idx))
            .collect::<ForceResult<Vec<_>>>()?;

        let identical = alignment.indices == rmsd.indices;
        Ok(Self {
            n_particles,
            alignment,
            rmsd,
            alignment_weights,
            rmsd_weights,
            identical,
        })
    }

    pub fn same_membership(&self, other: &ResolvedSets) -> bool {
        self.n_particles == other.n_particles
            && self.alignment.indices == other.alignment.indices
            && self.rmsd.indices == other.rmsd.indices
    }

    /// Copies the positions of both sets out of `positions`. With a box every
    /// particle is replaced by its image nearest the first alignment particle.
    pub fn gather(
        &self,
        positions: &[[f64; 3]],
        pbc: Option<&PeriodicBox>,
        alignment_out: &mut Vec<[f64; 3]>,
        rmsd_out: &mut Vec<[f64; 3]>,
    ) {
        let anchor = positions[self.alignment.indices[0]];
        let place = |idx: usize| match pbc {
            Some(cell) => cell.image_near(positions[idx], anchor),
            None => positions[idx],
        };
        alignment_out.clear();
        alignment_out.extend(self.alignment.indices.iter().map(|&idx| place(idx)));
        rmsd_out.clear();
        rmsd_out.extend(self.rmsd.indices.iter().map(|&idx| place(idx)));
    }
}
