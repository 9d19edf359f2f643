use rmsdplus_core::error::{ForceError, ForceResult};

use crate::config::{RmsdPlusConfig, Weighting};

/// How per-particle weights are assigned.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum WeightMode {
    #[default]
    Uniform,
    Mass,
    /// One weight per system particle, indexed by particle index.
    Explicit(Vec<f64>),
}

/// Parameters of an RMSD-plus restraint: which particles define the frame,
/// which particles are measured, and the reference they are compared with.
#[derive(Clone, Debug, PartialEq)]
pub struct RmsdPlusForce {
    reference_positions: Vec<[f64; 3]>,
    alignment_particles: Vec<usize>,
    rmsd_particles: Vec<usize>,
    weights: WeightMode,
    use_periodic: bool,
}

impl RmsdPlusForce {
    pub fn new(
        reference_positions: Vec<[f64; 3]>,
        alignment_particles: Vec<usize>,
        rmsd_particles: Vec<usize>,
    ) -> Self {
        Self {
            reference_positions,
            alignment_particles,
            rmsd_particles,
            weights: WeightMode::Uniform,
            use_periodic: false,
        }
    }

    /// Alignment and measurement over the same particles.
    pub fn aligned(reference_positions: Vec<[f64; 3]>, particles: Vec<usize>) -> Self {
        Self::new(reference_positions, particles.clone(), particles)
    }

    pub fn with_weights(mut self, weights: WeightMode) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_periodic(mut self, use_periodic: bool) -> Self {
        self.use_periodic = use_periodic;
        self
    }

    pub fn from_config(config: &RmsdPlusConfig) -> ForceResult<Self> {
        let cfg = config.normalized()?;
        let weights = match cfg.weighting.unwrap_or_default() {
            Weighting::Uniform => WeightMode::Uniform,
            Weighting::Mass => WeightMode::Mass,
            Weighting::Explicit => WeightMode::Explicit(cfg.weights.clone().ok_or_else(|| {
                ForceError::InvalidConfiguration(
                    "explicit weighting requires a weights list".into(),
                )
            })?),
        };
        Ok(Self::new(
            cfg.reference_positions.clone(),
            cfg.alignment_particles.clone(),
            cfg.rmsd_particles.clone(),
        )
        .with_weights(weights)
        .with_periodic(cfg.use_periodic))
    }

    pub fn reference_positions(&self) -> &[[f64; 3]] {
        &self.reference_positions
    }

    pub fn alignment_particles(&self) -> &[usize] {
        &self.alignment_particles
    }

    pub fn rmsd_particles(&self) -> &[usize] {
        &self.rmsd_particles
    }

    pub fn weights(&self) -> &WeightMode {
        &self.weights
    }

    pub fn uses_periodic_boundary_conditions(&self) -> bool {
        self.use_periodic
    }

    pub fn set_reference_positions(&mut self, positions: Vec<[f64; 3]>) {
        self.reference_positions = positions;
    }

    pub fn set_weights(&mut self, weights: WeightMode) {
        self.weights = weights;
    }

    pub fn set_uses_periodic_boundary_conditions(&mut self, use_periodic: bool) {
        self.use_periodic = use_periodic;
    }

    /// Replaces the particle sets. A kernel that was initialized with
    /// different sets rejects the change on its next parameter copy.
    pub fn set_particles(&mut self, alignment: Vec<usize>, rmsd: Vec<usize>) {
        self.alignment_particles = alignment;
        self.rmsd_particles = rmsd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_uses_same_particles_for_both_sets() {
        let force = RmsdPlusForce::aligned(vec![[0.0; 3]; 4], vec![0, 1, 2]);
        assert_eq!(force.alignment_particles(), force.rmsd_particles());
        assert_eq!(force.weights(), &WeightMode::Uniform);
        assert!(!force.uses_periodic_boundary_conditions());
    }

    #[test]
    fn from_config_requires_weights_for_explicit_mode() {
        let cfg = RmsdPlusConfig {
            reference_positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            alignment_particles: vec![0, 1, 2],
            rmsd_particles: vec![0, 1, 2],
            weighting: Some(Weighting::Explicit),
            ..RmsdPlusConfig::default()
        };
        assert!(matches!(
            RmsdPlusForce::from_config(&cfg),
            Err(ForceError::InvalidConfiguration(_))
        ));
    }
}
