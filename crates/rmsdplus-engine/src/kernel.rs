use log::{debug, info, warn};
use nalgebra::{Matrix3, Vector3};

use rmsdplus_core::error::{ForceError, ForceResult};
use rmsdplus_core::pbc::PeriodicBox;
use rmsdplus_core::real::Real;
use rmsdplus_core::system::{ParticleContext, ParticleSystem};

use crate::backend::{create_backend, BackendReal, ForceBackend, SetPositions};
use crate::config::{Precision, RmsdPlusConfig, DEFAULT_BLOCK_SIZE};
use crate::device::Device;
use crate::force::{RmsdPlusForce, WeightMode};
use crate::pipeline::project::{rotation_gradient, Projection, ProjectionParams};
use crate::pipeline::reference::NormalizedReference;
use crate::pipeline::rotation::alignment_residual;
use crate::pipeline::sets::ResolvedSets;

/// Diagnostics of the most recent evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationReport {
    pub energy: f64,
    /// Weighted squared deviation `D` over the rmsd set.
    pub deviation: f64,
    pub lambda_max: f64,
    pub alignment_residual: f64,
    pub degenerate: bool,
    /// Rotation applied to centered current positions, rows first.
    pub rotation: [[f64; 3]; 3],
    pub quaternion: [f64; 4],
    pub alignment_center: [f64; 3],
}

struct Pipeline<T: Real> {
    backend: Box<dyn ForceBackend<T>>,
    reference: NormalizedReference<T>,
    positions: SetPositions<T>,
    projection: Projection<T>,
}

impl<T: BackendReal> Pipeline<T> {
    fn build(
        device: &Device,
        block_size: usize,
        reference_positions: &[[f64; 3]],
        sets: &ResolvedSets,
    ) -> ForceResult<Self> {
        let reference = NormalizedReference::normalize(reference_positions, sets)?;
        let backend = create_backend(device, block_size, &reference)?;
        Ok(Self {
            backend,
            reference,
            positions: SetPositions::default(),
            projection: Projection::default(),
        })
    }

    fn reload(&mut self, reference_positions: &[[f64; 3]], sets: &ResolvedSets) -> ForceResult<()> {
        let reference = NormalizedReference::normalize(reference_positions, sets)?;
        self.backend.load_reference(&reference)?;
        self.reference = reference;
        Ok(())
    }

    fn evaluate(&mut self, identical: bool, include_forces: bool) -> ForceResult<EvaluationReport> {
        let corr = self.backend.reduce(&self.positions, &self.reference)?;
        let rot = self.backend.solve_rotation(&corr)?;
        let residual =
            alignment_residual(self.reference.sum_norm_ref, corr.sum_norm_cur, rot.lambda_max);

        let sums = if include_forces || !identical {
            Some(self.backend.measure(
                &self.positions,
                &self.reference,
                &rot.rotation,
                &corr.center,
            )?)
        } else {
            None
        };
        let deviation = match (&sums, identical) {
            (Some(sums), false) => sums.deviation.as_f64().max(0.0),
            _ => residual.as_f64(),
        };
        let rmsd_weight = self.reference.rmsd_weight.as_f64();
        let msd = deviation / rmsd_weight;
        let energy = msd.sqrt();

        if include_forces {
            self.projection
                .zeroed(self.reference.alignment.len(), self.reference.rmsd.len());
            if let (Some(sums), true) = (&sums, msd > T::ZERO_DEVIATION) {
                // Identical sets: the rotation and centroid terms cancel.
                let (gamma, h) = if identical {
                    (Matrix3::zeros(), Vector3::zeros())
                } else {
                    (rotation_gradient(&rot, &sums.g), sums.direct * T::lit(2.0))
                };
                let params = ProjectionParams {
                    rotation: rot.rotation,
                    center: corr.center,
                    gamma,
                    h,
                    inv_alignment_weight: T::one() / self.reference.alignment_weight,
                    scale: T::lit(-1.0 / (2.0 * energy * rmsd_weight)),
                };
                self.backend.project_forces(
                    &self.positions,
                    &self.reference,
                    &params,
                    &mut self.projection,
                )?;
            }
        }

        let r = &rot.rotation;
        let q = &rot.quaternion;
        Ok(EvaluationReport {
            energy,
            deviation,
            lambda_max: rot.lambda_max.as_f64(),
            alignment_residual: residual.as_f64(),
            degenerate: rot.is_degenerate(),
            rotation: [0, 1, 2].map(|a| [0, 1, 2].map(|b| r[(a, b)].as_f64())),
            quaternion: [q[0].as_f64(), q[1].as_f64(), q[2].as_f64(), q[3].as_f64()],
            alignment_center: [
                corr.center.x.as_f64(),
                corr.center.y.as_f64(),
                corr.center.z.as_f64(),
            ],
        })
    }

    fn scatter(&self, sets: &ResolvedSets, forces: &mut [[f64; 3]]) {
        let pairs = sets
            .alignment
            .indices
            .iter()
            .zip(&self.projection.alignment)
            .chain(sets.rmsd.indices.iter().zip(&self.projection.rmsd));
        for (&idx, f) in pairs {
            forces[idx][0] += f.x.as_f64();
            forces[idx][1] += f.y.as_f64();
            forces[idx][2] += f.z.as_f64();
        }
    }
}

enum Engine {
    Single(Pipeline<f32>),
    Double(Pipeline<f64>),
}

impl Engine {
    fn backend_name(&self) -> &'static str {
        match self {
            Engine::Single(p) => p.backend.name(),
            Engine::Double(p) => p.backend.name(),
        }
    }
}

struct KernelState {
    system: ParticleSystem,
    force: RmsdPlusForce,
    sets: ResolvedSets,
    use_periodic: bool,
    engine: Engine,
}

/// Evaluates the energy and forces of one [`RmsdPlusForce`].
///
/// `initialize` validates the force against a particle system and uploads
/// the reference; `execute` then runs reduce, rotation solve and projection
/// for one set of positions. Forces are added to the caller's buffer only
/// after every stage succeeded.
pub struct RmsdPlusKernel {
    device: Device,
    precision: Precision,
    block_size: usize,
    state: Option<KernelState>,
    last_report: Option<EvaluationReport>,
    degenerate_warned: bool,
    alignment_scratch: Vec<[f64; 3]>,
    rmsd_scratch: Vec<[f64; 3]>,
}

impl RmsdPlusKernel {
    pub fn new(device: Device, precision: Precision, block_size: usize) -> ForceResult<Self> {
        if block_size == 0 {
            return Err(ForceError::InvalidConfiguration(
                "block_size must be > 0".into(),
            ));
        }
        Ok(Self::unchecked(device, precision, block_size))
    }

    pub fn cpu(precision: Precision) -> Self {
        Self::unchecked(Device::Cpu, precision, DEFAULT_BLOCK_SIZE)
    }

    fn unchecked(device: Device, precision: Precision, block_size: usize) -> Self {
        Self {
            device,
            precision,
            block_size,
            state: None,
            last_report: None,
            degenerate_warned: false,
            alignment_scratch: Vec::new(),
            rmsd_scratch: Vec::new(),
        }
    }

    /// Builds and initializes a kernel for the system the config describes.
    pub fn from_config(config: &RmsdPlusConfig) -> ForceResult<Self> {
        let cfg = config.normalized()?;
        let device = Device::from_spec(cfg.device.as_deref().unwrap_or("cpu"))?;
        let mut kernel = Self::new(
            device,
            cfg.precision.unwrap_or_default(),
            cfg.block_size.unwrap_or(DEFAULT_BLOCK_SIZE),
        )?;
        kernel.initialize(&cfg.system(), &RmsdPlusForce::from_config(&cfg)?)?;
        Ok(kernel)
    }

    pub fn initialize(
        &mut self,
        system: &ParticleSystem,
        force: &RmsdPlusForce,
    ) -> ForceResult<()> {
        let sets = ResolvedSets::resolve(force, system)?;
        let reference = force.reference_positions();
        let engine = match self.precision {
            Precision::Single => Engine::Single(Pipeline::build(
                &self.device,
                self.block_size,
                reference,
                &sets,
            )?),
            Precision::Double => Engine::Double(Pipeline::build(
                &self.device,
                self.block_size,
                reference,
                &sets,
            )?),
        };
        info!(
            "rmsdplus initialized: {} alignment / {} rmsd particles{}, backend={}, precision={}, block={}, periodic={}",
            sets.alignment.len(),
            sets.rmsd.len(),
            if sets.identical { " (identical)" } else { "" },
            engine.backend_name(),
            self.precision.name(),
            self.block_size,
            force.uses_periodic_boundary_conditions()
        );
        self.state = Some(KernelState {
            system: system.clone(),
            force: force.clone(),
            sets,
            use_periodic: force.uses_periodic_boundary_conditions(),
            engine,
        });
        self.last_report = None;
        self.degenerate_warned = false;
        Ok(())
    }

    /// Runs one evaluation. Returns the energy when `include_energy` is set
    /// and `0.0` otherwise; with `include_forces` the forces are added into
    /// `forces`, which must then hold one entry per particle.
    pub fn execute(
        &mut self,
        context: &dyn ParticleContext,
        forces: &mut [[f64; 3]],
        include_forces: bool,
        include_energy: bool,
    ) -> ForceResult<f64> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| ForceError::InvalidConfiguration("kernel is not initialized".into()))?;
        let n = state.sets.n_particles;
        let positions = context.positions();
        if context.n_particles() != n || positions.len() != n {
            return Err(ForceError::InvalidConfiguration(format!(
                "context has {} positions, expected {n}",
                positions.len()
            )));
        }
        if include_forces && forces.len() != n {
            return Err(ForceError::InvalidConfiguration(format!(
                "force buffer has {} entries, expected {n}",
                forces.len()
            )));
        }
        let pbc = if state.use_periodic {
            let vectors = context.periodic_box_vectors().ok_or_else(|| {
                ForceError::PeriodicGeometry(
                    "periodic boundary conditions requested but the context has no box".into(),
                )
            })?;
            Some(PeriodicBox::from_vectors(vectors)?)
        } else {
            None
        };

        state.sets.gather(
            positions,
            pbc.as_ref(),
            &mut self.alignment_scratch,
            &mut self.rmsd_scratch,
        );
        let identical = state.sets.identical;
        let report = match &mut state.engine {
            Engine::Single(p) => {
                p.positions.fill(&self.alignment_scratch, &self.rmsd_scratch);
                p.evaluate(identical, include_forces)?
            }
            Engine::Double(p) => {
                p.positions.fill(&self.alignment_scratch, &self.rmsd_scratch);
                p.evaluate(identical, include_forces)?
            }
        };
        if !report.energy.is_finite() {
            return Err(ForceError::DegenerateAlignment(
                "energy is not finite".into(),
            ));
        }

        if report.degenerate {
            if self.degenerate_warned {
                debug!("rmsdplus: degenerate alignment (lambda_max={:.6e})", report.lambda_max);
            } else {
                warn!(
                    "rmsdplus: dominant eigenvalue is degenerate (lambda_max={:.6e}); rotation chosen by tie-break",
                    report.lambda_max
                );
                self.degenerate_warned = true;
            }
        }

        if include_forces {
            match &state.engine {
                Engine::Single(p) => p.scatter(&state.sets, forces),
                Engine::Double(p) => p.scatter(&state.sets, forces),
            }
        }
        debug!(
            "rmsdplus: energy={:.6e} lambda_max={:.6e} residual={:.6e}",
            report.energy, report.lambda_max, report.alignment_residual
        );
        let energy = report.energy;
        self.last_report = Some(report);
        Ok(if include_energy { energy } else { 0.0 })
    }

    /// Replaces the reference and/or weights of the initialized force.
    pub fn refresh(
        &mut self,
        reference: Option<Vec<[f64; 3]>>,
        weights: Option<WeightMode>,
    ) -> ForceResult<()> {
        let mut force = self
            .state
            .as_ref()
            .map(|s| s.force.clone())
            .ok_or_else(|| ForceError::InvalidConfiguration("kernel is not initialized".into()))?;
        if let Some(reference) = reference {
            force.set_reference_positions(reference);
        }
        if let Some(weights) = weights {
            force.set_weights(weights);
        }
        self.copy_parameters_to_context(&force)
    }

    /// Re-derives reference quantities from `force` without rebuilding the
    /// backend. Particle membership must match the initialized force.
    pub fn copy_parameters_to_context(&mut self, force: &RmsdPlusForce) -> ForceResult<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| ForceError::InvalidConfiguration("kernel is not initialized".into()))?;
        let sets = ResolvedSets::resolve(force, &state.system)?;
        if !sets.same_membership(&state.sets) {
            return Err(ForceError::InvalidConfiguration(
                "particle sets cannot change after initialization".into(),
            ));
        }
        match &mut state.engine {
            Engine::Single(p) => p.reload(force.reference_positions(), &sets)?,
            Engine::Double(p) => p.reload(force.reference_positions(), &sets)?,
        }
        state.sets = sets;
        state.use_periodic = force.uses_periodic_boundary_conditions();
        state.force = force.clone();
        info!(
            "rmsdplus parameters updated (periodic={})",
            state.use_periodic
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn last_report(&self) -> Option<&EvaluationReport> {
        self.last_report.as_ref()
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.state.as_ref().map(|s| s.engine.backend_name())
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn force(&self) -> Option<&RmsdPlusForce> {
        self.state.as_ref().map(|s| &s.force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmsdplus_core::system::ContextState;

    fn square_force() -> RmsdPlusForce {
        let reference = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        RmsdPlusForce::aligned(reference, vec![0, 1, 2, 3])
    }

    #[test]
    fn execute_before_initialize_fails() {
        let mut kernel = RmsdPlusKernel::cpu(Precision::Double);
        let ctx = ContextState::new(vec![[0.0; 3]; 4]);
        let mut forces = vec![[0.0; 3]; 4];
        assert!(matches!(
            kernel.execute(&ctx, &mut forces, true, true),
            Err(ForceError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_block_size_is_rejected() {
        assert!(RmsdPlusKernel::new(Device::Cpu, Precision::Double, 0).is_err());
    }

    #[test]
    fn fatal_errors_leave_forces_untouched() {
        let mut kernel = RmsdPlusKernel::cpu(Precision::Double);
        let force = square_force().with_periodic(true);
        kernel
            .initialize(&ParticleSystem::with_unit_masses(4), &force)
            .unwrap();
        let ctx = ContextState::new(vec![[0.3, 0.0, 0.0]; 4]);
        let mut forces = vec![[7.0; 3]; 4];
        assert!(matches!(
            kernel.execute(&ctx, &mut forces, true, true),
            Err(ForceError::PeriodicGeometry(_))
        ));
        assert!(forces.iter().flatten().all(|&v| v == 7.0));

        let mut bad = ContextState::new(vec![[0.0; 3]; 4])
            .with_box([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]);
        bad.positions[2][1] = f64::NAN;
        assert!(matches!(
            kernel.execute(&bad, &mut forces, true, true),
            Err(ForceError::DegenerateAlignment(_))
        ));
        assert!(forces.iter().flatten().all(|&v| v == 7.0));
    }

    #[test]
    fn energy_only_skips_forces() {
        let mut kernel = RmsdPlusKernel::cpu(Precision::Double);
        kernel
            .initialize(&ParticleSystem::with_unit_masses(4), &square_force())
            .unwrap();
        let ctx = ContextState::new(vec![
            [0.0, 0.0, 0.0],
            [1.2, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 0.9],
        ]);
        let e = kernel.execute(&ctx, &mut [], false, true).unwrap();
        assert!(e > 0.0);
        let report = kernel.last_report().unwrap();
        assert_eq!(report.energy, e);
        assert_eq!(kernel.execute(&ctx, &mut [], false, false).unwrap(), 0.0);
    }

    #[test]
    fn membership_change_is_rejected() {
        let mut kernel = RmsdPlusKernel::cpu(Precision::Single);
        let mut force = square_force();
        kernel
            .initialize(&ParticleSystem::with_unit_masses(4), &force)
            .unwrap();
        force.set_particles(vec![0, 1, 2], vec![3]);
        assert!(matches!(
            kernel.copy_parameters_to_context(&force),
            Err(ForceError::InvalidConfiguration(_))
        ));
        assert_eq!(kernel.backend_name(), Some("cpu"));
    }

    #[test]
    fn cpu_shortcut_matches_explicit_constructor() {
        let shortcut = RmsdPlusKernel::cpu(Precision::Single);
        let explicit = RmsdPlusKernel::new(Device::Cpu, Precision::Single, DEFAULT_BLOCK_SIZE)
            .unwrap();
        assert_eq!(shortcut.block_size(), explicit.block_size());
        assert_eq!(shortcut.precision(), explicit.precision());
        assert_eq!(shortcut.device().name(), "cpu");
        assert!(!shortcut.is_initialized());
        assert!(shortcut.last_report().is_none());
    }
}
