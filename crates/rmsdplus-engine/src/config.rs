use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rmsdplus_core::error::{ForceError, ForceResult};
use rmsdplus_core::system::ParticleSystem;

pub const DEFAULT_BLOCK_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    #[default]
    Uniform,
    Mass,
    Explicit,
}

/// Floating-point width of the evaluation pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Single,
    #[default]
    Double,
}

impl Precision {
    pub fn name(self) -> &'static str {
        match self {
            Precision::Single => "single",
            Precision::Double => "double",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RmsdPlusConfig {
    pub reference_positions: Vec<[f64; 3]>,
    pub alignment_particles: Vec<usize>,
    pub rmsd_particles: Vec<usize>,
    #[serde(default)]
    pub masses: Option<Vec<f64>>,
    #[serde(default)]
    pub weighting: Option<Weighting>,
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
    #[serde(default, alias = "pbc")]
    pub use_periodic: bool,
    #[serde(default)]
    pub box_vectors: Option<[[f64; 3]; 3]>,
    #[serde(default)]
    pub precision: Option<Precision>,
    #[serde(default)]
    pub block_size: Option<usize>,
    #[serde(default)]
    pub device: Option<String>,
}

impl RmsdPlusConfig {
    pub fn from_json_str(text: &str) -> ForceResult<Self> {
        serde_json::from_str(text).map_err(|e| ForceError::Parse(format!("json parse error: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> ForceResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn normalized(&self) -> ForceResult<RmsdPlusConfig> {
        let mut cfg = self.clone();
        cfg.validate()?;
        if cfg.weighting.is_none() {
            cfg.weighting = Some(if cfg.weights.is_some() {
                Weighting::Explicit
            } else {
                Weighting::Uniform
            });
        }
        if cfg.precision.is_none() {
            cfg.precision = Some(Precision::Double);
        }
        if cfg.block_size.is_none() {
            cfg.block_size = Some(DEFAULT_BLOCK_SIZE);
        }
        if cfg.device.is_none() {
            cfg.device = Some("cpu".to_string());
        }
        Ok(cfg)
    }

    /// Shape checks that need no particle system. Range, duplicate and
    /// weight-value checks happen when a kernel resolves the sets.
    pub fn validate(&self) -> ForceResult<()> {
        let n = self.reference_positions.len();
        if n == 0 {
            return Err(ForceError::InvalidConfiguration(
                "reference_positions is empty".into(),
            ));
        }
        if self
            .reference_positions
            .iter()
            .flatten()
            .any(|v| !v.is_finite())
        {
            return Err(ForceError::InvalidConfiguration(
                "reference_positions must be finite".into(),
            ));
        }
        if self.alignment_particles.len() < 3 {
            return Err(ForceError::InvalidConfiguration(
                "alignment_particles needs at least 3 entries".into(),
            ));
        }
        if self.rmsd_particles.is_empty() {
            return Err(ForceError::InvalidConfiguration(
                "rmsd_particles is empty".into(),
            ));
        }
        if let Some(masses) = &self.masses {
            if masses.len() != n {
                return Err(ForceError::InvalidConfiguration(format!(
                    "masses has {} entries, expected {n}",
                    masses.len()
                )));
            }
        }
        match (self.weighting, &self.weights) {
            (Some(Weighting::Explicit), None) => {
                return Err(ForceError::InvalidConfiguration(
                    "explicit weighting requires a weights list".into(),
                ))
            }
            (Some(Weighting::Uniform | Weighting::Mass), Some(_)) => {
                return Err(ForceError::InvalidConfiguration(
                    "weights given but weighting is not explicit".into(),
                ))
            }
            _ => {}
        }
        if let Some(weights) = &self.weights {
            if weights.len() != n {
                return Err(ForceError::InvalidConfiguration(format!(
                    "weights has {} entries, expected {n}",
                    weights.len()
                )));
            }
        }
        if self.weighting == Some(Weighting::Mass) && self.masses.is_none() {
            return Err(ForceError::InvalidConfiguration(
                "mass weighting requires masses".into(),
            ));
        }
        if let Some(block_size) = self.block_size {
            if block_size == 0 {
                return Err(ForceError::InvalidConfiguration(
                    "block_size must be > 0".into(),
                ));
            }
        }
        Ok(())
    }

    /// Particle system described by the config: given masses, or unit masses
    /// for every reference position.
    pub fn system(&self) -> ParticleSystem {
        match &self.masses {
            Some(masses) => ParticleSystem::new(masses.clone()),
            None => ParticleSystem::with_unit_masses(self.reference_positions.len()),
        }
    }
}
