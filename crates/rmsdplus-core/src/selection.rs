use fxhash::FxHashSet;

use crate::error::{ForceError, ForceResult};

/// Ordered list of unique particle indices.
///
/// Order is significant: entry `k` of a set is paired with entry `k` of every
/// per-set table derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticleSet {
    pub indices: Vec<usize>,
}

impl ParticleSet {
    pub fn new(label: &str, indices: &[usize], n_particles: usize) -> ForceResult<Self> {
        let mut seen = FxHashSet::default();
        for &idx in indices {
            if idx >= n_particles {
                return Err(ForceError::InvalidConfiguration(format!(
                    "{label} index {idx} out of range for {n_particles} particles"
                )));
            }
            if !seen.insert(idx) {
                return Err(ForceError::InvalidConfiguration(format!(
                    "{label} index {idx} appears more than once"
                )));
            }
        }
        Ok(Self {
            indices: indices.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
