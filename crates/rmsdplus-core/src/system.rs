/// Static particle data the force needs at initialize time.
#[derive(Clone, Debug, Default)]
pub struct ParticleSystem {
    pub masses: Vec<f64>,
}

impl ParticleSystem {
    pub fn new(masses: Vec<f64>) -> Self {
        Self { masses }
    }

    pub fn with_unit_masses(n_particles: usize) -> Self {
        Self {
            masses: vec![1.0; n_particles],
        }
    }

    pub fn n_particles(&self) -> usize {
        self.masses.len()
    }
}

/// Per-evaluation state supplied by the host simulation.
pub trait ParticleContext {
    fn n_particles(&self) -> usize;

    /// Current positions, one `[x, y, z]` per particle.
    fn positions(&self) -> &[[f64; 3]];

    /// Periodic box vectors as rows `a`, `b`, `c`, if the host has a cell.
    fn periodic_box_vectors(&self) -> Option<[[f64; 3]; 3]>;
}

/// Plain in-memory context.
#[derive(Clone, Debug, Default)]
pub struct ContextState {
    pub positions: Vec<[f64; 3]>,
    pub box_vectors: Option<[[f64; 3]; 3]>,
}

impl ContextState {
    pub fn new(positions: Vec<[f64; 3]>) -> Self {
        Self {
            positions,
            box_vectors: None,
        }
    }

    pub fn with_box(mut self, box_vectors: [[f64; 3]; 3]) -> Self {
        self.box_vectors = Some(box_vectors);
        self
    }
}

impl ParticleContext for ContextState {
    fn n_particles(&self) -> usize {
        self.positions.len()
    }

    fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    fn periodic_box_vectors(&self) -> Option<[[f64; 3]; 3]> {
        self.box_vectors
    }
}
