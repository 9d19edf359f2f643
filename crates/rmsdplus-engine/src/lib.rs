pub mod backend;
pub mod config;
pub mod device;
pub mod force;
pub mod kernel;
pub mod pipeline;

pub use backend::{CpuBackend, ForceBackend, SetPositions};
#[cfg(feature = "cuda")]
pub use backend::CudaBackend;
pub use config::{Precision, RmsdPlusConfig, Weighting, DEFAULT_BLOCK_SIZE};
pub use device::Device;
pub use force::{RmsdPlusForce, WeightMode};
pub use kernel::{EvaluationReport, RmsdPlusKernel};

pub use rmsdplus_core::{
    ContextState, ForceError, ForceResult, ParticleContext, ParticleSystem, PeriodicBox,
};
