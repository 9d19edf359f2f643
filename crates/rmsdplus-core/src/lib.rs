#![forbid(unsafe_code)]

pub mod centers;
pub mod error;
pub mod geom;
pub mod pbc;
pub mod real;
pub mod selection;
pub mod system;

pub use centers::{weighted_center, weighted_sum_norm};
pub use error::{ForceError, ForceResult};
pub use geom::{
    canonical_quaternion, quaternion_from_axis_angle, rotation_about_axis,
    rotation_from_quaternion, rotation_quaternion_derivatives,
};
pub use pbc::PeriodicBox;
pub use real::Real;
pub use selection::ParticleSet;
pub use system::{ContextState, ParticleContext, ParticleSystem};
