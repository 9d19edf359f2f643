//! Evaluation stages, leaves first: set resolution, reference
//! normalization, correlation reduction, rotation solve and force
//! projection.

pub mod project;
pub mod reduce;
pub mod reference;
pub mod rotation;
pub mod sets;

pub use project::{DeviationSums, Projection, ProjectionParams};
pub use reduce::Correlation;
pub use reference::NormalizedReference;
pub use rotation::{alignment_residual, key_matrix, OptimalRotation};
pub use sets::ResolvedSets;
