use nalgebra::RealField;

/// Floating-point width the force pipeline runs in.
///
/// The whole pipeline is written once against this trait and instantiated for
/// `f32` and `f64`; nothing else differs between the two besides tolerances.
pub trait Real: RealField + Copy + Send + Sync + 'static {
    /// Human-readable precision name used in logs and reports.
    const NAME: &'static str;

    /// Relative eigenvalue gap below which the dominant eigenvalue is
    /// treated as degenerate.
    const DEGENERACY_TOLERANCE: f64;

    /// Deviation (squared length units) below which the energy is treated
    /// as exactly zero and no force is produced.
    const ZERO_DEVIATION: f64;

    fn lit(v: f64) -> Self;

    fn as_f64(self) -> f64;
}

impl Real for f32 {
    const NAME: &'static str = "single";
    const DEGENERACY_TOLERANCE: f64 = 1.0e-5;
    const ZERO_DEVIATION: f64 = 1.0e-12;

    #[inline]
    fn lit(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    const NAME: &'static str = "double";
    const DEGENERACY_TOLERANCE: f64 = 1.0e-10;
    const ZERO_DEVIATION: f64 = 1.0e-24;

    #[inline]
    fn lit(v: f64) -> Self {
        v
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}
