use std::cmp::Ordering;

use nalgebra::{Matrix3, Matrix4, SymmetricEigen, Vector4};

use rmsdplus_core::error::{ForceError, ForceResult};
use rmsdplus_core::geom::{canonical_quaternion, rotation_from_quaternion};
use rmsdplus_core::real::Real;

const EIGEN_MAX_ITERATIONS: usize = 1000;
const TIE_BREAK_THRESHOLD: f64 = 0.1;
const QUATERNION_SIGN_EPS: f64 = 1.0e-6;

/// Dominant eigenpair of the key matrix and the rotation it encodes.
#[derive(Clone, Debug)]
pub struct OptimalRotation<T: Real> {
    pub rotation: Matrix3<T>,
    /// Unit quaternion `(w, x, y, z)`, sign canonicalized.
    pub quaternion: Vector4<T>,
    pub lambda_max: T,
    /// Eigenvalues in descending order.
    pub eigenvalues: [T; 4],
    /// Unit eigenvectors matching `eigenvalues`.
    pub eigenvectors: [Vector4<T>; 4],
    /// Number of eigenvalues within tolerance of the largest one.
    pub degenerate_rank: usize,
}

impl<T: Real> OptimalRotation<T> {
    pub fn is_degenerate(&self) -> bool {
        self.degenerate_rank > 1
    }
}

/// Horn's symmetric key matrix for `S = m`. For a unit quaternion `q`,
/// `qᵀ N q = tr(R(q) m)`.
pub fn key_matrix<T: Real>(m: &Matrix3<T>) -> Matrix4<T> {
    let (sxx, sxy, sxz) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (syx, syy, syz) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (szx, szy, szz) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);
    Matrix4::new(
        sxx + syy + szz,
        syz - szy,
        szx - sxz,
        sxy - syx,
        syz - szy,
        sxx - syy - szz,
        sxy + syx,
        szx + sxz,
        szx - sxz,
        sxy + syx,
        -sxx + syy - szz,
        syz + szy,
        sxy - syx,
        szx + sxz,
        syz + szy,
        -sxx - syy + szz,
    )
}

pub fn solve<T: Real>(m: &Matrix3<T>) -> ForceResult<OptimalRotation<T>> {
    if m.iter().any(|v| !v.as_f64().is_finite()) {
        return Err(ForceError::DegenerateAlignment(
            "correlation matrix is not finite".into(),
        ));
    }
    let eig = SymmetricEigen::try_new(key_matrix(m), T::default_epsilon(), EIGEN_MAX_ITERATIONS)
        .ok_or_else(|| {
            ForceError::DegenerateAlignment("key matrix eigensolver did not converge".into())
        })?;

    let raw: Vec<f64> = eig.eigenvalues.iter().map(|v| v.as_f64()).collect();
    let mut order = [0usize, 1, 2, 3];
    order.sort_by(|&a, &b| raw[b].partial_cmp(&raw[a]).unwrap_or(Ordering::Equal));
    let eigenvalues = order.map(|k| eig.eigenvalues[k]);
    let eigenvectors = order.map(|k| eig.eigenvectors.column(k).into_owned());

    let lambda0 = raw[order[0]];
    if !lambda0.is_finite() {
        return Err(ForceError::DegenerateAlignment(
            "key matrix eigenvalues are not finite".into(),
        ));
    }
    let tol = T::DEGENERACY_TOLERANCE * lambda0.abs().max(f64::MIN_POSITIVE);
    let degenerate_rank = order
        .iter()
        .take_while(|&&k| lambda0 - raw[k] <= tol)
        .count()
        .max(1);

    let q = if degenerate_rank == 1 {
        eigenvectors[0]
    } else {
        tie_break(&eigenvectors[..degenerate_rank])
    };
    let q = canonical_quaternion(q.normalize(), QUATERNION_SIGN_EPS);

    Ok(OptimalRotation {
        rotation: rotation_from_quaternion(&q),
        quaternion: q,
        lambda_max: eigenvalues[0],
        eigenvalues,
        eigenvectors,
        degenerate_rank,
    })
}

/// Projection onto the degenerate subspace of the lowest-index basis vector
/// that survives it.
fn tie_break<T: Real>(subspace: &[Vector4<T>]) -> Vector4<T> {
    for i in 0..4 {
        let mut p = Vector4::zeros();
        for u in subspace {
            p += u * u[i];
        }
        let n = p.norm();
        if n.as_f64() > TIE_BREAK_THRESHOLD {
            return p / n;
        }
    }
    subspace[0]
}

/// `sumNormRef + sumNormCur − 2 λmax`, clamped at zero.
pub fn alignment_residual<T: Real>(sum_norm_ref: T, sum_norm_cur: T, lambda_max: T) -> T {
    let r = sum_norm_ref + sum_norm_cur - T::lit(2.0) * lambda_max;
    if r.as_f64() > 0.0 {
        r
    } else {
        T::zero()
    }
}
