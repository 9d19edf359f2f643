use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use rayon::prelude::*;

use rmsdplus_core::error::{ForceError, ForceResult};
use rmsdplus_core::geom::rotation_quaternion_derivatives;
use rmsdplus_core::real::Real;

use super::rotation::{key_matrix, OptimalRotation};

pub const DEVIATION_ROW: usize = 13;

/// Sums over the rmsd set for a fixed rotation and alignment centroid, with
/// `y = x − c` and `e = R y − s̃`.
#[derive(Clone, Debug)]
pub struct DeviationSums<T: Real> {
    /// `D = Σ w |e|²`.
    pub deviation: T,
    /// `Σ w Rᵀ e`.
    pub direct: Vector3<T>,
    /// `G = Σ w e yᵀ`.
    pub g: Matrix3<T>,
}

pub fn deviation_partials<T: Real>(
    positions: &[Vector3<T>],
    reference: &[Vector3<T>],
    weights: &[T],
    rotation: &Matrix3<T>,
    center: &Vector3<T>,
    block_size: usize,
) -> Vec<T> {
    let rt = rotation.transpose();
    let rows: Vec<[T; DEVIATION_ROW]> = positions
        .par_chunks(block_size)
        .zip(reference.par_chunks(block_size))
        .zip(weights.par_chunks(block_size))
        .map(|((pos, refs), w)| {
            let mut row = [T::zero(); DEVIATION_ROW];
            for ((p, s), &wi) in pos.iter().zip(refs).zip(w) {
                let y = p - center;
                let e = rotation * y - s;
                row[0] += wi * e.norm_squared();
                let rte = rt * e;
                for a in 0..3 {
                    row[1 + a] += wi * rte[a];
                    let we = wi * e[a];
                    for b in 0..3 {
                        row[4 + 3 * a + b] += we * y[b];
                    }
                }
            }
            row
        })
        .collect();
    rows.into_iter().flatten().collect()
}

pub fn deviation_from_rows<T: Real>(rows: &[T]) -> ForceResult<DeviationSums<T>> {
    let mut acc = [T::zero(); DEVIATION_ROW];
    for row in rows.chunks_exact(DEVIATION_ROW) {
        for k in 0..DEVIATION_ROW {
            acc[k] += row[k];
        }
    }
    if acc.iter().any(|v| !v.as_f64().is_finite()) {
        return Err(ForceError::DegenerateAlignment(
            "rmsd deviation is not finite".into(),
        ));
    }
    Ok(DeviationSums {
        deviation: acc[0],
        direct: Vector3::new(acc[1], acc[2], acc[3]),
        g: Matrix3::from_row_slice(&acc[4..]),
    })
}

/// `Γ = ∂D/∂M` through the optimal rotation, from first-order perturbation
/// of the dominant eigenvector. Gaps inside the degenerate block are skipped.
pub fn rotation_gradient<T: Real>(rotation: &OptimalRotation<T>, g: &Matrix3<T>) -> Matrix3<T> {
    let q = rotation.quaternion;
    let dr = rotation_quaternion_derivatives(&q);
    let two = T::lit(2.0);
    let gq = Vector4::from_fn(|p, _| two * g.component_mul(&dr[p]).sum());

    let lambda0 = rotation.eigenvalues[0].as_f64();
    let mut p_mat = Matrix4::<T>::zeros();
    for k in rotation.degenerate_rank..4 {
        let gap = lambda0 - rotation.eigenvalues[k].as_f64();
        if !gap.is_finite() || gap <= 0.0 {
            continue;
        }
        let u = &rotation.eigenvectors[k];
        let c = gq.dot(u) / T::lit(gap);
        p_mat += u * q.transpose() * c;
    }

    Matrix3::from_fn(|a, b| {
        let mut unit = Matrix3::zeros();
        unit[(a, b)] = T::one();
        p_mat.component_mul(&key_matrix(&unit)).sum()
    })
}

/// Scalars shared by both projection passes.
#[derive(Clone, Debug)]
pub struct ProjectionParams<T: Real> {
    pub rotation: Matrix3<T>,
    pub center: Vector3<T>,
    pub gamma: Matrix3<T>,
    /// `h = Σ_S 2 w Rᵀ e`.
    pub h: Vector3<T>,
    pub inv_alignment_weight: T,
    /// `−1 / (2 E W_S)`.
    pub scale: T,
}

/// Per-entry forces for each set, in set order.
#[derive(Clone, Debug)]
pub struct Projection<T: Real> {
    pub alignment: Vec<Vector3<T>>,
    pub rmsd: Vec<Vector3<T>>,
}

impl<T: Real> Default for Projection<T> {
    fn default() -> Self {
        Self {
            alignment: Vec::new(),
            rmsd: Vec::new(),
        }
    }
}

impl<T: Real> Projection<T> {
    pub fn zeroed(&mut self, n_align: usize, n_rmsd: usize) {
        self.alignment.clear();
        self.alignment.resize(n_align, Vector3::zeros());
        self.rmsd.clear();
        self.rmsd.resize(n_rmsd, Vector3::zeros());
    }
}

pub fn project_rmsd<T: Real>(
    positions: &[Vector3<T>],
    reference: &[Vector3<T>],
    weights: &[T],
    params: &ProjectionParams<T>,
    out: &mut Vec<Vector3<T>>,
) {
    let rt = params.rotation.transpose();
    let two = T::lit(2.0);
    positions
        .par_iter()
        .zip(reference.par_iter())
        .zip(weights.par_iter())
        .map(|((p, s), &w)| {
            let e = params.rotation * (p - params.center) - s;
            rt * e * (params.scale * two * w)
        })
        .collect_into_vec(out);
}

pub fn project_alignment<T: Real>(
    reference: &[Vector3<T>],
    weights: &[T],
    params: &ProjectionParams<T>,
    out: &mut Vec<Vector3<T>>,
) {
    let shift = params.h * params.inv_alignment_weight;
    reference
        .par_iter()
        .zip(weights.par_iter())
        .map(|(r, &w)| (params.gamma * r - shift) * (params.scale * w))
        .collect_into_vec(out);
}
