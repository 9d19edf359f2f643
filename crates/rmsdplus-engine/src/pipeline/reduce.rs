use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use rmsdplus_core::error::{ForceError, ForceResult};
use rmsdplus_core::real::Real;

pub const CENTROID_ROW: usize = 4;
pub const CORRELATION_ROW: usize = 10;

/// Result of reducing the alignment set against its reference.
#[derive(Clone, Debug)]
pub struct Correlation<T: Real> {
    /// `M = Σ w x̃ r̃ᵀ`, current on the left.
    pub matrix: Matrix3<T>,
    pub center: Vector3<T>,
    /// `Σ w |x̃|²`.
    pub sum_norm_cur: T,
}

/// Per-block rows of `(Σ w x, Σ w y, Σ w z, Σ w)`.
pub fn centroid_partials<T: Real>(
    positions: &[Vector3<T>],
    weights: &[T],
    block_size: usize,
) -> Vec<T> {
    let rows: Vec<[T; CENTROID_ROW]> = positions
        .par_chunks(block_size)
        .zip(weights.par_chunks(block_size))
        .map(|(pos, w)| {
            let mut row = [T::zero(); CENTROID_ROW];
            for (p, &wi) in pos.iter().zip(w) {
                row[0] += wi * p.x;
                row[1] += wi * p.y;
                row[2] += wi * p.z;
                row[3] += wi;
            }
            row
        })
        .collect();
    rows.into_iter().flatten().collect()
}

/// Per-block rows of `M` (row-major) followed by `Σ w |x̃|²`.
pub fn correlation_partials<T: Real>(
    positions: &[Vector3<T>],
    reference: &[Vector3<T>],
    weights: &[T],
    center: &Vector3<T>,
    block_size: usize,
) -> Vec<T> {
    let rows: Vec<[T; CORRELATION_ROW]> = positions
        .par_chunks(block_size)
        .zip(reference.par_chunks(block_size))
        .zip(weights.par_chunks(block_size))
        .map(|((pos, refs), w)| {
            let mut row = [T::zero(); CORRELATION_ROW];
            for ((p, r), &wi) in pos.iter().zip(refs).zip(w) {
                let x = p - center;
                for a in 0..3 {
                    let wx = wi * x[a];
                    for b in 0..3 {
                        row[3 * a + b] += wx * r[b];
                    }
                }
                row[9] += wi * x.norm_squared();
            }
            row
        })
        .collect();
    rows.into_iter().flatten().collect()
}

/// Combines centroid rows in block order.
pub fn center_from_rows<T: Real>(rows: &[T]) -> ForceResult<Vector3<T>> {
    let mut acc = [T::zero(); CENTROID_ROW];
    for row in rows.chunks_exact(CENTROID_ROW) {
        for k in 0..CENTROID_ROW {
            acc[k] += row[k];
        }
    }
    let total = acc[3];
    if !(total.as_f64() > 0.0) {
        return Err(ForceError::DegenerateAlignment(
            "alignment weights sum to zero".into(),
        ));
    }
    let center = Vector3::new(acc[0] / total, acc[1] / total, acc[2] / total);
    if center.iter().any(|v| !v.as_f64().is_finite()) {
        return Err(ForceError::DegenerateAlignment(
            "alignment positions are not finite".into(),
        ));
    }
    Ok(center)
}

/// Combines correlation rows in block order.
pub fn correlation_from_rows<T: Real>(
    rows: &[T],
    center: Vector3<T>,
) -> ForceResult<Correlation<T>> {
    let mut acc = [T::zero(); CORRELATION_ROW];
    for row in rows.chunks_exact(CORRELATION_ROW) {
        for k in 0..CORRELATION_ROW {
            acc[k] += row[k];
        }
    }
    if acc.iter().any(|v| !v.as_f64().is_finite()) {
        return Err(ForceError::DegenerateAlignment(
            "correlation matrix is not finite".into(),
        ));
    }
    Ok(Correlation {
        matrix: Matrix3::from_row_slice(&acc[..9]),
        center,
        sum_norm_cur: acc[9],
    })
}

/// Two-phase block reduction on the host.
pub fn reduce_blocks<T: Real>(
    positions: &[Vector3<T>],
    reference: &[Vector3<T>],
    weights: &[T],
    block_size: usize,
) -> ForceResult<Correlation<T>> {
    let center = center_from_rows(&centroid_partials(positions, weights, block_size))?;
    let rows = correlation_partials(positions, reference, weights, &center, block_size);
    correlation_from_rows(&rows, center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(rng: &mut StdRng, n: usize) -> Vec<Vector3<f64>> {
        (0..n)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-3.0..3.0),
                    rng.gen_range(-3.0..3.0),
                    rng.gen_range(-3.0..3.0),
                )
            })
            .collect()
    }

    #[test]
    fn matches_direct_sum() {
        let mut rng = StdRng::seed_from_u64(7);
        let pos = random_points(&mut rng, 37);
        let refs = random_points(&mut rng, 37);
        let w: Vec<f64> = (0..37).map(|_| rng.gen_range(0.5..2.0)).collect();

        let corr = reduce_blocks(&pos, &refs, &w, 8).unwrap();

        let total: f64 = w.iter().sum();
        let center = pos.iter().zip(&w).map(|(p, wi)| p * *wi).sum::<Vector3<f64>>() / total;
        let mut m = Matrix3::zeros();
        let mut norm = 0.0;
        for ((p, r), wi) in pos.iter().zip(&refs).zip(&w) {
            let x = p - center;
            m += x * r.transpose() * *wi;
            norm += wi * x.norm_squared();
        }
        assert!((corr.center - center).norm() < 1e-12);
        assert!((corr.matrix - m).norm() < 1e-10);
        assert!((corr.sum_norm_cur - norm).abs() < 1e-10);
    }

    #[test]
    fn block_size_only_changes_summation_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let pos = random_points(&mut rng, 100);
        let refs = random_points(&mut rng, 100);
        let w = vec![1.0; 100];
        let a = reduce_blocks(&pos, &refs, &w, 1).unwrap();
        let b = reduce_blocks(&pos, &refs, &w, 64).unwrap();
        let c = reduce_blocks(&pos, &refs, &w, 1000).unwrap();
        assert!((a.matrix - b.matrix).norm() < 1e-10);
        assert!((a.matrix - c.matrix).norm() < 1e-10);
        assert!((a.sum_norm_cur - c.sum_norm_cur).abs() < 1e-10);
    }

    #[test]
    fn non_finite_positions_are_degenerate() {
        let mut pos = vec![Vector3::new(0.0f64, 0.0, 0.0); 3];
        pos[1].y = f64::NAN;
        let refs = vec![Vector3::zeros(); 3];
        assert!(matches!(
            reduce_blocks(&pos, &refs, &[1.0; 3], 4),
            Err(ForceError::DegenerateAlignment(_))
        ));
    }
}
