use nalgebra::Vector3;

use crate::real::Real;

/// Weighted centroid `Σ w_i p_i / Σ w_i`; zero when the total weight is zero.
pub fn weighted_center<T: Real>(points: &[Vector3<T>], weights: &[T]) -> Vector3<T> {
    let mut sum = Vector3::zeros();
    let mut w_sum = T::lit(0.0);
    for (p, &w) in points.iter().zip(weights.iter()) {
        sum += p * w;
        w_sum += w;
    }
    if w_sum == T::lit(0.0) {
        return Vector3::zeros();
    }
    sum / w_sum
}

/// Weighted sum of squared norms `Σ w_i |p_i|²`.
pub fn weighted_sum_norm<T: Real>(points: &[Vector3<T>], weights: &[T]) -> T {
    let mut acc = T::lit(0.0);
    for (p, &w) in points.iter().zip(weights.iter()) {
        acc += w * p.norm_squared();
    }
    acc
}
