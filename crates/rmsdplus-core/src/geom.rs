use nalgebra::{Matrix3, Vector3, Vector4};

use crate::real::Real;

/// Rotation matrix of the quaternion `q = (w, x, y, z)`.
///
/// `q` is expected to be unit length; the result is then proper (det +1).
pub fn rotation_from_quaternion<T: Real>(q: &Vector4<T>) -> Matrix3<T> {
    let two = T::lit(2.0);
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    let ww = w * w;
    let xx = x * x;
    let yy = y * y;
    let zz = z * z;
    let xy = x * y;
    let xz = x * z;
    let yz = y * z;
    let wx = w * x;
    let wy = w * y;
    let wz = w * z;
    Matrix3::new(
        ww + xx - yy - zz,
        two * (xy - wz),
        two * (xz + wy),
        two * (xy + wz),
        ww - xx + yy - zz,
        two * (yz - wx),
        two * (xz - wy),
        two * (yz + wx),
        ww - xx - yy + zz,
    )
}

/// Partial derivatives `∂R/∂q_p` of [`rotation_from_quaternion`] for
/// `p = 0..4`.
pub fn rotation_quaternion_derivatives<T: Real>(q: &Vector4<T>) -> [Matrix3<T>; 4] {
    let two = T::lit(2.0);
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);
    [
        Matrix3::new(w, -z, y, z, w, -x, -y, x, w) * two,
        Matrix3::new(x, y, z, y, -x, -w, z, w, -x) * two,
        Matrix3::new(-y, x, w, x, y, z, -w, z, -y) * two,
        Matrix3::new(-z, -w, x, w, -z, y, x, y, z) * two,
    ]
}

/// Unit quaternion for a right-handed rotation of `angle` radians about `axis`.
pub fn quaternion_from_axis_angle<T: Real>(axis: &Vector3<T>, angle: T) -> Vector4<T> {
    let n = axis.norm();
    if n == T::lit(0.0) {
        return Vector4::new(T::lit(1.0), T::lit(0.0), T::lit(0.0), T::lit(0.0));
    }
    let half = angle * T::lit(0.5);
    let s = half.sin() / n;
    Vector4::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
}

pub fn rotation_about_axis<T: Real>(axis: &Vector3<T>, angle: T) -> Matrix3<T> {
    rotation_from_quaternion(&quaternion_from_axis_angle(axis, angle))
}

/// Flips `q` so that its first component with magnitude above `eps` is
/// positive. `q` and `-q` describe the same rotation.
pub fn canonical_quaternion<T: Real>(q: Vector4<T>, eps: f64) -> Vector4<T> {
    for k in 0..4 {
        let v = q[k].as_f64();
        if v.abs() > eps {
            return if v < 0.0 { -q } else { q };
        }
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_rotation_matches_closed_form() {
        let angle = 0.3f64;
        let r = rotation_about_axis(&Vector3::new(0.0, 0.0, 1.0), angle);
        assert!((r[(0, 0)] - angle.cos()).abs() < 1e-12);
        assert!((r[(0, 1)] + angle.sin()).abs() < 1e-12);
        assert!((r[(1, 0)] - angle.sin()).abs() < 1e-12);
        assert!((r[(2, 2)] - 1.0).abs() < 1e-12);
        assert!((r.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let q = Vector4::new(0.7f64, -0.2, 0.5, 0.46);
        let d = rotation_quaternion_derivatives(&q);
        let h = 1e-6;
        for p in 0..4 {
            let mut qp = q;
            let mut qm = q;
            qp[p] += h;
            qm[p] -= h;
            let fd = (rotation_from_quaternion(&qp) - rotation_from_quaternion(&qm)) / (2.0 * h);
            assert!((fd - d[p]).norm() < 1e-8, "component {p}");
        }
    }

    #[test]
    fn canonical_sign_is_stable() {
        let q = Vector4::new(0.0f64, -0.6, 0.8, 0.0);
        let c = canonical_quaternion(q, 1e-12);
        assert!(c[1] > 0.0);
        assert_eq!(canonical_quaternion(c, 1e-12), c);
    }
}
