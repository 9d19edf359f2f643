use crate::error::{ForceError, ForceResult};

const REDUCED_FORM_SLACK: f64 = 1.0e-6;

/// Periodic cell in reduced triclinic form.
///
/// Rows are the box vectors `a = (ax, 0, 0)`, `b = (bx, by, 0)` and
/// `c = (cx, cy, cz)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodicBox {
    pub vectors: [[f64; 3]; 3],
    pub size: [f64; 3],
    pub inv_size: [f64; 3],
}

impl PeriodicBox {
    pub fn from_vectors(vectors: [[f64; 3]; 3]) -> ForceResult<Self> {
        let [a, b, c] = vectors;
        if vectors.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ForceError::PeriodicGeometry(
                "box vectors must be finite".into(),
            ));
        }
        if a[1] != 0.0 || a[2] != 0.0 || b[2] != 0.0 {
            return Err(ForceError::PeriodicGeometry(
                "box vectors must be lower triangular (a along x, b in the xy plane)".into(),
            ));
        }
        if a[0] <= 0.0 || b[1] <= 0.0 || c[2] <= 0.0 {
            return Err(ForceError::PeriodicGeometry(
                "box vector diagonal must be positive".into(),
            ));
        }
        let slack = 1.0 + REDUCED_FORM_SLACK;
        if b[0].abs() > 0.5 * a[0] * slack
            || c[0].abs() > 0.5 * a[0] * slack
            || c[1].abs() > 0.5 * b[1] * slack
        {
            return Err(ForceError::PeriodicGeometry(
                "box vectors are not in reduced form".into(),
            ));
        }
        let size = [a[0], b[1], c[2]];
        Ok(Self {
            vectors,
            size,
            inv_size: [1.0 / size[0], 1.0 / size[1], 1.0 / size[2]],
        })
    }

    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> ForceResult<Self> {
        Self::from_vectors([[lx, 0.0, 0.0], [0.0, ly, 0.0], [0.0, 0.0, lz]])
    }

    /// Maps a coordinate difference onto its minimum image.
    pub fn min_image(&self, d: [f64; 3]) -> [f64; 3] {
        let [a, b, c] = self.vectors;
        let mut d = d;
        let sz = (d[2] * self.inv_size[2]).round();
        d[0] -= c[0] * sz;
        d[1] -= c[1] * sz;
        d[2] -= c[2] * sz;
        let sy = (d[1] * self.inv_size[1]).round();
        d[0] -= b[0] * sy;
        d[1] -= b[1] * sy;
        let sx = (d[0] * self.inv_size[0]).round();
        d[0] -= a[0] * sx;
        d
    }

    pub fn delta(&self, p: [f64; 3], q: [f64; 3]) -> [f64; 3] {
        self.min_image([p[0] - q[0], p[1] - q[1], p[2] - q[2]])
    }

    /// Image of `point` closest to `anchor`.
    pub fn image_near(&self, point: [f64; 3], anchor: [f64; 3]) -> [f64; 3] {
        let d = self.delta(point, anchor);
        [anchor[0] + d[0], anchor[1] + d[1], anchor[2] + d[2]]
    }
}
