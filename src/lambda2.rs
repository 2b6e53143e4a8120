//! λ2 vortex criterion. Negative λ2 marks points inside a vortex core.

use glam::{DMat3, DVec3};

use crate::field::{ScalarField3, VectorField3};
use crate::parallel_iter;

/// λ2 at every node, with unit grid spacing.
pub fn lambda2_field(velocity: &VectorField3) -> ScalarField3 {
    lambda2_field_with_spacing(velocity, [1.0, 1.0, 1.0])
}

pub fn lambda2_field_with_spacing(velocity: &VectorField3, spacing: [f64; 3]) -> ScalarField3 {
    let shape = velocity.shape();
    let [nx, ny, nz] = shape;
    let slabs = parallel_iter::map_range(0..nz, |k| {
        let mut out = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let grad = velocity_gradient(velocity, [i, j, k], spacing);
                out.push(lambda2(grad) as f32);
            }
        }
        out
    });
    ScalarField3::from_fn(shape, {
        let flat: Vec<f32> = slabs.into_iter().flatten().collect();
        move |i, j, k| flat[i + nx * (j + ny * k)]
    })
}

/// Velocity gradient `J[r][c] = d u_r / d x_c`: central differences inside,
/// one-sided at the boundary.
fn velocity_gradient(v: &VectorField3, at: [usize; 3], spacing: [f64; 3]) -> DMat3 {
    let shape = v.shape();
    let mut cols = [DVec3::ZERO; 3];
    for axis in 0..3 {
        let n = shape[axis];
        if n < 2 {
            continue;
        }
        let idx = at[axis];
        let (lo, hi) = if idx == 0 {
            (0, 1)
        } else if idx == n - 1 {
            (n - 2, n - 1)
        } else {
            (idx - 1, idx + 1)
        };
        let mut a = at;
        let mut b = at;
        a[axis] = lo;
        b[axis] = hi;
        let du = v.get(b[0], b[1], b[2]) - v.get(a[0], a[1], a[2]);
        cols[axis] = du / ((hi - lo) as f64 * spacing[axis]);
    }
    DMat3::from_cols(cols[0], cols[1], cols[2])
}

/// Middle eigenvalue of S² + Ω² for gradient `j`.
pub fn lambda2(j: DMat3) -> f64 {
    let jt = j.transpose();
    let s = (j + jt) * 0.5;
    let w = (j - jt) * 0.5;
    let m = s * s + w * w;
    symmetric_eigenvalues(m)[1]
}

/// Eigenvalues of a symmetric 3x3 matrix in ascending order.
pub fn symmetric_eigenvalues(m: DMat3) -> [f64; 3] {
    let a = m.to_cols_array_2d();
    let (a00, a11, a22) = (a[0][0], a[1][1], a[2][2]);
    let (a01, a02, a12) = (a[1][0], a[2][0], a[2][1]);

    let p1 = a01 * a01 + a02 * a02 + a12 * a12;
    if p1 == 0.0 {
        let mut d = [a00, a11, a22];
        d.sort_unstable_by(f64::total_cmp);
        return d;
    }

    let q = (a00 + a11 + a22) / 3.0;
    let p2 = (a00 - q).powi(2) + (a11 - q).powi(2) + (a22 - q).powi(2) + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();
    let b = (m - DMat3::from_diagonal(DVec3::splat(q))) * (1.0 / p);
    let r = (b.determinant() / 2.0).clamp(-1.0, 1.0);
    let phi = r.acos() / 3.0;

    let largest = q + 2.0 * p * phi.cos();
    let smallest = q + 2.0 * p * (phi + 2.0 * std::f64::consts::PI / 3.0).cos();
    let middle = 3.0 * q - largest - smallest;
    [smallest, middle, largest]
}
