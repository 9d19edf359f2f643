#![allow(dead_code)]

use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::Rng;

use rmsdplus_engine::{
    ContextState, ParticleSystem, Precision, RmsdPlusForce, RmsdPlusKernel,
};

pub fn random_cloud(rng: &mut StdRng, n: usize, spread: f64) -> Vec<[f64; 3]> {
    (0..n)
        .map(|_| {
            [
                rng.gen_range(-spread..spread),
                rng.gen_range(-spread..spread),
                rng.gen_range(-spread..spread),
            ]
        })
        .collect()
}

pub fn perturb(rng: &mut StdRng, points: &[[f64; 3]], amount: f64) -> Vec<[f64; 3]> {
    points
        .iter()
        .map(|p| {
            [
                p[0] + rng.gen_range(-amount..amount),
                p[1] + rng.gen_range(-amount..amount),
                p[2] + rng.gen_range(-amount..amount),
            ]
        })
        .collect()
}

pub fn rigid_transform(points: &[[f64; 3]], rot: &Matrix3<f64>, shift: [f64; 3]) -> Vec<[f64; 3]> {
    points
        .iter()
        .map(|p| {
            let v = rot * Vector3::new(p[0], p[1], p[2]);
            [v.x + shift[0], v.y + shift[1], v.z + shift[2]]
        })
        .collect()
}

pub fn kernel_for(
    force: &RmsdPlusForce,
    system: &ParticleSystem,
    precision: Precision,
    block_size: usize,
) -> RmsdPlusKernel {
    let mut kernel =
        RmsdPlusKernel::new(rmsdplus_engine::Device::Cpu, precision, block_size).unwrap();
    kernel.initialize(system, force).unwrap();
    kernel
}

/// Energy and fresh forces for one evaluation.
pub fn evaluate(kernel: &mut RmsdPlusKernel, ctx: &ContextState) -> (f64, Vec<[f64; 3]>) {
    let mut forces = vec![[0.0; 3]; ctx.positions.len()];
    let energy = kernel.execute(ctx, &mut forces, true, true).unwrap();
    (energy, forces)
}

pub fn energy_at(kernel: &mut RmsdPlusKernel, ctx: &ContextState) -> f64 {
    kernel.execute(ctx, &mut [], false, true).unwrap()
}

/// Central-difference forces `-dE/dx` for every particle.
pub fn numeric_forces(kernel: &mut RmsdPlusKernel, ctx: &ContextState, h: f64) -> Vec<[f64; 3]> {
    let mut probe = ctx.clone();
    let mut out = vec![[0.0; 3]; ctx.positions.len()];
    for i in 0..ctx.positions.len() {
        for d in 0..3 {
            let x0 = ctx.positions[i][d];
            probe.positions[i][d] = x0 + h;
            let ep = energy_at(kernel, &probe);
            probe.positions[i][d] = x0 - h;
            let em = energy_at(kernel, &probe);
            probe.positions[i][d] = x0;
            out[i][d] = -(ep - em) / (2.0 * h);
        }
    }
    out
}

pub fn max_abs_diff(a: &[[f64; 3]], b: &[[f64; 3]]) -> f64 {
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

pub fn max_abs(a: &[[f64; 3]]) -> f64 {
    a.iter().flatten().map(|v| v.abs()).fold(0.0, f64::max)
}

pub fn net_force(forces: &[[f64; 3]]) -> [f64; 3] {
    let mut sum = [0.0; 3];
    for f in forces {
        for d in 0..3 {
            sum[d] += f[d];
        }
    }
    sum
}

fn centroid(points: &[[f64; 3]], idx: &[usize], w: &[f64]) -> Vector3<f64> {
    let mut sum = Vector3::zeros();
    let mut total = 0.0;
    for (&i, &wi) in idx.iter().zip(w) {
        sum += Vector3::new(points[i][0], points[i][1], points[i][2]) * wi;
        total += wi;
    }
    sum / total
}

/// Weighted RMSD of `rmsd_idx` after a Kabsch (SVD) superposition of
/// `align_idx`, with both sets measured from the alignment centroids.
pub fn kabsch_rmsd(
    current: &[[f64; 3]],
    reference: &[[f64; 3]],
    align_idx: &[usize],
    rmsd_idx: &[usize],
    weights: &[f64],
) -> f64 {
    let wa: Vec<f64> = align_idx.iter().map(|&i| weights[i]).collect();
    let cx = centroid(current, align_idx, &wa);
    let cr = centroid(reference, align_idx, &wa);
    let v = |p: [f64; 3]| Vector3::new(p[0], p[1], p[2]);

    let mut m = Matrix3::zeros();
    for (&i, &w) in align_idx.iter().zip(&wa) {
        m += (v(current[i]) - cx) * (v(reference[i]) - cr).transpose() * w;
    }
    let svd = m.svd(true, true);
    let u = svd.u.unwrap();
    let vt = svd.v_t.unwrap();
    let mut d = Matrix3::identity();
    if (vt.transpose() * u.transpose()).determinant() < 0.0 {
        d[(2, 2)] = -1.0;
    }
    let rot = vt.transpose() * d * u.transpose();

    let mut dev = 0.0;
    let mut total = 0.0;
    for &j in rmsd_idx {
        let e = rot * (v(current[j]) - cx) - (v(reference[j]) - cr);
        dev += weights[j] * e.norm_squared();
        total += weights[j];
    }
    (dev / total).sqrt()
}
