mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rmsdplus_engine::{ContextState, ForceError, ParticleSystem, Precision, RmsdPlusForce};

use common::*;

const TRICLINIC: [[f64; 3]; 3] = [[8.0, 0.0, 0.0], [2.0, 7.0, 0.0], [-1.5, 3.0, 9.0]];
const CUBIC: [[f64; 3]; 3] = [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]];

fn lattice_shift(rng: &mut StdRng, p: [f64; 3], cell: &[[f64; 3]; 3]) -> [f64; 3] {
    let mut out = p;
    for v in cell {
        let n = rng.gen_range(-2i32..=2) as f64;
        for d in 0..3 {
            out[d] += n * v[d];
        }
    }
    out
}

fn periodic_case(seed: u64) -> (RmsdPlusForce, Vec<[f64; 3]>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let reference = random_cloud(&mut rng, 9, 1.0);
    let current = perturb(&mut rng, &reference, 0.4);
    let force = RmsdPlusForce::new(reference, vec![0, 1, 2, 3, 4], vec![4, 5, 6, 7, 8])
        .with_periodic(true);
    (force, current)
}

#[test]
fn lattice_translations_do_not_change_energy_or_forces() {
    for cell in [CUBIC, TRICLINIC] {
        let (force, current) = periodic_case(30);
        let system = ParticleSystem::with_unit_masses(9);
        let mut kernel = kernel_for(&force, &system, Precision::Double, 4);
        let (e0, f0) = evaluate(&mut kernel, &ContextState::new(current.clone()).with_box(cell));

        let mut rng = StdRng::seed_from_u64(31);
        let scattered: Vec<[f64; 3]> = current
            .iter()
            .map(|&p| lattice_shift(&mut rng, p, &cell))
            .collect();
        let (e1, f1) = evaluate(&mut kernel, &ContextState::new(scattered).with_box(cell));
        assert!((e0 - e1).abs() < 1e-9, "e0={e0} e1={e1}");
        assert!(max_abs_diff(&f0, &f1) < 1e-8);
    }
}

#[test]
fn molecule_split_across_boundary_matches_unwrapped() {
    let (force, current) = periodic_case(32);
    let system = ParticleSystem::with_unit_masses(9);
    let mut kernel = kernel_for(&force, &system, Precision::Double, 64);

    let near_edge: Vec<[f64; 3]> = current.iter().map(|p| [p[0] + 9.5, p[1], p[2]]).collect();
    let wrapped: Vec<[f64; 3]> = near_edge
        .iter()
        .map(|p| [p[0].rem_euclid(10.0), p[1], p[2]])
        .collect();
    let (e_unwrapped, f_unwrapped) =
        evaluate(&mut kernel, &ContextState::new(near_edge).with_box(CUBIC));
    let (e_wrapped, f_wrapped) = evaluate(&mut kernel, &ContextState::new(wrapped).with_box(CUBIC));
    assert!((e_unwrapped - e_wrapped).abs() < 1e-9);
    assert!(max_abs_diff(&f_unwrapped, &f_wrapped) < 1e-8);
}

#[test]
fn without_periodicity_wrapping_is_visible() {
    let (force, current) = periodic_case(33);
    let force = force.with_periodic(false);
    let system = ParticleSystem::with_unit_masses(9);
    let mut kernel = kernel_for(&force, &system, Precision::Double, 64);
    let mut shifted = current.clone();
    shifted[6][1] += 10.0;
    let e0 = energy_at(&mut kernel, &ContextState::new(current).with_box(CUBIC));
    let e1 = energy_at(&mut kernel, &ContextState::new(shifted).with_box(CUBIC));
    assert!(e1 > e0 + 1.0);
}

#[test]
fn periodic_forces_match_finite_differences() {
    let (force, current) = periodic_case(34);
    let system = ParticleSystem::with_unit_masses(9);
    let mut kernel = kernel_for(&force, &system, Precision::Double, 2);
    let mut rng = StdRng::seed_from_u64(35);
    let scattered: Vec<[f64; 3]> = current
        .iter()
        .map(|&p| lattice_shift(&mut rng, p, &TRICLINIC))
        .collect();
    let ctx = ContextState::new(scattered).with_box(TRICLINIC);
    let (_, analytic) = evaluate(&mut kernel, &ctx);
    let numeric = numeric_forces(&mut kernel, &ctx, 1.0e-6);
    let scale = max_abs(&analytic);
    assert!(max_abs_diff(&analytic, &numeric) < 1e-5 * scale + 1e-8);
}

#[test]
fn missing_or_malformed_box_is_rejected() {
    let (force, current) = periodic_case(36);
    let system = ParticleSystem::with_unit_masses(9);
    let mut kernel = kernel_for(&force, &system, Precision::Double, 64);
    let mut forces = vec![[0.0; 3]; 9];

    let no_box = ContextState::new(current.clone());
    assert!(matches!(
        kernel.execute(&no_box, &mut forces, true, true),
        Err(ForceError::PeriodicGeometry(_))
    ));

    let bad_boxes = [
        [[8.0, 0.0, 0.0], [5.0, 7.0, 0.0], [0.0, 0.0, 9.0]],
        [[8.0, 1.0, 0.0], [0.0, 7.0, 0.0], [0.0, 0.0, 9.0]],
        [[8.0, 0.0, 0.0], [0.0, 7.0, 0.0], [0.0, 0.0, -9.0]],
        [[8.0, 0.0, 0.0], [0.0, f64::NAN, 0.0], [0.0, 0.0, 9.0]],
    ];
    for cell in bad_boxes {
        let ctx = ContextState::new(current.clone()).with_box(cell);
        assert!(matches!(
            kernel.execute(&ctx, &mut forces, true, true),
            Err(ForceError::PeriodicGeometry(_))
        ));
    }
    assert!(forces.iter().flatten().all(|&v| v == 0.0));
}
