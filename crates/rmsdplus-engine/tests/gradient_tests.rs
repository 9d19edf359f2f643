mod common;

use rand::rngs::StdRng;
use rand::SeedableRng;

use rmsdplus_engine::{ContextState, ParticleSystem, Precision, RmsdPlusForce, WeightMode};

use common::*;

const FD_STEP: f64 = 1.0e-6;

fn assert_matches_finite_differences(
    force: &RmsdPlusForce,
    system: &ParticleSystem,
    ctx: &ContextState,
) {
    let mut kernel = kernel_for(force, system, Precision::Double, 4);
    let (energy, analytic) = evaluate(&mut kernel, ctx);
    assert!(energy > 1e-3, "configuration too close to reference: {energy}");
    let numeric = numeric_forces(&mut kernel, ctx, FD_STEP);
    let scale = max_abs(&analytic).max(1e-3);
    let err = max_abs_diff(&analytic, &numeric);
    assert!(
        err < 1e-5 * scale + 1e-8,
        "max error {err:.3e} against force scale {scale:.3e}"
    );
}

#[test]
fn identical_sets_match_finite_differences() {
    let mut rng = StdRng::seed_from_u64(10);
    let reference = random_cloud(&mut rng, 8, 2.0);
    let current = perturb(&mut rng, &reference, 0.6);
    let force = RmsdPlusForce::aligned(reference, (0..8).collect());
    assert_matches_finite_differences(
        &force,
        &ParticleSystem::with_unit_masses(8),
        &ContextState::new(current),
    );
}

#[test]
fn disjoint_sets_match_finite_differences() {
    let mut rng = StdRng::seed_from_u64(11);
    let reference = random_cloud(&mut rng, 5, 2.0);
    let current = perturb(&mut rng, &reference, 0.6);
    let force = RmsdPlusForce::new(reference, vec![0, 1, 2], vec![3, 4]);
    assert_matches_finite_differences(
        &force,
        &ParticleSystem::with_unit_masses(5),
        &ContextState::new(current),
    );
}

#[test]
fn overlapping_weighted_sets_match_finite_differences() {
    let mut rng = StdRng::seed_from_u64(12);
    let reference = random_cloud(&mut rng, 11, 2.5);
    let current = perturb(&mut rng, &reference, 0.7);
    let masses: Vec<f64> = (0..11).map(|i| 1.0 + 2.0 * (i % 3) as f64).collect();
    let force = RmsdPlusForce::new(
        reference,
        vec![0, 1, 2, 3, 4, 5, 6],
        vec![9, 4, 5, 6, 7, 10],
    )
    .with_weights(WeightMode::Mass);
    assert_matches_finite_differences(
        &force,
        &ParticleSystem::new(masses),
        &ContextState::new(current),
    );
}

#[test]
fn permuted_identical_membership_keeps_rotation_term() {
    let mut rng = StdRng::seed_from_u64(13);
    let reference = random_cloud(&mut rng, 6, 2.0);
    let current = perturb(&mut rng, &reference, 0.5);
    let force = RmsdPlusForce::new(reference, vec![0, 1, 2, 3, 4, 5], vec![5, 4, 3, 2, 1, 0]);
    assert_matches_finite_differences(
        &force,
        &ParticleSystem::with_unit_masses(6),
        &ContextState::new(current),
    );
}

#[test]
fn net_force_vanishes() {
    let mut rng = StdRng::seed_from_u64(14);
    let reference = random_cloud(&mut rng, 9, 2.0);
    let current = perturb(&mut rng, &reference, 0.5);
    let force = RmsdPlusForce::new(reference, vec![0, 1, 2, 3], vec![4, 5, 6, 7, 8])
        .with_weights(WeightMode::Explicit((0..9).map(|i| 1.0 + i as f64).collect()));
    let system = ParticleSystem::with_unit_masses(9);
    let mut kernel = kernel_for(&force, &system, Precision::Double, 2);
    let (_, forces) = evaluate(&mut kernel, &ContextState::new(current));
    let net = net_force(&forces);
    for v in net {
        assert!(v.abs() < 1e-10, "net force {net:?}");
    }
}

#[test]
fn alignment_particles_steer_rmsd_forces() {
    let reference = vec![
        [0.0, 0.0, 0.0],
        [1.5, 0.0, 0.0],
        [0.0, 1.5, 0.0],
        [2.0, 2.0, 1.0],
        [-1.0, 0.5, 2.0],
    ];
    let mut current = reference.clone();
    current[3] = [2.3, 1.8, 1.2];
    current[4] = [-0.8, 0.4, 2.4];
    let force = RmsdPlusForce::new(reference, vec![0, 1, 2], vec![3, 4]);
    let system = ParticleSystem::with_unit_masses(5);
    let mut kernel = kernel_for(&force, &system, Precision::Double, 64);

    let (_, before) = evaluate(&mut kernel, &ContextState::new(current.clone()));
    for idx in 0..3 {
        assert!(
            before[idx].iter().any(|v| v.abs() > 1e-6),
            "alignment particle {idx} got no force"
        );
    }

    current[1] = [1.5, 0.4, 0.1];
    let (_, after) = evaluate(&mut kernel, &ContextState::new(current));
    let shift: f64 = (3..5)
        .flat_map(|i| (0..3).map(move |d| (i, d)))
        .map(|(i, d)| (after[i][d] - before[i][d]).abs())
        .fold(0.0, f64::max);
    assert!(shift > 1e-4, "rmsd forces did not respond: {shift}");
}
