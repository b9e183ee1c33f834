//! End-to-end checks of decomposition, neighbor lists, forces and Ewald sums
//!
//! Every test drives the public `System` API the way a simulation script would.

use approx::assert_relative_eq;
use mdcore::interaction::{
    CellListCoulombKSpaceEwald, FixedPairList, FixedPairListInteraction, VerletListInteraction,
};
use mdcore::potential::{CoulombMultiSiteCorrectionEwald, CoulombRSpace, LennardJones};
use mdcore::{
    InteractionId, OrthorhombicBC, ParticleProperties, System, VelocityVerlet, VerletListId,
};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Jittered simple cubic lattice with `n` sites per edge and spacing `a`.
fn lattice_positions(n: usize, a: f64, jitter: f64, seed: u64) -> Vec<Vector3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                let site = Vector3::new(i as f64, j as f64, k as f64) * a;
                let d = Vector3::from_fn(|_, _| rng.gen_range(-jitter..jitter));
                positions.push(site + d);
            }
        }
    }
    positions
}

fn lj_system(workers: usize, seed: u64) -> (System, VerletListId) {
    let bc = OrthorhombicBC::cubic(12.0).unwrap();
    let mut system = System::with_workers(bc, workers, 2.5, 0.3).unwrap();
    let mut rng = StdRng::seed_from_u64(seed + 1);
    for (id, x) in lattice_positions(6, 2.0, 0.4, seed).into_iter().enumerate() {
        let v = Vector3::from_fn(|_, _| rng.gen_range(-0.5..0.5));
        system
            .add_particle(id, x, ParticleProperties::default().with_velocity(v))
            .unwrap();
    }
    let list = system.add_verlet_list(2.5).unwrap();
    let mut lj = VerletListInteraction::new(list);
    lj.set_potential(0, 0, LennardJones::new(1.0, 1.0, 2.5).unwrap().with_auto_shift());
    system.add_interaction(lj);
    system.decompose().unwrap();
    (system, list)
}

fn forces(system: &System) -> Vec<Vector3<f64>> {
    let mut f: Vec<(usize, Vector3<f64>)> = system
        .storage
        .particles()
        .map(|p| (p.id, p.force))
        .collect();
    f.sort_by_key(|(id, _)| *id);
    f.into_iter().map(|(_, f)| f).collect()
}

#[test]
fn test_every_particle_owned_exactly_once() {
    let (system, _) = lj_system(8, 3);
    assert_eq!(system.storage.n_nodes(), 8);
    let mut ids: Vec<usize> = system.storage.particles().map(|p| p.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..216).collect::<Vec<_>>());

    // each particle sits inside the region of its owner
    let grid = system.storage.grid();
    for domain in system.storage.domains() {
        for p in domain.particles() {
            let (rank, _) = grid.locate(&p.position);
            assert_eq!(rank, domain.rank());
        }
    }
}

#[test]
fn test_verlet_list_matches_brute_force() {
    let (system, list) = lj_system(8, 5);
    let particles: Vec<_> = system.storage.particles().cloned().collect();
    let range = 2.5 + system.skin();
    let mut expected = 0;
    for (i, a) in particles.iter().enumerate() {
        for b in &particles[i + 1..] {
            let d = system.bc.minimum_image(a.position - b.position);
            if d.norm() <= range {
                expected += 1;
            }
        }
    }
    let list = system.verlet_list(list).unwrap();
    assert!(expected > 0);
    assert_eq!(list.total_size(), expected);
}

#[test]
fn test_forces_sum_to_zero() {
    let (mut system, _) = lj_system(8, 7);
    system.compute_forces().unwrap();
    let total: Vector3<f64> = system.storage.particles().map(|p| p.force).sum();
    let largest = forces(&system)
        .iter()
        .map(|f| f.norm())
        .fold(0.0, f64::max);
    assert!(largest > 0.0);
    assert!(total.norm() < 1e-10 * largest.max(1.0));
}

#[test]
fn test_node_count_does_not_change_forces() {
    let (mut single, _) = lj_system(1, 11);
    let (mut split, _) = lj_system(8, 11);
    single.compute_forces().unwrap();
    split.compute_forces().unwrap();
    for (a, b) in forces(&single).iter().zip(forces(&split).iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-10, max_relative = 1e-10);
    }
    assert_relative_eq!(
        single.compute_energy().unwrap(),
        split.compute_energy().unwrap(),
        epsilon = 1e-10,
        max_relative = 1e-12
    );
}

#[test]
fn test_nve_energy_drift_is_small() {
    let (mut system, _) = lj_system(8, 13);
    let mut integrator = VelocityVerlet::new(0.002).unwrap();
    integrator.run(&mut system, 0).unwrap();
    let e0 = system.snapshot(0, 0.0).unwrap().total_energy();
    integrator.run(&mut system, 500).unwrap();
    let e1 = system.snapshot(integrator.step(), 1.0).unwrap().total_energy();
    assert!(integrator.rebuilds() > 0);
    assert!(
        (e1 - e0).abs() < 1e-3 * 216.0,
        "energy drifted from {} to {}",
        e0,
        e1
    );
}

#[test]
fn test_lj_dimer_at_minimum() {
    let bc = OrthorhombicBC::cubic(10.0).unwrap();
    let mut system = System::with_workers(bc, 1, 2.5, 0.3).unwrap();
    let rmin = 2f64.powf(1.0 / 6.0);
    system
        .add_particle(0, Vector3::new(4.0, 5.0, 5.0), ParticleProperties::default())
        .unwrap();
    system
        .add_particle(1, Vector3::new(4.0 + rmin, 5.0, 5.0), ParticleProperties::default())
        .unwrap();
    let list = system.add_verlet_list(2.5).unwrap();
    let mut lj = VerletListInteraction::new(list);
    lj.set_potential(0, 0, LennardJones::new(1.0, 1.0, 2.5).unwrap());
    system.add_interaction(lj);
    system.decompose().unwrap();
    system.compute_forces().unwrap();

    for f in forces(&system) {
        assert!(f.norm() < 1e-10);
    }
    assert_relative_eq!(system.compute_energy().unwrap(), -1.0, epsilon = 1e-12);
}

/// Four charges, neutral overall, in a cubic box of edge 10.
fn charged_system() -> System {
    let bc = OrthorhombicBC::cubic(10.0).unwrap();
    let mut system = System::with_workers(bc, 1, 4.5, 0.3).unwrap();
    let sites = [
        (Vector3::new(2.0, 2.5, 3.0), 1.0),
        (Vector3::new(3.1, 2.7, 3.2), -1.0),
        (Vector3::new(6.5, 7.0, 1.5), 0.5),
        (Vector3::new(8.0, 6.1, 8.9), -0.5),
    ];
    for (id, (x, q)) in sites.into_iter().enumerate() {
        system
            .add_particle(id, x, ParticleProperties::default().with_charge(q))
            .unwrap();
    }
    system
}

fn ewald_energy(alpha: f64, kmax: u32) -> f64 {
    let mut system = charged_system();
    let list = system.add_verlet_list(4.5).unwrap();
    let mut real = VerletListInteraction::new(list);
    real.potentials_mut()
        .set_all(CoulombRSpace::new(1.0, alpha, 4.5).unwrap());
    system.add_interaction(real);
    system.add_interaction(CellListCoulombKSpaceEwald::new(1.0, alpha, kmax).unwrap());
    system.decompose().unwrap();
    system.compute_energy().unwrap()
}

#[test]
fn test_ewald_total_independent_of_alpha() {
    let e1 = ewald_energy(0.75, 12);
    let e2 = ewald_energy(0.9, 12);
    assert_relative_eq!(e1, e2, max_relative = 1e-4);
}

#[test]
fn test_kspace_converges_with_kmax() {
    let mut system = charged_system();
    system.decompose().unwrap();
    let energy = |system: &mut System, kmax: u32| {
        let id = system.add_interaction(CellListCoulombKSpaceEwald::new(1.0, 0.5, kmax).unwrap());
        let e = system.compute_energy().unwrap();
        system.remove_interaction(id).unwrap();
        e
    };
    let reference = energy(&mut system, 20);
    let errors: Vec<f64> = [2, 4, 8]
        .into_iter()
        .map(|kmax| (energy(&mut system, kmax) - reference).abs())
        .collect();
    assert!(errors[0] > errors[1]);
    assert!(errors[1] > errors[2]);
    assert!(errors[2] < 1e-6);
}

/// Real space over `list` plus k-space, optionally excluding the first
/// pair and restoring it with the multi-site correction.
fn excluded_ewald(alpha: f64, kmax: u32, exclude: bool) -> (System, InteractionId, f64) {
    let mut system = charged_system();
    let list = system.add_verlet_list(4.5).unwrap();
    if exclude {
        system.verlet_list_mut(list).unwrap().exclude([(0, 1)]);
    }
    let mut real = VerletListInteraction::new(list);
    real.potentials_mut()
        .set_all(CoulombRSpace::new(1.0, alpha, 4.5).unwrap());
    let real = system.add_interaction(real);
    let kspace = system.add_interaction(CellListCoulombKSpaceEwald::new(1.0, alpha, kmax).unwrap());
    system.decompose().unwrap();
    let base = system.interaction_energy(real).unwrap() + system.interaction_energy(kspace).unwrap();
    if exclude {
        let bonds: FixedPairList = [(0, 1)].into_iter().collect();
        system.add_interaction(FixedPairListInteraction::with_potential(
            bonds,
            CoulombMultiSiteCorrectionEwald::new(1.0, alpha, 4.5).unwrap(),
        ));
    }
    (system, real, base)
}

#[test]
fn test_excluded_pair_correction() {
    let alpha = 0.8;
    let r = (Vector3::new(2.0, 2.5, 3.0) - Vector3::new(3.1, 2.7, 3.2)).norm();

    let (excluded, real, base) = excluded_ewald(alpha, 10, true);
    let total = excluded.compute_energy().unwrap();
    // q0 q1 = -1
    assert_relative_eq!(total - base, libm::erf(alpha * r) / r, epsilon = 1e-12);

    // removing the pair from the full sum leaves exactly E_full - q0 q1 / r
    let (full, _, _) = excluded_ewald(alpha, 10, false);
    let e_full = full.compute_energy().unwrap();
    assert_relative_eq!(total, e_full + 1.0 / r, epsilon = 1e-10);

    // the excluded pair is absent from the real-space sum, the others are not
    let d = excluded
        .bc
        .minimum_image(Vector3::new(6.5, 7.0, 1.5) - Vector3::new(8.0, 6.1, 8.9));
    let others = -0.25 * libm::erfc(alpha * d.norm()) / d.norm();
    let real = excluded.interaction_energy(real).unwrap();
    assert_relative_eq!(real, others, epsilon = 1e-12);
}

/// Opposite unit charges 2 apart in a box of edge 10.
fn charge_pair() -> System {
    let bc = OrthorhombicBC::cubic(10.0).unwrap();
    let mut system = System::with_workers(bc, 1, 2.5, 0.3).unwrap();
    system
        .add_particle(0, Vector3::new(4.0, 5.0, 5.0), ParticleProperties::default().with_charge(1.0))
        .unwrap();
    system
        .add_particle(1, Vector3::new(6.0, 5.0, 5.0), ParticleProperties::default().with_charge(-1.0))
        .unwrap();
    system.decompose().unwrap();
    system
}

#[test]
fn test_charge_pair_kspace_rises_to_limit() {
    let mut system = charge_pair();
    let mut energy = |kmax: u32| {
        let id = system.add_interaction(CellListCoulombKSpaceEwald::new(1.0, 0.5, kmax).unwrap());
        let e = system.compute_energy().unwrap();
        system.remove_interaction(id).unwrap();
        e
    };
    let reference = energy(20);
    let sequence: Vec<f64> = (1..=4).map(&mut energy).collect();
    for pair in sequence.windows(2) {
        assert!(pair[0] < pair[1], "k-space energy fell: {:?}", sequence);
    }
    for e in &sequence {
        assert!(*e <= reference + 1e-12);
    }
    assert_relative_eq!(sequence[3], -0.43048, epsilon = 1e-4);
    assert!((energy(8) - reference).abs() < 1e-8);
}

#[test]
fn test_list_free_run_keeps_ownership() {
    let bc = OrthorhombicBC::cubic(10.0).unwrap();
    let mut system = System::with_workers(bc, 2, 2.0, 0.3).unwrap();
    let v = Vector3::new(1.0, 1.0, 1.0);
    // half a box apart along z, so the k-space forces cancel
    for (id, (z, q)) in [(2.0, 1.0), (7.0, -1.0)].into_iter().enumerate() {
        let props = ParticleProperties::default().with_charge(q).with_velocity(v);
        system.add_particle(id, Vector3::new(2.0, 3.0, z), props).unwrap();
    }
    system.add_interaction(CellListCoulombKSpaceEwald::new(1.0, 0.5, 4).unwrap());
    assert_eq!(system.storage.n_nodes(), 2);

    let mut integrator = VelocityVerlet::new(0.01).unwrap();
    integrator.run(&mut system, 700).unwrap();
    assert!(integrator.rebuilds() > 0);

    let grid = system.storage.grid();
    for domain in system.storage.domains() {
        for p in domain.particles() {
            let (rank, _) = grid.locate(&system.bc.folded_position(&p.position));
            assert_eq!(rank, domain.rank(), "particle {} held by the wrong node", p.id);
            assert_relative_eq!(p.velocity, v, epsilon = 1e-9);
        }
    }
    assert!(system.storage.max_displacement() <= 0.5 * grid.min_cell_size());
}
