//! Reciprocal-space part of the Ewald sum.
//!
//! The sum runs over integer lattice vectors `n` with `0 < |n| <= kmax`,
//! `k = 2 pi n / L`. Only one of `n` and `-n` is visited; the contribution of
//! the pair is twice the visited term. Structure factors are summed per node
//! and then reduced over all nodes before energies or forces are formed.

use std::any::Any;
use std::f64::consts::PI;

use itertools::iproduct;
use nalgebra::{Matrix3, Vector3};
use num_complex::Complex64;
use rayon::prelude::*;
use tracing::trace;

use super::Interaction;
use crate::bc::OrthorhombicBC;
use crate::error::{MdError, Result};
use crate::storage::DomainDecomposition;
use crate::verlet::VerletLists;

#[derive(Debug, Clone)]
struct KVector {
    n: [i32; 3],
    k: Vector3<f64>,
    /// `4 pi / k^2 exp(-k^2 / 4 alpha^2)`
    weight: f64,
}

/// `e^{i m k1 x}` for `m = 0..=kmax` in each dimension.
struct PhaseTable {
    tables: [Vec<Complex64>; 3],
}

impl PhaseTable {
    fn new(position: &Vector3<f64>, box_l: &Vector3<f64>, kmax: usize) -> Self {
        let tables = [0, 1, 2].map(|dim| {
            let base = Complex64::from_polar(1.0, 2.0 * PI * position[dim] / box_l[dim]);
            let mut table = Vec::with_capacity(kmax + 1);
            let mut current = Complex64::new(1.0, 0.0);
            for _ in 0..=kmax {
                table.push(current);
                current *= base;
            }
            table
        });
        PhaseTable { tables }
    }

    /// `e^{i k . r}` for lattice vector `n`.
    #[inline]
    fn phase(&self, n: &[i32; 3]) -> Complex64 {
        let mut e = Complex64::new(1.0, 0.0);
        for dim in 0..3 {
            let f = self.tables[dim][n[dim].unsigned_abs() as usize];
            e *= if n[dim] < 0 { f.conj() } else { f };
        }
        e
    }
}

/// Per-node partial sums needed by the reciprocal energy.
#[derive(Debug, Clone)]
struct ChargeSums {
    structure: Vec<Complex64>,
    q_sum: f64,
    q2_sum: f64,
}

impl ChargeSums {
    fn zero(n_k: usize) -> Self {
        ChargeSums {
            structure: vec![Complex64::new(0.0, 0.0); n_k],
            q_sum: 0.0,
            q2_sum: 0.0,
        }
    }

    fn merge(mut self, other: ChargeSums) -> Self {
        for (s, o) in self.structure.iter_mut().zip(other.structure) {
            *s += o;
        }
        self.q_sum += other.q_sum;
        self.q2_sum += other.q2_sum;
        self
    }
}

/// Ewald reciprocal sum over all charges, including the self-energy and the
/// neutralising background of a net charge.
#[derive(Debug, Clone)]
pub struct CellListCoulombKSpaceEwald {
    pub prefactor: f64,
    pub alpha: f64,
    kmax: u32,
}

impl CellListCoulombKSpaceEwald {
    pub fn new(prefactor: f64, alpha: f64, kmax: u32) -> Result<Self> {
        if !prefactor.is_finite() || !(alpha > 0.0) || kmax == 0 {
            return Err(MdError::Configuration(format!(
                "invalid k-space Ewald parameters prefactor={}, alpha={}, kmax={}",
                prefactor, alpha, kmax
            )));
        }
        Ok(CellListCoulombKSpaceEwald {
            prefactor,
            alpha,
            kmax,
        })
    }

    pub fn kmax(&self) -> u32 {
        self.kmax
    }

    pub fn set_kmax(&mut self, kmax: u32) {
        self.kmax = kmax.max(1);
    }

    fn kvectors(&self, box_l: &Vector3<f64>) -> Vec<KVector> {
        let kmax = self.kmax as i32;
        let kmax2 = kmax * kmax;
        let four_alpha2 = 4.0 * self.alpha * self.alpha;
        let mut kvecs = Vec::new();
        for (nx, ny, nz) in iproduct!(0..=kmax, -kmax..=kmax, -kmax..=kmax) {
            let n2 = nx * nx + ny * ny + nz * nz;
            if n2 == 0 || n2 > kmax2 {
                continue;
            }
            // keep one of n and -n
            if nx == 0 && (ny < 0 || (ny == 0 && nz < 0)) {
                continue;
            }
            let k = Vector3::new(
                2.0 * PI * nx as f64 / box_l.x,
                2.0 * PI * ny as f64 / box_l.y,
                2.0 * PI * nz as f64 / box_l.z,
            );
            let k2 = k.norm_squared();
            kvecs.push(KVector {
                n: [nx, ny, nz],
                k,
                weight: 4.0 * PI / k2 * (-k2 / four_alpha2).exp(),
            });
        }
        kvecs
    }

    fn check_box(&self, bc: &OrthorhombicBC) -> Result<()> {
        if bc.is_sheared() {
            return Err(MdError::Configuration(
                "k-space Ewald summation does not support a sheared box".into(),
            ));
        }
        Ok(())
    }

    /// Structure factors and charge sums reduced over all nodes.
    fn charge_sums(&self, storage: &DomainDecomposition, box_l: &Vector3<f64>, kvecs: &[KVector]) -> ChargeSums {
        let kmax = self.kmax as usize;
        storage
            .domains()
            .par_iter()
            .map(|domain| {
                let mut sums = ChargeSums::zero(kvecs.len());
                for p in domain.particles() {
                    if p.charge == 0.0 {
                        continue;
                    }
                    sums.q_sum += p.charge;
                    sums.q2_sum += p.charge * p.charge;
                    let phases = PhaseTable::new(&p.position, box_l, kmax);
                    for (s, kv) in sums.structure.iter_mut().zip(kvecs) {
                        *s += p.charge * phases.phase(&kv.n);
                    }
                }
                sums
            })
            .reduce(|| ChargeSums::zero(kvecs.len()), ChargeSums::merge)
    }

    /// Reciprocal-space energy terms: lattice sum, self energy and background.
    fn energy_terms(&self, sums: &ChargeSums, kvecs: &[KVector], volume: f64) -> (f64, f64, f64) {
        let lattice: f64 = kvecs
            .iter()
            .zip(&sums.structure)
            .map(|(kv, s)| kv.weight * s.norm_sqr())
            .sum::<f64>()
            * self.prefactor
            / volume;
        let self_energy = -self.prefactor * self.alpha / PI.sqrt() * sums.q2_sum;
        let background =
            -self.prefactor * PI * sums.q_sum * sums.q_sum / (2.0 * volume * self.alpha * self.alpha);
        (lattice, self_energy, background)
    }
}

impl Interaction for CellListCoulombKSpaceEwald {
    fn name(&self) -> &str {
        "k-space Ewald"
    }

    fn add_forces(
        &self,
        storage: &mut DomainDecomposition,
        _lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<()> {
        self.check_box(bc)?;
        let box_l = bc.box_l();
        let kvecs = self.kvectors(&box_l);
        let sums = self.charge_sums(storage, &box_l, &kvecs);
        let scale = 2.0 * self.prefactor / bc.volume();
        let kmax = self.kmax as usize;
        trace!(kvectors = kvecs.len(), "k-space forces");

        storage.domains_mut().par_iter_mut().for_each(|domain| {
            for p in domain.particles_mut() {
                if p.charge == 0.0 {
                    continue;
                }
                let phases = PhaseTable::new(&p.position, &box_l, kmax);
                let mut f = Vector3::zeros();
                for (kv, s) in kvecs.iter().zip(&sums.structure) {
                    let im = (s.conj() * phases.phase(&kv.n)).im;
                    f += kv.k * (kv.weight * im);
                }
                p.force += f * (scale * p.charge);
            }
        });
        Ok(())
    }

    fn compute_energy(
        &self,
        storage: &DomainDecomposition,
        _lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<f64> {
        self.check_box(bc)?;
        let box_l = bc.box_l();
        let kvecs = self.kvectors(&box_l);
        let sums = self.charge_sums(storage, &box_l, &kvecs);
        let (lattice, self_energy, background) = self.energy_terms(&sums, &kvecs, bc.volume());
        Ok(lattice + self_energy + background)
    }

    fn compute_virial_tensor(
        &self,
        storage: &DomainDecomposition,
        _lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<Matrix3<f64>> {
        self.check_box(bc)?;
        let box_l = bc.box_l();
        let kvecs = self.kvectors(&box_l);
        let sums = self.charge_sums(storage, &box_l, &kvecs);
        let inv_4alpha2 = 1.0 / (4.0 * self.alpha * self.alpha);
        let lattice: Matrix3<f64> = kvecs
            .iter()
            .zip(&sums.structure)
            .map(|(kv, s)| {
                let k2 = kv.k.norm_squared();
                let kk = kv.k * kv.k.transpose() * (2.0 * (1.0 / k2 + inv_4alpha2));
                (Matrix3::identity() - kk) * (kv.weight * s.norm_sqr())
            })
            .sum::<Matrix3<f64>>()
            * (self.prefactor / bc.volume());
        let (_, _, background) = self.energy_terms(&sums, &kvecs, bc.volume());
        Ok(lattice + Matrix3::identity() * background)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ParticleProperties;
    use approx::assert_relative_eq;

    fn two_charges(separation: f64) -> (OrthorhombicBC, DomainDecomposition) {
        let bc = OrthorhombicBC::cubic(10.0).unwrap();
        let mut dd = DomainDecomposition::new(&bc, [1, 1, 1], [3, 3, 3]).unwrap();
        let props = ParticleProperties::default();
        dd.add_particle(&bc, 0, Vector3::new(4.0, 5.0, 5.0), props.clone().with_charge(1.0))
            .unwrap();
        dd.add_particle(
            &bc,
            1,
            Vector3::new(4.0 + separation, 5.3, 4.9),
            props.with_charge(-1.0),
        )
        .unwrap();
        dd.decompose(&bc).unwrap();
        (bc, dd)
    }

    #[test]
    fn test_half_space_lattice() {
        let ewald = CellListCoulombKSpaceEwald::new(1.0, 0.5, 2).unwrap();
        let kvecs = ewald.kvectors(&Vector3::new(10.0, 10.0, 10.0));
        // lattice points with 0 < |n|^2 <= 4: 6 + 12 + 8 + 6 = 32, half of them
        assert_eq!(kvecs.len(), 16);
        for kv in &kvecs {
            let neg = [-kv.n[0], -kv.n[1], -kv.n[2]];
            assert!(!kvecs.iter().any(|other| other.n == neg));
        }
    }

    #[test]
    fn test_forces_match_energy_gradient() {
        let ewald = CellListCoulombKSpaceEwald::new(1.0, 0.6, 4).unwrap();
        let lists = VerletLists::default();
        let (bc, mut dd) = two_charges(1.5);
        ewald.add_forces(&mut dd, &lists, &bc).unwrap();
        let force = dd.particle(0).unwrap().force;
        let other = dd.particle(1).unwrap().force;
        assert_relative_eq!(force, -other, epsilon = 1e-10);

        let h = 1e-5;
        for k in 0..3 {
            let energy = |delta: f64| {
                let mut moved = dd.clone();
                moved.particle_mut(0).unwrap().position[k] += delta;
                ewald.compute_energy(&moved, &lists, &bc).unwrap()
            };
            let numeric = -(energy(h) - energy(-h)) / (2.0 * h);
            assert_relative_eq!(force[k], numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rejects_sheared_box() {
        let ewald = CellListCoulombKSpaceEwald::new(1.0, 0.6, 4).unwrap();
        let (mut bc, dd) = two_charges(1.5);
        bc.set_shear_rate(0.1);
        let result = ewald.compute_energy(&dd, &VerletLists::default(), &bc);
        assert!(matches!(result, Err(MdError::Configuration(_))));
    }

    #[test]
    fn test_virial_matches_volume_derivative() {
        // W = -3 V dE/dV under uniform scaling of box and positions
        let ewald = CellListCoulombKSpaceEwald::new(1.0, 0.7, 5).unwrap();
        let lists = VerletLists::default();
        let energy_at = |scale: f64| {
            let bc = OrthorhombicBC::cubic(10.0 * scale).unwrap();
            let mut dd = DomainDecomposition::new(&bc, [1, 1, 1], [3, 3, 3]).unwrap();
            let props = ParticleProperties::default();
            let charges = [(1.0, [1.0, 2.0, 3.0]), (-1.0, [2.5, 2.0, 3.5]), (1.0, [7.0, 6.0, 1.0])];
            for (id, (q, p)) in charges.iter().enumerate() {
                let pos = Vector3::from(*p) * scale;
                dd.add_particle(&bc, id, pos, props.clone().with_charge(*q)).unwrap();
            }
            dd.decompose(&bc).unwrap();
            (
                ewald.compute_energy(&dd, &lists, &bc).unwrap(),
                ewald.compute_virial(&dd, &lists, &bc).unwrap(),
            )
        };
        let h = 1e-5;
        let (_, virial) = energy_at(1.0);
        // V = L^3 s^3, so V dE/dV = (s/3) dE/ds
        let de_ds = (energy_at(1.0 + h).0 - energy_at(1.0 - h).0) / (2.0 * h);
        assert_relative_eq!(virial, -de_ds, epsilon = 1e-6);
    }

    #[test]
    fn test_virial_tensor_matches_axial_strain() {
        // W_xx = -L_x dE/dL_x when only x is stretched
        let ewald = CellListCoulombKSpaceEwald::new(1.0, 0.6, 6).unwrap();
        let lists = VerletLists::default();
        let at_strain = |sx: f64| {
            let bc = OrthorhombicBC::new(Vector3::new(10.0 * sx, 9.0, 11.0)).unwrap();
            let mut dd = DomainDecomposition::new(&bc, [1, 1, 1], [3, 3, 3]).unwrap();
            let props = ParticleProperties::default();
            let charges = [(1.0, [1.0, 2.0, 3.0]), (-1.0, [2.5, 2.0, 3.5]), (0.5, [7.0, 6.0, 1.0])];
            for (id, (q, p)) in charges.iter().enumerate() {
                let pos = Vector3::new(p[0] * sx, p[1], p[2]);
                dd.add_particle(&bc, id, pos, props.clone().with_charge(*q)).unwrap();
            }
            dd.decompose(&bc).unwrap();
            (
                ewald.compute_energy(&dd, &lists, &bc).unwrap(),
                ewald.compute_virial_tensor(&dd, &lists, &bc).unwrap(),
                ewald.compute_virial(&dd, &lists, &bc).unwrap(),
            )
        };
        let h = 1e-5;
        let (_, tensor, scalar) = at_strain(1.0);
        let de_ds = (at_strain(1.0 + h).0 - at_strain(1.0 - h).0) / (2.0 * h);
        assert_relative_eq!(tensor[(0, 0)], -de_ds, epsilon = 1e-6);
        assert_relative_eq!(tensor, tensor.transpose(), epsilon = 1e-12);
        assert_relative_eq!(tensor.trace(), scalar, epsilon = 1e-12);
    }
}
