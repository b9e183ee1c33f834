//! Observables and snapshots handed to external writers.
//!
//! Units are reduced with `k_B = 1`.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::particle::Particle;
use crate::storage::DomainDecomposition;
use crate::system::System;

pub fn kinetic_energy(storage: &DomainDecomposition) -> f64 {
    storage.particles().map(Particle::kinetic_energy).sum()
}

/// Instantaneous temperature with `3N` degrees of freedom.
pub fn temperature(storage: &DomainDecomposition) -> f64 {
    let n = storage.n_particles();
    if n == 0 {
        return 0.0;
    }
    2.0 * kinetic_energy(storage) / (3.0 * n as f64)
}

/// Scalar pressure `(2 E_kin + W) / 3V` from the interaction virial.
pub fn pressure(system: &System) -> Result<f64> {
    let virial = system.compute_virial()?;
    Ok((2.0 * kinetic_energy(&system.storage) + virial) / (3.0 * system.bc.volume()))
}

/// `sum m v v^T` over all particles.
pub fn kinetic_tensor(storage: &DomainDecomposition) -> Matrix3<f64> {
    storage
        .particles()
        .map(|p| p.velocity * p.velocity.transpose() * p.mass)
        .sum()
}

/// Pressure tensor `(sum m v v^T + W) / V`. Its trace over three is the
/// scalar pressure.
pub fn pressure_tensor(system: &System) -> Result<Matrix3<f64>> {
    let virial = system.compute_virial_tensor()?;
    Ok((kinetic_tensor(&system.storage) + virial) / system.bc.volume())
}

/// Dissipative xz stress of pair thermostats, recorded once per force
/// evaluation while the box is sheared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ShearStress {
    /// Sum of `(x f_z + z f_x) / 2` over pairs and evaluations
    pub sum_xz: f64,
    pub samples: u64,
}

impl ShearStress {
    pub fn record(&mut self, xz: f64) {
        self.sum_xz += xz;
        self.samples += 1;
    }

    /// Average dissipative contribution to `P_xz`.
    pub fn mean_pxz(&self, volume: f64) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.sum_xz / (self.samples as f64 * volume)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyTerm {
    pub name: String,
    pub value: f64,
}

/// State of the system at one reporting point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub step: u64,
    pub time: f64,
    pub box_l: [f64; 3],
    pub shear_offset: f64,
    /// Sorted by id
    pub particles: Vec<Particle>,
    pub energies: Vec<EnergyTerm>,
    pub kinetic_energy: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub pressure_tensor: Matrix3<f64>,
    /// Mean dissipative `P_xz` since the stress record was last reset
    pub dissipative_pxz: f64,
}

impl Snapshot {
    pub fn capture(system: &System, step: u64, time: f64) -> Result<Self> {
        let mut particles: Vec<Particle> = system.storage.particles().cloned().collect();
        particles.sort_unstable_by_key(|p| p.id);
        let energies = system
            .interactions()
            .map(|(id, interaction)| {
                Ok(EnergyTerm {
                    name: interaction.name().to_string(),
                    value: system.interaction_energy(id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Snapshot {
            step,
            time,
            box_l: system.bc.box_l().into(),
            shear_offset: system.bc.shear_offset(),
            particles,
            energies,
            kinetic_energy: kinetic_energy(&system.storage),
            temperature: temperature(&system.storage),
            pressure: pressure(system)?,
            pressure_tensor: pressure_tensor(system)?,
            dissipative_pxz: system.shear_stress().mean_pxz(system.bc.volume()),
        })
    }

    pub fn potential_energy(&self) -> f64 {
        self.energies.iter().map(|e| e.value).sum()
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.potential_energy()
    }
}

/// Sink for snapshots; the on-disk format is up to the implementor.
pub trait SnapshotWriter {
    fn write(&mut self, snapshot: &Snapshot) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bc::OrthorhombicBC;
    use crate::interaction::VerletListInteraction;
    use crate::particle::ParticleProperties;
    use crate::potential::LennardJones;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    struct Collect(Vec<Snapshot>);

    impl SnapshotWriter for Collect {
        fn write(&mut self, snapshot: &Snapshot) -> Result<()> {
            self.0.push(snapshot.clone());
            Ok(())
        }
    }

    #[test]
    fn test_ideal_gas_observables() {
        let bc = OrthorhombicBC::cubic(10.0).unwrap();
        let mut system = System::with_workers(bc, 1, 2.5, 0.3).unwrap();
        let v = Vector3::new(1.0, -2.0, 0.5);
        for id in (0..4).rev() {
            let props = ParticleProperties::default().with_mass(2.0).with_velocity(v);
            system
                .add_particle(id, Vector3::new(1.0 + id as f64, 2.0, 3.0), props)
                .unwrap();
        }
        system.decompose().unwrap();

        let ek = 4.0 * 0.5 * 2.0 * v.norm_squared();
        assert_relative_eq!(kinetic_energy(&system.storage), ek, epsilon = 1e-12);
        assert_relative_eq!(temperature(&system.storage), 2.0 * ek / 12.0, epsilon = 1e-12);
        assert_relative_eq!(pressure(&system).unwrap(), 2.0 * ek / 3000.0, epsilon = 1e-12);

        let mut writer = Collect(Vec::new());
        writer
            .write(&Snapshot::capture(&system, 7, 0.35).unwrap())
            .unwrap();
        let snap = &writer.0[0];
        assert_eq!(snap.step, 7);
        let ids: Vec<_> = snap.particles.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(snap.potential_energy(), 0.0);
        assert_relative_eq!(snap.total_energy(), ek, epsilon = 1e-12);
        // uniform velocities: P = m v v^T N / V
        let expected = v * v.transpose() * (2.0 * 4.0 / 1000.0);
        assert_relative_eq!(snap.pressure_tensor, expected, epsilon = 1e-12);
        assert_eq!(snap.dissipative_pxz, 0.0);
    }

    #[test]
    fn test_pressure_tensor_trace_is_pressure() {
        let bc = OrthorhombicBC::cubic(8.0).unwrap();
        let mut system = System::with_workers(bc, 2, 2.5, 0.3).unwrap();
        let sites = [
            [1.0, 1.0, 1.0],
            [2.1, 1.3, 0.8],
            [1.5, 2.2, 1.9],
            [7.6, 1.2, 1.1],
            [4.0, 4.5, 5.0],
            [4.9, 5.2, 4.4],
        ];
        for (id, x) in sites.iter().enumerate() {
            let v = Vector3::new(0.1 * id as f64, -0.3, 0.2 * (id % 2) as f64);
            let props = ParticleProperties::default().with_velocity(v);
            system.add_particle(id, Vector3::from(*x), props).unwrap();
        }
        let list = system.add_verlet_list(2.5).unwrap();
        let mut lj = VerletListInteraction::new(list);
        lj.set_potential(0, 0, LennardJones::new(1.0, 1.0, 2.5).unwrap());
        system.add_interaction(lj);
        system.decompose().unwrap();

        let tensor = pressure_tensor(&system).unwrap();
        assert_relative_eq!(tensor.trace() / 3.0, pressure(&system).unwrap(), epsilon = 1e-12);
        assert_relative_eq!(tensor, tensor.transpose(), epsilon = 1e-12);
        assert!(tensor[(0, 1)].abs() > 0.0);
    }

    #[test]
    fn test_shear_stress_mean() {
        let mut stress = ShearStress::default();
        assert_eq!(stress.mean_pxz(10.0), 0.0);
        stress.record(3.0);
        stress.record(1.0);
        assert_eq!(stress.samples, 2);
        assert_relative_eq!(stress.mean_pxz(10.0), 0.2, epsilon = 1e-15);
    }
}
