use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Extension;
use crate::error::{MdError, Result};
use crate::system::System;

/// Langevin thermostat: friction `-gamma m v` plus uniform noise with the
/// matching variance on every local particle.
pub struct LangevinThermostat {
    gamma: f64,
    temperature: f64,
    noise_scale: f64,
    rng: StdRng,
}

impl LangevinThermostat {
    pub fn new(gamma: f64, temperature: f64, seed: u64) -> Result<Self> {
        if !(gamma >= 0.0) || !(temperature >= 0.0) {
            return Err(MdError::Configuration(format!(
                "langevin thermostat needs gamma >= 0 and T >= 0, got gamma={}, T={}",
                gamma, temperature
            )));
        }
        Ok(LangevinThermostat {
            gamma,
            temperature,
            noise_scale: 1.0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }
}

impl Extension for LangevinThermostat {
    fn name(&self) -> &str {
        "langevin thermostat"
    }

    fn heat_up(&mut self) {
        self.noise_scale = 3f64.sqrt();
    }

    fn cool_down(&mut self) {
        self.noise_scale = 1.0;
    }

    fn after_force(&mut self, system: &mut System, dt: f64) -> Result<()> {
        if self.gamma == 0.0 {
            return Ok(());
        }
        let friction = -self.gamma;
        // uniform variates on [-0.5, 0.5) have variance 1/12
        let noise = self.noise_scale * (24.0 * self.temperature * self.gamma / dt).sqrt();
        // sequential over nodes so a seed reproduces the same trajectory
        for domain in system.storage.domains_mut() {
            for p in domain.particles_mut() {
                let sqrt_m = p.mass.sqrt();
                for k in 0..3 {
                    let u: f64 = self.rng.gen::<f64>() - 0.5;
                    p.force[k] += friction * p.mass * p.velocity[k] + noise * sqrt_m * u;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::temperature;
    use crate::bc::OrthorhombicBC;
    use crate::integrator::VelocityVerlet;
    use crate::particle::ParticleProperties;
    use nalgebra::Vector3;

    fn gas(seed: u64) -> System {
        let bc = OrthorhombicBC::cubic(10.0).unwrap();
        let mut system = System::with_workers(bc.clone(), 2, 2.5, 0.3).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        for id in 0..200 {
            system
                .add_particle(id, bc.random_position(&mut rng), ParticleProperties::default())
                .unwrap();
        }
        system
    }

    #[test]
    fn test_ideal_gas_reaches_target_temperature() {
        let mut system = gas(1);
        let mut integrator = VelocityVerlet::new(0.005).unwrap();
        integrator.add_extension(LangevinThermostat::new(1.0, 1.5, 7).unwrap());
        integrator.run(&mut system, 2000).unwrap();

        let mut samples = Vec::new();
        for _ in 0..20 {
            integrator.run(&mut system, 50).unwrap();
            samples.push(temperature(&system.storage));
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((mean - 1.5).abs() < 0.15, "mean temperature {}", mean);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let run = || {
            let mut system = gas(3);
            let mut integrator = VelocityVerlet::new(0.005).unwrap();
            integrator.add_extension(LangevinThermostat::new(0.5, 1.0, 11).unwrap());
            integrator.run(&mut system, 50).unwrap();
            system.storage.particle(17).unwrap().velocity
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_friction_only_at_zero_temperature() {
        let bc = OrthorhombicBC::cubic(10.0).unwrap();
        let mut system = System::with_workers(bc, 1, 2.5, 0.3).unwrap();
        let v0 = Vector3::new(1.0, 0.0, 0.0);
        system
            .add_particle(0, Vector3::new(5.0, 5.0, 5.0), ParticleProperties::default().with_velocity(v0))
            .unwrap();
        let mut integrator = VelocityVerlet::new(0.01).unwrap();
        integrator.add_extension(LangevinThermostat::new(2.0, 0.0, 0).unwrap());
        integrator.run(&mut system, 10).unwrap();
        let v = system.storage.particle(0).unwrap().velocity.x;
        assert!(v < 1.0 && v > (-2.0f64 * 0.1).exp() - 0.01);
    }
}
