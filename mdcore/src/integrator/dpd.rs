use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Extension;
use crate::error::{MdError, Result};
use crate::system::System;
use crate::verlet::VerletListId;

/// Dissipative particle dynamics thermostat over the pairs of a Verlet list.
///
/// `gamma` drives the standard (central) friction and noise, `tgamma` the
/// transverse one acting perpendicular to the pair axis. Both use the weight
/// `1 - r / rc` with `rc` the list cutoff, and both conserve momentum.
pub struct DpdThermostat {
    list: VerletListId,
    gamma: f64,
    tgamma: f64,
    temperature: f64,
    noise_scale: f64,
    rng: StdRng,
}

impl DpdThermostat {
    pub fn new(list: VerletListId, gamma: f64, tgamma: f64, temperature: f64, seed: u64) -> Result<Self> {
        if !(gamma >= 0.0) || !(tgamma >= 0.0) || !(temperature >= 0.0) {
            return Err(MdError::Configuration(format!(
                "dpd thermostat needs non-negative gamma={}, tgamma={}, T={}",
                gamma, tgamma, temperature
            )));
        }
        Ok(DpdThermostat {
            list,
            gamma,
            tgamma,
            temperature,
            noise_scale: 1.0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn tgamma(&self) -> f64 {
        self.tgamma
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>() - 0.5
    }

    /// Friction and noise along the pair axis.
    fn central(&mut self, r_hat: &Vector3<f64>, omega: f64, dv: &Vector3<f64>, noise: f64) -> Vector3<f64> {
        let friction = self.gamma * omega * omega * dv.dot(r_hat);
        let random = noise * omega * self.uniform();
        r_hat * (random - friction)
    }

    /// Friction and noise projected onto the plane normal to the pair axis.
    fn transverse(&mut self, r_hat: &Vector3<f64>, omega: f64, dv: &Vector3<f64>, noise: f64) -> Vector3<f64> {
        let projector = Matrix3::identity() - r_hat * r_hat.transpose();
        let damping = projector * dv * (self.tgamma * omega * omega);
        let xi = Vector3::new(self.uniform(), self.uniform(), self.uniform());
        projector * xi * (noise * omega) - damping
    }
}

impl Extension for DpdThermostat {
    fn name(&self) -> &str {
        "dpd thermostat"
    }

    fn heat_up(&mut self) {
        self.noise_scale = 3f64.sqrt();
    }

    fn cool_down(&mut self) {
        self.noise_scale = 1.0;
    }

    fn after_force(&mut self, system: &mut System, dt: f64) -> Result<()> {
        if self.gamma == 0.0 && self.tgamma == 0.0 {
            return Ok(());
        }
        let noise = self.noise_scale * (24.0 * self.temperature * self.gamma / dt).sqrt();
        let tnoise = self.noise_scale * (24.0 * self.temperature * self.tgamma / dt).sqrt();

        let (storage, lists, bc) = system.storage_and_lists();
        let sheared = bc.is_sheared();
        let list = lists.fresh(self.list, storage, bc)?;
        let rc = list.cutoff();
        let mut stress_xz = 0.0;
        // sequential over nodes so a seed reproduces the same trajectory
        for domain in storage.domains_mut() {
            for &(a, b) in list.pairs(domain.rank()) {
                let sa = domain.site(a);
                let sb = domain.site(b);
                let d = sa.position - sb.position;
                let dist2 = d.norm_squared();
                if dist2 >= rc * rc || dist2 == 0.0 {
                    continue;
                }
                let dist = dist2.sqrt();
                let r_hat = d / dist;
                let omega = 1.0 - dist / rc;
                let dv = sa.velocity - sb.velocity;

                let mut f = Vector3::zeros();
                if self.gamma > 0.0 {
                    f += self.central(&r_hat, omega, &dv, noise);
                }
                if self.tgamma > 0.0 {
                    f += self.transverse(&r_hat, omega, &dv, tnoise);
                }
                if sheared {
                    stress_xz += 0.5 * (d.x * f.z + d.z * f.x);
                }
                domain.add_force(a, f);
                domain.add_force(b, -f);
            }
        }
        if sheared {
            system.record_shear_stress(stress_xz);
        }
        Ok(())
    }
}
