//! Real-space parts of Ewald electrostatics.
//!
//! Both potentials are written for unit charges; the pair scale multiplies in
//! `prefactor * q1 * q2`.

use std::f64::consts::PI;

use super::Potential;
use crate::error::{MdError, Result};
use crate::particle::Site;

const MIN_R: f64 = 1e-6;
const CORRECTION_MIN_R: f64 = 1e-8;

fn check(prefactor: f64, alpha: f64, cutoff: f64) -> Result<()> {
    if !prefactor.is_finite() || !(alpha > 0.0) || !(cutoff > 0.0) {
        return Err(MdError::Configuration(format!(
            "invalid Ewald parameters prefactor={}, alpha={}, cutoff={}",
            prefactor, alpha, cutoff
        )));
    }
    Ok(())
}

/// Screened Coulomb term `erfc(alpha r) / r`.
#[derive(Debug, Clone)]
pub struct CoulombRSpace {
    pub prefactor: f64,
    pub alpha: f64,
    cutoff: f64,
}

impl CoulombRSpace {
    pub fn new(prefactor: f64, alpha: f64, cutoff: f64) -> Result<Self> {
        check(prefactor, alpha, cutoff)?;
        Ok(CoulombRSpace {
            prefactor,
            alpha,
            cutoff,
        })
    }
}

impl Potential for CoulombRSpace {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn energy(&self, r: f64) -> f64 {
        let r = r.max(MIN_R);
        libm::erfc(self.alpha * r) / r
    }

    fn force(&self, r: f64) -> f64 {
        let r = r.max(MIN_R);
        let ar = self.alpha * r;
        libm::erfc(ar) / (r * r) + 2.0 * self.alpha / PI.sqrt() * (-ar * ar).exp() / r
    }

    #[inline]
    fn pair_scale(&self, a: &Site, b: &Site) -> f64 {
        self.prefactor * a.charge * b.charge
    }
}

/// Removes the smooth `erf(alpha r) / r` interaction that the reciprocal sum
/// includes for excluded pairs.
#[derive(Debug, Clone)]
pub struct CoulombMultiSiteCorrectionEwald {
    pub prefactor: f64,
    pub alpha: f64,
    cutoff: f64,
}

impl CoulombMultiSiteCorrectionEwald {
    pub fn new(prefactor: f64, alpha: f64, cutoff: f64) -> Result<Self> {
        check(prefactor, alpha, cutoff)?;
        Ok(CoulombMultiSiteCorrectionEwald {
            prefactor,
            alpha,
            cutoff,
        })
    }
}

impl Potential for CoulombMultiSiteCorrectionEwald {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn energy(&self, r: f64) -> f64 {
        if r < CORRECTION_MIN_R {
            return -2.0 * self.alpha / PI.sqrt();
        }
        -libm::erf(self.alpha * r) / r
    }

    fn force(&self, r: f64) -> f64 {
        if r < CORRECTION_MIN_R {
            return 0.0;
        }
        let ar = self.alpha * r;
        2.0 * self.alpha / PI.sqrt() * (-ar * ar).exp() / r - libm::erf(ar) / (r * r)
    }

    #[inline]
    fn pair_scale(&self, a: &Site, b: &Site) -> f64 {
        self.prefactor * a.charge * b.charge
    }
}
