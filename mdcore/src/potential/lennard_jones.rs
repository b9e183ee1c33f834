use super::Potential;
use crate::error::{MdError, Result};

/// Below this fraction of sigma the LJ terms are evaluated at the clamp
/// distance instead, keeping forces finite for overlapping particles.
const MIN_R_OVER_SIGMA: f64 = 0.1;

fn check_parameters(epsilon: f64, sigma: f64, cutoff: f64) -> Result<()> {
    if !epsilon.is_finite() || !(sigma > 0.0) || !(cutoff > 0.0) {
        return Err(MdError::Configuration(format!(
            "invalid Lennard-Jones parameters epsilon={}, sigma={}, cutoff={}",
            epsilon, sigma, cutoff
        )));
    }
    Ok(())
}

#[inline]
fn lj_energy(epsilon: f64, sigma: f64, r: f64) -> f64 {
    let inv_r2 = sigma * sigma / (r * r);
    let inv_r6 = inv_r2 * inv_r2 * inv_r2;
    4.0 * epsilon * (inv_r6 * inv_r6 - inv_r6)
}

#[inline]
fn lj_force(epsilon: f64, sigma: f64, r: f64) -> f64 {
    let inv_r2 = sigma * sigma / (r * r);
    let inv_r6 = inv_r2 * inv_r2 * inv_r2;
    48.0 * epsilon * inv_r6 * (inv_r6 - 0.5) / r
}

/// 12-6 Lennard-Jones potential with an optional energy shift.
#[derive(Debug, Clone)]
pub struct LennardJones {
    pub epsilon: f64,
    pub sigma: f64,
    cutoff: f64,
    shift: f64,
}

impl LennardJones {
    pub fn new(epsilon: f64, sigma: f64, cutoff: f64) -> Result<Self> {
        check_parameters(epsilon, sigma, cutoff)?;
        Ok(LennardJones {
            epsilon,
            sigma,
            cutoff,
            shift: 0.0,
        })
    }

    /// Shift the energy so that it vanishes at the cutoff.
    pub fn with_auto_shift(mut self) -> Self {
        self.shift = -lj_energy(self.epsilon, self.sigma, self.cutoff);
        self
    }

    pub fn with_shift(mut self, shift: f64) -> Self {
        self.shift = shift;
        self
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    #[inline]
    fn clamped(&self, r: f64) -> f64 {
        r.max(MIN_R_OVER_SIGMA * self.sigma)
    }
}

impl Potential for LennardJones {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn energy(&self, r: f64) -> f64 {
        lj_energy(self.epsilon, self.sigma, self.clamped(r)) + self.shift
    }

    fn force(&self, r: f64) -> f64 {
        lj_force(self.epsilon, self.sigma, self.clamped(r))
    }
}

/// Lennard-Jones potential whose force and energy are frozen below `caprad`.
///
/// Used while pushing apart overlapping particles of a random start
/// configuration. `epsilon`, `sigma` and `caprad` may be changed between runs.
#[derive(Debug, Clone)]
pub struct LennardJonesCapped {
    pub epsilon: f64,
    pub sigma: f64,
    pub caprad: f64,
    cutoff: f64,
    shift: Option<f64>,
}

impl LennardJonesCapped {
    pub fn new(epsilon: f64, sigma: f64, cutoff: f64, caprad: f64) -> Result<Self> {
        check_parameters(epsilon, sigma, cutoff)?;
        if !(caprad > 0.0) {
            return Err(MdError::Configuration(format!(
                "capping radius must be positive, got {}",
                caprad
            )));
        }
        Ok(LennardJonesCapped {
            epsilon,
            sigma,
            caprad,
            cutoff,
            shift: Some(0.0),
        })
    }

    /// Keep the energy zero at the cutoff, following later changes of
    /// `epsilon` and `sigma`.
    pub fn with_auto_shift(mut self) -> Self {
        self.shift = None;
        self
    }

    pub fn with_shift(mut self, shift: f64) -> Self {
        self.shift = Some(shift);
        self
    }

    pub fn shift(&self) -> f64 {
        self.shift
            .unwrap_or_else(|| -lj_energy(self.epsilon, self.sigma, self.cutoff.max(self.caprad)))
    }

    #[inline]
    fn capped(&self, r: f64) -> f64 {
        r.max(self.caprad).max(MIN_R_OVER_SIGMA * self.sigma)
    }
}

impl Potential for LennardJonesCapped {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn energy(&self, r: f64) -> f64 {
        lj_energy(self.epsilon, self.sigma, self.capped(r)) + self.shift()
    }

    fn force(&self, r: f64) -> f64 {
        lj_force(self.epsilon, self.sigma, self.capped(r))
    }
}
