use super::Potential;
use crate::error::{MdError, Result};

/// Harmonic bond `K (r - r0)^2`.
#[derive(Debug, Clone)]
pub struct Harmonic {
    pub k: f64,
    pub r0: f64,
    cutoff: f64,
}

impl Harmonic {
    pub fn new(k: f64, r0: f64) -> Result<Self> {
        if !k.is_finite() || !r0.is_finite() || r0 < 0.0 {
            return Err(MdError::Configuration(format!(
                "invalid harmonic bond K={}, r0={}",
                k, r0
            )));
        }
        Ok(Harmonic {
            k,
            r0,
            cutoff: f64::INFINITY,
        })
    }

    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }
}

impl Potential for Harmonic {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn energy(&self, r: f64) -> f64 {
        let dr = r - self.r0;
        self.k * dr * dr
    }

    fn force(&self, r: f64) -> f64 {
        -2.0 * self.k * (r - self.r0)
    }
}
