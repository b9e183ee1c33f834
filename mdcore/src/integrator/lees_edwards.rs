use tracing::debug;

use super::Extension;
use crate::error::{MdError, Result};
use crate::system::System;

/// Lees-Edwards shear: the periodic image above moves along x with
/// `shear_rate * Lz`. The accumulated offset is advanced once per step.
pub struct LeesEdwards {
    shear_rate: f64,
}

impl LeesEdwards {
    pub fn new(shear_rate: f64) -> Result<Self> {
        if !shear_rate.is_finite() {
            return Err(MdError::Configuration(format!("invalid shear rate {}", shear_rate)));
        }
        Ok(LeesEdwards { shear_rate })
    }

    pub fn shear_rate(&self) -> f64 {
        self.shear_rate
    }
}

impl Extension for LeesEdwards {
    fn name(&self) -> &str {
        "lees-edwards"
    }

    fn after_position_update(&mut self, system: &mut System, dt: f64) -> Result<()> {
        if system.bc.shear_rate() != self.shear_rate {
            debug!(rate = self.shear_rate, "setting shear rate");
            system.bc.set_shear_rate(self.shear_rate);
        }
        system.bc.advance_shear(dt);
        Ok(())
    }
}
