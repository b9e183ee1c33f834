//! Velocity Verlet time stepping with pluggable extensions.

mod dpd;
mod langevin;
mod lees_edwards;

pub use dpd::DpdThermostat;
pub use langevin::LangevinThermostat;
pub use lees_edwards::LeesEdwards;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{MdError, Result};
use crate::system::System;

/// Hook points of one integration step.
///
/// Extensions run in the order they were added. Forces an extension adds to
/// ghosts in `after_force` are returned to their owners once every extension
/// has run.
pub trait Extension: Send {
    fn name(&self) -> &str;

    /// Called before the forces of a `run` are primed.
    fn heat_up(&mut self) {}

    /// Called once the primed forces are in place.
    fn cool_down(&mut self) {}

    /// Positions have moved, ghosts are not yet refreshed.
    fn after_position_update(&mut self, _system: &mut System, _dt: f64) -> Result<()> {
        Ok(())
    }

    /// Interaction forces are in place at the new positions.
    fn after_force(&mut self, _system: &mut System, _dt: f64) -> Result<()> {
        Ok(())
    }

    fn after_step(&mut self, _system: &mut System, _step: u64) -> Result<()> {
        Ok(())
    }
}

pub struct VelocityVerlet {
    dt: f64,
    step: u64,
    rebuilds: u64,
    extensions: Vec<Box<dyn Extension>>,
}

impl VelocityVerlet {
    pub fn new(dt: f64) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(MdError::Configuration(format!("time step must be positive, got {}", dt)));
        }
        Ok(VelocityVerlet {
            dt,
            step: 0,
            rebuilds: 0,
            extensions: Vec::new(),
        })
    }

    pub fn add_extension<E: Extension + 'static>(&mut self, extension: E) {
        debug!(name = extension.name(), "added integrator extension");
        self.extensions.push(Box::new(extension));
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> + '_ {
        self.extensions.iter().map(|e| e.name())
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Number of completed steps. Not reset between `run` calls.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Carry the step counter over from another integrator, or reset it.
    pub fn set_step(&mut self, step: u64) {
        self.step = step;
    }

    /// Decompositions triggered by stale neighbor lists so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Prime the forces and advance `n_steps`.
    pub fn run(&mut self, system: &mut System, n_steps: u64) -> Result<()> {
        if system.needs_rebuild() {
            system.decompose()?;
        }
        for ext in &mut self.extensions {
            ext.heat_up();
        }
        self.update_forces(system)?;
        for ext in &mut self.extensions {
            ext.cool_down();
        }

        let start = self.step;
        let rebuilds = self.rebuilds;
        for _ in 0..n_steps {
            self.integrate_step(system)?;
        }
        info!(
            from = start,
            to = self.step,
            rebuilds = self.rebuilds - rebuilds,
            "integration finished"
        );
        Ok(())
    }

    fn integrate_step(&mut self, system: &mut System) -> Result<()> {
        let dt = self.dt;
        kick_and_drift(system, dt);
        for ext in &mut self.extensions {
            ext.after_position_update(system, dt)?;
        }

        if system.needs_rebuild() {
            system.decompose()?;
            self.rebuilds += 1;
        } else {
            system.update_ghosts()?;
        }

        self.update_forces(system)?;
        kick(system, dt);

        for ext in &mut self.extensions {
            ext.after_step(system, self.step)?;
        }
        self.step += 1;
        Ok(())
    }

    fn update_forces(&mut self, system: &mut System) -> Result<()> {
        system.compute_forces()?;
        for ext in &mut self.extensions {
            ext.after_force(system, self.dt)?;
        }
        system.storage.collect_ghost_forces();
        Ok(())
    }
}

fn kick_and_drift(system: &mut System, dt: f64) {
    let half_dt = 0.5 * dt;
    system.storage.domains_mut().par_iter_mut().for_each(|domain| {
        for p in domain.particles_mut() {
            p.velocity += p.force * (half_dt / p.mass);
            p.position += p.velocity * dt;
        }
    });
}

fn kick(system: &mut System, dt: f64) {
    let half_dt = 0.5 * dt;
    system.storage.domains_mut().par_iter_mut().for_each(|domain| {
        for p in domain.particles_mut() {
            p.velocity += p.force * (half_dt / p.mass);
        }
    });
}
