//! Warmup, equilibration and production of a Lennard-Jones fluid

use color_eyre::eyre::{Result, WrapErr};
use mdcore::interaction::VerletListInteraction;
use mdcore::potential::{LennardJones, LennardJonesCapped};
use mdcore::{
    DpdThermostat, LangevinThermostat, LeesEdwards, OrthorhombicBC, ParticleProperties,
    SnapshotWriter, System, VelocityVerlet, VerletListId,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs::File;
use tracing::info;

use crate::config::{Config, ThermostatConfig};
use crate::io::EnergyWriter;

/// Observables of the last reported loop
#[derive(Debug, Clone, Copy)]
pub struct Report {
    pub step: u64,
    pub temperature: f64,
    pub pressure: f64,
    pub potential: f64,
    pub total: f64,
}

pub struct Simulation {
    config: Config,
    system: System,
    energies: Option<EnergyWriter<File>>,
    last: Option<Report>,
}

impl Simulation {
    /// Random initial positions in a cubic box sized for the warmup cutoff
    pub fn new(config: Config) -> Result<Self> {
        let sys = &config.system;
        let box_l = config.box_length();
        let bc = OrthorhombicBC::cubic(box_l)?;
        let mut system = System::with_workers(bc, sys.workers, config.warmup.cutoff, sys.skin)
            .wrap_err("Unable to decompose the simulation box")?;

        let mut rng = StdRng::seed_from_u64(sys.seed);
        let velocities = config.generate_velocities(sys.n_particles, &mut rng);
        for (id, v) in velocities.into_iter().enumerate() {
            let position = system.bc.random_position(&mut rng);
            let props = ParticleProperties::default().with_mass(sys.mass).with_velocity(v);
            system.add_particle(id, position, props)?;
        }
        system.decompose()?;
        info!(
            "Added {} particles to a box of edge {:.4}",
            sys.n_particles, box_l
        );

        let energies = match &config.output.energy_file {
            Some(path) => Some(
                EnergyWriter::create(path)
                    .wrap_err_with(|| format!("Unable to create energy file: {}", path.display()))?,
            ),
            None => None,
        };

        Ok(Simulation {
            config,
            system,
            energies,
            last: None,
        })
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn last_report(&self) -> Option<Report> {
        self.last
    }

    fn integrator(&self, list: VerletListId, seed: u64) -> Result<VelocityVerlet> {
        let mut integrator = VelocityVerlet::new(self.config.system.time_step)?;
        self.add_thermostat(&mut integrator, list, seed)?;
        Ok(integrator)
    }

    fn add_thermostat(&self, integrator: &mut VelocityVerlet, list: VerletListId, seed: u64) -> Result<()> {
        match self.config.thermostat {
            ThermostatConfig::None => {}
            ThermostatConfig::Langevin { gamma, temperature } => {
                integrator.add_extension(LangevinThermostat::new(gamma, temperature, seed)?);
            }
            ThermostatConfig::Dpd {
                gamma,
                tgamma,
                temperature,
            } => {
                integrator.add_extension(DpdThermostat::new(list, gamma, tgamma, temperature, seed)?);
            }
        }
        Ok(())
    }

    fn report(&mut self, phase: &str, integrator: &VelocityVerlet) -> Result<()> {
        let step = integrator.step();
        let snapshot = self.system.snapshot(step, step as f64 * integrator.dt())?;
        let report = Report {
            step,
            temperature: snapshot.temperature,
            pressure: snapshot.pressure,
            potential: snapshot.potential_energy(),
            total: snapshot.total_energy(),
        };
        info!(
            "{:>13} step {:>8}  T {:>9.5}  P {:>9.5}  Epot {:>12.5}  Etot {:>12.5}",
            phase, report.step, report.temperature, report.pressure, report.potential, report.total
        );
        if let Some(writer) = &mut self.energies {
            writer.set_phase(phase);
            writer.write(&snapshot)?;
        }
        self.last = Some(report);
        Ok(())
    }

    /// Capped warmup potential, shifted to zero at the cutoff for every
    /// `epsilon` it is ramped through.
    fn warmup_potential(&self) -> Result<LennardJonesCapped> {
        let warmup = &self.config.warmup;
        let lj = LennardJonesCapped::new(
            warmup.epsilon_start,
            self.config.potential.sigma,
            warmup.cutoff,
            warmup.caprad,
        )?;
        Ok(lj.with_auto_shift())
    }

    /// Push overlapping particles apart with a capped potential whose depth
    /// grows from `epsilon_start` to `epsilon_end`.
    pub fn warmup(&mut self) -> Result<()> {
        let warmup = self.config.warmup.clone();
        info!("starting warm-up ...");

        let list = self.system.add_verlet_list(warmup.cutoff)?;
        let mut interaction = VerletListInteraction::new(list);
        interaction.set_potential(0, 0, self.warmup_potential()?);
        let id = self.system.add_interaction(interaction);

        let mut integrator = self.integrator(list, self.config.system.seed.wrapping_add(1))?;
        self.report("warmup", &integrator)?;
        let delta = warmup.epsilon_delta();
        for _ in 0..warmup.nloops {
            integrator.run(&mut self.system, warmup.isteps)?;
            for lj in self
                .system
                .interaction_mut::<VerletListInteraction<LennardJonesCapped>>(id)?
                .potentials_mut()
                .values_mut()
            {
                lj.epsilon += delta;
            }
            self.report("warmup", &integrator)?;
        }

        self.system.remove_interaction(id)?;
        self.system.remove_verlet_list(list)?;
        info!("warmup finished");
        Ok(())
    }

    fn full_potential(&mut self) -> Result<VerletListId> {
        let p = &self.config.potential;
        let mut lj = LennardJones::new(p.epsilon, p.sigma, p.cutoff)?;
        if p.auto_shift {
            lj = lj.with_auto_shift();
        }
        let list = self.system.add_verlet_list(p.cutoff)?;
        let mut interaction = VerletListInteraction::new(list);
        interaction.set_potential(0, 0, lj);
        self.system.add_interaction(interaction);
        // the cutoff changed, so resize the cells
        self.system
            .cell_adjust()
            .wrap_err("Box too small for the interaction cutoff")?;
        Ok(list)
    }

    /// Relax with the full Lennard-Jones potential.
    pub fn equilibrate(&mut self) -> Result<VerletListId> {
        let phase = self.config.equilibration.clone();
        let list = self.full_potential()?;
        let mut integrator = self.integrator(list, self.config.system.seed.wrapping_add(2))?;

        info!("starting equilibration ...");
        self.report("equilibration", &integrator)?;
        for _ in 0..phase.nloops {
            integrator.run(&mut self.system, phase.isteps)?;
            self.report("equilibration", &integrator)?;
        }
        info!("equilibration finished");
        Ok(list)
    }

    /// Production run, sheared when a shear rate is configured.
    pub fn produce(&mut self, list: VerletListId) -> Result<()> {
        let phase = self.config.production.clone();
        let mut integrator = VelocityVerlet::new(self.config.system.time_step)?;
        if phase.shear_rate != 0.0 {
            info!("Applying Lees-Edwards shear rate {}", phase.shear_rate);
            integrator.add_extension(LeesEdwards::new(phase.shear_rate)?);
        }
        self.add_thermostat(&mut integrator, list, self.config.system.seed.wrapping_add(3))?;

        info!("starting production ...");
        self.system.reset_shear_stress();
        self.report("production", &integrator)?;
        for _ in 0..phase.nloops {
            integrator.run(&mut self.system, phase.isteps)?;
            self.report("production", &integrator)?;
        }
        if let Some(writer) = &mut self.energies {
            writer.flush()?;
        }
        info!(
            "production finished after {} steps, {} neighbor list rebuilds",
            integrator.step(),
            integrator.rebuilds()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        OutputConfig, PhaseConfig, PotentialConfig, ProductionConfig, SystemConfig,
        VelocityConfig, WarmupConfig,
    };
    use mdcore::potential::Potential;

    fn small_config(thermostat: ThermostatConfig, shear_rate: f64) -> Config {
        Config {
            system: SystemConfig {
                n_particles: 108,
                density: 0.6,
                mass: 1.0,
                skin: 0.4,
                time_step: 0.002,
                workers: 1,
                seed: 7,
                velocities: VelocityConfig::Zero,
            },
            potential: PotentialConfig::default(),
            thermostat,
            warmup: WarmupConfig {
                cutoff: 2.0,
                caprad: 0.6,
                epsilon_start: 0.1,
                epsilon_end: 1.0,
                nloops: 20,
                isteps: 20,
            },
            equilibration: PhaseConfig {
                nloops: 3,
                isteps: 50,
            },
            production: ProductionConfig {
                nloops: 2,
                isteps: 50,
                shear_rate,
            },
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_warmup_potential_vanishes_at_cutoff() {
        let config = small_config(ThermostatConfig::None, 0.0);
        let sim = Simulation::new(config).unwrap();
        let mut lj = sim.warmup_potential().unwrap();
        let rc = sim.config.warmup.cutoff;
        assert!(lj.energy(rc).abs() < 1e-12);
        assert!(lj.energy(0.5 * rc) != 0.0);
        for _ in 0..10 {
            lj.epsilon += 0.09;
            assert!(lj.energy(rc).abs() < 1e-12);
        }
    }

    #[test]
    fn test_langevin_workflow_stays_finite() {
        let config = small_config(
            ThermostatConfig::Langevin {
                gamma: 1.0,
                temperature: 1.0,
            },
            0.0,
        );
        let mut sim = Simulation::new(config).unwrap();
        sim.warmup().unwrap();
        assert_eq!(sim.system().verlet_lists().len(), 0);
        let list = sim.equilibrate().unwrap();
        sim.produce(list).unwrap();

        let report = sim.last_report().unwrap();
        assert_eq!(report.step, 100);
        assert!(report.temperature.is_finite() && report.temperature > 0.0);
        assert!(report.total.is_finite());
        assert_eq!(sim.system().storage.n_particles(), 108);
    }

    #[test]
    fn test_sheared_dpd_production_writes_energies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("energies.csv");
        let mut config = small_config(
            ThermostatConfig::Dpd {
                gamma: 1.0,
                tgamma: 0.0,
                temperature: 1.0,
            },
            0.05,
        );
        config.output.energy_file = Some(path.clone());

        let mut sim = Simulation::new(config).unwrap();
        sim.warmup().unwrap();
        let list = sim.equilibrate().unwrap();
        sim.produce(list).unwrap();
        assert!(sim.system().bc.shear_total() > 0.0);

        let stress = sim.system().shear_stress();
        assert!(stress.samples >= 100);
        assert!(stress.mean_pxz(sim.system().bc.volume()).is_finite());

        let text = std::fs::read_to_string(&path).unwrap();
        // header, 21 warmup rows, 4 equilibration rows, 3 production rows
        assert_eq!(text.lines().count(), 1 + 21 + 4 + 3);
        assert!(text.lines().last().unwrap().starts_with("production,100,"));
    }
}
