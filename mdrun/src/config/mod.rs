//! Configuration for a Lennard-Jones fluid run
//!
//! A run goes through three phases: a capped-potential warmup that pushes
//! apart overlapping particles, an equilibration with the full potential and
//! a production phase, optionally under shear.

mod args;

pub use args::Args;

use color_eyre::eyre::{eyre, Result, WrapErr};
use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub potential: PotentialConfig,
    #[serde(default)]
    pub thermostat: ThermostatConfig,
    pub warmup: WarmupConfig,
    pub equilibration: PhaseConfig,
    pub production: ProductionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// System setup configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    pub n_particles: usize,
    /// Number density; fixes the edge of the cubic box
    pub density: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
    #[serde(default = "default_skin")]
    pub skin: f64,
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    /// Node domains the storage is split into
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub velocities: VelocityConfig,
}

/// Initial velocity configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(tag = "type")]
pub enum VelocityConfig {
    #[serde(rename = "zero")]
    #[default]
    Zero,
    /// Maxwell-Boltzmann distribution at given temperature
    #[serde(rename = "maxwell_boltzmann")]
    MaxwellBoltzmann { temperature: f64 },
}

/// Lennard-Jones parameters of equilibration and production
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PotentialConfig {
    #[serde(default = "default_one")]
    pub epsilon: f64,
    #[serde(default = "default_one")]
    pub sigma: f64,
    #[serde(default = "default_lj_cutoff")]
    pub cutoff: f64,
    /// Shift the energy to zero at the cutoff
    #[serde(default = "default_true")]
    pub auto_shift: bool,
}

impl Default for PotentialConfig {
    fn default() -> Self {
        PotentialConfig {
            epsilon: 1.0,
            sigma: 1.0,
            cutoff: default_lj_cutoff(),
            auto_shift: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(tag = "type")]
pub enum ThermostatConfig {
    #[serde(rename = "none")]
    #[default]
    None,
    #[serde(rename = "langevin")]
    Langevin { gamma: f64, temperature: f64 },
    /// Pairwise thermostat acting over the interaction's Verlet list
    #[serde(rename = "dpd")]
    Dpd {
        gamma: f64,
        #[serde(default)]
        tgamma: f64,
        temperature: f64,
    },
}

/// Capped, slowly strengthened Lennard-Jones warmup
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WarmupConfig {
    #[serde(default = "default_warmup_cutoff")]
    pub cutoff: f64,
    #[serde(default = "default_caprad")]
    pub caprad: f64,
    #[serde(default = "default_epsilon_start")]
    pub epsilon_start: f64,
    #[serde(default = "default_one")]
    pub epsilon_end: f64,
    pub nloops: usize,
    pub isteps: u64,
}

impl WarmupConfig {
    /// Epsilon increment applied after each warmup loop
    pub fn epsilon_delta(&self) -> f64 {
        (self.epsilon_end - self.epsilon_start) / self.nloops.max(1) as f64
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PhaseConfig {
    pub nloops: usize,
    pub isteps: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProductionConfig {
    pub nloops: usize,
    pub isteps: u64,
    /// Lees-Edwards shear rate; zero runs without shear
    #[serde(default)]
    pub shear_rate: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OutputConfig {
    /// CSV file receiving one energy row per loop
    pub energy_file: Option<PathBuf>,
}

// Default value functions
fn default_mass() -> f64 {
    1.0
}
fn default_one() -> f64 {
    1.0
}
fn default_skin() -> f64 {
    0.4
}
fn default_time_step() -> f64 {
    0.002
}
fn default_workers() -> usize {
    1
}
fn default_seed() -> u64 {
    12345
}
fn default_lj_cutoff() -> f64 {
    2.5
}
fn default_true() -> bool {
    true
}
fn default_warmup_cutoff() -> f64 {
    2.0
}
fn default_caprad() -> f64 {
    0.6
}
fn default_epsilon_start() -> f64 {
    0.1
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Unable to read configuration file: {}", path.display()))?;
        serde_yml::from_str(&content).wrap_err("Failed to parse configuration file")
    }

    /// Save configuration to YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply command-line overrides
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(workers) = args.workers {
            self.system.workers = workers;
        }
        if let Some(seed) = args.seed {
            self.system.seed = seed;
        }
        if let Some(n) = args.warmup_loops {
            self.warmup.nloops = n;
        }
        if let Some(n) = args.equilibration_loops {
            self.equilibration.nloops = n;
        }
        if let Some(n) = args.production_loops {
            self.production.nloops = n;
        }
        if let Some(rate) = args.shear_rate {
            self.production.shear_rate = rate;
        }
        if let Some(path) = &args.energy_file {
            self.output.energy_file = Some(path.clone());
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        let system = &self.system;
        if system.n_particles == 0 {
            return Err("Number of particles must be positive".to_string());
        }
        if !(system.density > 0.0) {
            return Err("Density must be positive".to_string());
        }
        if !(system.mass > 0.0) {
            return Err("Mass must be positive".to_string());
        }
        if !(system.skin >= 0.0) {
            return Err("Skin must not be negative".to_string());
        }
        if !(system.time_step > 0.0) {
            return Err("Time step must be positive".to_string());
        }
        if system.workers == 0 {
            return Err("At least one worker is required".to_string());
        }
        if let VelocityConfig::MaxwellBoltzmann { temperature } = system.velocities {
            if !(temperature >= 0.0) {
                return Err("Initial temperature must not be negative".to_string());
            }
        }

        let p = &self.potential;
        if !(p.epsilon > 0.0) || !(p.sigma > 0.0) || !(p.cutoff > 0.0) {
            return Err("LJ epsilon, sigma and cutoff must be positive".to_string());
        }

        match self.thermostat {
            ThermostatConfig::None => {}
            ThermostatConfig::Langevin { gamma, temperature } => {
                if !(gamma > 0.0) || !(temperature > 0.0) {
                    return Err("Langevin gamma and temperature must be positive".to_string());
                }
            }
            ThermostatConfig::Dpd {
                gamma,
                tgamma,
                temperature,
            } => {
                if !(gamma >= 0.0) || !(tgamma >= 0.0) || gamma + tgamma == 0.0 {
                    return Err("DPD needs a positive gamma or tgamma".to_string());
                }
                if !(temperature > 0.0) {
                    return Err("DPD temperature must be positive".to_string());
                }
            }
        }

        let w = &self.warmup;
        if !(w.cutoff > 0.0) || !(w.caprad >= 0.0) {
            return Err("Warmup cutoff must be positive and caprad not negative".to_string());
        }
        if !(w.epsilon_start > 0.0) || !(w.epsilon_end > 0.0) {
            return Err("Warmup epsilon must be positive".to_string());
        }
        if !self.production.shear_rate.is_finite() {
            return Err("Shear rate must be finite".to_string());
        }
        Ok(())
    }

    /// Edge of the cubic box holding `n_particles` at `density`
    pub fn box_length(&self) -> f64 {
        (self.system.n_particles as f64 / self.system.density).cbrt()
    }

    /// Initial velocities for `n` particles of equal mass
    pub fn generate_velocities<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<Vector3<f64>> {
        match self.system.velocities {
            VelocityConfig::Zero => vec![Vector3::zeros(); n],
            VelocityConfig::MaxwellBoltzmann { temperature } => {
                let mass = self.system.mass;
                let sigma = (temperature / mass).sqrt();
                let mut velocities: Vec<Vector3<f64>> = (0..n)
                    .map(|_| {
                        Vector3::from_fn(|_, _| Distribution::<f64>::sample(&StandardNormal, rng)) * sigma
                    })
                    .collect();

                // Remove center-of-mass motion
                let v_cm = velocities.iter().sum::<Vector3<f64>>() / n.max(1) as f64;
                for v in &mut velocities {
                    *v -= v_cm;
                }

                // Scale to exact target temperature if we have more than one particle
                if n > 1 {
                    let current =
                        mass * velocities.iter().map(|v| v.norm_squared()).sum::<f64>() / (3.0 * n as f64);
                    if current > 0.0 {
                        let scale = (temperature / current).sqrt();
                        for v in &mut velocities {
                            *v *= scale;
                        }
                    }
                }
                velocities
            }
        }
    }
}

/// Parse a validated configuration, mapping validation failures into reports
pub fn load(args: &Args) -> Result<Config> {
    let mut config = Config::from_file(&args.config_file)?;
    config.apply_args(args);
    config
        .validate()
        .map_err(|e| eyre!(e))
        .wrap_err("Invalid configuration")?;
    Ok(config)
}
