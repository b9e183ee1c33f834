//! Lennard-Jones fluid command-line interface
//!
//! Runs a capped warmup, an equilibration and a production phase with the
//! parameters of a YAML configuration.

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

mod config;
mod io;
mod simulation;

use config::Args;
use io::setup_output;
use simulation::Simulation;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_output(args.output.as_ref()).wrap_err("Unable to create log file")?;

    info!("Reading configuration from: {}", args.config_file);
    let config = config::load(&args)?;
    info!("Configuration loaded:\n{:?}", config);

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.system.workers)
        .build_global()
        .wrap_err("Unable to start the worker pool")?;

    let mut sim = Simulation::new(config)?;
    sim.warmup()?;
    let list = sim.equilibrate()?;
    sim.produce(list)?;

    if let Some(report) = sim.last_report() {
        info!(
            "Final state: T = {:.5}, P = {:.5}, Etot = {:.5}",
            report.temperature, report.pressure, report.total
        );
    }
    Ok(())
}
