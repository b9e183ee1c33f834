//! Command-line argument parsing for MD runs

use clap::Parser;
use std::path::PathBuf;

/// Lennard-Jones fluid simulation with YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Override number of node domains
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Override random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override number of warmup loops
    #[arg(long)]
    pub warmup_loops: Option<usize>,

    /// Override number of equilibration loops
    #[arg(long)]
    pub equilibration_loops: Option<usize>,

    /// Override number of production loops
    #[arg(long)]
    pub production_loops: Option<usize>,

    /// Override production shear rate
    #[arg(long)]
    pub shear_rate: Option<f64>,

    /// Write energies to this CSV file
    #[arg(short, long)]
    pub energy_file: Option<PathBuf>,
}
