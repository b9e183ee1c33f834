//! Input/Output operations for MD runs
//!
//! This module handles logging setup and energy output.

mod output;

pub use output::{setup_output, EnergyWriter};
