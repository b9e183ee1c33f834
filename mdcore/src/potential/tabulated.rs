use std::fs;
use std::path::Path;

use tracing::debug;

use super::interpolation::{Interpolation, Spline};
use super::Potential;
use crate::error::{MdError, Result};

/// Samples of a radial function: distance, energy and force columns.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub r: Vec<f64>,
    pub energy: Vec<f64>,
    pub force: Vec<f64>,
}

impl TableData {
    /// Parse whitespace separated `r energy force` rows. Blank lines and
    /// lines starting with `#` are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut data = TableData::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let values = line
                .split_whitespace()
                .take(3)
                .map(str::parse::<f64>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| MdError::Table(format!("line {}: {}", lineno + 1, e)))?;
            if values.len() < 3 {
                return Err(MdError::Table(format!(
                    "line {}: expected 3 columns, found {}",
                    lineno + 1,
                    values.len()
                )));
            }
            data.r.push(values[0]);
            data.energy.push(values[1]);
            data.force.push(values[2]);
        }
        Ok(data)
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let data = Self::parse(&text)?;
        debug!(path = %path.as_ref().display(), samples = data.r.len(), "read table");
        Ok(data)
    }

    /// Sample another potential on `n` equidistant points of `[r_min, r_max]`.
    pub fn sample<P: Potential + ?Sized>(potential: &P, r_min: f64, r_max: f64, n: usize) -> Self {
        let mut data = TableData::default();
        for i in 0..n {
            let r = r_min + (r_max - r_min) * i as f64 / (n.max(2) - 1) as f64;
            data.r.push(r);
            data.energy.push(potential.energy(r));
            data.force.push(potential.force(r));
        }
        data
    }
}

/// Potential interpolated from a table.
///
/// Energy and force columns are interpolated independently. Below the first
/// sample both are held at their first-sample values.
#[derive(Debug, Clone)]
pub struct Tabulated {
    interpolation: Interpolation,
    cutoff: f64,
    energy: Spline,
    force: Spline,
}

impl Tabulated {
    pub fn new(interpolation: Interpolation, data: &TableData, cutoff: f64) -> Result<Self> {
        if !(cutoff > 0.0) {
            return Err(MdError::Table(format!("cutoff must be positive, got {}", cutoff)));
        }
        Ok(Tabulated {
            interpolation,
            cutoff,
            energy: Spline::new(interpolation, &data.r, &data.energy)?,
            force: Spline::new(interpolation, &data.r, &data.force)?,
        })
    }

    pub fn from_file<P: AsRef<Path>>(interpolation: Interpolation, path: P, cutoff: f64) -> Result<Self> {
        Self::new(interpolation, &TableData::read(path)?, cutoff)
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn r_min(&self) -> f64 {
        self.energy.x_min()
    }
}

impl Potential for Tabulated {
    fn cutoff(&self) -> f64 {
        self.cutoff
    }

    fn energy(&self, r: f64) -> f64 {
        self.energy.value(r)
    }

    fn force(&self, r: f64) -> f64 {
        self.force.value(r)
    }
}
