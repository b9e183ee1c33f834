//! Logging setup and energy output

use mdcore::{Snapshot, SnapshotWriter};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{
    fmt::layer, fmt::time::Uptime, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Install the log subscriber, writing to `output_path` or stdout.
/// Timestamps are seconds since start.
pub fn setup_output(output_path: Option<&String>) -> io::Result<()> {
    match output_path {
        Some(path) => {
            let log = File::create(path)?;
            let file_layer = layer()
                .with_writer(log)
                .with_timer(Uptime::default())
                .with_target(false)
                .with_ansi(false);
            Registry::default().with(file_layer).init();
            info!("Output will be written to: {}", path);
        }
        None => {
            let stdout_layer = layer()
                .with_writer(io::stdout)
                .with_timer(Uptime::default())
                .with_target(false);
            Registry::default().with(stdout_layer).init();
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct EnergyRecord<'a> {
    phase: &'a str,
    step: u64,
    time: f64,
    temperature: f64,
    pressure: f64,
    kinetic: f64,
    potential: f64,
    total: f64,
    shear_offset: f64,
    pxx: f64,
    pyy: f64,
    pzz: f64,
    pxy: f64,
    pxz: f64,
    pyz: f64,
    dpd_pxz: f64,
}

/// One CSV row of energies per snapshot, labelled with the current phase
pub struct EnergyWriter<W: Write> {
    writer: csv::Writer<W>,
    phase: String,
}

impl EnergyWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let writer = csv::Writer::from_path(path).map_err(io::Error::from)?;
        Ok(EnergyWriter {
            writer,
            phase: String::new(),
        })
    }
}

impl<W: Write> EnergyWriter<W> {
    pub fn from_writer(inner: W) -> Self {
        EnergyWriter {
            writer: csv::Writer::from_writer(inner),
            phase: String::new(),
        }
    }

    pub fn set_phase(&mut self, phase: &str) {
        self.phase = phase.to_string();
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

impl<W: Write> SnapshotWriter for EnergyWriter<W> {
    fn write(&mut self, snapshot: &Snapshot) -> mdcore::Result<()> {
        let p = &snapshot.pressure_tensor;
        let record = EnergyRecord {
            phase: &self.phase,
            step: snapshot.step,
            time: snapshot.time,
            temperature: snapshot.temperature,
            pressure: snapshot.pressure,
            kinetic: snapshot.kinetic_energy,
            potential: snapshot.potential_energy(),
            total: snapshot.total_energy(),
            shear_offset: snapshot.shear_offset,
            pxx: p[(0, 0)],
            pyy: p[(1, 1)],
            pzz: p[(2, 2)],
            pxy: p[(0, 1)],
            pxz: p[(0, 2)],
            pyz: p[(1, 2)],
            dpd_pxz: snapshot.dissipative_pxz,
        };
        self.writer.serialize(record).map_err(io::Error::from)?;
        Ok(())
    }

    fn flush(&mut self) -> mdcore::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdcore::analysis::EnergyTerm;
    use nalgebra::Matrix3;

    fn snapshot(step: u64, potential: f64) -> Snapshot {
        Snapshot {
            step,
            time: step as f64 * 0.01,
            box_l: [5.0; 3],
            shear_offset: 0.0,
            particles: Vec::new(),
            energies: vec![EnergyTerm {
                name: "verlet-list pair".to_string(),
                value: potential,
            }],
            kinetic_energy: 1.5,
            temperature: 1.0,
            pressure: 0.3,
            pressure_tensor: Matrix3::new(0.2, 0.0, -0.25, 0.0, 0.3, 0.0, -0.25, 0.0, 0.4),
            dissipative_pxz: 0.05,
        }
    }

    #[test]
    fn test_energy_rows() {
        let mut writer = EnergyWriter::from_writer(Vec::new());
        writer.set_phase("warmup");
        writer.write(&snapshot(0, -2.0)).unwrap();
        writer.set_phase("production");
        writer.write(&snapshot(100, -3.0)).unwrap();
        writer.flush().unwrap();

        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "phase,step,time,temperature,pressure,kinetic,potential,total,shear_offset,\
             pxx,pyy,pzz,pxy,pxz,pyz,dpd_pxz"
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("warmup,0,0.0,"));
        assert!(lines[2].starts_with("production,100,1.0,"));
        assert!(lines[2].contains(",-3.0,-1.5,"));
        assert!(lines[2].ends_with(",0.2,0.3,0.4,0.0,-0.25,0.0,0.05"));
    }

    #[test]
    fn test_create_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("energies.csv");
        let mut writer = EnergyWriter::create(&path).unwrap();
        writer.set_phase("equilibration");
        writer.write(&snapshot(5, 0.0)).unwrap();
        writer.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("equilibration,5,"));
    }
}
