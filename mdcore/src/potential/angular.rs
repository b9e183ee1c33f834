use std::path::Path;

use nalgebra::Vector3;

use super::interpolation::{Interpolation, Spline};
use super::tabulated::TableData;
use crate::error::{MdError, Result};

/// `sin(theta)` is never taken smaller than this when converting `dE/dtheta`
/// into Cartesian forces.
const MIN_SIN: f64 = 1e-8;

/// Potential of the angle `theta` at particle 2 spanned by particles 1 and 3.
pub trait AngularPotential: Send + Sync + std::fmt::Debug {
    /// Energy at angle `theta` (radians).
    fn energy(&self, theta: f64) -> f64;

    /// `dE/dtheta`.
    fn derivative(&self, theta: f64) -> f64;

    /// Energy for the bond vectors `d12 = r1 - r2` and `d32 = r3 - r2`.
    fn triple_energy(&self, d12: &Vector3<f64>, d32: &Vector3<f64>) -> f64 {
        self.energy(angle(d12, d32))
    }

    /// Forces on particles 1 and 3. The force on particle 2 is minus their sum.
    fn triple_forces(&self, d12: &Vector3<f64>, d32: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let r12 = d12.norm();
        let r32 = d32.norm();
        if r12 == 0.0 || r32 == 0.0 {
            return (Vector3::zeros(), Vector3::zeros());
        }
        let cos = (d12.dot(d32) / (r12 * r32)).clamp(-1.0, 1.0);
        let sin = (1.0 - cos * cos).sqrt().max(MIN_SIN);
        let theta = cos.acos();
        let a = self.derivative(theta) / sin;
        let f1 = (d32 / (r12 * r32) - d12 * (cos / (r12 * r12))) * a;
        let f3 = (d12 / (r12 * r32) - d32 * (cos / (r32 * r32))) * a;
        (f1, f3)
    }
}

pub fn angle(d12: &Vector3<f64>, d32: &Vector3<f64>) -> f64 {
    let denom = d12.norm() * d32.norm();
    if denom == 0.0 {
        return 0.0;
    }
    (d12.dot(d32) / denom).clamp(-1.0, 1.0).acos()
}

/// `K (theta - theta0)^2`.
#[derive(Debug, Clone)]
pub struct AngularHarmonic {
    pub k: f64,
    pub theta0: f64,
}

impl AngularHarmonic {
    pub fn new(k: f64, theta0: f64) -> Result<Self> {
        if !k.is_finite() || !theta0.is_finite() {
            return Err(MdError::Configuration(format!(
                "invalid angular potential K={}, theta0={}",
                k, theta0
            )));
        }
        Ok(AngularHarmonic { k, theta0 })
    }
}

impl AngularPotential for AngularHarmonic {
    fn energy(&self, theta: f64) -> f64 {
        let dt = theta - self.theta0;
        self.k * dt * dt
    }

    fn derivative(&self, theta: f64) -> f64 {
        2.0 * self.k * (theta - self.theta0)
    }
}

/// Angular potential interpolated from `theta energy force` rows, where
/// `force = -dE/dtheta`.
#[derive(Debug, Clone)]
pub struct TabulatedAngular {
    energy: Spline,
    force: Spline,
}

impl TabulatedAngular {
    pub fn new(interpolation: Interpolation, data: &TableData) -> Result<Self> {
        Ok(TabulatedAngular {
            energy: Spline::new(interpolation, &data.r, &data.energy)?,
            force: Spline::new(interpolation, &data.r, &data.force)?,
        })
    }

    pub fn from_file<P: AsRef<Path>>(interpolation: Interpolation, path: P) -> Result<Self> {
        Self::new(interpolation, &TableData::read(path)?)
    }
}

impl AngularPotential for TabulatedAngular {
    fn energy(&self, theta: f64) -> f64 {
        self.energy.value(theta)
    }

    fn derivative(&self, theta: f64) -> f64 {
        -self.force.value(theta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn positions() -> [Vector3<f64>; 3] {
        [
            Vector3::new(1.1, 0.2, -0.1),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(-0.3, 0.9, 0.4),
        ]
    }

    fn total_energy<A: AngularPotential>(pot: &A, p: &[Vector3<f64>; 3]) -> f64 {
        pot.triple_energy(&(p[0] - p[1]), &(p[2] - p[1]))
    }

    #[test]
    fn test_forces_match_numerical_gradient() {
        let pot = AngularHarmonic::new(30.0, 1.9).unwrap();
        let p = positions();
        let (f1, f3) = pot.triple_forces(&(p[0] - p[1]), &(p[2] - p[1]));
        let f2 = -(f1 + f3);
        let h = 1e-6;
        for (i, f) in [f1, f2, f3].iter().enumerate() {
            for k in 0..3 {
                let mut plus = p;
                let mut minus = p;
                plus[i][k] += h;
                minus[i][k] -= h;
                let numeric = -(total_energy(&pot, &plus) - total_energy(&pot, &minus)) / (2.0 * h);
                assert_relative_eq!(f[k], numeric, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_tabulated_angular_matches_harmonic() {
        let harmonic = AngularHarmonic::new(10.0, 2.0).unwrap();
        let mut data = TableData::default();
        for i in 0..=180 {
            let theta = PI * i as f64 / 180.0;
            data.r.push(theta);
            data.energy.push(harmonic.energy(theta));
            data.force.push(-harmonic.derivative(theta));
        }
        let tab = TabulatedAngular::new(Interpolation::Cubic, &data).unwrap();
        for theta in [0.5, 1.3, 2.0, 2.71] {
            assert_relative_eq!(tab.energy(theta), harmonic.energy(theta), epsilon = 1e-6);
            assert_relative_eq!(tab.derivative(theta), harmonic.derivative(theta), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_angle() {
        let a = angle(&Vector3::x(), &Vector3::y());
        assert_relative_eq!(a, PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(angle(&Vector3::x(), &-Vector3::x()), PI, epsilon = 1e-12);
    }
}
