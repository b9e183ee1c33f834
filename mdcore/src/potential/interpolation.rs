//! Piecewise cubic interpolation of sampled functions.

use serde::{Deserialize, Serialize};

use crate::error::{MdError, Result};

/// Interpolation scheme of a table. Fixed when the table is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Linear,
    Akima,
    Cubic,
}

impl Interpolation {
    /// Map the numeric table codes 1, 2 and 3 used by table-driven setups.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            1 => Ok(Interpolation::Linear),
            2 => Ok(Interpolation::Akima),
            3 => Ok(Interpolation::Cubic),
            _ => Err(MdError::Table(format!(
                "unknown interpolation code {} (expected 1, 2 or 3)",
                code
            ))),
        }
    }
}

/// A sampled function stored as one cubic polynomial per interval.
///
/// On interval `i` the value is `a + b t + c t^2 + d t^3` with `t = x - x_i`.
/// Outside the sampled range the end values are held constant.
#[derive(Debug, Clone)]
pub struct Spline {
    x: Vec<f64>,
    coeffs: Vec<[f64; 4]>,
}

impl Spline {
    pub fn new(kind: Interpolation, x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(MdError::Table(format!(
                "{} abscissae but {} values",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(MdError::Table("at least two samples are required".into()));
        }
        if x.iter().chain(y).any(|v| !v.is_finite()) {
            return Err(MdError::Table("samples must be finite".into()));
        }
        if let Some(w) = x.windows(2).find(|w| w[1] <= w[0]) {
            return Err(MdError::Table(format!(
                "abscissae must be strictly increasing, found {} after {}",
                w[1], w[0]
            )));
        }
        let coeffs = match kind {
            Interpolation::Linear => linear(x, y),
            Interpolation::Cubic => natural_cubic(x, y),
            Interpolation::Akima => akima(x, y),
        };
        Ok(Spline {
            x: x.to_vec(),
            coeffs,
        })
    }

    pub fn x_min(&self) -> f64 {
        self.x[0]
    }

    pub fn x_max(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    #[inline]
    fn locate(&self, x: f64) -> (usize, f64) {
        let x = x.clamp(self.x_min(), self.x_max());
        let i = self
            .x
            .partition_point(|&xi| xi <= x)
            .saturating_sub(1)
            .min(self.coeffs.len() - 1);
        (i, x - self.x[i])
    }

    pub fn value(&self, x: f64) -> f64 {
        let (i, t) = self.locate(x);
        let [a, b, c, d] = self.coeffs[i];
        a + t * (b + t * (c + t * d))
    }

    /// First derivative, zero outside the sampled range.
    pub fn derivative(&self, x: f64) -> f64 {
        if x < self.x_min() || x > self.x_max() {
            return 0.0;
        }
        let (i, t) = self.locate(x);
        let [_, b, c, d] = self.coeffs[i];
        b + t * (2.0 * c + 3.0 * t * d)
    }
}

fn secants(x: &[f64], y: &[f64]) -> Vec<f64> {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| (yw[1] - yw[0]) / (xw[1] - xw[0]))
        .collect()
}

fn linear(x: &[f64], y: &[f64]) -> Vec<[f64; 4]> {
    secants(x, y)
        .into_iter()
        .zip(y)
        .map(|(m, &yi)| [yi, m, 0.0, 0.0])
        .collect()
}

/// Cubic Hermite segments from values and tangents at the samples.
fn hermite(x: &[f64], y: &[f64], slopes: &[f64], tangents: &[f64]) -> Vec<[f64; 4]> {
    (0..slopes.len())
        .map(|i| {
            let h = x[i + 1] - x[i];
            let (t0, t1) = (tangents[i], tangents[i + 1]);
            [
                y[i],
                t0,
                (3.0 * slopes[i] - 2.0 * t0 - t1) / h,
                (t0 + t1 - 2.0 * slopes[i]) / (h * h),
            ]
        })
        .collect()
}

/// Natural cubic spline (zero curvature at both ends).
fn natural_cubic(x: &[f64], y: &[f64]) -> Vec<[f64; 4]> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let m = secants(x, y);

    // second derivatives from the tridiagonal system, Thomas algorithm
    let mut curvature = vec![0.0; n];
    if n > 2 {
        let inner = n - 2;
        let mut diag = vec![0.0; inner];
        let mut rhs = vec![0.0; inner];
        for k in 0..inner {
            diag[k] = 2.0 * (h[k] + h[k + 1]);
            rhs[k] = 6.0 * (m[k + 1] - m[k]);
        }
        for k in 1..inner {
            let w = h[k] / diag[k - 1];
            diag[k] -= w * h[k];
            rhs[k] -= w * rhs[k - 1];
        }
        curvature[inner] = rhs[inner - 1] / diag[inner - 1];
        for k in (0..inner - 1).rev() {
            curvature[k + 1] = (rhs[k] - h[k + 1] * curvature[k + 2]) / diag[k];
        }
    }

    (0..n - 1)
        .map(|i| {
            let (c0, c1) = (curvature[i], curvature[i + 1]);
            [
                y[i],
                m[i] - h[i] * (2.0 * c0 + c1) / 6.0,
                0.5 * c0,
                (c1 - c0) / (6.0 * h[i]),
            ]
        })
        .collect()
}

/// Akima spline. Two extra slopes are extrapolated linearly at each end.
fn akima(x: &[f64], y: &[f64]) -> Vec<[f64; 4]> {
    let m = secants(x, y);
    if m.len() < 2 {
        return linear(x, y);
    }
    let k = m.len();
    let mut ext = Vec::with_capacity(k + 4);
    let before = 2.0 * m[0] - m[1];
    ext.push(2.0 * before - m[0]);
    ext.push(before);
    ext.extend_from_slice(&m);
    let after = 2.0 * m[k - 1] - m[k - 2];
    ext.push(after);
    ext.push(2.0 * after - m[k - 1]);

    // ext[i + 2] is the secant to the right of sample i
    let tangents: Vec<f64> = (0..x.len())
        .map(|i| {
            let (m0, m1, m2, m3) = (ext[i], ext[i + 1], ext[i + 2], ext[i + 3]);
            let w_left = (m3 - m2).abs();
            let w_right = (m1 - m0).abs();
            if w_left + w_right == 0.0 {
                0.5 * (m1 + m2)
            } else {
                (w_left * m1 + w_right * m2) / (w_left + w_right)
            }
        })
        .collect();
    hermite(x, y, &m, &tangents)
}
