//! Periodic orthorhombic boundary conditions.
//!
//! The box spans `[0, L)` in every dimension. An optional Lees–Edwards shear
//! offset couples the z images to a displacement along x: the image box above
//! (z + Lz) is shifted by `+offset` in x and moves with `+shear_rate * Lz`.

use nalgebra::Vector3;
use rand::Rng;

use crate::error::{MdError, Result};

#[derive(Debug, Clone)]
pub struct OrthorhombicBC {
    box_l: Vector3<f64>,
    inv_box_l: Vector3<f64>,
    shear_rate: f64,
    /// Accumulated shear displacement, never wrapped
    shear_total: f64,
}

impl OrthorhombicBC {
    pub fn new(box_l: Vector3<f64>) -> Result<Self> {
        if box_l.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(MdError::Configuration(format!(
                "box lengths must be positive and finite, got {:?}",
                box_l.as_slice()
            )));
        }
        Ok(OrthorhombicBC {
            box_l,
            inv_box_l: box_l.map(|l| 1.0 / l),
            shear_rate: 0.0,
            shear_total: 0.0,
        })
    }

    pub fn cubic(length: f64) -> Result<Self> {
        Self::new(Vector3::new(length, length, length))
    }

    #[inline]
    pub fn box_l(&self) -> Vector3<f64> {
        self.box_l
    }

    pub fn volume(&self) -> f64 {
        self.box_l.x * self.box_l.y * self.box_l.z
    }

    pub fn shear_rate(&self) -> f64 {
        self.shear_rate
    }

    pub fn set_shear_rate(&mut self, rate: f64) {
        self.shear_rate = rate;
    }

    /// Total shear displacement accumulated so far.
    pub fn shear_total(&self) -> f64 {
        self.shear_total
    }

    /// Current image offset along x, folded into `[0, Lx)`.
    pub fn shear_offset(&self) -> f64 {
        let lx = self.box_l.x;
        let folded = self.shear_total - lx * (self.shear_total / lx).floor();
        if folded >= lx {
            0.0
        } else {
            folded
        }
    }

    pub fn is_sheared(&self) -> bool {
        self.shear_rate != 0.0 || self.shear_total != 0.0
    }

    /// Advance the shear displacement by one time step.
    pub fn advance_shear(&mut self, dt: f64) {
        self.shear_total += self.shear_rate * self.box_l.z * dt;
    }

    /// Velocity of the image box above along x.
    #[inline]
    pub fn shear_velocity(&self) -> f64 {
        self.shear_rate * self.box_l.z
    }

    /// Fold a position into the primary box, adjusting the velocity when the
    /// particle crosses a sheared z boundary.
    pub fn fold(&self, position: &mut Vector3<f64>, velocity: &mut Vector3<f64>) {
        let nz = (position.z * self.inv_box_l.z).floor();
        if nz != 0.0 {
            position.z -= nz * self.box_l.z;
            position.x -= nz * self.shear_offset();
            velocity.x -= nz * self.shear_velocity();
        }
        for k in 0..3 {
            let l = self.box_l[k];
            position[k] -= l * (position[k] * self.inv_box_l[k]).floor();
            // x - floor(x) can round up to exactly L for tiny negative x
            if position[k] >= l {
                position[k] = 0.0;
            }
        }
    }

    /// Fold a position, ignoring velocities.
    pub fn folded_position(&self, position: &Vector3<f64>) -> Vector3<f64> {
        let mut p = *position;
        let mut v = Vector3::zeros();
        self.fold(&mut p, &mut v);
        p
    }

    /// Apply the minimum-image convention to a distance vector `d = p1 - p2`.
    pub fn minimum_image(&self, mut d: Vector3<f64>) -> Vector3<f64> {
        let nz = (d.z * self.inv_box_l.z).round();
        d.z -= nz * self.box_l.z;
        d.x -= nz * self.shear_offset();
        for k in 0..2 {
            let l = self.box_l[k];
            d[k] -= l * (d[k] * self.inv_box_l[k]).round();
        }
        d
    }

    /// Displacement of the periodic image `image` relative to the primary box.
    pub fn image_shift(&self, image: [i32; 3]) -> Vector3<f64> {
        Vector3::new(
            image[0] as f64 * self.box_l.x + image[2] as f64 * self.shear_offset(),
            image[1] as f64 * self.box_l.y,
            image[2] as f64 * self.box_l.z,
        )
    }

    /// Velocity offset carried by the periodic image `image`.
    pub fn image_velocity(&self, image: [i32; 3]) -> Vector3<f64> {
        Vector3::new(image[2] as f64 * self.shear_velocity(), 0.0, 0.0)
    }

    /// Uniformly distributed position inside the box.
    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector3<f64> {
        Vector3::new(
            rng.gen::<f64>() * self.box_l.x,
            rng.gen::<f64>() * self.box_l.y,
            rng.gen::<f64>() * self.box_l.z,
        )
    }
}
