//! Pair, bond and angle potentials.
//!
//! A [`Potential`] is a radial function with a cutoff: `energy(r)` and its
//! negative derivative `force(r)`. Pair evaluation on top of that filters by
//! the exact distance and scales by a pair-dependent factor such as a charge
//! product. Angular potentials implement [`AngularPotential`].

pub mod angular;
pub mod coulomb;
pub mod harmonic;
pub mod interpolation;
pub mod lennard_jones;
pub mod tabulated;

use nalgebra::Vector3;

use crate::particle::Site;

pub use angular::{AngularHarmonic, AngularPotential, TabulatedAngular};
pub use coulomb::{CoulombMultiSiteCorrectionEwald, CoulombRSpace};
pub use harmonic::Harmonic;
pub use interpolation::Interpolation;
pub use lennard_jones::{LennardJones, LennardJonesCapped};
pub use tabulated::Tabulated;

pub trait Potential: Send + Sync + std::fmt::Debug {
    /// Interaction range. Pairs further apart contribute nothing.
    fn cutoff(&self) -> f64;

    /// Energy at distance `r`.
    fn energy(&self, r: f64) -> f64;

    /// Radial force `-dE/dr` at distance `r`.
    fn force(&self, r: f64) -> f64;

    /// Factor applied to energy and force of a specific pair.
    #[inline]
    fn pair_scale(&self, _a: &Site, _b: &Site) -> f64 {
        1.0
    }

    /// Force on `a` exerted by `b`, where `d = a.position - b.position`.
    #[inline]
    fn pair_force(&self, a: &Site, b: &Site, d: &Vector3<f64>) -> Vector3<f64> {
        let r2 = d.norm_squared();
        let rc = self.cutoff();
        if r2 > rc * rc || r2 == 0.0 {
            return Vector3::zeros();
        }
        let r = r2.sqrt();
        d * (self.pair_scale(a, b) * self.force(r) / r)
    }

    #[inline]
    fn pair_energy(&self, a: &Site, b: &Site, d: &Vector3<f64>) -> f64 {
        let r2 = d.norm_squared();
        let rc = self.cutoff();
        if r2 > rc * rc {
            return 0.0;
        }
        self.pair_scale(a, b) * self.energy(r2.sqrt())
    }
}
