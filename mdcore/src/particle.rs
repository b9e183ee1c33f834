use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{MdError, Result};

pub type ParticleId = usize;
pub type ParticleType = usize;

/// A particle owned by exactly one node domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    pub id: ParticleId,
    pub ptype: ParticleType,
    pub mass: f64,
    pub charge: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// Force accumulator, reset before every force evaluation
    #[serde(skip, default = "Vector3::zeros")]
    pub force: Vector3<f64>,
}

/// Attributes supplied alongside a position when a particle is added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleProperties {
    pub ptype: ParticleType,
    pub mass: f64,
    pub charge: f64,
    pub velocity: Vector3<f64>,
}

impl Default for ParticleProperties {
    fn default() -> Self {
        ParticleProperties {
            ptype: 0,
            mass: 1.0,
            charge: 0.0,
            velocity: Vector3::zeros(),
        }
    }
}

impl ParticleProperties {
    pub fn with_type(mut self, ptype: ParticleType) -> Self {
        self.ptype = ptype;
        self
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.velocity = velocity;
        self
    }
}

impl Particle {
    pub fn new(id: ParticleId, position: Vector3<f64>, props: ParticleProperties) -> Self {
        Particle {
            id,
            ptype: props.ptype,
            mass: props.mass,
            charge: props.charge,
            position,
            velocity: props.velocity,
            force: Vector3::zeros(),
        }
    }

    /// Reject particles whose state cannot be integrated.
    pub fn validate(&self) -> Result<()> {
        if !all_finite(&self.position) {
            return Err(MdError::NonFinite { id: self.id, field: "position" });
        }
        if !all_finite(&self.velocity) {
            return Err(MdError::NonFinite { id: self.id, field: "velocity" });
        }
        if !self.mass.is_finite() || self.mass <= 0.0 {
            return Err(MdError::NonFinite { id: self.id, field: "mass" });
        }
        if !self.charge.is_finite() {
            return Err(MdError::NonFinite { id: self.id, field: "charge" });
        }
        Ok(())
    }

    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.mass * self.velocity.norm_squared()
    }
}

/// Read-only copy of a particle owned by another node (or a periodic image of
/// a local particle). Forces accumulated on a ghost are sent back to its owner.
#[derive(Debug, Clone)]
pub struct Ghost {
    pub id: ParticleId,
    pub ptype: ParticleType,
    pub charge: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub force: Vector3<f64>,
    /// Rank of the owning node
    pub owner: usize,
    /// Index of the particle in the owner's local array
    pub owner_index: usize,
}

/// Pair-evaluation view shared by local particles and ghosts.
#[derive(Debug, Clone, Copy)]
pub struct Site {
    pub id: ParticleId,
    pub ptype: ParticleType,
    pub charge: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl From<&Particle> for Site {
    fn from(p: &Particle) -> Self {
        Site {
            id: p.id,
            ptype: p.ptype,
            charge: p.charge,
            position: p.position,
            velocity: p.velocity,
        }
    }
}

impl From<&Ghost> for Site {
    fn from(g: &Ghost) -> Self {
        Site {
            id: g.id,
            ptype: g.ptype,
            charge: g.charge,
            position: g.position,
            velocity: g.velocity,
        }
    }
}

#[inline]
pub(crate) fn all_finite(v: &Vector3<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_mass() {
        let p = Particle::new(1, Vector3::zeros(), ParticleProperties::default().with_mass(0.0));
        assert!(matches!(p.validate(), Err(MdError::NonFinite { field: "mass", .. })));
    }

    #[test]
    fn test_validate_rejects_nan_position() {
        let p = Particle::new(
            7,
            Vector3::new(f64::NAN, 0.0, 0.0),
            ParticleProperties::default(),
        );
        assert!(matches!(p.validate(), Err(MdError::NonFinite { id: 7, field: "position" })));
    }

    #[test]
    fn test_builder_properties() {
        let props = ParticleProperties::default()
            .with_type(3)
            .with_mass(2.0)
            .with_charge(-1.0);
        let p = Particle::new(0, Vector3::new(1.0, 2.0, 3.0), props);
        assert_eq!(p.ptype, 3);
        assert_eq!(p.mass, 2.0);
        assert_eq!(p.charge, -1.0);
        assert!(p.validate().is_ok());
    }
}
