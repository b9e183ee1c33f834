//! Domain-decomposed molecular dynamics engine.
//!
//! A [`System`] owns the periodic box, the particle storage split over node
//! domains, the Verlet lists and the registered interactions. A
//! [`VelocityVerlet`] integrator advances it with optional extensions for
//! thermostats and sheared boundaries.

pub mod analysis;
pub mod bc;
pub mod error;
pub mod integrator;
pub mod interaction;
pub mod particle;
pub mod potential;
pub mod storage;
pub mod system;
pub mod verlet;

pub use analysis::{Snapshot, SnapshotWriter};
pub use bc::OrthorhombicBC;
pub use error::{MdError, Result};
pub use integrator::{DpdThermostat, Extension, LangevinThermostat, LeesEdwards, VelocityVerlet};
pub use particle::{Particle, ParticleId, ParticleProperties, ParticleType};
pub use storage::DomainDecomposition;
pub use system::{InteractionId, System};
pub use verlet::{VerletList, VerletListId};
