//! Interactions bind potentials to the particles they act on.
//!
//! Forces are accumulated on local particles and ghosts alike; returning ghost
//! forces to their owners is left to the caller so that all interactions of a
//! step share one exchange.

pub mod ewald;
pub mod fixed_pair;
pub mod fixed_triple;
pub mod verlet_list;

use std::any::Any;
use std::collections::HashMap;

use nalgebra::Matrix3;

use crate::bc::OrthorhombicBC;
use crate::error::{MdError, Result};
use crate::particle::ParticleType;
use crate::storage::DomainDecomposition;
use crate::verlet::VerletLists;

pub use ewald::CellListCoulombKSpaceEwald;
pub use fixed_pair::{FixedPairList, FixedPairListInteraction};
pub use fixed_triple::{FixedTripleList, FixedTripleListInteraction};
pub use verlet_list::VerletListInteraction;

pub trait Interaction: Any + Send + Sync {
    fn name(&self) -> &str;

    /// Add this interaction's forces to the force accumulators.
    fn add_forces(
        &self,
        storage: &mut DomainDecomposition,
        lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<()>;

    /// Total energy. Never modifies particle state.
    fn compute_energy(
        &self,
        storage: &DomainDecomposition,
        lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<f64>;

    /// Virial tensor `sum r_i F_i^T` of this interaction.
    fn compute_virial_tensor(
        &self,
        storage: &DomainDecomposition,
        lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<Matrix3<f64>>;

    /// Scalar virial `sum r_i . F_i`, the trace of the tensor.
    fn compute_virial(
        &self,
        storage: &DomainDecomposition,
        lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<f64> {
        Ok(self.compute_virial_tensor(storage, lists, bc)?.trace())
    }

    /// Largest distance at which this interaction acts, if it is short ranged.
    fn max_cutoff(&self) -> Option<f64> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Potentials keyed by unordered pairs of particle types, with an optional
/// potential used for every pair without its own entry.
#[derive(Debug, Clone)]
pub struct PotentialTable<P> {
    by_types: HashMap<(ParticleType, ParticleType), P>,
    fallback: Option<P>,
}

impl<P> Default for PotentialTable<P> {
    fn default() -> Self {
        PotentialTable {
            by_types: HashMap::new(),
            fallback: None,
        }
    }
}

#[inline]
fn type_key(t1: ParticleType, t2: ParticleType) -> (ParticleType, ParticleType) {
    (t1.min(t2), t1.max(t2))
}

impl<P> PotentialTable<P> {
    pub fn set(&mut self, t1: ParticleType, t2: ParticleType, potential: P) {
        self.by_types.insert(type_key(t1, t2), potential);
    }

    pub fn set_all(&mut self, potential: P) {
        self.fallback = Some(potential);
    }

    #[inline]
    pub fn get(&self, t1: ParticleType, t2: ParticleType) -> Result<&P> {
        self.by_types
            .get(&type_key(t1, t2))
            .or(self.fallback.as_ref())
            .ok_or(MdError::MissingPotential { type1: t1, type2: t2 })
    }

    pub fn get_mut(&mut self, t1: ParticleType, t2: ParticleType) -> Option<&mut P> {
        match self.by_types.get_mut(&type_key(t1, t2)) {
            Some(p) => Some(p),
            None => self.fallback.as_mut(),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &P> + '_ {
        self.by_types.values().chain(self.fallback.iter())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut P> + '_ {
        self.by_types.values_mut().chain(self.fallback.iter_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.by_types.is_empty() && self.fallback.is_none()
    }
}
