use std::any::Any;
use std::iter::Sum;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use tracing::error;

use super::{Interaction, PotentialTable};
use crate::bc::OrthorhombicBC;
use crate::error::{MdError, Result};
use crate::particle::{ParticleId, ParticleType, Site};
use crate::potential::Potential;
use crate::storage::{DomainDecomposition, NodeDomain};
use crate::verlet::VerletLists;

/// Explicit list of bonded particle pairs.
#[derive(Debug, Clone, Default)]
pub struct FixedPairList {
    pairs: Vec<(ParticleId, ParticleId)>,
}

impl FixedPairList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, a: ParticleId, b: ParticleId) {
        self.pairs.push((a, b));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticleId, ParticleId)> + '_ {
        self.pairs.iter().copied()
    }
}

impl FromIterator<(ParticleId, ParticleId)> for FixedPairList {
    fn from_iter<I: IntoIterator<Item = (ParticleId, ParticleId)>>(iter: I) -> Self {
        FixedPairList {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Pair potential applied to the pairs of a [`FixedPairList`].
///
/// Each bond is evaluated on the node owning its first particle, against the
/// closest image of the second one.
#[derive(Debug, Clone)]
pub struct FixedPairListInteraction<P> {
    bonds: FixedPairList,
    potentials: PotentialTable<P>,
}

impl<P: Potential + 'static> FixedPairListInteraction<P> {
    pub fn new(bonds: FixedPairList) -> Self {
        FixedPairListInteraction {
            bonds,
            potentials: PotentialTable::default(),
        }
    }

    /// Bonds with a single potential regardless of particle types.
    pub fn with_potential(bonds: FixedPairList, potential: P) -> Self {
        let mut interaction = Self::new(bonds);
        interaction.potentials.set_all(potential);
        interaction
    }

    pub fn set_potential(&mut self, t1: ParticleType, t2: ParticleType, potential: P) {
        self.potentials.set(t1, t2, potential);
    }

    pub fn potentials_mut(&mut self) -> &mut PotentialTable<P> {
        &mut self.potentials
    }

    pub fn bonds(&self) -> &FixedPairList {
        &self.bonds
    }

    /// Local slot of the first particle and slot of the nearest image of the
    /// second, for every bond owned by `domain`.
    fn resolve<'a>(
        &'a self,
        domain: &'a NodeDomain,
    ) -> impl Iterator<Item = Result<(usize, usize)>> + 'a {
        self.bonds.iter().filter_map(move |(i, j)| {
            let a = domain.local_slot(i)?;
            let b = domain
                .nearest_image(j, &domain.position(a))
                .ok_or_else(|| {
                    error!(id = i, partner = j, rank = domain.rank(), "bond partner not found");
                    MdError::MissingBondPartner {
                        id: i,
                        partner: j,
                        rank: domain.rank(),
                    }
                });
            Some(b.map(|b| (a, b)))
        })
    }

    fn bond_sum<T, G>(&self, storage: &DomainDecomposition, g: G) -> Result<T>
    where
        T: Send + Sum<T>,
        G: Fn(&P, &Site, &Site, &Vector3<f64>) -> T + Sync,
    {
        if !storage.is_decomposed() {
            return Err(MdError::NotDecomposed);
        }
        let partial = storage
            .domains()
            .par_iter()
            .map(|domain| {
                self.resolve(domain)
                    .map(|slots| {
                        let (a, b) = slots?;
                        let sa = domain.site(a);
                        let sb = domain.site(b);
                        let potential = self.potentials.get(sa.ptype, sb.ptype)?;
                        Ok(g(potential, &sa, &sb, &(sa.position - sb.position)))
                    })
                    .sum::<Result<T>>()
            })
            .collect::<Result<Vec<T>>>()?;
        Ok(partial.into_iter().sum())
    }
}

impl<P: Potential + 'static> Interaction for FixedPairListInteraction<P> {
    fn name(&self) -> &str {
        "fixed pair list"
    }

    fn add_forces(
        &self,
        storage: &mut DomainDecomposition,
        _lists: &VerletLists,
        _bc: &OrthorhombicBC,
    ) -> Result<()> {
        if !storage.is_decomposed() {
            return Err(MdError::NotDecomposed);
        }
        storage
            .domains_mut()
            .par_iter_mut()
            .map(|domain| {
                let slots = self.resolve(domain).collect::<Result<Vec<_>>>()?;
                for (a, b) in slots {
                    let sa = domain.site(a);
                    let sb = domain.site(b);
                    let potential = self.potentials.get(sa.ptype, sb.ptype)?;
                    let f = potential.pair_force(&sa, &sb, &(sa.position - sb.position));
                    domain.add_force(a, f);
                    domain.add_force(b, -f);
                }
                Ok(())
            })
            .collect()
    }

    fn compute_energy(
        &self,
        storage: &DomainDecomposition,
        _lists: &VerletLists,
        _bc: &OrthorhombicBC,
    ) -> Result<f64> {
        self.bond_sum(storage, |p, a, b, d| p.pair_energy(a, b, d))
    }

    fn compute_virial_tensor(
        &self,
        storage: &DomainDecomposition,
        _lists: &VerletLists,
        _bc: &OrthorhombicBC,
    ) -> Result<Matrix3<f64>> {
        self.bond_sum(storage, |p, a, b, d| d * p.pair_force(a, b, d).transpose())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
