use std::any::Any;
use std::iter::Sum;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use super::{Interaction, PotentialTable};
use crate::bc::OrthorhombicBC;
use crate::error::Result;
use crate::particle::{ParticleType, Site};
use crate::potential::Potential;
use crate::storage::{DomainDecomposition, NodeDomain};
use crate::verlet::{VerletList, VerletListId, VerletLists};

/// Non-bonded pair interaction over the pairs of one Verlet list.
#[derive(Debug, Clone)]
pub struct VerletListInteraction<P> {
    list: VerletListId,
    potentials: PotentialTable<P>,
}

impl<P: Potential + 'static> VerletListInteraction<P> {
    pub fn new(list: VerletListId) -> Self {
        VerletListInteraction {
            list,
            potentials: PotentialTable::default(),
        }
    }

    pub fn list(&self) -> VerletListId {
        self.list
    }

    pub fn set_potential(&mut self, t1: ParticleType, t2: ParticleType, potential: P) {
        self.potentials.set(t1, t2, potential);
    }

    pub fn potential_mut(&mut self, t1: ParticleType, t2: ParticleType) -> Option<&mut P> {
        self.potentials.get_mut(t1, t2)
    }

    pub fn potentials(&self) -> &PotentialTable<P> {
        &self.potentials
    }

    pub fn potentials_mut(&mut self) -> &mut PotentialTable<P> {
        &mut self.potentials
    }

    fn node_forces(&self, list: &VerletList, domain: &mut NodeDomain) -> Result<()> {
        for &(a, b) in list.pairs(domain.rank()) {
            let sa = domain.site(a);
            let sb = domain.site(b);
            let potential = self.potentials.get(sa.ptype, sb.ptype)?;
            let d = sa.position - sb.position;
            let f = potential.pair_force(&sa, &sb, &d);
            domain.add_force(a, f);
            domain.add_force(b, -f);
        }
        Ok(())
    }

    /// Sum of `g(potential, site_a, site_b, d)` over every pair.
    fn pair_sum<T, G>(
        &self,
        storage: &DomainDecomposition,
        lists: &VerletLists,
        bc: &OrthorhombicBC,
        g: G,
    ) -> Result<T>
    where
        T: Send + Sum<T>,
        G: Fn(&P, &Site, &Site, &Vector3<f64>) -> T + Sync,
    {
        let list = lists.fresh(self.list, storage, bc)?;
        let partial = storage
            .domains()
            .par_iter()
            .map(|domain| {
                list.pairs(domain.rank())
                    .iter()
                    .map(|&(a, b)| {
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

impl<P: Potential + 'static> Interaction for VerletListInteraction<P> {
    fn name(&self) -> &str {
        "verlet-list pair"
    }

    fn add_forces(
        &self,
        storage: &mut DomainDecomposition,
        lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<()> {
        let list = lists.fresh(self.list, storage, bc)?;
        storage
            .domains_mut()
            .par_iter_mut()
            .map(|domain| self.node_forces(list, domain))
            .collect()
    }

    fn compute_energy(
        &self,
        storage: &DomainDecomposition,
        lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<f64> {
        self.pair_sum(storage, lists, bc, |p, a, b, d| p.pair_energy(a, b, d))
    }

    fn compute_virial_tensor(
        &self,
        storage: &DomainDecomposition,
        lists: &VerletLists,
        bc: &OrthorhombicBC,
    ) -> Result<Matrix3<f64>> {
        self.pair_sum(storage, lists, bc, |p, a, b, d| d * p.pair_force(a, b, d).transpose())
    }

    fn max_cutoff(&self) -> Option<f64> {
        self.potentials.values().map(|p| p.cutoff()).reduce(f64::max)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
