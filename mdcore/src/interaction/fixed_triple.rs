use std::any::Any;
use std::collections::HashMap;
use std::iter::Sum;

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use tracing::error;

use super::Interaction;
use crate::bc::OrthorhombicBC;
use crate::error::{MdError, Result};
use crate::particle::{ParticleId, ParticleType};
use crate::potential::AngularPotential;
use crate::storage::{DomainDecomposition, NodeDomain};
use crate::verlet::VerletLists;

/// Explicit list of angle triples `(i, j, k)` with `j` at the apex.
#[derive(Debug, Clone, Default)]
pub struct FixedTripleList {
    triples: Vec<(ParticleId, ParticleId, ParticleId)>,
}

impl FixedTripleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, i: ParticleId, j: ParticleId, k: ParticleId) {
        self.triples.push((i, j, k));
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticleId, ParticleId, ParticleId)> + '_ {
        self.triples.iter().copied()
    }
}

impl FromIterator<(ParticleId, ParticleId, ParticleId)> for FixedTripleList {
    fn from_iter<I: IntoIterator<Item = (ParticleId, ParticleId, ParticleId)>>(iter: I) -> Self {
        FixedTripleList {
            triples: iter.into_iter().collect(),
        }
    }
}

type TripleKey = (ParticleType, ParticleType, ParticleType);

#[inline]
fn triple_key(t1: ParticleType, t2: ParticleType, t3: ParticleType) -> TripleKey {
    if t1 <= t3 {
        (t1, t2, t3)
    } else {
        (t3, t2, t1)
    }
}

/// Angular potential applied to the triples of a [`FixedTripleList`].
///
/// A triple is evaluated on the node owning its apex particle.
#[derive(Debug, Clone)]
pub struct FixedTripleListInteraction<A> {
    triples: FixedTripleList,
    by_types: HashMap<TripleKey, A>,
    fallback: Option<A>,
}

impl<A: AngularPotential + 'static> FixedTripleListInteraction<A> {
    pub fn new(triples: FixedTripleList) -> Self {
        FixedTripleListInteraction {
            triples,
            by_types: HashMap::new(),
            fallback: None,
        }
    }

    pub fn with_potential(triples: FixedTripleList, potential: A) -> Self {
        let mut interaction = Self::new(triples);
        interaction.fallback = Some(potential);
        interaction
    }

    /// Register a potential for `(t1, t2, t3)`; `(t3, t2, t1)` resolves to it
    /// as well.
    pub fn set_potential(&mut self, t1: ParticleType, t2: ParticleType, t3: ParticleType, potential: A) {
        self.by_types.insert(triple_key(t1, t2, t3), potential);
    }

    fn potential(&self, t1: ParticleType, t2: ParticleType, t3: ParticleType) -> Result<&A> {
        self.by_types
            .get(&triple_key(t1, t2, t3))
            .or(self.fallback.as_ref())
            .ok_or(MdError::MissingAngularPotential {
                type1: t1,
                type2: t2,
                type3: t3,
            })
    }

    /// Slots of the two outer particles (nearest images to the apex) and the
    /// apex, for every triple owned by `domain`.
    fn resolve(&self, domain: &NodeDomain) -> Result<Vec<[usize; 3]>> {
        let mut resolved = Vec::new();
        for (i, j, k) in self.triples.iter() {
            let Some(apex) = domain.local_slot(j) else {
                continue;
            };
            let center = domain.position(apex);
            let missing = |partner| {
                error!(id = j, partner, rank = domain.rank(), "angle partner not found");
                MdError::MissingBondPartner {
                    id: j,
                    partner,
                    rank: domain.rank(),
                }
            };
            let a = domain.nearest_image(i, &center).ok_or_else(|| missing(i))?;
            let c = domain.nearest_image(k, &center).ok_or_else(|| missing(k))?;
            resolved.push([a, apex, c]);
        }
        Ok(resolved)
    }

    fn geometry(&self, domain: &NodeDomain, [a, b, c]: [usize; 3]) -> Result<(&A, Vector3<f64>, Vector3<f64>)> {
        let (s1, s2, s3) = (domain.site(a), domain.site(b), domain.site(c));
        let potential = self.potential(s1.ptype, s2.ptype, s3.ptype)?;
        Ok((potential, s1.position - s2.position, s3.position - s2.position))
    }

    fn triple_sum<T, G>(&self, storage: &DomainDecomposition, g: G) -> Result<T>
    where
        T: Send + Sum<T>,
        G: Fn(&A, &Vector3<f64>, &Vector3<f64>) -> T + Sync,
    {
        if !storage.is_decomposed() {
            return Err(MdError::NotDecomposed);
        }
        let partial = storage
            .domains()
            .par_iter()
            .map(|domain| {
                self.resolve(domain)?
                    .into_iter()
                    .map(|slots| {
                        let (potential, d12, d32) = self.geometry(domain, slots)?;
                        Ok(g(potential, &d12, &d32))
                    })
                    .sum::<Result<T>>()
            })
            .collect::<Result<Vec<T>>>()?;
        Ok(partial.into_iter().sum())
    }
}

impl<A: AngularPotential + 'static> Interaction for FixedTripleListInteraction<A> {
    fn name(&self) -> &str {
        "fixed triple list"
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
                for slots in self.resolve(domain)? {
                    let (potential, d12, d32) = self.geometry(domain, slots)?;
                    let (f1, f3) = potential.triple_forces(&d12, &d32);
                    domain.add_force(slots[0], f1);
                    domain.add_force(slots[1], -(f1 + f3));
                    domain.add_force(slots[2], f3);
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
        self.triple_sum(storage, |p, d12, d32| p.triple_energy(d12, d32))
    }

    fn compute_virial_tensor(
        &self,
        storage: &DomainDecomposition,
        _lists: &VerletLists,
        _bc: &OrthorhombicBC,
    ) -> Result<Matrix3<f64>> {
        self.triple_sum(storage, |p, d12, d32| {
            let (f1, f3) = p.triple_forces(d12, d32);
            d12 * f1.transpose() + d32 * f3.transpose()
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
