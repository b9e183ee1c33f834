//! Verlet neighbor lists built from the cell frames.

use std::collections::HashSet;

use itertools::iproduct;
use rayon::prelude::*;
use tracing::{debug, error};

use crate::bc::OrthorhombicBC;
use crate::error::{MdError, Result};
use crate::particle::ParticleId;
use crate::storage::{DomainDecomposition, Grid, NodeDomain};

/// Handle of a Verlet list registered with a [`crate::system::System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerletListId(pub(crate) usize);

impl VerletListId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Pairs of slots within `cutoff + skin`, one list per node.
///
/// The first slot of a pair is always a local particle. A pair is stored on
/// the node owning the particle with the smaller id, so every pair of
/// periodic images appears once over all nodes.
#[derive(Debug, Clone)]
pub struct VerletList {
    cutoff: f64,
    skin: f64,
    exclusions: HashSet<(ParticleId, ParticleId)>,
    pairs: Vec<Vec<(usize, usize)>>,
    built_for: Option<u64>,
    builds: usize,
}

impl VerletList {
    pub fn new(cutoff: f64, skin: f64) -> Result<Self> {
        if !(cutoff > 0.0) || !(skin >= 0.0) {
            return Err(MdError::Configuration(format!(
                "verlet list needs a positive cutoff and non-negative skin, got {} and {}",
                cutoff, skin
            )));
        }
        Ok(VerletList {
            cutoff,
            skin,
            exclusions: HashSet::new(),
            pairs: Vec::new(),
            built_for: None,
            builds: 0,
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn skin(&self) -> f64 {
        self.skin
    }

    /// Number of times the list was (re)built.
    pub fn builds(&self) -> usize {
        self.builds
    }

    pub fn built_for(&self) -> Option<u64> {
        self.built_for
    }

    /// Exclude particle pairs from the list. Takes effect at the next build.
    pub fn exclude<I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (ParticleId, ParticleId)>,
    {
        self.exclusions
            .extend(pairs.into_iter().map(|(a, b)| (a.min(b), a.max(b))));
        self.built_for = None;
    }

    pub fn is_excluded(&self, a: ParticleId, b: ParticleId) -> bool {
        self.exclusions.contains(&(a.min(b), a.max(b)))
    }

    pub fn n_exclusions(&self) -> usize {
        self.exclusions.len()
    }

    pub fn pairs(&self, rank: usize) -> &[(usize, usize)] {
        self.pairs.get(rank).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_size(&self) -> usize {
        self.pairs.iter().map(Vec::len).sum()
    }

    pub fn build(&mut self, storage: &DomainDecomposition) -> Result<()> {
        if !storage.is_decomposed() {
            return Err(MdError::NotDecomposed);
        }
        let range = self.cutoff + self.skin;
        storage.grid().check_cell_size(range)?;
        let range2 = range * range;
        let grid = storage.grid();
        let exclusions = &self.exclusions;
        self.pairs = storage
            .domains()
            .par_iter()
            .map(|d| node_pairs(d, grid, range2, exclusions))
            .collect();
        self.built_for = Some(storage.generation());
        self.builds += 1;
        debug!(
            cutoff = self.cutoff,
            pairs = self.total_size(),
            generation = storage.generation(),
            "built verlet list"
        );
        Ok(())
    }

    /// True if the list may miss a pair within `cutoff`.
    pub fn is_stale(&self, storage: &DomainDecomposition, bc: &OrthorhombicBC) -> bool {
        if storage.is_dirty() || self.built_for != Some(storage.generation()) {
            return true;
        }
        !(2.0 * storage.max_displacement() + storage.shear_drift(bc) <= self.skin)
    }

    /// Fail with full diagnostics if the list cannot be used for evaluation.
    pub fn ensure_fresh(
        &self,
        id: VerletListId,
        storage: &DomainDecomposition,
        bc: &OrthorhombicBC,
    ) -> Result<()> {
        if !self.is_stale(storage, bc) {
            return Ok(());
        }
        let err = MdError::StaleNeighborList {
            list: id.0,
            built: self.built_for,
            current: storage.generation(),
            max_displacement: storage.max_displacement(),
            skin: self.skin,
        };
        error!(%err, shear_drift = storage.shear_drift(bc), "refusing to evaluate forces");
        Err(err)
    }
}

fn node_pairs(
    domain: &NodeDomain,
    grid: &Grid,
    range2: f64,
    exclusions: &HashSet<(ParticleId, ParticleId)>,
) -> Vec<(usize, usize)> {
    let cells = domain.cells();
    let mut pairs = Vec::new();
    for cell in grid.real_cells() {
        for &a in &cells[grid.frame_index(cell)] {
            if !domain.is_local(a) {
                continue;
            }
            let id_a = domain.id(a);
            let pos_a = domain.position(a);
            for (dz, dy, dx) in iproduct!(0..3, 0..3, 0..3) {
                let neighbor = [cell[0] + dx - 1, cell[1] + dy - 1, cell[2] + dz - 1];
                for &b in &cells[grid.frame_index(neighbor)] {
                    let id_b = domain.id(b);
                    if id_a >= id_b || exclusions.contains(&(id_a, id_b)) {
                        continue;
                    }
                    if (domain.position(b) - pos_a).norm_squared() <= range2 {
                        pairs.push((a, b));
                    }
                }
            }
        }
    }
    pairs
}

/// The Verlet lists of a system, addressed by [`VerletListId`].
///
/// Removing a list leaves its slot empty so other handles stay valid.
#[derive(Debug, Clone, Default)]
pub struct VerletLists {
    lists: Vec<Option<VerletList>>,
}

impl VerletLists {
    pub fn insert(&mut self, list: VerletList) -> VerletListId {
        self.lists.push(Some(list));
        VerletListId(self.lists.len() - 1)
    }

    pub fn remove(&mut self, id: VerletListId) -> Result<VerletList> {
        self.lists
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(MdError::UnknownVerletList(id.0))
    }

    pub fn len(&self) -> usize {
        self.lists.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: VerletListId) -> Result<&VerletList> {
        self.lists
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(MdError::UnknownVerletList(id.0))
    }

    pub fn get_mut(&mut self, id: VerletListId) -> Result<&mut VerletList> {
        self.lists
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(MdError::UnknownVerletList(id.0))
    }

    /// A list checked against the current storage state.
    pub fn fresh(
        &self,
        id: VerletListId,
        storage: &DomainDecomposition,
        bc: &OrthorhombicBC,
    ) -> Result<&VerletList> {
        let list = self.get(id)?;
        list.ensure_fresh(id, storage, bc)?;
        Ok(list)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VerletListId, &VerletList)> + '_ {
        self.lists
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().map(|l| (VerletListId(i), l)))
    }

    pub fn max_cutoff(&self) -> Option<f64> {
        self.lists.iter().flatten().map(VerletList::cutoff).reduce(f64::max)
    }

    pub fn build_all(&mut self, storage: &DomainDecomposition) -> Result<()> {
        self.lists.iter_mut().flatten().try_for_each(|l| l.build(storage))
    }

    pub fn any_stale(&self, storage: &DomainDecomposition, bc: &OrthorhombicBC) -> bool {
        self.lists.iter().flatten().any(|l| l.is_stale(storage, bc))
    }
}
