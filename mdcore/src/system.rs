//! The simulation context: box, storage, neighbor lists and interactions.

use nalgebra::{Matrix3, Vector3};
use tracing::{debug, info};

use crate::analysis::{ShearStress, Snapshot};
use crate::bc::OrthorhombicBC;
use crate::error::{MdError, Result};
use crate::interaction::Interaction;
use crate::particle::{ParticleId, ParticleProperties};
use crate::storage::DomainDecomposition;
use crate::verlet::{VerletList, VerletListId, VerletLists};

/// Handle of an interaction registered with a [`System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InteractionId(usize);

impl InteractionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

pub struct System {
    pub bc: OrthorhombicBC,
    pub storage: DomainDecomposition,
    skin: f64,
    verlet_lists: VerletLists,
    interactions: Vec<Option<Box<dyn Interaction>>>,
    shear_stress: ShearStress,
}

impl System {
    pub fn new(bc: OrthorhombicBC, storage: DomainDecomposition, skin: f64) -> Result<Self> {
        if !(skin >= 0.0) {
            return Err(MdError::Configuration(format!("skin must be non-negative, got {}", skin)));
        }
        if storage.grid().box_l() != bc.box_l() {
            return Err(MdError::Configuration(
                "storage grid and boundary conditions disagree on the box".into(),
            ));
        }
        Ok(System {
            bc,
            storage,
            skin,
            verlet_lists: VerletLists::default(),
            interactions: Vec::new(),
            shear_stress: ShearStress::default(),
        })
    }

    /// Build a system whose storage is split over `n_workers` node domains
    /// with cells of at least `rc + skin`.
    pub fn with_workers(bc: OrthorhombicBC, n_workers: usize, rc: f64, skin: f64) -> Result<Self> {
        let storage = DomainDecomposition::with_workers(&bc, n_workers, rc, skin)?;
        info!(
            workers = n_workers,
            node_grid = ?storage.grid().node_grid(),
            cell_grid = ?storage.grid().cell_grid(),
            "created domain decomposition"
        );
        Self::new(bc, storage, skin)
    }

    pub fn skin(&self) -> f64 {
        self.skin
    }

    pub fn add_particle(
        &mut self,
        id: ParticleId,
        position: Vector3<f64>,
        props: ParticleProperties,
    ) -> Result<()> {
        self.storage.add_particle(&self.bc, id, position, props)
    }

    /// Decompose the storage and rebuild every Verlet list.
    pub fn decompose(&mut self) -> Result<()> {
        self.storage.decompose(&self.bc)?;
        self.verlet_lists.build_all(&self.storage)
    }

    pub fn update_ghosts(&mut self) -> Result<()> {
        self.storage.update_ghosts(&self.bc)
    }

    /// True if forces cannot be evaluated before the next decomposition:
    /// ownership is out of date or some Verlet list is stale.
    pub fn needs_rebuild(&self) -> bool {
        self.storage.needs_decompose(&self.bc) || self.verlet_lists.any_stale(&self.storage, &self.bc)
    }

    /// Resize the cells to the largest Verlet list cutoff and decompose.
    pub fn cell_adjust(&mut self) -> Result<()> {
        let rc = self.verlet_lists.max_cutoff().ok_or_else(|| {
            MdError::Configuration("cell adjustment needs at least one verlet list".into())
        })?;
        self.storage.cell_adjust(&self.bc, rc, self.skin)?;
        self.verlet_lists.build_all(&self.storage)
    }

    pub fn add_verlet_list(&mut self, cutoff: f64) -> Result<VerletListId> {
        let mut list = VerletList::new(cutoff, self.skin)?;
        if self.storage.is_decomposed() && !self.storage.is_dirty() {
            list.build(&self.storage)?;
        }
        let id = self.verlet_lists.insert(list);
        debug!(list = id.index(), cutoff, "added verlet list");
        Ok(id)
    }

    /// Drop a list that no interaction or extension uses any more.
    pub fn remove_verlet_list(&mut self, id: VerletListId) -> Result<VerletList> {
        let list = self.verlet_lists.remove(id)?;
        debug!(list = id.index(), "removed verlet list");
        Ok(list)
    }

    pub fn verlet_list(&self, id: VerletListId) -> Result<&VerletList> {
        self.verlet_lists.get(id)
    }

    /// Mutable access, e.g. to add exclusions. The list is rebuilt at the next
    /// decomposition.
    pub fn verlet_list_mut(&mut self, id: VerletListId) -> Result<&mut VerletList> {
        self.verlet_lists.get_mut(id)
    }

    pub fn verlet_lists(&self) -> &VerletLists {
        &self.verlet_lists
    }

    /// Split borrow used by extensions that add pair forces themselves.
    pub fn storage_and_lists(&mut self) -> (&mut DomainDecomposition, &VerletLists, &OrthorhombicBC) {
        (&mut self.storage, &self.verlet_lists, &self.bc)
    }

    pub fn add_interaction<I: Interaction>(&mut self, interaction: I) -> InteractionId {
        debug!(name = interaction.name(), "added interaction");
        self.interactions.push(Some(Box::new(interaction)));
        InteractionId(self.interactions.len() - 1)
    }

    pub fn remove_interaction(&mut self, id: InteractionId) -> Result<Box<dyn Interaction>> {
        let removed = self
            .interactions
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(MdError::UnknownInteraction(id.0))?;
        debug!(name = removed.name(), "removed interaction");
        Ok(removed)
    }

    pub fn interaction(&self, id: InteractionId) -> Result<&dyn Interaction> {
        self.interactions
            .get(id.0)
            .and_then(Option::as_deref)
            .ok_or(MdError::UnknownInteraction(id.0))
    }

    /// Concrete access to an interaction, e.g. to change potential parameters
    /// between runs.
    pub fn interaction_mut<T: Interaction>(&mut self, id: InteractionId) -> Result<&mut T> {
        self.interactions
            .get_mut(id.0)
            .and_then(Option::as_deref_mut)
            .and_then(|i| i.as_any_mut().downcast_mut::<T>())
            .ok_or(MdError::UnknownInteraction(id.0))
    }

    pub fn interactions(&self) -> impl Iterator<Item = (InteractionId, &dyn Interaction)> + '_ {
        self.interactions
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_deref().map(|it| (InteractionId(i), it)))
    }

    /// Zero all forces, add every interaction and return ghost forces to
    /// their owners.
    pub fn compute_forces(&mut self) -> Result<()> {
        if !self.storage.is_decomposed() {
            return Err(MdError::NotDecomposed);
        }
        self.storage.zero_forces();
        for interaction in self.interactions.iter().flatten() {
            interaction.add_forces(&mut self.storage, &self.verlet_lists, &self.bc)?;
        }
        self.storage.collect_ghost_forces();
        Ok(())
    }

    pub fn interaction_energy(&self, id: InteractionId) -> Result<f64> {
        self.interaction(id)?
            .compute_energy(&self.storage, &self.verlet_lists, &self.bc)
    }

    /// Total potential energy of all interactions.
    pub fn compute_energy(&self) -> Result<f64> {
        self.interactions()
            .map(|(_, i)| i.compute_energy(&self.storage, &self.verlet_lists, &self.bc))
            .sum()
    }

    pub fn compute_virial(&self) -> Result<f64> {
        self.interactions()
            .map(|(_, i)| i.compute_virial(&self.storage, &self.verlet_lists, &self.bc))
            .sum()
    }

    pub fn compute_virial_tensor(&self) -> Result<Matrix3<f64>> {
        self.interactions()
            .map(|(_, i)| i.compute_virial_tensor(&self.storage, &self.verlet_lists, &self.bc))
            .sum()
    }

    pub fn shear_stress(&self) -> ShearStress {
        self.shear_stress
    }

    /// Add one force evaluation's dissipative xz stress.
    pub fn record_shear_stress(&mut self, xz: f64) {
        self.shear_stress.record(xz);
    }

    pub fn reset_shear_stress(&mut self) {
        self.shear_stress = ShearStress::default();
    }

    pub fn snapshot(&self, step: u64, time: f64) -> Result<Snapshot> {
        Snapshot::capture(self, step, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::VerletListInteraction;
    use crate::potential::{LennardJones, LennardJonesCapped};
    use approx::assert_relative_eq;

    fn lj_pair(r: f64) -> (System, InteractionId) {
        let bc = OrthorhombicBC::cubic(10.0).unwrap();
        let mut system = System::with_workers(bc, 1, 2.5, 0.3).unwrap();
        system
            .add_particle(0, Vector3::new(5.0, 5.0, 5.0), ParticleProperties::default())
            .unwrap();
        system
            .add_particle(1, Vector3::new(5.0 + r, 5.0, 5.0), ParticleProperties::default())
            .unwrap();
        let list = system.add_verlet_list(2.5).unwrap();
        let mut lj = VerletListInteraction::new(list);
        lj.set_potential(0, 0, LennardJones::new(1.0, 1.0, 2.5).unwrap());
        let id = system.add_interaction(lj);
        system.decompose().unwrap();
        (system, id)
    }

    #[test]
    fn test_forces_require_decomposition() {
        let bc = OrthorhombicBC::cubic(10.0).unwrap();
        let mut system = System::with_workers(bc, 1, 2.5, 0.3).unwrap();
        assert!(matches!(system.compute_forces(), Err(MdError::NotDecomposed)));
    }

    #[test]
    fn test_interaction_downcast_and_removal() {
        let (mut system, id) = lj_pair(1.5);
        assert!(system
            .interaction_mut::<VerletListInteraction<LennardJonesCapped>>(id)
            .is_err());
        let lj = system
            .interaction_mut::<VerletListInteraction<LennardJones>>(id)
            .unwrap();
        lj.potential_mut(0, 0).unwrap().epsilon = 2.0;
        let e = system.compute_energy().unwrap();
        assert_relative_eq!(e, 2.0 * 4.0 * (1.5f64.powi(-12) - 1.5f64.powi(-6)), epsilon = 1e-12);

        system.remove_interaction(id).unwrap();
        assert_eq!(system.compute_energy().unwrap(), 0.0);
        assert!(matches!(
            system.remove_interaction(id),
            Err(MdError::UnknownInteraction(_))
        ));
    }

    #[test]
    fn test_stale_list_is_fatal() {
        let (mut system, _) = lj_pair(1.5);
        system.storage.particle_mut(1).unwrap().position.x += 0.2;
        assert!(system.needs_rebuild());
        let err = system.compute_forces().unwrap_err();
        assert!(matches!(err, MdError::StaleNeighborList { .. }));
        system.decompose().unwrap();
        system.compute_forces().unwrap();
    }

    #[test]
    fn test_missing_type_pair_is_fatal() {
        let (mut system, _) = lj_pair(1.5);
        system
            .add_particle(2, Vector3::new(5.0, 6.0, 5.0), ParticleProperties::default().with_type(1))
            .unwrap();
        system.decompose().unwrap();
        assert!(matches!(
            system.compute_forces(),
            Err(MdError::MissingPotential { .. })
        ));
    }

    #[test]
    fn test_cell_adjust_follows_largest_cutoff() {
        let (mut system, _) = lj_pair(1.5);
        assert_eq!(system.storage.grid().cell_grid(), [3, 3, 3]);
        system.add_verlet_list(4.0).unwrap();
        system.cell_adjust().unwrap();
        assert_eq!(system.storage.grid().cell_grid(), [2, 2, 2]);
        assert!(!system.needs_rebuild());
    }
}
