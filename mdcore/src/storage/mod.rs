//! Domain-decomposed particle storage.
//!
//! Every node domain exclusively owns its local particles and cells. Ghost
//! copies of particles near a region boundary are created at decomposition
//! and refreshed between decompositions through explicit messages (see
//! [`exchange`]).

pub mod domain;
pub mod exchange;
pub mod grid;

use std::collections::HashSet;

use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::debug;

pub use domain::NodeDomain;
pub use grid::{cell_grid, node_grid, Grid};

use crate::bc::OrthorhombicBC;
use crate::error::{MdError, Result};
use crate::particle::{Particle, ParticleId, ParticleProperties};
use exchange::{route, GhostExport, GhostMessage};

/// Maximum that propagates NaN instead of dropping it.
pub(crate) fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

#[derive(Debug, Clone)]
pub struct DomainDecomposition {
    grid: Grid,
    domains: Vec<NodeDomain>,
    ids: HashSet<ParticleId>,
    generation: u64,
    decomposed: bool,
    dirty: bool,
    shear_total_at_build: f64,
}

impl DomainDecomposition {
    pub fn new(bc: &OrthorhombicBC, node_grid: [usize; 3], cell_grid: [usize; 3]) -> Result<Self> {
        let grid = Grid::new(bc.box_l(), node_grid, cell_grid)?;
        let domains = (0..grid.n_nodes()).map(|rank| NodeDomain::new(rank, &grid)).collect();
        Ok(DomainDecomposition {
            grid,
            domains,
            ids: HashSet::new(),
            generation: 0,
            decomposed: false,
            dirty: false,
            shear_total_at_build: 0.0,
        })
    }

    /// Pick node and cell grids for `n_workers` workers and an interaction
    /// range of `rc + skin`.
    pub fn with_workers(bc: &OrthorhombicBC, n_workers: usize, rc: f64, skin: f64) -> Result<Self> {
        let nodes = node_grid(n_workers, bc.box_l(), rc, skin)?;
        let cells = cell_grid(bc.box_l(), nodes, rc, skin)?;
        Self::new(bc, nodes, cells)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn n_nodes(&self) -> usize {
        self.domains.len()
    }

    pub fn domains(&self) -> &[NodeDomain] {
        &self.domains
    }

    pub fn domains_mut(&mut self) -> &mut [NodeDomain] {
        &mut self.domains
    }

    pub fn n_particles(&self) -> usize {
        self.ids.len()
    }

    /// Incremented by every decomposition. Verlet lists remember the
    /// generation they were built for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_decomposed(&self) -> bool {
        self.decomposed
    }

    /// True if particles were added since the last decomposition.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Shear displacement accumulated since the last decomposition.
    pub fn shear_drift(&self, bc: &OrthorhombicBC) -> f64 {
        (bc.shear_total() - self.shear_total_at_build).abs()
    }

    /// Add a particle to the node owning its (folded) position.
    pub fn add_particle(
        &mut self,
        bc: &OrthorhombicBC,
        id: ParticleId,
        position: Vector3<f64>,
        props: ParticleProperties,
    ) -> Result<()> {
        if self.ids.contains(&id) {
            return Err(MdError::DuplicateParticle(id));
        }
        let mut particle = Particle::new(id, position, props);
        particle.validate()?;
        bc.fold(&mut particle.position, &mut particle.velocity);
        let (rank, _) = self.grid.locate(&particle.position);
        self.domains[rank].particles.push(particle);
        self.ids.insert(id);
        self.dirty = true;
        Ok(())
    }

    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles().find(|p| p.id == id)
    }

    pub fn particle_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles_mut().find(|p| p.id == id)
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.domains.iter().flat_map(|d| d.particles.iter())
    }

    pub fn particles_mut(&mut self) -> impl Iterator<Item = &mut Particle> + '_ {
        self.domains.iter_mut().flat_map(|d| d.particles.iter_mut())
    }

    /// Reassign every particle to the node and cell owning its position and
    /// rebuild the ghost frames. Invalidates every Verlet list.
    pub fn decompose(&mut self, bc: &OrthorhombicBC) -> Result<()> {
        let n_nodes = self.domains.len();
        let grid = &self.grid;

        let outboxes = self
            .domains
            .par_iter_mut()
            .map(|d| d.extract_migrants(grid, bc))
            .collect::<Result<Vec<_>>>()?;
        let migrated: usize = outboxes.iter().map(Vec::len).sum();
        let inboxes = route(outboxes, n_nodes);
        self.domains
            .par_iter_mut()
            .zip(inboxes.into_par_iter())
            .for_each(|(d, inbox)| d.receive_migrants(inbox));

        self.domains
            .par_iter_mut()
            .map(|d| d.rebuild_cells(grid))
            .collect::<Result<()>>()?;

        let outboxes: Vec<Vec<GhostMessage>> =
            self.domains.par_iter().map(|d| d.pack_ghosts(grid, bc)).collect();
        // ghosts are appended on the receiver in sender-rank order
        let mut received = vec![0usize; n_nodes];
        for (domain, outbox) in self.domains.iter_mut().zip(&outboxes) {
            domain.exports = outbox
                .iter()
                .map(|m| {
                    let ghost = received[m.to];
                    received[m.to] += 1;
                    GhostExport {
                        to: m.to,
                        ghost,
                        local: m.owner_index,
                        image: m.image,
                        shift: m.shift,
                    }
                })
                .collect();
        }
        let inboxes = route(outboxes, n_nodes);
        self.domains
            .par_iter_mut()
            .zip(inboxes.into_par_iter())
            .for_each(|(d, inbox)| {
                d.receive_ghosts(inbox, grid);
                d.rebuild_index();
                d.record_reference_positions();
            });

        self.generation += 1;
        self.decomposed = true;
        self.dirty = false;
        self.shear_total_at_build = bc.shear_total();
        debug!(
            generation = self.generation,
            migrated,
            ghosts = received.iter().sum::<usize>(),
            "decomposed storage"
        );
        Ok(())
    }

    /// Copy owner positions and velocities onto their ghosts.
    pub fn update_ghosts(&mut self, bc: &OrthorhombicBC) -> Result<()> {
        if !self.decomposed {
            return Err(MdError::NotDecomposed);
        }
        let drift = bc.shear_total() - self.shear_total_at_build;
        let outboxes: Vec<_> = self
            .domains
            .par_iter()
            .map(|d| d.pack_ghost_updates(bc, drift))
            .collect();
        let inboxes = route(outboxes, self.domains.len());
        self.domains
            .par_iter_mut()
            .zip(inboxes.into_par_iter())
            .for_each(|(d, inbox)| d.apply_ghost_updates(inbox));
        Ok(())
    }

    /// Add the forces accumulated on ghosts to their owners and clear them.
    pub fn collect_ghost_forces(&mut self) {
        let outboxes: Vec<_> = self
            .domains
            .par_iter_mut()
            .map(|d| d.drain_ghost_forces())
            .collect();
        let inboxes = route(outboxes, self.domains.len());
        self.domains
            .par_iter_mut()
            .zip(inboxes.into_par_iter())
            .for_each(|(d, inbox)| d.apply_forces(inbox));
    }

    pub fn zero_forces(&mut self) {
        self.domains.par_iter_mut().for_each(NodeDomain::zero_forces);
    }

    /// Largest particle displacement since the last decomposition.
    pub fn max_displacement(&self) -> f64 {
        self.domains
            .par_iter()
            .map(NodeDomain::max_displacement)
            .reduce(|| 0.0, nan_max)
    }

    /// True if ownership or ghost coverage may be wrong: never decomposed,
    /// particles added, a particle moved more than half a cell or left its
    /// node's region. A non-finite displacement always asks for a rebuild.
    pub fn needs_decompose(&self, bc: &OrthorhombicBC) -> bool {
        if !self.decomposed || self.dirty {
            return true;
        }
        if !(self.max_displacement() <= 0.5 * self.grid.min_cell_size()) {
            return true;
        }
        self.domains.par_iter().any(|d| d.has_strays(&self.grid, bc))
    }

    /// Resize the cells for a new interaction range `rc + skin`, keeping the
    /// node grid, and decompose.
    pub fn cell_adjust(&mut self, bc: &OrthorhombicBC, rc: f64, skin: f64) -> Result<()> {
        let cells = cell_grid(bc.box_l(), self.grid.node_grid(), rc, skin)?;
        if cells != self.grid.cell_grid() {
            debug!(old = ?self.grid.cell_grid(), new = ?cells, "adjusting cell grid");
            self.grid = Grid::new(bc.box_l(), self.grid.node_grid(), cells)?;
            let grid = &self.grid;
            for domain in &mut self.domains {
                domain.resize_frame(grid);
            }
        }
        self.decompose(bc)
    }
}
