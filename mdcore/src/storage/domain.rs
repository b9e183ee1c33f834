use std::collections::HashMap;

use nalgebra::Vector3;
use tracing::error;

use super::exchange::{ForceMessage, GhostExport, GhostMessage, GhostUpdate, MigrationMessage};
use super::grid::Grid;
use super::nan_max;
use crate::bc::OrthorhombicBC;
use crate::error::{MdError, Result};
use crate::particle::{Ghost, Particle, ParticleId, Site};

/// Particles, cells and ghosts owned by one worker.
///
/// Slots address both kinds of particles: slot `i < n_local()` is the local
/// particle `i`, any larger slot is the ghost `i - n_local()`.
#[derive(Debug, Clone)]
pub struct NodeDomain {
    rank: usize,
    node: [usize; 3],
    pub(crate) particles: Vec<Particle>,
    pub(crate) ghosts: Vec<Ghost>,
    pub(crate) cells: Vec<Vec<usize>>,
    pub(crate) exports: Vec<GhostExport>,
    reference_positions: Vec<Vector3<f64>>,
    index: HashMap<ParticleId, Vec<usize>>,
}

impl NodeDomain {
    pub(crate) fn new(rank: usize, grid: &Grid) -> Self {
        NodeDomain {
            rank,
            node: grid.node_of(rank),
            particles: Vec::new(),
            ghosts: Vec::new(),
            cells: vec![Vec::new(); grid.frame_len()],
            exports: Vec::new(),
            reference_positions: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn node(&self) -> [usize; 3] {
        self.node
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn ghosts(&self) -> &[Ghost] {
        &self.ghosts
    }

    pub fn cells(&self) -> &[Vec<usize>] {
        &self.cells
    }

    #[inline]
    pub fn n_local(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn is_local(&self, slot: usize) -> bool {
        slot < self.particles.len()
    }

    #[inline]
    pub fn site(&self, slot: usize) -> Site {
        let n = self.particles.len();
        if slot < n {
            Site::from(&self.particles[slot])
        } else {
            Site::from(&self.ghosts[slot - n])
        }
    }

    #[inline]
    pub fn id(&self, slot: usize) -> ParticleId {
        let n = self.particles.len();
        if slot < n {
            self.particles[slot].id
        } else {
            self.ghosts[slot - n].id
        }
    }

    #[inline]
    pub fn position(&self, slot: usize) -> Vector3<f64> {
        let n = self.particles.len();
        if slot < n {
            self.particles[slot].position
        } else {
            self.ghosts[slot - n].position
        }
    }

    #[inline]
    pub fn add_force(&mut self, slot: usize, force: Vector3<f64>) {
        let n = self.particles.len();
        if slot < n {
            self.particles[slot].force += force;
        } else {
            self.ghosts[slot - n].force += force;
        }
    }

    /// All slots (local first, then ghost images) holding particle `id`.
    pub fn slots_of(&self, id: ParticleId) -> &[usize] {
        self.index.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Local slot of particle `id`, if this node owns it.
    pub fn local_slot(&self, id: ParticleId) -> Option<usize> {
        self.slots_of(id).iter().copied().find(|&s| self.is_local(s))
    }

    /// Slot of the image of `id` closest to `reference`.
    pub fn nearest_image(&self, id: ParticleId, reference: &Vector3<f64>) -> Option<usize> {
        self.slots_of(id).iter().copied().min_by(|&a, &b| {
            let da = (self.position(a) - reference).norm_squared();
            let db = (self.position(b) - reference).norm_squared();
            da.total_cmp(&db)
        })
    }

    pub fn zero_forces(&mut self) {
        for p in &mut self.particles {
            p.force = Vector3::zeros();
        }
        for g in &mut self.ghosts {
            g.force = Vector3::zeros();
        }
    }

    /// Largest displacement of a local particle since the last decomposition.
    pub fn max_displacement(&self) -> f64 {
        self.particles
            .iter()
            .zip(&self.reference_positions)
            .map(|(p, r)| (p.position - r).norm())
            .fold(0.0, nan_max)
    }

    /// True if a local particle's folded position lies in another node's
    /// region.
    pub fn has_strays(&self, grid: &Grid, bc: &OrthorhombicBC) -> bool {
        self.particles
            .iter()
            .any(|p| grid.locate(&bc.folded_position(&p.position)).0 != self.rank)
    }

    pub(crate) fn resize_frame(&mut self, grid: &Grid) {
        self.node = grid.node_of(self.rank);
        self.cells = vec![Vec::new(); grid.frame_len()];
    }

    /// Fold every local particle into the box and pull out those that now
    /// belong to another node.
    pub(crate) fn extract_migrants(
        &mut self,
        grid: &Grid,
        bc: &OrthorhombicBC,
    ) -> Result<Vec<MigrationMessage>> {
        for p in &self.particles {
            p.validate()?;
        }
        let mut kept = Vec::with_capacity(self.particles.len());
        let mut outbox = Vec::new();
        for mut p in self.particles.drain(..) {
            bc.fold(&mut p.position, &mut p.velocity);
            let (owner, _) = grid.locate(&p.position);
            if owner == self.rank {
                kept.push(p);
            } else {
                outbox.push(MigrationMessage { to: owner, particle: p });
            }
        }
        self.particles = kept;
        Ok(outbox)
    }

    pub(crate) fn receive_migrants(&mut self, inbox: Vec<MigrationMessage>) {
        self.particles.extend(inbox.into_iter().map(|m| m.particle));
    }

    /// Sort local particles into real cells and drop every ghost.
    pub(crate) fn rebuild_cells(&mut self, grid: &Grid) -> Result<()> {
        self.ghosts.clear();
        self.exports.clear();
        for cell in &mut self.cells {
            cell.clear();
        }
        for (i, p) in self.particles.iter().enumerate() {
            let (owner, cell) = grid.locate(&p.position);
            if owner != self.rank {
                error!(
                    id = p.id,
                    rank = self.rank,
                    owner,
                    position = ?p.position,
                    "particle left its node region"
                );
                return Err(MdError::OutsideDomain {
                    id: p.id,
                    rank: self.rank,
                    position: [p.position.x, p.position.y, p.position.z],
                });
            }
            self.cells[grid.frame_index(cell)].push(i);
        }
        Ok(())
    }

    /// Ghost messages for every periodic image of a local particle that lands
    /// in the ghost frame of some node (this one included).
    pub(crate) fn pack_ghosts(&self, grid: &Grid, bc: &OrthorhombicBC) -> Vec<GhostMessage> {
        let node_grid = grid.node_grid();
        let sheared = bc.is_sheared();
        let mut outbox = Vec::new();
        let mut candidates: [Vec<usize>; 3] = Default::default();

        for (i, p) in self.particles.iter().enumerate() {
            for sz in -1i32..=1 {
                // a sheared image can be displaced by up to one extra box along x
                let sx_range = if sheared && sz != 0 { -2i32..=2 } else { -1i32..=1 };
                for sy in -1i32..=1 {
                    for sx in sx_range.clone() {
                        let image = [sx, sy, sz];
                        let shift = bc.image_shift(image);
                        let y = p.position + shift;
                        for dim in 0..3 {
                            candidates[dim].clear();
                            candidates[dim].extend(
                                (0..node_grid[dim])
                                    .filter(|&k| grid.frame_offset(dim, k, y[dim]).is_some()),
                            );
                        }
                        for &kz in &candidates[2] {
                            for &ky in &candidates[1] {
                                for &kx in &candidates[0] {
                                    let to = grid.rank_of([kx, ky, kz]);
                                    if to == self.rank && image == [0, 0, 0] {
                                        continue;
                                    }
                                    outbox.push(GhostMessage {
                                        to,
                                        id: p.id,
                                        ptype: p.ptype,
                                        charge: p.charge,
                                        position: y,
                                        velocity: p.velocity + bc.image_velocity(image),
                                        owner: self.rank,
                                        owner_index: i,
                                        image,
                                        shift,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        outbox
    }

    pub(crate) fn receive_ghosts(&mut self, inbox: Vec<GhostMessage>, grid: &Grid) {
        let n_local = self.particles.len();
        let cell_grid = grid.cell_grid();
        self.ghosts.reserve(inbox.len());
        for m in inbox {
            let mut cell = [0usize; 3];
            for dim in 0..3 {
                let t = grid
                    .frame_offset(dim, self.node[dim], m.position[dim])
                    .unwrap_or(-1)
                    .clamp(-1, cell_grid[dim] as i64);
                cell[dim] = (t + 1) as usize;
            }
            let slot = n_local + self.ghosts.len();
            self.cells[grid.frame_index(cell)].push(slot);
            self.ghosts.push(Ghost {
                id: m.id,
                ptype: m.ptype,
                charge: m.charge,
                position: m.position,
                velocity: m.velocity,
                force: Vector3::zeros(),
                owner: m.owner,
                owner_index: m.owner_index,
            });
        }
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.index.clear();
        let n_local = self.particles.len();
        for (i, p) in self.particles.iter().enumerate() {
            self.index.entry(p.id).or_default().push(i);
        }
        for (g, ghost) in self.ghosts.iter().enumerate() {
            self.index.entry(ghost.id).or_default().push(n_local + g);
        }
    }

    pub(crate) fn record_reference_positions(&mut self) {
        self.reference_positions.clear();
        self.reference_positions
            .extend(self.particles.iter().map(|p| p.position));
    }

    /// Fresh positions and velocities for every ghost this node exports.
    /// `shear_drift` is the shear displacement accumulated since the ghosts
    /// were created.
    pub(crate) fn pack_ghost_updates(&self, bc: &OrthorhombicBC, shear_drift: f64) -> Vec<GhostUpdate> {
        self.exports
            .iter()
            .map(|e| {
                let p = &self.particles[e.local];
                let drift = Vector3::new(e.image[2] as f64 * shear_drift, 0.0, 0.0);
                GhostUpdate {
                    to: e.to,
                    ghost: e.ghost,
                    position: p.position + e.shift + drift,
                    velocity: p.velocity + bc.image_velocity(e.image),
                }
            })
            .collect()
    }

    pub(crate) fn apply_ghost_updates(&mut self, inbox: Vec<GhostUpdate>) {
        for m in inbox {
            let ghost = &mut self.ghosts[m.ghost];
            ghost.position = m.position;
            ghost.velocity = m.velocity;
        }
    }

    /// Move ghost forces into messages for their owners.
    pub(crate) fn drain_ghost_forces(&mut self) -> Vec<ForceMessage> {
        let mut outbox = Vec::new();
        for ghost in &mut self.ghosts {
            if ghost.force != Vector3::zeros() {
                outbox.push(ForceMessage {
                    to: ghost.owner,
                    index: ghost.owner_index,
                    force: ghost.force,
                });
                ghost.force = Vector3::zeros();
            }
        }
        outbox
    }

    pub(crate) fn apply_forces(&mut self, inbox: Vec<ForceMessage>) {
        for m in inbox {
            self.particles[m.index].force += m.force;
        }
    }
}
