//! Messages exchanged between node domains.
//!
//! Nodes never read each other's particle arrays. Every exchange is a parallel
//! pack pass over nodes, a routing step, then a parallel unpack pass; the
//! routing step is the barrier between the two passes.

use nalgebra::Vector3;

use crate::particle::{Particle, ParticleId, ParticleType};

pub trait Addressed {
    /// Rank of the receiving node.
    fn destination(&self) -> usize;
}

/// A particle leaving its node after its position crossed a region boundary.
#[derive(Debug, Clone)]
pub struct MigrationMessage {
    pub to: usize,
    pub particle: Particle,
}

/// Creates a ghost on the receiving node.
#[derive(Debug, Clone)]
pub struct GhostMessage {
    pub to: usize,
    pub id: ParticleId,
    pub ptype: ParticleType,
    pub charge: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub owner: usize,
    pub owner_index: usize,
    pub image: [i32; 3],
    pub shift: Vector3<f64>,
}

/// Refreshes an existing ghost between decompositions.
#[derive(Debug, Clone)]
pub struct GhostUpdate {
    pub to: usize,
    pub ghost: usize,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

/// Returns the force accumulated on a ghost to the owning node.
#[derive(Debug, Clone)]
pub struct ForceMessage {
    pub to: usize,
    pub index: usize,
    pub force: Vector3<f64>,
}

/// Send-side record of a ghost, kept by the owning node until the next
/// decomposition.
#[derive(Debug, Clone)]
pub(crate) struct GhostExport {
    pub to: usize,
    pub ghost: usize,
    pub local: usize,
    pub image: [i32; 3],
    pub shift: Vector3<f64>,
}

macro_rules! addressed {
    ($($ty:ty),*) => {
        $(impl Addressed for $ty {
            #[inline]
            fn destination(&self) -> usize {
                self.to
            }
        })*
    };
}

addressed!(MigrationMessage, GhostMessage, GhostUpdate, ForceMessage);

/// Deliver every outbox into per-node inboxes. Messages arrive ordered by
/// sending rank, then by the order they were packed.
pub fn route<M: Addressed>(outboxes: Vec<Vec<M>>, n_nodes: usize) -> Vec<Vec<M>> {
    let mut inboxes: Vec<Vec<M>> = (0..n_nodes).map(|_| Vec::new()).collect();
    for outbox in outboxes {
        for message in outbox {
            let to = message.destination();
            inboxes[to].push(message);
        }
    }
    inboxes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_preserves_sender_order() {
        let outboxes = vec![
            vec![
                ForceMessage { to: 1, index: 0, force: Vector3::x() },
                ForceMessage { to: 1, index: 1, force: Vector3::y() },
            ],
            vec![ForceMessage { to: 0, index: 5, force: Vector3::z() }],
            vec![ForceMessage { to: 1, index: 2, force: Vector3::z() }],
        ];
        let inboxes = route(outboxes, 3);
        assert_eq!(inboxes[0].len(), 1);
        assert_eq!(inboxes[0][0].index, 5);
        let order: Vec<usize> = inboxes[1].iter().map(|m| m.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(inboxes[2].is_empty());
    }
}
