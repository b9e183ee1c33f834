use thiserror::Error;

use crate::particle::{ParticleId, ParticleType};

/// Errors raised by the engine.
///
/// Configuration errors come from bad input and are reported as soon as the
/// input is seen. Consistency errors mean an invariant of the engine was
/// broken; they carry enough state to diagnose the failure and are never
/// retried.
#[derive(Debug, Error)]
pub enum MdError {
    #[error("Particle id {0} is already present")]
    DuplicateParticle(ParticleId),

    #[error("Particle {id} has a non-finite or invalid {field}")]
    NonFinite { id: ParticleId, field: &'static str },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("No potential registered for particle types ({type1}, {type2})")]
    MissingPotential {
        type1: ParticleType,
        type2: ParticleType,
    },

    #[error("No angular potential registered for particle types ({type1}, {type2}, {type3})")]
    MissingAngularPotential {
        type1: ParticleType,
        type2: ParticleType,
        type3: ParticleType,
    },

    #[error("Invalid tabulated data: {0}")]
    Table(String),

    #[error("Cell edge {cell_size:.6} in dimension {dim} is smaller than cutoff + skin = {required:.6}")]
    CellTooSmall {
        dim: usize,
        cell_size: f64,
        required: f64,
    },

    #[error("Storage must be decomposed before forces or energies are evaluated")]
    NotDecomposed,

    #[error(
        "Verlet list {list} is stale: built for generation {built:?}, storage is at {current}, \
         max displacement {max_displacement:.6}, skin {skin:.6}"
    )]
    StaleNeighborList {
        list: usize,
        built: Option<u64>,
        current: u64,
        max_displacement: f64,
        skin: f64,
    },

    #[error("Particle {id} at {position:?} lies outside the region of node {rank}")]
    OutsideDomain {
        id: ParticleId,
        rank: usize,
        position: [f64; 3],
    },

    #[error("Bonded partner {partner} of particle {id} is not visible on node {rank}")]
    MissingBondPartner {
        id: ParticleId,
        partner: ParticleId,
        rank: usize,
    },

    #[error("Unknown verlet list handle {0}")]
    UnknownVerletList(usize),

    #[error("Unknown interaction handle {0}")]
    UnknownInteraction(usize),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MdError>;
