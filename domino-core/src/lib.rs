#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! # Domino Core
//!
//! Deterministic world-simulation primitives: fixed-point arithmetic,
//! named-stream RNG, the shared domain vocabulary (policy, budget,
//! refusal taxonomy, histograms), the per-subsystem field resolvers
//! (energy, heat, fluid, information, crafting), and the serialization
//! and hashing layers that make a world's state reproducible across
//! runs and machines.
//!
//! ## Determinism
//!
//! Every resolver in this crate is a pure function of its inputs: the
//! live state, a tick and `tick_delta`, and an explicit [`rng::Rng`]
//! seed derived from `(world_seed, domain_id, process_id, tick)`. No
//! resolver reads wall-clock time, thread-local state, or hash-map
//! iteration order. [`hash::hash_world`] exists so two runs fed the
//! same fixture can be compared bit-for-bit.
//!
//! ## Budgets and refusal
//! Every operation that can fail returns a [`domain::QueryMeta`] rather
//! than panicking; exhausted [`domain::Budget`]s and policy violations
//! both surface as a [`domain::Refusal`] instead of an `Err`, since
//! refusal is an expected outcome, not an error condition.

pub mod crafting;
pub mod domain;
pub mod energy;
pub mod error;
pub mod fixed;
pub mod fluid;
pub mod hash;
pub mod heat;
pub mod information;
pub mod registry;
pub mod rng;
pub mod serialize;

pub use domain::{
    Aabb, Archival, Budget, Confidence, DomainState, Existence, Histogram, Point, Policy,
    QueryMeta, Refusal, Resolution, Status,
};
pub use error::{DomainError, Result};
pub use fixed::{Q16, Q16_ONE, Q16_UNKNOWN, Q48, Q48_ONE};
pub use hash::{hash_chunk, hash_world, ChunkMeta, WorldHash, WorldMeta};
pub use registry::{Registry, SubsystemDescriptor, SubsystemId};
pub use rng::{RngState, SeedContext, SeedMix};

/// Common imports for a crate consuming `domino-core` to drive a
/// resolver loop.
pub mod prelude {
    pub use crate::domain::{Budget, Policy, QueryMeta, Refusal};
    pub use crate::fixed::{Q16, Q48};
    pub use crate::registry::{Registry, SubsystemDescriptor, SubsystemId};
    pub use crate::rng::{RngState, SeedContext, SeedMix};
    pub use crate::{crafting, energy, fluid, hash, heat, information, serialize};
}
