/*
 * Fixpoint Engine - Concurrent Lattice-Based Fixpoint Computation
 *
 * Generic core that static analyses (alias, immutability, call-graph
 * construction, escape analysis) plug into. Analyses register lattices and
 * computations over opaque entities; the engine schedules them on a bounded
 * worker pool, tracks cross-analysis dependencies, and converges to a sound
 * global fixpoint even across cyclic dependencies.
 *
 * Architecture:
 * - domain/     : Entities, properties, lattices, EPK/EPS state
 * - registry    : Property kind catalog (order, bottom, fallback)
 * - store       : Single source of truth, per-EPK atomic updates
 * - tracker     : Suspended continuations indexed by dependee EPK
 * - scheduler   : Task queue + rayon worker pool, eager/lazy computations
 * - phase       : Running -> Quiescent -> Resolving -> Done state machine
 * - engine      : Public facade (registration, query, run control)
 *
 * Guarantees:
 * - Per-EPK property histories are monotone in the lattice order
 * - Final values are immutable for the remainder of the run
 * - Continuations observe the latest store values on every wake-up
 * - Lazily-registered computations that are never queried never run
 */

#![allow(clippy::new_without_default)]
#![allow(clippy::type_complexity)]

pub mod domain;
pub mod engine;
pub mod errors;
pub mod phase;
pub mod registry;
pub mod store;

mod scheduler;
mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for the public API
pub use domain::entity::Entity;
pub use domain::epk::{Epk, Eps, Finality, UpdateOutcome};
pub use domain::kind::{Lattice, PropertyKindId};
pub use domain::property::{Property, PropertyValue};
pub use domain::result::{
    AnalysisError, AnalysisResult, Computation, ComputationResult, Continuation, DependeeSnapshot,
};
pub use engine::{EngineConfig, FixpointEngine, QueryContext, SolveStats};
pub use errors::{EngineError, EngineResult};
pub use phase::Phase;
