//! Domain model for the fixpoint engine
//!
//! - `entity`: opaque program-element identifiers
//! - `property`: dynamically-typed lattice values
//! - `kind`: property kinds and their lattices
//! - `epk`: entity/kind keys and stored state
//! - `result`: computation results, continuations, snapshots

pub mod entity;
pub mod epk;
pub mod kind;
pub mod property;
pub mod result;
