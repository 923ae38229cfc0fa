//! Entity/kind keys and stored state
//!
//! `Epk` is the addressable unit the store indexes by; `Eps` is what it
//! holds for one key: the current property, its finality, and a per-key
//! revision counter used to detect missed wake-ups.

use std::fmt;

use super::entity::Entity;
use super::kind::PropertyKindId;
use super::property::Property;

/// Entity + property kind: the store's key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Epk {
    pub entity: Entity,
    pub kind: PropertyKindId,
}

impl Epk {
    pub fn new(entity: Entity, kind: PropertyKindId) -> Self {
        Self { entity, kind }
    }
}

impl fmt::Display for Epk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.entity, self.kind)
    }
}

/// Finality flag of a stored property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    /// May still advance in the lattice order
    Interim,
    /// Immutable for the remainder of the run
    Final,
}

impl Finality {
    pub fn is_final(&self) -> bool {
        matches!(self, Finality::Final)
    }
}

/// Stored state of one EPK
///
/// `revision` strictly increases on every observable change (value advance
/// or finalization). A continuation subscribing against a dependee records
/// the revision it observed; a mismatch at subscription time means the
/// dependee already moved and the continuation must be re-scheduled
/// immediately instead of waiting for a notification that already fired.
#[derive(Debug, Clone)]
pub struct Eps {
    pub property: Property,
    pub finality: Finality,
    pub revision: u64,
}

impl Eps {
    pub fn new(property: Property, finality: Finality, revision: u64) -> Self {
        Self {
            property,
            finality,
            revision,
        }
    }

    /// Fresh interim state at bottom (revision 0)
    pub fn interim_bottom(bottom: Property) -> Self {
        Self::new(bottom, Finality::Interim, 0)
    }

    pub fn is_final(&self) -> bool {
        self.finality.is_final()
    }
}

/// What an update did to the stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The stored value strictly advanced in the lattice order
    pub advanced: bool,
    /// The EPK became Final with this update
    pub finalized: bool,
}
