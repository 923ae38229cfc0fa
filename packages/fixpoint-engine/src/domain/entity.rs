//! Opaque entity identifiers
//!
//! An entity names a program element under analysis (method, field, call
//! site, allocation site). Ownership stays with the registering analysis:
//! the engine only ever hashes and compares entities, it never inspects
//! what they stand for.

use std::fmt;

/// Opaque, externally-owned identifier for a program element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u64);

impl Entity {
    /// Wrap an externally-assigned id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id (round-trips back to the owning analysis)
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}
