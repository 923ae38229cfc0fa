//! Property kinds and their lattices
//!
//! A property kind names one analysis dimension (e.g. "field immutability
//! level", "receiver type set") together with the lattice its values live
//! in. Kinds are registered before any computation runs; the registry hands
//! out dense ids used everywhere else.

use std::fmt;

use super::property::Property;

/// Dense id for a registered property kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKindId(u32);

impl PropertyKindId {
    pub(crate) fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PropertyKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.0)
    }
}

/// Lattice of one property kind
///
/// The engine relies on three contracts the registering analysis must
/// uphold:
/// - `leq` is a partial order and `join` its least upper bound
/// - the lattice has finite height (termination depends on it)
/// - the fallback, when declared, dominates any value a computation could
///   validly have withheld, so forced finalization is sound
pub trait Lattice: Send + Sync + 'static {
    /// Human-readable kind name (diagnostics only)
    fn name(&self) -> &str;

    /// Partial order: `a ⊑ b`
    fn leq(&self, a: &Property, b: &Property) -> bool;

    /// Least upper bound; combines contributions from independent
    /// computations feeding the same kind
    fn join(&self, a: &Property, b: &Property) -> Property;

    /// Most conservative / least precise element; initial value of every
    /// lazily-created EPS
    fn bottom(&self) -> Property;

    /// Sound default installed at forced finalization. Kinds without a
    /// fallback cannot be left Interim at quiescence.
    fn fallback(&self) -> Option<Property> {
        None
    }
}
