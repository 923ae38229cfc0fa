//! Property kind registry
//!
//! Static catalog of analysis result categories. Each registered kind
//! carries its lattice (partial order, join, bottom) and optional fallback.
//! Kinds are registered before any computation runs; lookups during a run
//! are read-only.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::kind::{Lattice, PropertyKindId};
use crate::domain::property::Property;

struct KindRecord {
    lattice: Arc<dyn Lattice>,
    /// Bottom cached at registration; cloning a Property is an Arc bump
    bottom: Property,
    fallback: Option<Property>,
}

/// Registry of all property kinds of one run
pub struct KindRegistry {
    kinds: RwLock<Vec<KindRecord>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self {
            kinds: RwLock::new(Vec::new()),
        }
    }

    /// Register a lattice, returning its dense kind id
    pub fn register(&self, lattice: Arc<dyn Lattice>) -> PropertyKindId {
        let mut kinds = self.kinds.write();
        let id = PropertyKindId::new(kinds.len() as u32);
        kinds.push(KindRecord {
            bottom: lattice.bottom(),
            fallback: lattice.fallback(),
            lattice,
        });
        id
    }

    pub fn name(&self, kind: PropertyKindId) -> String {
        self.kinds.read()[kind.raw() as usize].lattice.name().to_string()
    }

    pub fn bottom(&self, kind: PropertyKindId) -> Property {
        self.kinds.read()[kind.raw() as usize].bottom.clone()
    }

    pub fn fallback(&self, kind: PropertyKindId) -> Option<Property> {
        self.kinds.read()[kind.raw() as usize].fallback.clone()
    }

    pub fn leq(&self, kind: PropertyKindId, a: &Property, b: &Property) -> bool {
        self.kinds.read()[kind.raw() as usize].lattice.leq(a, b)
    }

    pub fn join(&self, kind: PropertyKindId, a: &Property, b: &Property) -> Property {
        self.kinds.read()[kind.raw() as usize].lattice.join(a, b)
    }

    pub fn len(&self) -> usize {
        self.kinds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
