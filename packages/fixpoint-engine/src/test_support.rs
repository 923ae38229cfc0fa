//! Shared lattices for unit tests

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::kind::{Lattice, PropertyKindId};
use crate::domain::property::Property;
use crate::registry::KindRegistry;

/// Element of a finite total order 0..=top
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level(pub u8);

/// Total-order lattice over `Level`
pub struct ChainLattice {
    name: String,
    fallback: u8,
    #[allow(dead_code)]
    top: u8,
}

impl ChainLattice {
    pub fn new(name: impl Into<String>, top: u8, fallback: u8) -> Self {
        Self {
            name: name.into(),
            top,
            fallback,
        }
    }
}

fn level(p: &Property) -> u8 {
    p.downcast_ref::<Level>().expect("level property").0
}

impl Lattice for ChainLattice {
    fn name(&self) -> &str {
        &self.name
    }

    fn leq(&self, a: &Property, b: &Property) -> bool {
        level(a) <= level(b)
    }

    fn join(&self, a: &Property, b: &Property) -> Property {
        Property::new(Level(level(a).max(level(b))))
    }

    fn bottom(&self) -> Property {
        Property::new(Level(0))
    }

    fn fallback(&self) -> Option<Property> {
        Some(Property::new(Level(self.fallback)))
    }
}

/// Registry with a single chain kind
pub fn chain_registry(top: u8, fallback: u8) -> (Arc<KindRegistry>, PropertyKindId) {
    let registry = Arc::new(KindRegistry::new());
    let kind = registry.register(Arc::new(ChainLattice::new("chain", top, fallback)));
    (registry, kind)
}

/// Powerset element (e.g. a receiver type set)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSet(pub BTreeSet<u32>);

impl TypeSet {
    pub fn of(items: &[u32]) -> Self {
        Self(items.iter().copied().collect())
    }
}

/// Subset lattice over `TypeSet`, fallback = declared universe
pub struct SetLattice {
    universe: BTreeSet<u32>,
}

impl SetLattice {
    pub fn new(universe: &[u32]) -> Self {
        Self {
            universe: universe.iter().copied().collect(),
        }
    }
}

fn set(p: &Property) -> &BTreeSet<u32> {
    &p.downcast_ref::<TypeSet>().expect("type-set property").0
}

impl Lattice for SetLattice {
    fn name(&self) -> &str {
        "type-set"
    }

    fn leq(&self, a: &Property, b: &Property) -> bool {
        set(a).is_subset(set(b))
    }

    fn join(&self, a: &Property, b: &Property) -> Property {
        Property::new(TypeSet(set(a).union(set(b)).copied().collect()))
    }

    fn bottom(&self) -> Property {
        Property::new(TypeSet(BTreeSet::new()))
    }

    fn fallback(&self) -> Option<Property> {
        Some(Property::new(TypeSet(self.universe.clone())))
    }
}
