//! Property store: single source of truth for all EPK state
//!
//! Each EPK maps to a cell whose mutex guards the current `Eps`, the
//! subscriber list, and the computation-scheduled flag together. Updating
//! the value and draining subscribers under one lock makes per-EPK updates
//! totally ordered and closes the missed-wakeup race: a dependee cannot
//! finalize between a computation's read and its subscription without the
//! revision counter exposing it.
//!
//! Update semantics (per kind lattice):
//! - `current ⊑ proposed` installs `proposed`
//! - a strict regression is a fatal `ContractViolation`
//! - incomparable values join: independent computations contributing to the
//!   same kind combine through the lattice, the engine hard-codes no
//!   precedence between them

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::entity::Entity;
use crate::domain::epk::{Epk, Eps, Finality, UpdateOutcome};
use crate::domain::kind::PropertyKindId;
use crate::domain::property::Property;
use crate::errors::{EngineError, EngineResult};
use crate::registry::KindRegistry;
use crate::tracker::ContinuationId;

pub(crate) struct CellState {
    pub eps: Eps,
    /// Continuations to wake on the next observable change (ids only;
    /// the tracker owns the continuations themselves)
    pub subscribers: Vec<ContinuationId>,
    /// A computation has been enqueued for this EPK
    pub compute_scheduled: bool,
}

pub(crate) struct Cell {
    pub state: Mutex<CellState>,
}

impl Cell {
    fn new(bottom: Property) -> Self {
        Self {
            state: Mutex::new(CellState {
                eps: Eps::interim_bottom(bottom),
                subscribers: Vec::new(),
                compute_scheduled: false,
            }),
        }
    }
}

/// Maps (entity, property kind) pairs to property state
pub struct PropertyStore {
    cells: DashMap<Epk, Arc<Cell>>,
    registry: Arc<KindRegistry>,
}

impl PropertyStore {
    pub(crate) fn new(registry: Arc<KindRegistry>) -> Self {
        Self {
            cells: DashMap::new(),
            registry,
        }
    }

    /// Get or lazily create the cell for an EPK (state = bottom, Interim)
    pub(crate) fn ensure_cell(&self, epk: Epk) -> (Arc<Cell>, bool) {
        if let Some(cell) = self.cells.get(&epk) {
            return (Arc::clone(&cell), false);
        }
        let mut created = false;
        let cell = self
            .cells
            .entry(epk)
            .or_insert_with(|| {
                created = true;
                Arc::new(Cell::new(self.registry.bottom(epk.kind)))
            })
            .clone();
        (cell, created)
    }

    /// Current state, if an EPS exists
    pub fn read(&self, epk: Epk) -> Option<Eps> {
        self.cells
            .get(&epk)
            .map(|cell| cell.state.lock().eps.clone())
    }

    /// Install a new property value for an EPK
    ///
    /// Returns what the update did plus the subscribers to wake. Spurious
    /// re-derivations (no advance, no finalization) wake nobody.
    pub(crate) fn update(
        &self,
        epk: Epk,
        proposed: Property,
        is_final: bool,
    ) -> EngineResult<(UpdateOutcome, Vec<ContinuationId>)> {
        let (cell, _) = self.ensure_cell(epk);
        let mut st = cell.state.lock();

        if st.eps.is_final() {
            if st.eps.property == proposed {
                // Re-derivation of the final value: no-op
                return Ok((
                    UpdateOutcome {
                        advanced: false,
                        finalized: false,
                    },
                    Vec::new(),
                ));
            }
            return Err(EngineError::contract(
                epk,
                self.registry.name(epk.kind),
                format!(
                    "update on a Final EPK: {:?} -> {:?}",
                    st.eps.property, proposed
                ),
            ));
        }

        let current = st.eps.property.clone();
        let next = if self.registry.leq(epk.kind, &current, &proposed) {
            proposed
        } else if self.registry.leq(epk.kind, &proposed, &current) {
            return Err(EngineError::contract(
                epk,
                self.registry.name(epk.kind),
                format!("non-monotonic update: {:?} -> {:?}", current, proposed),
            ));
        } else {
            // Incomparable contribution from an independent computation
            self.registry.join(epk.kind, &current, &proposed)
        };

        let advanced = next != current;
        if advanced {
            st.eps.property = next;
        }
        if is_final {
            st.eps.finality = Finality::Final;
        }
        let outcome = UpdateOutcome {
            advanced,
            finalized: is_final,
        };

        if advanced || is_final {
            st.eps.revision += 1;
            let woken = std::mem::take(&mut st.subscribers);
            Ok((outcome, woken))
        } else {
            Ok((outcome, Vec::new()))
        }
    }

    /// Install a kind's fallback as Final (phase manager only)
    ///
    /// Sound because fallbacks are declared to dominate any value the
    /// analysis could validly have withheld; the lattice is still asked to
    /// confirm, and disagreement aborts the run.
    pub(crate) fn force_finalize(
        &self,
        epk: Epk,
        fallback: Property,
    ) -> EngineResult<Vec<ContinuationId>> {
        let (cell, _) = self.ensure_cell(epk);
        let mut st = cell.state.lock();

        if st.eps.is_final() {
            return Ok(Vec::new());
        }
        if !self.registry.leq(epk.kind, &st.eps.property, &fallback) {
            return Err(EngineError::contract(
                epk,
                self.registry.name(epk.kind),
                format!(
                    "fallback {:?} does not dominate current value {:?}",
                    fallback, st.eps.property
                ),
            ));
        }

        debug!(%epk, "forced finalization via fallback");
        st.eps.property = fallback;
        st.eps.finality = Finality::Final;
        st.eps.revision += 1;
        Ok(std::mem::take(&mut st.subscribers))
    }

    /// All EPKs still Interim (drives the resolving phase)
    pub(crate) fn interim_epks(&self) -> Vec<Epk> {
        self.cells
            .iter()
            .filter(|entry| !entry.value().state.lock().eps.is_final())
            .map(|entry| *entry.key())
            .collect()
    }

    /// All Final (entity, property) pairs of a kind: result extraction
    pub fn finals_for_kind(&self, kind: PropertyKindId) -> Vec<(Entity, Property)> {
        self.cells
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .filter_map(|entry| {
                let st = entry.value().state.lock();
                st.eps
                    .is_final()
                    .then(|| (entry.key().entity, st.eps.property.clone()))
            })
            .collect()
    }

    /// Number of EPKs tracked
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of Final EPKs
    pub fn final_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|entry| entry.value().state.lock().eps.is_final())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_registry, Level};

    fn epk(e: u64, k: PropertyKindId) -> Epk {
        Epk::new(Entity::new(e), k)
    }

    #[test]
    fn test_lazy_cell_creation_at_bottom() {
        let (reg, k) = chain_registry(3, 3);
        let store = PropertyStore::new(reg);

        assert!(store.read(epk(1, k)).is_none());
        let (_, created) = store.ensure_cell(epk(1, k));
        assert!(created);

        let eps = store.read(epk(1, k)).unwrap();
        assert!(!eps.is_final());
        assert_eq!(eps.property, Property::new(Level(0)));
        assert_eq!(eps.revision, 0);
    }

    #[test]
    fn test_monotone_advance_bumps_revision() {
        let (reg, k) = chain_registry(3, 3);
        let store = PropertyStore::new(reg);

        let (outcome, _) = store.update(epk(1, k), Property::new(Level(1)), false).unwrap();
        assert!(outcome.advanced);
        assert!(!outcome.finalized);

        let eps = store.read(epk(1, k)).unwrap();
        assert_eq!(eps.property, Property::new(Level(1)));
        assert_eq!(eps.revision, 1);
    }

    #[test]
    fn test_equal_value_does_not_advance() {
        let (reg, k) = chain_registry(3, 3);
        let store = PropertyStore::new(reg);

        store.update(epk(1, k), Property::new(Level(1)), false).unwrap();
        let (outcome, woken) = store.update(epk(1, k), Property::new(Level(1)), false).unwrap();
        assert!(!outcome.advanced);
        assert!(woken.is_empty());
        assert_eq!(store.read(epk(1, k)).unwrap().revision, 1);
    }

    #[test]
    fn test_regression_is_contract_violation() {
        let (reg, k) = chain_registry(3, 3);
        let store = PropertyStore::new(reg);

        store.update(epk(1, k), Property::new(Level(2)), false).unwrap();
        let err = store
            .update(epk(1, k), Property::new(Level(1)), false)
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }

    #[test]
    fn test_final_is_immutable() {
        let (reg, k) = chain_registry(3, 3);
        let store = PropertyStore::new(reg);

        store.update(epk(1, k), Property::new(Level(2)), true).unwrap();

        // Same value: no-op
        let (outcome, _) = store.update(epk(1, k), Property::new(Level(2)), false).unwrap();
        assert!(!outcome.advanced);

        // Larger value: rejection
        let err = store
            .update(epk(1, k), Property::new(Level(3)), false)
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }

    #[test]
    fn test_subscribers_drained_once_on_advance() {
        let (reg, k) = chain_registry(3, 3);
        let store = PropertyStore::new(reg);

        let (cell, _) = store.ensure_cell(epk(1, k));
        cell.state.lock().subscribers.push(41);
        cell.state.lock().subscribers.push(42);

        let (_, woken) = store.update(epk(1, k), Property::new(Level(1)), false).unwrap();
        assert_eq!(woken, vec![41, 42]);

        // Already drained
        let (_, woken) = store.update(epk(1, k), Property::new(Level(2)), false).unwrap();
        assert!(woken.is_empty());
    }

    #[test]
    fn test_force_finalize_checks_domination() {
        let (reg, k) = chain_registry(3, 2);
        let store = PropertyStore::new(reg);

        store.update(epk(1, k), Property::new(Level(3)), false).unwrap();
        // Fallback is Level(2), current is Level(3): fallback below current
        let err = store
            .force_finalize(epk(1, k), Property::new(Level(2)))
            .unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { .. }));
    }

    #[test]
    fn test_force_finalize_installs_fallback() {
        let (reg, k) = chain_registry(3, 2);
        let store = PropertyStore::new(reg);

        store.ensure_cell(epk(1, k));
        store.force_finalize(epk(1, k), Property::new(Level(2))).unwrap();

        let eps = store.read(epk(1, k)).unwrap();
        assert!(eps.is_final());
        assert_eq!(eps.property, Property::new(Level(2)));

        // Idempotent on Final
        let woken = store.force_finalize(epk(1, k), Property::new(Level(2))).unwrap();
        assert!(woken.is_empty());
    }

    #[test]
    fn test_interim_and_final_listing() {
        let (reg, k) = chain_registry(3, 3);
        let store = PropertyStore::new(reg);

        store.update(epk(1, k), Property::new(Level(2)), true).unwrap();
        store.ensure_cell(epk(2, k));

        assert_eq!(store.interim_epks(), vec![epk(2, k)]);
        assert_eq!(store.final_count(), 1);

        let finals = store.finals_for_kind(k);
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].0, Entity::new(1));
        assert_eq!(finals[0].1, Property::new(Level(2)));
    }
}
