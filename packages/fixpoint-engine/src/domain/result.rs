//! Computation results, continuations, and dependee snapshots
//!
//! A computation never blocks a worker thread waiting on another EPK.
//! Blocking is structural: when inputs are incomplete it returns
//! `Interim` with its full dependee set and a continuation, and the
//! tracker re-invokes the continuation once a dependee updates.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::entity::Entity;
use super::epk::{Epk, Eps};
use super::property::Property;
use crate::engine::QueryContext;

/// Error raised by an analysis computation (always fatal for the run)
pub type AnalysisError = Box<dyn std::error::Error + Send + Sync>;

/// What a computation or continuation hands back to the engine
pub type AnalysisResult = Result<ComputationResult, AnalysisError>;

/// Registered computation function for one entity
///
/// Reads of other EPKs go through the [`QueryContext`] so the engine can
/// verify the declared dependee set against the reads that actually
/// happened.
pub type Computation = Arc<dyn Fn(Entity, &QueryContext) -> AnalysisResult + Send + Sync>;

/// Suspended remainder of a computation, re-invoked with a fresh snapshot
/// of all its declared dependees once at least one of them updates
pub type Continuation = Box<dyn FnOnce(&DependeeSnapshot) -> AnalysisResult + Send>;

/// Result of running a computation (or continuation) once
pub enum ComputationResult {
    /// The property is known exactly; the EPK becomes Final.
    Final(Property),

    /// Partial result: `value` is the best currently-known property,
    /// `dependees` the complete set of EPKs the result still depends on.
    /// Reads of Interim EPKs outside `dependees` are a contract violation.
    Interim {
        value: Property,
        dependees: Vec<Epk>,
        continuation: Continuation,
    },
}

impl ComputationResult {
    /// Interim helper
    pub fn interim(
        value: Property,
        dependees: Vec<Epk>,
        continuation: impl FnOnce(&DependeeSnapshot) -> AnalysisResult + Send + 'static,
    ) -> Self {
        ComputationResult::Interim {
            value,
            dependees,
            continuation: Box::new(continuation),
        }
    }
}

impl fmt::Debug for ComputationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputationResult::Final(p) => f.debug_tuple("Final").field(p).finish(),
            ComputationResult::Interim {
                value, dependees, ..
            } => f
                .debug_struct("Interim")
                .field("value", value)
                .field("dependees", dependees)
                .finish_non_exhaustive(),
        }
    }
}

/// Current store state of a continuation's declared dependees, re-queried
/// at the moment the continuation is re-run (never a stale registration-time
/// snapshot)
#[derive(Debug, Clone)]
pub struct DependeeSnapshot {
    states: FxHashMap<Epk, Eps>,
}

impl DependeeSnapshot {
    pub(crate) fn new(states: FxHashMap<Epk, Eps>) -> Self {
        Self { states }
    }

    /// Full state of one dependee
    pub fn eps(&self, epk: &Epk) -> Option<&Eps> {
        self.states.get(epk)
    }

    /// Current property of one dependee
    pub fn property(&self, epk: &Epk) -> Option<&Property> {
        self.states.get(epk).map(|eps| &eps.property)
    }

    /// Whether a dependee is already Final
    pub fn is_final(&self, epk: &Epk) -> bool {
        self.states.get(epk).map_or(false, |eps| eps.is_final())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
