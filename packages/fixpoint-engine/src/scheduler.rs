//! Task queue and eager/lazy computation registration
//!
//! The queue is a mutex-protected deque with an in-flight counter: a pop
//! marks the task in flight under the same lock, so "queue empty and
//! nothing in flight" is an exact quiescence test for the polling workers.
//! Lazy factories are installed at most once per kind, the first time any
//! EPK of that kind is queried without an existing computation; kinds that
//! are never queried never run (pull-based cost avoidance).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::domain::epk::Epk;
use crate::domain::kind::PropertyKindId;
use crate::domain::result::Computation;
use crate::tracker::ContinuationId;

/// Builds a kind's computation on first query
///
/// Factories must only construct the computation closure; querying the
/// store from a factory is not supported.
pub(crate) type LazyFactory = Box<dyn Fn() -> Computation + Send + Sync>;

/// Unit of work for the worker pool
pub(crate) enum Task {
    /// Run a registered computation for an EPK
    Compute { epk: Epk, computation: Computation },
    /// Resume a suspended continuation (claimed at execution time; a
    /// duplicate wake-up claims nothing and is a no-op)
    Resume { id: ContinuationId },
}

pub(crate) struct Scheduler {
    queue: Mutex<VecDeque<Task>>,
    in_flight: AtomicUsize,
    /// Lazy factories not yet invoked
    lazy: DashMap<PropertyKindId, LazyFactory>,
    /// Per-kind computations installed from lazy factories
    installed: DashMap<PropertyKindId, Computation>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            lazy: DashMap::new(),
            installed: DashMap::new(),
        }
    }

    pub fn push(&self, task: Task) {
        self.queue.lock().push_back(task);
    }

    /// Pop a task, marking it in flight under the queue lock
    pub fn pop(&self) -> Option<Task> {
        let mut queue = self.queue.lock();
        let task = queue.pop_front()?;
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Some(task)
    }

    pub fn task_done(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// No runnable work left anywhere
    pub fn is_idle(&self) -> bool {
        let queue = self.queue.lock();
        queue.is_empty() && self.in_flight.load(Ordering::Acquire) == 0
    }

    /// Record a factory for a kind, invoked only on first demand
    ///
    /// One factory per kind: the first registration wins and later ones
    /// are rejected. Multiple contributors to a kind go through eager
    /// per-entity scheduling, not competing factories.
    pub fn register_lazy(&self, kind: PropertyKindId, factory: LazyFactory) {
        if self.installed.contains_key(&kind) {
            warn!(%kind, "lazy computation already registered for kind; ignoring");
            return;
        }
        match self.lazy.entry(kind) {
            Entry::Occupied(_) => {
                warn!(%kind, "lazy computation already registered for kind; ignoring");
            }
            Entry::Vacant(entry) => {
                entry.insert(factory);
            }
        }
    }

    /// Computation serving queries for a kind, if any
    ///
    /// Invokes the kind's lazy factory exactly once; concurrent callers
    /// serialize on the installed-map entry.
    pub fn computation_for(&self, kind: PropertyKindId) -> Option<Computation> {
        match self.installed.entry(kind) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (_, factory) = self.lazy.remove(&kind)?;
                let computation = factory();
                entry.insert(computation.clone());
                Some(computation)
            }
        }
    }

    /// Factories never invoked (lazy-avoidance accounting)
    pub fn lazy_pending(&self) -> usize {
        self.lazy.len()
    }
}
