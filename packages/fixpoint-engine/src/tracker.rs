//! Dependency tracker: suspended continuations and wake-up resolution
//!
//! Cyclic dependency graphs are represented without reference cycles: store
//! cells index subscribed continuations by id, and the tracker owns the
//! continuations themselves. Claiming a continuation is an atomic map
//! removal, so however many dependees update concurrently, exactly one
//! notifier resumes it; stale ids left in other subscriber lists are
//! skipped when popped.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::domain::epk::Epk;
use crate::domain::result::Continuation;
use crate::store::PropertyStore;

/// Id a suspended continuation is indexed under
pub(crate) type ContinuationId = u64;

/// A computation parked on its declared dependee set
pub(crate) struct Suspended {
    /// The EPK this continuation computes
    pub target: Epk,
    pub continuation: Continuation,
    /// Complete declared dependee set (snapshot keys at resume time)
    pub dependees: Vec<Epk>,
}

/// Outcome of parking a continuation
pub(crate) enum SuspendResult {
    /// Waiting for a dependee notification
    Parked,
    /// A dependee already advanced or finalized between the computation's
    /// read and its subscription; resume immediately instead of waiting for
    /// a notification that already fired
    ResumeNow(ContinuationId),
}

pub(crate) struct DependencyTracker {
    suspended: DashMap<ContinuationId, Mutex<Suspended>>,
    /// Target EPK -> pending continuation ids, for discarding dead
    /// continuations at forced finalization. A set, not a single id:
    /// several contributors to one EPK may be parked at once.
    by_target: DashMap<Epk, FxHashSet<ContinuationId>>,
    next_id: AtomicU64,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self {
            suspended: DashMap::new(),
            by_target: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Park a continuation under each of its dependees
    ///
    /// `dependees` pairs each EPK with the revision the computation
    /// observed. Subscription happens under the dependee's cell lock; any
    /// revision mismatch (or an already-Final dependee) means a wake-up may
    /// already have been missed, so the caller must re-schedule.
    pub fn suspend(
        &self,
        store: &PropertyStore,
        target: Epk,
        continuation: Continuation,
        dependees: Vec<(Epk, u64)>,
    ) -> SuspendResult {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let dependee_keys: Vec<Epk> = dependees.iter().map(|(epk, _)| *epk).collect();

        // Registered before subscribing so a concurrent notifier can claim
        self.by_target.entry(target).or_default().insert(id);
        self.suspended.insert(
            id,
            Mutex::new(Suspended {
                target,
                continuation,
                dependees: dependee_keys,
            }),
        );

        let mut stale = false;
        for (epk, observed_revision) in &dependees {
            let (cell, _) = store.ensure_cell(*epk);
            let mut st = cell.state.lock();
            if st.eps.is_final() || st.eps.revision != *observed_revision {
                stale = true;
                break;
            }
            st.subscribers.push(id);
        }

        if stale {
            SuspendResult::ResumeNow(id)
        } else {
            SuspendResult::Parked
        }
    }

    /// Atomically take ownership of a suspended continuation
    ///
    /// Returns `None` when another notifier already claimed it.
    pub fn claim(&self, id: ContinuationId) -> Option<Suspended> {
        let (_, cell) = self.suspended.remove(&id)?;
        let suspended = cell.into_inner();
        if let Some(mut ids) = self.by_target.get_mut(&suspended.target) {
            ids.remove(&id);
        }
        self.by_target
            .remove_if(&suspended.target, |_, ids| ids.is_empty());
        Some(suspended)
    }

    /// Drop every continuation computing `target`, returning how many were
    /// discarded
    ///
    /// Used when `target` is force-finalized: its pending computations are
    /// dead and must never run against a now-Final EPK. All of them go —
    /// leaving any one behind would let a later dependee wake-up resume it
    /// against the finalized target.
    pub fn discard_for_target(&self, target: Epk) -> usize {
        let Some((_, ids)) = self.by_target.remove(&target) else {
            return 0;
        };
        let mut dropped = 0;
        for id in ids {
            if self.suspended.remove(&id).is_some() {
                dropped += 1;
            }
        }
        dropped
    }

    /// Number of parked continuations
    pub fn pending(&self) -> usize {
        self.suspended.len()
    }
}
