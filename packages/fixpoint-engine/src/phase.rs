//! Run phase state machine
//!
//! `Running -> Quiescent -> Resolving -> (Running | Done)`. Quiescence is
//! detected when the task queue is drained and nothing is in flight;
//! Resolving breaks remaining cycles by installing fallback values. The
//! deliberately simple global-quiescence strategy (instead of SCC-based
//! cycle detection) trades occasionally finalizing a wider batch of EPKs
//! for O(1) bookkeeping per cycle.

use parking_lot::Mutex;
use tracing::debug;

/// Phase of a fixpoint run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Workers draining the queue
    Running,
    /// No runnable work left
    Quiescent,
    /// Forcing fallback finalization of remaining Interim EPKs
    Resolving,
    /// Every EPK Final; results extractable
    Done,
}

pub(crate) struct PhaseManager {
    current: Mutex<Phase>,
}

impl PhaseManager {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Phase::Running),
        }
    }

    pub fn current(&self) -> Phase {
        *self.current.lock()
    }

    pub fn set(&self, next: Phase) {
        let mut current = self.current.lock();
        if *current != next {
            debug!(from = ?*current, to = ?next, "phase transition");
            *current = next;
        }
    }
}
