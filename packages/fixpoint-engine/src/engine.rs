//! Engine facade: registration, query, run control, result extraction
//!
//! Control flow: an analysis registers a computation for a property kind;
//! the scheduler runs it on the worker pool; it reads the store through a
//! [`QueryContext`] (possibly triggering nested computations); incomplete
//! inputs make it return `Interim` plus its dependee set; the tracker parks
//! the continuation; any dependee update re-schedules it with a fresh
//! snapshot; the phase manager detects global quiescence and breaks
//! remaining cycles with fallback values until every EPK is Final.
//!
//! Failure semantics are binary: a complete, sound fixpoint, or a diagnosed
//! abort on the first fatal error. There is no retry policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::entity::Entity;
use crate::domain::epk::{Epk, Eps};
use crate::domain::kind::{Lattice, PropertyKindId};
use crate::domain::property::Property;
use crate::domain::result::{AnalysisResult, Computation, ComputationResult, DependeeSnapshot};
use crate::errors::{EngineError, EngineResult};
use crate::phase::{Phase, PhaseManager};
use crate::registry::KindRegistry;
use crate::scheduler::{Scheduler, Task};
use crate::store::PropertyStore;
use crate::tracker::{ContinuationId, DependencyTracker, SuspendResult};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size
    pub num_workers: usize,

    /// Safety limit on resolving rounds (0 = unlimited). Exceeding it means
    /// resumed continuations keep minting new interim EPKs, which breaks
    /// the finite-entity-set assumption termination rests on.
    pub max_resolve_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            max_resolve_rounds: 0,
        }
    }
}

impl EngineConfig {
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_max_resolve_rounds(mut self, max_resolve_rounds: usize) -> Self {
        self.max_resolve_rounds = max_resolve_rounds;
        self
    }
}

/// Statistics of one fixpoint run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolveStats {
    /// Computations executed (first runs)
    pub computations: usize,
    /// Continuations resumed
    pub resumes: usize,
    /// Store updates that advanced a value
    pub updates: usize,
    /// EPKs finalized by fallback at resolution
    pub fallback_finalized: usize,
    /// Resolving rounds needed
    pub resolve_rounds: usize,
    /// EPKs tracked at the end of the run
    pub epks_total: usize,
    /// EPKs Final at the end of the run
    pub epks_final: usize,
    /// Lazy computation factories never invoked (cost avoided)
    pub lazy_never_run: usize,
    pub duration_ms: f64,
}

/// What a computation observed when it read an EPK
#[derive(Debug, Clone, Copy)]
struct ObservedRead {
    revision: u64,
    interim: bool,
}

struct EngineInner {
    config: EngineConfig,
    registry: Arc<KindRegistry>,
    store: PropertyStore,
    tracker: DependencyTracker,
    scheduler: Scheduler,
    phase: PhaseManager,
    /// First fatal error wins; workers stop on it
    fatal: Mutex<Option<EngineError>>,
    computations: AtomicUsize,
    resumes: AtomicUsize,
    updates: AtomicUsize,
}

/// Read handle passed to computations
///
/// Every `get` is logged so the engine can verify that an `Interim`
/// result's declared dependee set covers all Interim-state reads that
/// influenced it; an undeclared dependency is a fatal contract violation.
pub struct QueryContext {
    inner: Arc<EngineInner>,
    reads: Mutex<FxHashMap<Epk, ObservedRead>>,
}

impl QueryContext {
    fn new(inner: Arc<EngineInner>) -> Self {
        Self {
            inner,
            reads: Mutex::new(FxHashMap::default()),
        }
    }

    /// Read another entity's property, implicitly creating a dependency
    /// when the result is still Interim
    pub fn get(&self, entity: Entity, kind: PropertyKindId) -> EngineResult<Eps> {
        let epk = Epk::new(entity, kind);
        let eps = self.inner.query_epk(epk)?;
        self.reads.lock().insert(
            epk,
            ObservedRead {
                revision: eps.revision,
                interim: !eps.is_final(),
            },
        );
        Ok(eps)
    }

    fn into_reads(self) -> FxHashMap<Epk, ObservedRead> {
        self.reads.into_inner()
    }
}

impl EngineInner {
    /// Query an EPK, lazily creating its EPS and triggering its computation
    ///
    /// The scheduled flag and the trigger decision sit under the cell lock,
    /// so exactly one computation is enqueued per EPK however many readers
    /// race on the first query.
    fn query_epk(&self, epk: Epk) -> EngineResult<Eps> {
        let (cell, _) = self.store.ensure_cell(epk);
        let mut st = cell.state.lock();

        if !st.compute_scheduled && !st.eps.is_final() {
            match self.scheduler.computation_for(epk.kind) {
                Some(computation) => {
                    st.compute_scheduled = true;
                    self.scheduler.push(Task::Compute { epk, computation });
                }
                None => {
                    if self.registry.fallback(epk.kind).is_none() {
                        return Err(EngineError::Unresolvable {
                            kind: self.registry.name(epk.kind),
                        });
                    }
                    // No computation, but a fallback resolves it at
                    // quiescence; the EPS stays at bottom until then.
                }
            }
        }
        Ok(st.eps.clone())
    }

    fn record_fatal(&self, err: EngineError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            warn!(error = %err, "aborting run");
            *fatal = Some(err);
        }
    }

    fn has_fatal(&self) -> bool {
        self.fatal.lock().is_some()
    }

    fn wake(&self, ids: Vec<ContinuationId>) {
        for id in ids {
            self.scheduler.push(Task::Resume { id });
        }
    }

    /// Drain the queue on the worker pool until quiescent or fatal
    fn drain(inner: &Arc<EngineInner>) {
        let workers = inner.config.num_workers.max(1);
        (0..workers)
            .into_par_iter()
            .for_each(|_| Self::worker_loop(inner));
    }

    fn worker_loop(inner: &Arc<EngineInner>) {
        loop {
            if inner.has_fatal() {
                break;
            }
            match inner.scheduler.pop() {
                Some(task) => {
                    Self::execute(inner, task);
                    inner.scheduler.task_done();
                }
                None => {
                    // Another worker may still spawn tasks from an
                    // in-flight computation
                    if inner.scheduler.is_idle() {
                        break;
                    }
                    std::thread::sleep(std::time::Duration::from_micros(10));
                }
            }
        }
    }

    fn execute(inner: &Arc<EngineInner>, task: Task) {
        match task {
            Task::Compute { epk, computation } => {
                inner.computations.fetch_add(1, Ordering::Relaxed);
                let ctx = QueryContext::new(Arc::clone(inner));
                let result = computation(epk.entity, &ctx);
                let observed = ctx.into_reads();
                Self::process_outcome(inner, epk, result, observed, true);
            }
            Task::Resume { id } => {
                // A duplicate wake-up claims nothing
                let Some(suspended) = inner.tracker.claim(id) else {
                    return;
                };
                inner.resumes.fetch_add(1, Ordering::Relaxed);

                // Fresh snapshot of every declared dependee, read at resume
                // time: never older than the update that triggered the wake
                let mut states = FxHashMap::default();
                let mut observed = FxHashMap::default();
                for dependee in &suspended.dependees {
                    if let Some(eps) = inner.store.read(*dependee) {
                        observed.insert(
                            *dependee,
                            ObservedRead {
                                revision: eps.revision,
                                interim: !eps.is_final(),
                            },
                        );
                        states.insert(*dependee, eps);
                    }
                }
                let snapshot = DependeeSnapshot::new(states);
                let result = (suspended.continuation)(&snapshot);
                // A continuation may legitimately drop dependees it no
                // longer needs, so declared-read enforcement only applies
                // to first runs.
                Self::process_outcome(inner, suspended.target, result, observed, false);
            }
        }
    }

    fn process_outcome(
        inner: &Arc<EngineInner>,
        target: Epk,
        result: AnalysisResult,
        observed: FxHashMap<Epk, ObservedRead>,
        enforce_declared: bool,
    ) {
        let result = match result {
            Ok(result) => result,
            Err(source) => {
                inner.record_fatal(EngineError::Computation {
                    epk: target,
                    kind: inner.registry.name(target.kind),
                    message: source.to_string(),
                });
                return;
            }
        };

        match result {
            ComputationResult::Final(property) => {
                match inner.store.update(target, property, true) {
                    Ok((outcome, woken)) => {
                        if outcome.advanced {
                            inner.updates.fetch_add(1, Ordering::Relaxed);
                        }
                        inner.wake(woken);
                    }
                    Err(err) => inner.record_fatal(err),
                }
            }
            ComputationResult::Interim {
                value,
                dependees,
                continuation,
            } => {
                // Dedup while keeping declaration order
                let mut declared = Vec::with_capacity(dependees.len());
                let mut declared_set = FxHashSet::default();
                for dependee in dependees {
                    if declared_set.insert(dependee) {
                        declared.push(dependee);
                    }
                }

                if enforce_declared {
                    for (read_epk, read) in &observed {
                        if read.interim && !declared_set.contains(read_epk) {
                            inner.record_fatal(EngineError::contract(
                                target,
                                inner.registry.name(target.kind),
                                format!("undeclared dependency on {}", read_epk),
                            ));
                            return;
                        }
                    }
                }

                match inner.store.update(target, value, false) {
                    Ok((outcome, woken)) => {
                        if outcome.advanced {
                            inner.updates.fetch_add(1, Ordering::Relaxed);
                        }
                        inner.wake(woken);
                    }
                    Err(err) => {
                        inner.record_fatal(err);
                        return;
                    }
                }

                // Observed revisions anchor the missed-wakeup check;
                // declared-but-unread dependees are queried now (which also
                // triggers their computations)
                let mut dependee_revisions = Vec::with_capacity(declared.len());
                for dependee in declared {
                    let revision = match observed.get(&dependee) {
                        Some(read) => read.revision,
                        None => match inner.query_epk(dependee) {
                            Ok(eps) => eps.revision,
                            Err(err) => {
                                inner.record_fatal(err);
                                return;
                            }
                        },
                    };
                    dependee_revisions.push((dependee, revision));
                }

                match inner
                    .tracker
                    .suspend(&inner.store, target, continuation, dependee_revisions)
                {
                    SuspendResult::Parked => {}
                    SuspendResult::ResumeNow(id) => {
                        inner.scheduler.push(Task::Resume { id });
                    }
                }
            }
        }
    }
}

/// Incremental, concurrent, lattice-based fixpoint computation engine
///
/// Lifetime is exactly one analysis run: register kinds and computations,
/// call [`run_to_quiescence`](Self::run_to_quiescence), extract Final
/// results, drop the engine.
pub struct FixpointEngine {
    inner: Arc<EngineInner>,
}

impl FixpointEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let registry = Arc::new(KindRegistry::new());
        Self {
            inner: Arc::new(EngineInner {
                config,
                store: PropertyStore::new(Arc::clone(&registry)),
                registry,
                tracker: DependencyTracker::new(),
                scheduler: Scheduler::new(),
                phase: PhaseManager::new(),
                fatal: Mutex::new(None),
                computations: AtomicUsize::new(0),
                resumes: AtomicUsize::new(0),
                updates: AtomicUsize::new(0),
            }),
        }
    }

    /// Declare a property kind (order, bottom, fallback)
    pub fn register_kind(&self, lattice: impl Lattice) -> PropertyKindId {
        self.inner.registry.register(Arc::new(lattice))
    }

    /// Enqueue a computation for one entity, run when the pool starts
    ///
    /// Several computations may be scheduled for the same EPK; their
    /// contributions combine through the kind's join.
    pub fn schedule_eager<F>(&self, entity: Entity, kind: PropertyKindId, computation: F)
    where
        F: Fn(Entity, &QueryContext) -> AnalysisResult + Send + Sync + 'static,
    {
        let epk = Epk::new(entity, kind);
        let (cell, _) = self.inner.store.ensure_cell(epk);
        cell.state.lock().compute_scheduled = true;
        self.inner.scheduler.push(Task::Compute {
            epk,
            computation: Arc::new(computation),
        });
    }

    /// Record a computation factory for a kind, invoked only the first time
    /// any entity's EPK of that kind is queried — never-queried analyses
    /// are never run
    ///
    /// One factory per kind; a second registration is ignored (with a
    /// warning). Multiple contributors to a kind belong in
    /// [`schedule_eager`](Self::schedule_eager).
    pub fn register_lazy<F, C>(&self, kind: PropertyKindId, factory: F)
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: Fn(Entity, &QueryContext) -> AnalysisResult + Send + Sync + 'static,
    {
        self.inner
            .scheduler
            .register_lazy(kind, Box::new(move || Arc::new(factory()) as Computation));
    }

    /// Current state of an EPK, lazily creating it (and triggering its
    /// computation) on first query
    pub fn get(&self, entity: Entity, kind: PropertyKindId) -> EngineResult<Eps> {
        self.inner.query_epk(Epk::new(entity, kind))
    }

    /// Drive the run to a complete fixpoint
    ///
    /// Returns once every EPK is Final (`Done`), or with the first fatal
    /// error. Termination is guaranteed for finite entity sets and
    /// finite-height lattices.
    pub fn run_to_quiescence(&self) -> EngineResult<SolveStats> {
        let start = Instant::now();
        let mut resolve_rounds = 0usize;
        let mut fallback_finalized = 0usize;

        loop {
            self.inner.phase.set(Phase::Running);
            EngineInner::drain(&self.inner);
            if let Some(err) = self.inner.fatal.lock().take() {
                return Err(err);
            }

            self.inner.phase.set(Phase::Quiescent);
            let interim = self.inner.store.interim_epks();
            if interim.is_empty() {
                self.inner.phase.set(Phase::Done);
                break;
            }

            self.inner.phase.set(Phase::Resolving);
            resolve_rounds += 1;
            let limit = self.inner.config.max_resolve_rounds;
            if limit > 0 && resolve_rounds > limit {
                warn!(rounds = resolve_rounds, "resolve round limit exceeded");
                return Err(EngineError::ResolveLimitExceeded {
                    limit,
                    interim: interim.len(),
                });
            }
            debug!(
                count = interim.len(),
                round = resolve_rounds,
                pending = self.inner.tracker.pending(),
                "resolving interim EPKs via fallback"
            );

            // Continuations computing finalized EPKs are dead: drop them
            // before notifying so nothing runs against a Final target
            for epk in &interim {
                self.inner.tracker.discard_for_target(*epk);
            }
            for epk in interim {
                let fallback = match self.inner.registry.fallback(epk.kind) {
                    Some(property) => property,
                    None => {
                        return Err(EngineError::Unresolvable {
                            kind: self.inner.registry.name(epk.kind),
                        })
                    }
                };
                let woken = self.inner.store.force_finalize(epk, fallback)?;
                fallback_finalized += 1;
                self.inner.wake(woken);
            }
            // Back to Running: drain re-notified survivors
        }

        let stats = SolveStats {
            computations: self.inner.computations.load(Ordering::Relaxed),
            resumes: self.inner.resumes.load(Ordering::Relaxed),
            updates: self.inner.updates.load(Ordering::Relaxed),
            fallback_finalized,
            resolve_rounds,
            epks_total: self.inner.store.len(),
            epks_final: self.inner.store.final_count(),
            lazy_never_run: self.inner.scheduler.lazy_pending(),
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        info!(?stats, "fixpoint reached");
        Ok(stats)
    }

    /// Current run phase
    pub fn phase(&self) -> Phase {
        self.inner.phase.current()
    }

    /// All Final (entity, property) pairs of a kind
    pub fn finals(&self, kind: PropertyKindId) -> Vec<(Entity, Property)> {
        self.inner.store.finals_for_kind(kind)
    }

    /// Read-only access to the store
    pub fn store(&self) -> &PropertyStore {
        &self.inner.store
    }
}
