// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Implementation of our tick-driven, single-threaded coroutine scheduler.
//!
//! The scheduler keeps an ordered active set of handles. Handles launched at any point are parked in a pending set
//! and promoted at the start of the next tick, so a body never starts running inside the tick that launched it. Each
//! tick advances every scheduler-owned handle exactly once and then sweeps out whatever finished or was adopted by a
//! parent handle.
//!
//! All sets are owned by the one thread that drives [SharedScheduler::tick]. The first thread to tick becomes the
//! owner and any other thread is refused for the rest of the scheduler's life.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    config::SchedulerConfig,
    fail::Fail,
    logging,
    scheduler::{
        handle::AdvanceStatus,
        scope::ScopeArena,
        CoroutineContext,
        CoroutineHandle,
        CoroutineScope,
        OwnerTag,
        ScopeId,
        YieldResult,
    },
};
use ::parking_lot::Mutex;
use ::std::{
    mem,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        OnceLock,
    },
    thread::{
        self,
        ThreadId,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Coroutine Scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    /// Thread that ticked first.
    owner_thread: OnceLock<ThreadId>,
    /// Set for the duration of a tick.
    ticking: AtomicBool,
    /// Handles being advanced, in launch order.
    active: Mutex<Vec<CoroutineHandle>>,
    /// Handles launched since the last tick started.
    pending_add: Mutex<Vec<CoroutineHandle>>,
    /// Cancellation scopes.
    scopes: Mutex<ScopeArena>,
}

#[derive(Clone)]
pub struct SharedScheduler(Arc<Scheduler>);

/// Clears the ticking flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SharedScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        logging::initialize();
        Self(Arc::new(Scheduler {
            config,
            owner_thread: OnceLock::new(),
            ticking: AtomicBool::new(false),
            active: Mutex::new(Vec::with_capacity(config.initial_capacity)),
            pending_add: Mutex::new(Vec::with_capacity(config.initial_capacity)),
            scopes: Mutex::new(ScopeArena::default()),
        }))
    }

    pub fn config(&self) -> SchedulerConfig {
        self.0.config
    }

    /// Wraps `body` in a handle bound to `scope` and queues it to start on the next tick.
    pub fn run<B>(&self, name: &str, body: B, scope: &CoroutineScope) -> Result<CoroutineHandle, Fail>
    where
        B: IntoIterator<Item = YieldResult>,
        B::IntoIter: Send + 'static,
    {
        self.run_owned(name, body, scope, None)
    }

    /// Same as [SharedScheduler::run], tagging the handle's context with `owner`.
    pub fn run_owned<B>(
        &self,
        name: &str,
        body: B,
        scope: &CoroutineScope,
        owner: Option<OwnerTag>,
    ) -> Result<CoroutineHandle, Fail>
    where
        B: IntoIterator<Item = YieldResult>,
        B::IntoIter: Send + 'static,
    {
        if !Arc::ptr_eq(&self.0, &scope.scheduler().0) {
            let cause: String = format!("scope belongs to another scheduler (name={:?})", name);
            error!("run(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        let context: CoroutineContext = CoroutineContext::new(scope.id(), Arc::downgrade(&self.0), owner);
        let handle: CoroutineHandle = CoroutineHandle::new(name, super::body(body), context);
        self.0.scopes.lock().register(scope.id(), handle.clone())?;
        handle.mark_scheduled();
        self.0.pending_add.lock().push(handle.clone());
        trace!("run(): name={:?}, id={:?}, scope={:?}", name, handle.id(), scope.id());
        Ok(handle)
    }

    /// Advances every scheduler-owned handle once.
    pub fn tick(&self, delta: f64) -> Result<(), Fail> {
        self.check_thread_affinity()?;
        let _guard: TickGuard = TickGuard::enter(&self.0.ticking)?;

        // Promote handles launched since the last tick.
        let mut promoted: Vec<CoroutineHandle> = mem::take(&mut *self.0.pending_add.lock());
        self.0.active.lock().append(&mut promoted);

        // Walk a snapshot so the active set stays in place, and visible, while bodies run.
        let snapshot: Vec<CoroutineHandle> = self.0.active.lock().clone();
        let max_resumes: usize = self.0.config.max_resumes_per_tick;
        for handle in snapshot.iter() {
            if handle.is_managed_by_parent() {
                continue;
            }
            if !handle.is_done() && !handle.context().is_scope_active() {
                debug!(
                    "tick(): owning scope is gone, cancelling (name={:?}, id={:?})",
                    handle.name(),
                    handle.id()
                );
                handle.cancel();
            }
            if handle.advance(delta, max_resumes) == AdvanceStatus::Done {
                trace!("tick(): done (name={:?}, id={:?})", handle.name(), handle.id());
            }
        }

        // Sweep on current state: a parent may have adopted or released a handle after it was visited.
        let mut finished: bool = false;
        self.0.active.lock().retain(|handle| {
            if handle.is_done() || handle.is_managed_by_parent() {
                finished |= handle.is_done();
                handle.mark_unscheduled();
                return false;
            }
            true
        });
        if finished {
            // Dropped outside the arena lock.
            let pruned: Vec<CoroutineHandle> = self.0.scopes.lock().prune();
            trace!("tick(): pruned {:?} finished handles from scopes", pruned.len());
        }
        Ok(())
    }

    /// Ticks until `handle` is done or `max_ticks` ticks went by. Returns whether the handle is done.
    pub fn run_until(&self, handle: &CoroutineHandle, delta: f64, max_ticks: usize) -> Result<bool, Fail> {
        for _ in 0..max_ticks {
            if handle.is_done() {
                break;
            }
            self.tick(delta)?;
        }
        Ok(handle.is_done())
    }

    /// Number of handles in the active set. During a tick this still counts handles that finished earlier in the same
    /// tick; they leave the set when the tick ends.
    pub fn num_active(&self) -> usize {
        self.0.active.lock().len()
    }

    pub fn num_pending(&self) -> usize {
        self.0.pending_add.lock().len()
    }

    /// True when there is nothing left to advance.
    pub fn is_idle(&self) -> bool {
        self.num_active() == 0 && self.num_pending() == 0
    }

    pub fn is_scope_active(&self, id: ScopeId) -> bool {
        self.0.scopes.lock().is_active(id)
    }

    pub fn num_scopes(&self) -> usize {
        self.0.scopes.lock().len()
    }

    pub(crate) fn create_scope(&self, parent: Option<ScopeId>) -> Result<ScopeId, Fail> {
        self.0.scopes.lock().insert(parent)
    }

    pub(crate) fn cancel_scope(&self, id: ScopeId) {
        // Release the arena before cancelling: completion callbacks may launch or cancel.
        let handles: Vec<CoroutineHandle> = self.0.scopes.lock().cancel(id);
        debug!("cancel_scope(): scope={:?}, handles={:?}", id, handles.len());
        for handle in handles {
            handle.cancel();
        }
    }

    pub(crate) fn remove_scope(&self, id: ScopeId) {
        let handles: Vec<CoroutineHandle> = self.0.scopes.lock().remove(id);
        trace!("remove_scope(): scope={:?}, handles={:?}", id, handles.len());
        for handle in handles {
            handle.cancel();
        }
    }

    /// Puts a handle that was released by its parent back in the pending set.
    pub(crate) fn reschedule(&self, handle: CoroutineHandle) {
        if handle.mark_scheduled() {
            self.0.pending_add.lock().push(handle);
        }
    }

    fn check_thread_affinity(&self) -> Result<(), Fail> {
        let current: ThreadId = thread::current().id();
        let owner: ThreadId = *self.0.owner_thread.get_or_init(|| current);
        if owner != current {
            let cause: String = format!(
                "tick() called from a thread that does not own the scheduler (owner={:?}, caller={:?})",
                owner, current
            );
            error!("check_thread_affinity(): {}", cause);
            return Err(Fail::new(libc::EPERM, &cause));
        }
        Ok(())
    }
}

impl<'a> TickGuard<'a> {
    fn enter(ticking: &'a AtomicBool) -> Result<Self, Fail> {
        if ticking.swap(true, Ordering::AcqRel) {
            let cause: &str = "tick() called while a tick is in progress";
            error!("enter(): {}", cause);
            return Err(Fail::new(libc::EBUSY, cause));
        }
        Ok(Self(ticking))
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SharedScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl From<Arc<Scheduler>> for SharedScheduler {
    fn from(scheduler: Arc<Scheduler>) -> Self {
        Self(scheduler)
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
