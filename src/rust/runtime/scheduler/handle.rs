// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Runtime state of one launched coroutine.
//!
//! A handle owns a stack of coroutine bodies (innermost on top) and, while suspended, the thing it is parked on. The
//! scheduler advances it at most once per tick. Termination is exactly-once: whichever of completion, fault or
//! cancellation gets there first wins, and only its callbacks fire.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    instructions::Instruction,
    scheduler::{
        CoroutineBody,
        CoroutineContext,
        Yield,
        YieldResult,
    },
};
use ::parking_lot::Mutex;
use ::std::{
    fmt,
    mem,
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::{
        atomic::{
            AtomicBool,
            AtomicU64,
            AtomicU8,
            Ordering,
        },
        Arc,
        Weak,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

const RUNNING: u8 = 0;
const COMPLETED: u8 = 1;
const FAULTED: u8 = 2;
const CANCELLED: u8 = 3;

/// Source of handle identifiers.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

//======================================================================================================================
// Structures
//======================================================================================================================

/// Externally visible handle identifier.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct HandleId(u64);

/// Lifecycle of a handle. Every state but `Running` is terminal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HandleState {
    Running,
    Completed,
    Faulted,
    Cancelled,
}

/// Outcome of a single [CoroutineHandle::advance] call.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum AdvanceStatus {
    /// The handle was already done.
    NotRunnable,
    /// The handle suspended and wants to be advanced again on a later tick.
    Running,
    /// The handle terminated during this call.
    Done,
}

type CompleteCallback = Box<dyn FnOnce(&CoroutineHandle) + Send>;
type ErrorCallback = Box<dyn FnOnce(&CoroutineHandle, &Fail) + Send>;

/// What a suspended handle is waiting on.
enum Parked {
    Instruction(Box<dyn Instruction>),
    /// Another handle. `driving` is set when this handle adopted the child and is responsible for advancing it.
    Handle { handle: CoroutineHandle, driving: bool },
}

/// Result of updating the parked target.
enum ParkedStatus {
    Pending,
    Ready,
    Faulted(Fail),
}

/// Mutable execution state. Only touched by [CoroutineHandle::advance] and [CoroutineHandle::cancel].
#[derive(Default)]
struct Execution {
    stack: Vec<CoroutineBody>,
    parked: Option<Parked>,
}

#[derive(Default)]
struct Callbacks {
    fault: Option<Fail>,
    on_complete: Vec<CompleteCallback>,
    on_error: Vec<ErrorCallback>,
}

struct HandleInner {
    id: HandleId,
    name: String,
    context: CoroutineContext,
    state: AtomicU8,
    /// Set while another handle drives this one. The scheduler does not advance adopted handles.
    managed_by_parent: AtomicBool,
    /// Set while the handle sits in the scheduler's pending or active set.
    scheduled: AtomicBool,
    /// Handle this one is parked on, if any. Followed to refuse joins that would close a waiting cycle.
    awaiting: Mutex<Option<Weak<HandleInner>>>,
    execution: Mutex<Execution>,
    callbacks: Mutex<Callbacks>,
}

/// Coroutine Handle
#[derive(Clone)]
pub struct CoroutineHandle(Arc<HandleInner>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl CoroutineHandle {
    pub(crate) fn new(name: &str, body: CoroutineBody, context: CoroutineContext) -> Self {
        let id: HandleId = HandleId(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed));
        Self(Arc::new(HandleInner {
            id,
            name: name.to_string(),
            context,
            state: AtomicU8::new(RUNNING),
            managed_by_parent: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            awaiting: Mutex::new(None),
            execution: Mutex::new(Execution {
                stack: vec![body],
                parked: None,
            }),
            callbacks: Mutex::new(Callbacks::default()),
        }))
    }

    pub fn id(&self) -> HandleId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn context(&self) -> &CoroutineContext {
        &self.0.context
    }

    pub fn state(&self) -> HandleState {
        match self.0.state.load(Ordering::Acquire) {
            RUNNING => HandleState::Running,
            COMPLETED => HandleState::Completed,
            FAULTED => HandleState::Faulted,
            _ => HandleState::Cancelled,
        }
    }

    /// True once the handle completed, faulted or was cancelled. Never goes back to false.
    pub fn is_done(&self) -> bool {
        self.0.state.load(Ordering::Acquire) != RUNNING
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.state.load(Ordering::Acquire) == CANCELLED
    }

    pub fn is_faulted(&self) -> bool {
        self.0.state.load(Ordering::Acquire) == FAULTED
    }

    /// Returns the fault that terminated this handle, if any.
    pub fn fault(&self) -> Option<Fail> {
        self.0.callbacks.lock().fault.clone()
    }

    pub fn is_managed_by_parent(&self) -> bool {
        self.0.managed_by_parent.load(Ordering::Acquire)
    }

    /// Registers a callback that runs once the handle completes or is cancelled. Runs right away if that already
    /// happened; never runs for a faulted handle.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&CoroutineHandle) + Send + 'static,
    {
        let mut callbacks = self.0.callbacks.lock();
        match self.0.state.load(Ordering::Acquire) {
            RUNNING => callbacks.on_complete.push(Box::new(callback)),
            FAULTED => (),
            _ => {
                drop(callbacks);
                self.invoke_complete(Box::new(callback));
            },
        }
    }

    /// Registers a callback that runs once if the handle faults. Runs right away if it already has.
    pub fn on_error<F>(&self, callback: F)
    where
        F: FnOnce(&CoroutineHandle, &Fail) + Send + 'static,
    {
        let mut callbacks = self.0.callbacks.lock();
        let fault: Option<Fail> = callbacks.fault.clone();
        match (self.0.state.load(Ordering::Acquire), fault) {
            (RUNNING, _) => callbacks.on_error.push(Box::new(callback)),
            (FAULTED, Some(fault)) => {
                drop(callbacks);
                self.invoke_error(Box::new(callback), &fault);
            },
            _ => (),
        }
    }

    /// Cancels the coroutine. Remaining bodies are dropped without being resumed and completion callbacks fire. Calling
    /// this on a finished handle does nothing.
    pub fn cancel(&self) {
        if self.is_done() {
            return;
        }
        // A resumption in progress holds the lock and clears the stack itself as soon as the body returns.
        let execution: Option<Execution> = self.0.execution.try_lock().map(|mut execution| mem::take(&mut *execution));
        if self.finish(CANCELLED, None) {
            debug!("cancel(): name={:?}, id={:?}", self.0.name, self.0.id);
        }
        if let Some(execution) = execution {
            self.discard(execution);
        }
    }

    /// Advances the coroutine by one logical step.
    pub(crate) fn advance(&self, delta: f64, max_resumes: usize) -> AdvanceStatus {
        if self.is_done() {
            return AdvanceStatus::NotRunnable;
        }
        let mut execution = match self.0.execution.try_lock() {
            Some(execution) => execution,
            None => {
                warn!(
                    "advance(): already being advanced, waiting cycle? (name={:?}, id={:?})",
                    self.0.name, self.0.id
                );
                return AdvanceStatus::Running;
            },
        };

        if let Some(parked) = execution.parked.as_mut() {
            match Self::update_parked(parked, delta, max_resumes) {
                ParkedStatus::Pending => {
                    if self.is_done() {
                        let execution: Execution = mem::take(&mut *execution);
                        self.discard(execution);
                        return AdvanceStatus::Done;
                    }
                    return AdvanceStatus::Running;
                },
                ParkedStatus::Ready => {
                    execution.parked = None;
                    self.set_awaiting(None);
                },
                ParkedStatus::Faulted(e) => {
                    let execution: Execution = mem::take(&mut *execution);
                    self.terminate(execution, FAULTED, Some(e));
                    return AdvanceStatus::Done;
                },
            }
        }

        let mut resumes: usize = 0;
        loop {
            if self.is_done() {
                // Cancelled while parked or while a body was running.
                let execution: Execution = mem::take(&mut *execution);
                self.discard(execution);
                return AdvanceStatus::Done;
            }
            if resumes == max_resumes {
                warn!(
                    "advance(): resume cap reached, suspending until next tick (name={:?}, id={:?}, cap={:?})",
                    self.0.name, self.0.id, max_resumes
                );
                return AdvanceStatus::Running;
            }
            resumes += 1;

            let resumed: Option<YieldResult> = match execution.stack.last_mut() {
                Some(top) => match panic::catch_unwind(AssertUnwindSafe(|| top.next())) {
                    Ok(resumed) => resumed,
                    Err(payload) => Some(Err(Fail::from_panic(payload.as_ref()))),
                },
                None => {
                    let execution: Execution = mem::take(&mut *execution);
                    self.terminate(execution, COMPLETED, None);
                    return AdvanceStatus::Done;
                },
            };

            if self.is_done() {
                continue;
            }

            match resumed {
                None => {
                    execution.stack.pop();
                    if execution.stack.is_empty() {
                        let execution: Execution = mem::take(&mut *execution);
                        self.terminate(execution, COMPLETED, None);
                        return AdvanceStatus::Done;
                    }
                },
                Some(Err(e)) => {
                    let execution: Execution = mem::take(&mut *execution);
                    self.terminate(execution, FAULTED, Some(e));
                    return AdvanceStatus::Done;
                },
                Some(Ok(Yield::Continue)) => (),
                Some(Ok(Yield::Nested(body))) => execution.stack.push(body),
                Some(Ok(Yield::Wait(instruction))) => {
                    execution.parked = Some(Parked::Instruction(instruction));
                    return AdvanceStatus::Running;
                },
                Some(Ok(Yield::Join(child))) => {
                    if child.is_done() {
                        continue;
                    }
                    if self.is_awaited_by(&child) {
                        let cause: String = if child == *self {
                            format!("coroutine cannot wait on itself (name={:?})", self.0.name)
                        } else {
                            format!(
                                "waiting on {:?} would close a waiting cycle (name={:?})",
                                child.name(),
                                self.0.name
                            )
                        };
                        error!("advance(): {}", cause);
                        let execution: Execution = mem::take(&mut *execution);
                        self.terminate(execution, FAULTED, Some(Fail::new(libc::EDEADLK, &cause)));
                        return AdvanceStatus::Done;
                    }
                    let driving: bool = child.adopt();
                    trace!(
                        "advance(): parked on handle (parent={:?}, child={:?}, driving={:?})",
                        self.0.id,
                        child.id(),
                        driving
                    );
                    self.set_awaiting(Some(&child));
                    execution.parked = Some(Parked::Handle { handle: child, driving });
                    return AdvanceStatus::Running;
                },
            }
        }
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.0.scheduled.load(Ordering::Acquire)
    }

    /// Marks the handle as a member of the scheduler's sets. Returns false if it already was.
    pub(crate) fn mark_scheduled(&self) -> bool {
        self.0
            .scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_unscheduled(&self) {
        self.0.scheduled.store(false, Ordering::Release);
    }

    /// Takes over driving this handle. Returns false if another handle already drives it.
    fn adopt(&self) -> bool {
        self.0
            .managed_by_parent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Hands an adopted handle back to its scheduler.
    fn release(&self) {
        self.0.managed_by_parent.store(false, Ordering::Release);
        if self.is_done() {
            return;
        }
        // Still sitting in the active set when the sweep has not run yet; the scheduler picks it up again as is.
        if self.is_scheduled() {
            return;
        }
        match self.0.context.scheduler() {
            Some(scheduler) => {
                trace!("release(): rescheduling orphaned child (name={:?}, id={:?})", self.0.name, self.0.id);
                scheduler.reschedule(self.clone());
            },
            None => warn!("release(): scheduler is gone (name={:?}, id={:?})", self.0.name, self.0.id),
        }
    }

    fn set_awaiting(&self, target: Option<&CoroutineHandle>) {
        *self.0.awaiting.lock() = target.map(|handle| Arc::downgrade(&handle.0));
    }

    /// Returns true if `target` is this handle or already waits on it, directly or through other running handles.
    fn is_awaited_by(&self, target: &CoroutineHandle) -> bool {
        let mut current: Option<Arc<HandleInner>> = Some(target.0.clone());
        while let Some(inner) = current {
            if Arc::ptr_eq(&inner, &self.0) {
                return true;
            }
            if inner.state.load(Ordering::Acquire) != RUNNING {
                return false;
            }
            current = inner.awaiting.lock().as_ref().and_then(Weak::upgrade);
        }
        false
    }

    fn update_parked(parked: &mut Parked, delta: f64, max_resumes: usize) -> ParkedStatus {
        match parked {
            Parked::Instruction(instruction) => {
                // Instructions run host code (predicates, futures), so a panic there faults this handle only.
                let polled: Result<Option<Option<Fail>>, _> = panic::catch_unwind(AssertUnwindSafe(|| {
                    instruction.update(delta);
                    if !instruction.is_done() {
                        return None;
                    }
                    Some(instruction.take_fault())
                }));
                match polled {
                    Ok(None) => ParkedStatus::Pending,
                    Ok(Some(None)) => ParkedStatus::Ready,
                    Ok(Some(Some(e))) => ParkedStatus::Faulted(e),
                    Err(payload) => ParkedStatus::Faulted(Fail::from_panic(payload.as_ref())),
                }
            },
            Parked::Handle { handle, driving } => {
                if !handle.is_done() && *driving {
                    handle.advance(delta, max_resumes);
                }
                if handle.is_done() {
                    if *driving {
                        handle.0.managed_by_parent.store(false, Ordering::Release);
                    }
                    ParkedStatus::Ready
                } else {
                    ParkedStatus::Pending
                }
            },
        }
    }

    /// Drops what is left of an execution. Children this handle was driving go back to the scheduler.
    fn discard(&self, execution: Execution) {
        self.set_awaiting(None);
        let Execution { stack, parked } = execution;
        drop(stack);
        if let Some(Parked::Handle { handle, driving: true }) = parked {
            handle.release();
        }
    }

    /// Clears the execution and records the terminal state.
    fn terminate(&self, execution: Execution, state: u8, fault: Option<Fail>) {
        self.discard(execution);
        match &fault {
            Some(e) => warn!("terminate(): faulted (name={:?}, id={:?}, fault={:?})", self.0.name, self.0.id, e),
            None => trace!("terminate(): completed (name={:?}, id={:?})", self.0.name, self.0.id),
        }
        self.finish(state, fault);
    }

    /// Moves a running handle into `state` and fires the matching callbacks. Returns false if the handle was already
    /// done, in which case nothing fires.
    fn finish(&self, state: u8, fault: Option<Fail>) -> bool {
        let (on_complete, on_error): (Vec<CompleteCallback>, Vec<ErrorCallback>) = {
            let mut callbacks = self.0.callbacks.lock();
            if self
                .0
                .state
                .compare_exchange(RUNNING, state, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return false;
            }
            callbacks.fault = fault.clone();
            (
                mem::take(&mut callbacks.on_complete),
                mem::take(&mut callbacks.on_error),
            )
        };
        match fault {
            Some(e) => {
                for callback in on_error {
                    self.invoke_error(callback, &e);
                }
            },
            None => {
                for callback in on_complete {
                    self.invoke_complete(callback);
                }
            },
        }
        true
    }

    fn invoke_complete(&self, callback: CompleteCallback) {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(self))).is_err() {
            error!("on_complete(): callback panicked (name={:?}, id={:?})", self.0.name, self.0.id);
        }
    }

    fn invoke_error(&self, callback: ErrorCallback, fault: &Fail) {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(self, fault))).is_err() {
            error!("on_error(): callback panicked (name={:?}, id={:?})", self.0.name, self.0.id);
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<HandleId> for u64 {
    fn from(value: HandleId) -> Self {
        value.0
    }
}

impl PartialEq for CoroutineHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CoroutineHandle {}

impl fmt::Debug for CoroutineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineHandle")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("state", &self.state())
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
