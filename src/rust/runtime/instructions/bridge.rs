// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Bridges an externally driven asynchronous operation into the tick loop.
//!
//! The operation is a [Future]. It is polled once per update with a no-op waker, so it must be driven to completion by
//! something other than its waker: another thread, a channel, an I/O completion. Whatever it produces is only
//! observed on the scheduler thread, inside a tick.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    instructions::Instruction,
};
use ::futures::{
    channel::oneshot,
    future::BoxFuture,
    task::noop_waker_ref,
    Future,
    FutureExt,
};
use ::parking_lot::Mutex;
use ::std::{
    fmt,
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::Arc,
    task::{
        Context,
        Poll,
    },
    thread,
};

//======================================================================================================================
// Structures
//======================================================================================================================

struct BridgeState<T> {
    /// Dropped once it resolves.
    operation: Option<BoxFuture<'static, Result<T, Fail>>>,
    outcome: Option<Result<T, Fail>>,
}

/// Async Bridge
///
/// Done once the operation resolves. A failed operation faults the handle parked on it. Clones share the outcome.
pub struct AsyncBridge<T>(Arc<Mutex<BridgeState<T>>>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T: Send + 'static> AsyncBridge<T> {
    pub fn new<F>(operation: F) -> Self
    where
        F: Future<Output = Result<T, Fail>> + Send + 'static,
    {
        Self(Arc::new(Mutex::new(BridgeState {
            operation: Some(operation.boxed()),
            outcome: None,
        })))
    }

    /// Waits for whatever is sent on the other end of `receiver`. A dropped sender is an `ECANCELED` fault.
    pub fn from_receiver(receiver: oneshot::Receiver<Result<T, Fail>>) -> Self {
        Self::new(async move {
            match receiver.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Err(Fail::new(libc::ECANCELED, "operation was dropped before completing")),
            }
        })
    }

    /// Runs `work` on a new thread named `name`. A panic in `work` is reported as an `EFAULT` fault.
    pub fn spawn<F>(name: &str, work: F) -> Result<Self, Fail>
    where
        F: FnOnce() -> Result<T, Fail> + Send + 'static,
    {
        let (sender, receiver): (oneshot::Sender<Result<T, Fail>>, oneshot::Receiver<Result<T, Fail>>) =
            oneshot::channel();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            let outcome: Result<T, Fail> = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(outcome) => outcome,
                Err(payload) => Err(Fail::from_panic(payload.as_ref())),
            };
            if sender.send(outcome).is_err() {
                trace!("spawn(): bridge dropped before the operation finished");
            }
        })?;
        Ok(Self::from_receiver(receiver))
    }

    /// Hands out the outcome and leaves `None` behind.
    pub fn take_result(&self) -> Option<Result<T, Fail>> {
        self.0.lock().outcome.take()
    }
}

impl<T: Clone> AsyncBridge<T> {
    /// Outcome of the operation, once it resolved.
    pub fn result(&self) -> Option<Result<T, Fail>> {
        self.0.lock().outcome.clone()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T> Clone for AsyncBridge<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Send> Instruction for AsyncBridge<T> {
    fn is_done(&self) -> bool {
        let state = self.0.lock();
        state.operation.is_none()
    }

    fn update(&mut self, _delta: f64) {
        let mut state = self.0.lock();
        let outcome: Result<T, Fail> = match state.operation.as_mut() {
            Some(operation) => match operation.poll_unpin(&mut Context::from_waker(noop_waker_ref())) {
                Poll::Ready(outcome) => outcome,
                Poll::Pending => return,
            },
            None => return,
        };
        state.operation = None;
        state.outcome = Some(outcome);
    }

    fn take_fault(&mut self) -> Option<Fail> {
        match &self.0.lock().outcome {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }
}

impl<T> fmt::Debug for AsyncBridge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncBridge(done={:?})", self.0.lock().operation.is_none())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
