// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Waits on events delivered through an [EventSource].
//!
//! Both waits are cheap to clone: every clone shares the same state, so a body can yield one clone and read the payload
//! from another once it resumes.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::event_bus::{
        EventSource,
        Subscription,
    },
    runtime::{
        fail::Fail,
        instructions::Instruction,
    },
};
use ::parking_lot::Mutex;
use ::std::{
    fmt,
    sync::{
        Arc,
        Weak,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

struct EventWaitState<T> {
    payload: Option<T>,
    done: bool,
    /// Taken exactly once, by whichever of arrival, dispose or drop gets there first.
    subscription: Option<Subscription>,
}

/// Waits for the first matching event and captures its payload.
pub struct EventWait<T>(Arc<Mutex<EventWaitState<T>>>);

struct TimeoutState<T> {
    inner: EventWait<T>,
    timeout: f64,
    elapsed: f64,
    timed_out: bool,
}

/// Races an [EventWait] against accumulated tick time.
pub struct EventWaitWithTimeout<T>(Arc<Mutex<TimeoutState<T>>>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T: Clone + Send + 'static> EventWait<T> {
    /// Subscribes to `source` right away.
    pub fn new<S: EventSource<T> + ?Sized>(source: &S) -> Self {
        Self::with_filter(source, |_: &T| true)
    }

    /// Like [EventWait::new], only matching events for which `filter` holds.
    pub fn with_filter<S, F>(source: &S, filter: F) -> Self
    where
        S: EventSource<T> + ?Sized,
        F: Fn(&T) -> bool + Send + 'static,
    {
        let state: Arc<Mutex<EventWaitState<T>>> = Arc::new(Mutex::new(EventWaitState {
            payload: None,
            done: false,
            subscription: None,
        }));
        let weak: Weak<Mutex<EventWaitState<T>>> = Arc::downgrade(&state);
        let subscription: Subscription = source.subscribe(Box::new(move |event: &T| {
            let state: Arc<Mutex<EventWaitState<T>>> = match weak.upgrade() {
                Some(state) => state,
                None => return,
            };
            if !filter(event) {
                return;
            }
            let subscription: Option<Subscription> = {
                let mut state = state.lock();
                if state.done {
                    return;
                }
                state.payload = Some(event.clone());
                state.done = true;
                state.subscription.take()
            };
            // Unsubscribe with the state unlocked.
            drop(subscription);
        }));

        let mut guard = state.lock();
        if guard.done {
            // Matched before the token was stored.
            drop(guard);
            subscription.unsubscribe();
        } else {
            guard.subscription = Some(subscription);
            drop(guard);
        }
        Self(state)
    }

    /// Payload of the matching event, once it arrived.
    pub fn payload(&self) -> Option<T> {
        self.0.lock().payload.clone()
    }

    pub fn take_payload(&self) -> Option<T> {
        self.0.lock().payload.take()
    }

    /// Stops listening. A disposed wait that had not matched yet never completes.
    pub fn dispose(&self) {
        let subscription: Option<Subscription> = self.0.lock().subscription.take();
        if let Some(subscription) = subscription {
            trace!("dispose(): unsubscribing");
            subscription.unsubscribe();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.0.lock().subscription.is_some()
    }

    /// Gives up after `timeout` seconds of tick time.
    pub fn with_timeout(self, timeout: f64) -> EventWaitWithTimeout<T> {
        EventWaitWithTimeout::new(self, timeout)
    }
}

impl<T: Clone + Send + 'static> EventWaitWithTimeout<T> {
    pub fn new(inner: EventWait<T>, timeout: f64) -> Self {
        Self(Arc::new(Mutex::new(TimeoutState {
            inner,
            timeout: timeout.max(0.0),
            elapsed: 0.0,
            timed_out: false,
        })))
    }

    /// True if the wait ended because time ran out.
    pub fn is_timeout(&self) -> bool {
        self.0.lock().timed_out
    }

    pub fn payload(&self) -> Option<T> {
        self.0.lock().inner.payload()
    }

    pub fn inner(&self) -> EventWait<T> {
        self.0.lock().inner.clone()
    }

    /// Turns the outcome into a result, escalating a timeout to `ETIMEDOUT`.
    pub fn into_result(self) -> Result<T, Fail> {
        let state = self.0.lock();
        if state.timed_out {
            let cause: String = format!("no event within {:?} seconds", state.timeout);
            debug!("into_result(): {}", cause);
            return Err(Fail::new(libc::ETIMEDOUT, &cause));
        }
        match state.inner.payload() {
            Some(payload) => Ok(payload),
            None => Err(Fail::new(libc::EAGAIN, "event has not arrived yet")),
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T> Clone for EventWait<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Clone for EventWaitWithTimeout<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Send> Instruction for EventWait<T> {
    fn is_done(&self) -> bool {
        self.0.lock().done
    }

    /// Arrival is pushed by the source; there is nothing to poll.
    fn update(&mut self, _delta: f64) {}
}

impl<T: Clone + Send + 'static> Instruction for EventWaitWithTimeout<T> {
    fn is_done(&self) -> bool {
        let state = self.0.lock();
        state.timed_out || state.inner.is_done()
    }

    fn update(&mut self, delta: f64) {
        let mut state = self.0.lock();
        if state.timed_out || state.inner.is_done() {
            return;
        }
        if delta > 0.0 {
            state.elapsed += delta;
        }
        if state.elapsed >= state.timeout {
            state.timed_out = true;
            state.inner.dispose();
        }
    }
}

impl<T> fmt::Debug for EventWait<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventWait(done={:?})", self.0.lock().done)
    }
}

impl<T> fmt::Debug for EventWaitWithTimeout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.lock();
        f.debug_struct("EventWaitWithTimeout")
            .field("timeout", &state.timeout)
            .field("elapsed", &state.elapsed)
            .field("timed_out", &state.timed_out)
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
