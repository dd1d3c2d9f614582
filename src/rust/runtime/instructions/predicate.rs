// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::instructions::Instruction;
use ::std::fmt;

//======================================================================================================================
// Structures
//======================================================================================================================

type Predicate = Box<dyn FnMut() -> bool + Send>;

/// Waits until a predicate holds. Once it has held, the wait stays over and the predicate is not polled again.
pub struct WaitUntil {
    predicate: Predicate,
    done: bool,
}

/// Waits while a predicate holds. The predicate is polled on every update, so the wait can reopen.
pub struct WaitWhile {
    predicate: Predicate,
    done: bool,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl WaitUntil {
    pub fn new<F: FnMut() -> bool + Send + 'static>(predicate: F) -> Self {
        Self {
            predicate: Box::new(predicate),
            done: false,
        }
    }
}

impl WaitWhile {
    pub fn new<F: FnMut() -> bool + Send + 'static>(predicate: F) -> Self {
        Self {
            predicate: Box::new(predicate),
            done: false,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Instruction for WaitUntil {
    fn is_done(&self) -> bool {
        self.done
    }

    fn update(&mut self, _delta: f64) {
        if !self.done {
            self.done = (self.predicate)();
        }
    }
}

impl Instruction for WaitWhile {
    fn is_done(&self) -> bool {
        self.done
    }

    fn update(&mut self, _delta: f64) {
        self.done = !(self.predicate)();
    }
}

impl fmt::Debug for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WaitUntil(done={:?})", self.done)
    }
}

impl fmt::Debug for WaitWhile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WaitWhile(done={:?})", self.done)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        WaitUntil,
        WaitWhile,
    };
    use crate::runtime::instructions::Instruction;
    use ::anyhow::Result;
    use ::std::sync::{
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
        Arc,
    };

    #[test]
    fn wait_until_is_sticky() -> Result<()> {
        let flag: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
        let polls: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let flag_: Arc<AtomicBool> = flag.clone();
        let polls_: Arc<AtomicUsize> = polls.clone();
        let mut wait: WaitUntil = WaitUntil::new(move || {
            polls_.fetch_add(1, Ordering::SeqCst);
            flag_.load(Ordering::SeqCst)
        });

        wait.update(0.0);
        crate::ensure_eq!(wait.is_done(), false);
        flag.store(true, Ordering::SeqCst);
        wait.update(0.0);
        crate::ensure_eq!(wait.is_done(), true);
        flag.store(false, Ordering::SeqCst);
        wait.update(0.0);
        crate::ensure_eq!(wait.is_done(), true);
        crate::ensure_eq!(polls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn wait_while_is_reevaluated() -> Result<()> {
        let busy: Arc<AtomicBool> = Arc::new(AtomicBool::new(true));
        let busy_: Arc<AtomicBool> = busy.clone();
        let mut wait: WaitWhile = WaitWhile::new(move || busy_.load(Ordering::SeqCst));

        wait.update(0.0);
        crate::ensure_eq!(wait.is_done(), false);
        busy.store(false, Ordering::SeqCst);
        wait.update(0.0);
        crate::ensure_eq!(wait.is_done(), true);
        busy.store(true, Ordering::SeqCst);
        wait.update(0.0);
        crate::ensure_eq!(wait.is_done(), false);
        Ok(())
    }
}
