// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![allow(dead_code)]

//==============================================================================
// Imports
//==============================================================================

use ::coopkernel::{
    CoroutineScope,
    Fail,
    SharedScheduler,
    Yield,
    YieldResult,
};
use ::std::{
    iter,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
};

//==============================================================================
// Structures
//==============================================================================

/// A scheduler with one root scope.
pub struct Test {
    pub scheduler: SharedScheduler,
    pub scope: CoroutineScope,
}

/// Boolean shared between a test and the bodies it launches.
#[derive(Clone, Default)]
pub struct Flag(Arc<AtomicBool>);

//==============================================================================
// Associate Functions
//==============================================================================

impl Test {
    pub fn new() -> Result<Self, Fail> {
        let scheduler: SharedScheduler = SharedScheduler::default();
        let scope: CoroutineScope = CoroutineScope::new(&scheduler)?;
        Ok(Self { scheduler, scope })
    }

    /// Ticks `n` times with a fixed delta.
    pub fn tick_n(&self, n: usize, delta: f64) -> Result<(), Fail> {
        for _ in 0..n {
            self.scheduler.tick(delta)?;
        }
        Ok(())
    }
}

impl Flag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Step that raises the flag when the body reaches it.
    pub fn raise(&self) -> YieldResult {
        let flag: Arc<AtomicBool> = self.0.clone();
        action(move || flag.store(true, Ordering::SeqCst))
    }
}

//==============================================================================
// Standalone Functions
//==============================================================================

/// Step that runs `f` when the body reaches it and continues within the same tick.
pub fn action<F: FnOnce() + Send + 'static>(f: F) -> YieldResult {
    Ok(Yield::nested(
        iter::once_with(f).filter_map(|()| -> Option<YieldResult> { None }),
    ))
}
