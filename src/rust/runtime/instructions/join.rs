// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    instructions::Instruction,
    scheduler::CoroutineHandle,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Waits until every listed handle has finished and left the scheduler. Cancels nothing.
#[derive(Debug)]
pub struct JoinAll {
    handles: Vec<CoroutineHandle>,
    done: bool,
}

/// Waits until any listed handle has finished and left the scheduler. Cancels nothing.
#[derive(Debug)]
pub struct JoinAny {
    handles: Vec<CoroutineHandle>,
    done: bool,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl JoinAll {
    pub fn new<I: IntoIterator<Item = CoroutineHandle>>(handles: I) -> Self {
        Self {
            handles: handles.into_iter().collect(),
            done: false,
        }
    }
}

impl JoinAny {
    /// An empty set is over on the first update.
    pub fn new<I: IntoIterator<Item = CoroutineHandle>>(handles: I) -> Self {
        Self {
            handles: handles.into_iter().collect(),
            done: false,
        }
    }
}

/// Finished, and swept out of (or never in) the scheduler's sets.
fn has_left(handle: &CoroutineHandle) -> bool {
    handle.is_done() && !handle.is_scheduled()
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Instruction for JoinAll {
    fn is_done(&self) -> bool {
        self.done
    }

    fn update(&mut self, _delta: f64) {
        self.done = self.handles.iter().all(has_left);
    }
}

impl Instruction for JoinAny {
    fn is_done(&self) -> bool {
        self.done
    }

    fn update(&mut self, _delta: f64) {
        self.done = self.handles.is_empty() || self.handles.iter().any(has_left);
    }
}
