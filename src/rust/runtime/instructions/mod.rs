// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Suspension instructions.
//!
//! A coroutine parks on an [Instruction] by yielding [crate::runtime::scheduler::Yield::Wait]. The handle then calls
//! [Instruction::update] once per tick and resumes the body as soon as [Instruction::is_done] reports true.

mod bridge;
mod delay;
mod event;
mod frames;
mod join;
mod predicate;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    bridge::AsyncBridge,
    delay::{
        Delay,
        RealtimeDelay,
    },
    event::{
        EventWait,
        EventWaitWithTimeout,
    },
    frames::FrameCount,
    join::{
        JoinAll,
        JoinAny,
    },
    predicate::{
        WaitUntil,
        WaitWhile,
    },
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Suspension Instruction
pub trait Instruction: Send {
    /// Reports whether the wait is over. Must not change any state.
    fn is_done(&self) -> bool;

    /// Advances the instruction by `delta` seconds. Called at most once per tick, only while a handle is parked on it.
    fn update(&mut self, delta: f64);

    /// Takes the fault the instruction finished with, if any. The handle re-raises it as a body fault.
    fn take_fault(&mut self) -> Option<Fail> {
        None
    }
}

impl<I: Instruction + ?Sized> Instruction for Box<I> {
    fn is_done(&self) -> bool {
        (**self).is_done()
    }

    fn update(&mut self, delta: f64) {
        (**self).update(delta)
    }

    fn take_fault(&mut self) -> Option<Fail> {
        (**self).take_fault()
    }
}
