// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    instructions::Instruction,
    scheduler::CoroutineHandle,
};
use ::std::fmt;

//======================================================================================================================
// Structures
//======================================================================================================================

/// What a coroutine body produces every time it is resumed. `Err` is a body fault and terminates the handle.
pub type YieldResult = Result<Yield, Fail>;

/// A coroutine body: a lazy, single-pass sequence of suspension points. Exhausting the iterator is natural completion.
pub type CoroutineBody = Box<dyn Iterator<Item = YieldResult> + Send>;

/// Suspension point of a coroutine body.
pub enum Yield {
    /// Keep running within the current tick.
    Continue,
    /// Delegate into a sub-coroutine. The current body resumes once the nested one is exhausted.
    Nested(CoroutineBody),
    /// Park on a suspension instruction until it reports done.
    Wait(Box<dyn Instruction>),
    /// Park until another coroutine finishes.
    Join(CoroutineHandle),
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Yield {
    /// Delegates into `body`.
    pub fn nested<B>(body: B) -> Self
    where
        B: IntoIterator<Item = YieldResult>,
        B::IntoIter: Send + 'static,
    {
        Yield::Nested(self::body(body))
    }

    /// Parks on `instruction`.
    pub fn wait<I: Instruction + 'static>(instruction: I) -> Self {
        Yield::Wait(Box::new(instruction))
    }

    /// Parks until `handle` is done.
    pub fn join(handle: &CoroutineHandle) -> Self {
        Yield::Join(handle.clone())
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Boxes anything that iterates over [YieldResult]s into a [CoroutineBody].
pub fn body<B>(body: B) -> CoroutineBody
where
    B: IntoIterator<Item = YieldResult>,
    B::IntoIter: Send + 'static,
{
    Box::new(body.into_iter())
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for Yield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Yield::Continue => write!(f, "Continue"),
            Yield::Nested(_) => write!(f, "Nested"),
            Yield::Wait(_) => write!(f, "Wait"),
            Yield::Join(handle) => write!(f, "Join({:?})", handle.id()),
        }
    }
}

impl From<CoroutineHandle> for Yield {
    fn from(handle: CoroutineHandle) -> Self {
        Yield::Join(handle)
    }
}
