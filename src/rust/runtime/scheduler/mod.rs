// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod context;
mod coroutine;
mod handle;
mod scope;

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod scheduler;

pub use self::{
    context::{
        CoroutineContext,
        OwnerTag,
    },
    coroutine::{
        body,
        CoroutineBody,
        Yield,
        YieldResult,
    },
    handle::{
        CoroutineHandle,
        HandleId,
        HandleState,
    },
    scheduler::SharedScheduler,
    scope::{
        CoroutineScope,
        ScopeId,
    },
};
