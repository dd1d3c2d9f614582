// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod collections;
pub mod runtime;

//======================================================================================================================
// Exports
//======================================================================================================================

pub use self::{
    collections::event_bus::{
        EventSource,
        SharedEventBus,
        Subscription,
    },
    runtime::{
        config::{
            Config,
            SchedulerConfig,
        },
        fail::Fail,
        instructions::{
            AsyncBridge,
            Delay,
            EventWait,
            EventWaitWithTimeout,
            FrameCount,
            Instruction,
            JoinAll,
            JoinAny,
            RealtimeDelay,
            WaitUntil,
            WaitWhile,
        },
        scheduler::{
            CoroutineBody,
            CoroutineContext,
            CoroutineHandle,
            CoroutineScope,
            HandleId,
            HandleState,
            OwnerTag,
            ScopeId,
            SharedScheduler,
            Yield,
            YieldResult,
        },
    },
};

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, otherwise bails out of the enclosing function with an [anyhow::Error].
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    anyhow::bail!(
                        "ensure failed: `(left == right)` left: `{:?}`, right: `{:?}`",
                        left_val,
                        right_val
                    );
                }
            },
        }
    };
}

/// Ensures that two expressions are not equal, otherwise bails out of the enclosing function with an [anyhow::Error].
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(
                        "ensure failed: `(left != right)` left: `{:?}`, right: `{:?}`",
                        left_val,
                        right_val
                    );
                }
            },
        }
    };
}
