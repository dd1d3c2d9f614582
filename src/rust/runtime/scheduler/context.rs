// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::scheduler::{
    scheduler::{
        Scheduler,
        SharedScheduler,
    },
    ScopeId,
};
use ::std::{
    any::Any,
    fmt,
    sync::{
        Arc,
        Weak,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Opaque tag identifying whoever launched a coroutine.
pub type OwnerTag = Arc<dyn Any + Send + Sync>;

/// Immutable bundle handed to a coroutine handle when it is created.
#[derive(Clone)]
pub struct CoroutineContext {
    /// Scope that launched the coroutine.
    scope: ScopeId,
    /// Scheduler that runs the coroutine. Weak so that handles do not keep their scheduler alive.
    scheduler: Weak<Scheduler>,
    /// Optional tag of the launching component.
    owner: Option<OwnerTag>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl CoroutineContext {
    pub(crate) fn new(scope: ScopeId, scheduler: Weak<Scheduler>, owner: Option<OwnerTag>) -> Self {
        Self {
            scope,
            scheduler,
            owner,
        }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope
    }

    /// Returns the scheduler running this coroutine, if it is still alive.
    pub fn scheduler(&self) -> Option<SharedScheduler> {
        self.scheduler.upgrade().map(SharedScheduler::from)
    }

    pub fn owner(&self) -> Option<&OwnerTag> {
        self.owner.as_ref()
    }

    /// Downcasts the owner tag.
    pub fn owner_as<T: Any>(&self) -> Option<&T> {
        self.owner.as_ref()?.downcast_ref::<T>()
    }

    /// Asks the scheduler whether the owning scope may still run coroutines. A dead scheduler has no live scopes.
    pub fn is_scope_active(&self) -> bool {
        match self.scheduler() {
            Some(scheduler) => scheduler.is_scope_active(self.scope),
            None => false,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for CoroutineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineContext")
            .field("scope", &self.scope)
            .field("has_owner", &self.owner.is_some())
            .finish()
    }
}
