// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cancellation scopes.
//!
//! Scopes form a tree that lives in an arena owned by the scheduler. Every node lists the handles it launched and the
//! indices of its child scopes; cancelling walks the arena by index. Ids are generational, so a context that outlives
//! its scope never mistakes a recycled slot for a live scope.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        CoroutineHandle,
        OwnerTag,
        SharedScheduler,
        YieldResult,
    },
};
use ::slab::Slab;
use ::std::fmt;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Stable identifier of a scope in the scheduler's arena.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub struct ScopeId {
    index: usize,
    generation: u64,
}

struct ScopeNode {
    generation: u64,
    parent: Option<usize>,
    children: Vec<usize>,
    handles: Vec<CoroutineHandle>,
    active: bool,
}

/// Arena of scopes.
#[derive(Default)]
pub(crate) struct ScopeArena {
    nodes: Slab<ScopeNode>,
    next_generation: u64,
}

/// Coroutine Scope
///
/// Owns the coroutines it launches and the scopes created under it. Cancelling a scope, or dropping it, cancels all of
/// them. A cancelled scope rejects further launches; there is no way to reactivate it.
pub struct CoroutineScope {
    id: ScopeId,
    scheduler: SharedScheduler,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ScopeId {
    /// Id that never resolves to a live scope.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            index: usize::MAX,
            generation: u64::MAX,
        }
    }
}

impl ScopeArena {
    /// Creates a scope, registering it with `parent` when given. Children of inactive scopes are refused.
    pub fn insert(&mut self, parent: Option<ScopeId>) -> Result<ScopeId, Fail> {
        let parent_index: Option<usize> = match parent {
            Some(parent) => {
                if !self.is_active(parent) {
                    let cause: String = format!("cannot create a child of an inactive scope (parent={:?})", parent);
                    warn!("insert(): {}", cause);
                    return Err(Fail::new(libc::ECANCELED, &cause));
                }
                Some(parent.index)
            },
            None => None,
        };
        let generation: u64 = self.next_generation;
        self.next_generation += 1;
        let index: usize = self.nodes.insert(ScopeNode {
            generation,
            parent: parent_index,
            children: Vec::new(),
            handles: Vec::new(),
            active: true,
        });
        if let Some(parent_index) = parent_index {
            self.nodes[parent_index].children.push(index);
        }
        Ok(ScopeId { index, generation })
    }

    pub fn is_active(&self, id: ScopeId) -> bool {
        self.get(id).map(|node| node.active).unwrap_or(false)
    }

    /// Records a handle launched through `id`.
    pub fn register(&mut self, id: ScopeId, handle: CoroutineHandle) -> Result<(), Fail> {
        match self.get_mut(id) {
            Some(node) if node.active => {
                node.handles.retain(|handle| !handle.is_done());
                node.handles.push(handle);
                Ok(())
            },
            _ => {
                let cause: String = format!("scope is not active (scope={:?})", id);
                warn!("register(): {}", cause);
                Err(Fail::new(libc::ECANCELED, &cause))
            },
        }
    }

    /// Forgets finished handles in every scope and hands them back to the caller.
    pub fn prune(&mut self) -> Vec<CoroutineHandle> {
        let mut pruned: Vec<CoroutineHandle> = Vec::new();
        for (_, node) in self.nodes.iter_mut() {
            let (done, running): (Vec<CoroutineHandle>, Vec<CoroutineHandle>) =
                node.handles.drain(..).partition(|handle| handle.is_done());
            node.handles = running;
            pruned.extend(done);
        }
        pruned
    }

    /// Number of handles recorded across all scopes.
    #[cfg(test)]
    pub fn num_handles(&self) -> usize {
        self.nodes.iter().map(|(_, node)| node.handles.len()).sum()
    }

    /// Deactivates `id` and all of its descendants. Returns the handles to cancel, own handles of a scope ahead of its
    /// descendants'.
    pub fn cancel(&mut self, id: ScopeId) -> Vec<CoroutineHandle> {
        let mut handles: Vec<CoroutineHandle> = Vec::new();
        let root: usize = match self.get(id) {
            Some(_) => id.index,
            None => return handles,
        };
        let mut walk: Vec<usize> = vec![root];
        while let Some(index) = walk.pop() {
            let node: &mut ScopeNode = &mut self.nodes[index];
            node.active = false;
            handles.append(&mut node.handles);
            walk.extend(node.children.iter().rev().copied());
        }
        handles
    }

    /// Cancels `id` and frees its slot. Children stay in the arena, cancelled and detached.
    pub fn remove(&mut self, id: ScopeId) -> Vec<CoroutineHandle> {
        let handles: Vec<CoroutineHandle> = self.cancel(id);
        if self.get(id).is_none() {
            return handles;
        }
        let node: ScopeNode = self.nodes.remove(id.index);
        if let Some(parent) = node.parent.and_then(|parent| self.nodes.get_mut(parent)) {
            parent.children.retain(|child| *child != id.index);
        }
        for child in node.children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }
        handles
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn get(&self, id: ScopeId) -> Option<&ScopeNode> {
        self.nodes.get(id.index).filter(|node| node.generation == id.generation)
    }

    fn get_mut(&mut self, id: ScopeId) -> Option<&mut ScopeNode> {
        self.nodes.get_mut(id.index).filter(|node| node.generation == id.generation)
    }
}

impl CoroutineScope {
    /// Creates a root scope on `scheduler`.
    pub fn new(scheduler: &SharedScheduler) -> Result<Self, Fail> {
        let id: ScopeId = scheduler.create_scope(None)?;
        trace!("new(): scope={:?}", id);
        Ok(Self {
            id,
            scheduler: scheduler.clone(),
        })
    }

    /// Creates a scope that is cancelled whenever this one is.
    pub fn child(&self) -> Result<Self, Fail> {
        let id: ScopeId = self.scheduler.create_scope(Some(self.id))?;
        trace!("child(): parent={:?}, scope={:?}", self.id, id);
        Ok(Self {
            id,
            scheduler: self.scheduler.clone(),
        })
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }

    /// Launches a coroutine. It first runs on the tick after this call.
    pub fn launch<B>(&self, name: &str, body: B) -> Result<CoroutineHandle, Fail>
    where
        B: IntoIterator<Item = YieldResult>,
        B::IntoIter: Send + 'static,
    {
        self.scheduler.run(name, body, self)
    }

    /// Launches a coroutine whose context carries `owner`.
    pub fn launch_owned<B>(&self, name: &str, owner: OwnerTag, body: B) -> Result<CoroutineHandle, Fail>
    where
        B: IntoIterator<Item = YieldResult>,
        B::IntoIter: Send + 'static,
    {
        self.scheduler.run_owned(name, body, self, Some(owner))
    }

    pub fn is_active(&self) -> bool {
        self.scheduler.is_scope_active(self.id)
    }

    /// Cancels every coroutine launched here and every descendant scope. Idempotent.
    pub fn cancel(&self) {
        self.scheduler.cancel_scope(self.id);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for CoroutineScope {
    fn drop(&mut self) {
        self.scheduler.remove_scope(self.id);
    }
}

impl fmt::Debug for CoroutineScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineScope")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        ScopeArena,
        ScopeId,
    };
    use ::anyhow::Result;

    #[test]
    fn cancel_reaches_descendants() -> Result<()> {
        let mut arena: ScopeArena = ScopeArena::default();
        let root: ScopeId = arena.insert(None)?;
        let child: ScopeId = arena.insert(Some(root))?;
        let grandchild: ScopeId = arena.insert(Some(child))?;
        let sibling: ScopeId = arena.insert(None)?;

        arena.cancel(root);
        crate::ensure_eq!(arena.is_active(root), false);
        crate::ensure_eq!(arena.is_active(child), false);
        crate::ensure_eq!(arena.is_active(grandchild), false);
        crate::ensure_eq!(arena.is_active(sibling), true);
        Ok(())
    }

    #[test]
    fn inactive_scopes_refuse_children() -> Result<()> {
        let mut arena: ScopeArena = ScopeArena::default();
        let root: ScopeId = arena.insert(None)?;
        arena.cancel(root);
        match arena.insert(Some(root)) {
            Err(e) => crate::ensure_eq!(e.errno, libc::ECANCELED),
            Ok(_) => anyhow::bail!("child of a cancelled scope should be refused"),
        }
        Ok(())
    }

    #[test]
    fn recycled_slots_do_not_revive_stale_ids() -> Result<()> {
        let mut arena: ScopeArena = ScopeArena::default();
        let stale: ScopeId = arena.insert(None)?;
        arena.remove(stale);
        let fresh: ScopeId = arena.insert(None)?;
        crate::ensure_neq!(stale, fresh);
        crate::ensure_eq!(arena.is_active(stale), false);
        crate::ensure_eq!(arena.is_active(fresh), true);
        crate::ensure_eq!(arena.len(), 1);
        Ok(())
    }

    #[test]
    fn removing_a_parent_detaches_children() -> Result<()> {
        let mut arena: ScopeArena = ScopeArena::default();
        let root: ScopeId = arena.insert(None)?;
        let child: ScopeId = arena.insert(Some(root))?;
        arena.remove(root);
        crate::ensure_eq!(arena.is_active(child), false);
        crate::ensure_eq!(arena.len(), 1);
        arena.remove(child);
        crate::ensure_eq!(arena.len(), 0);
        Ok(())
    }
}
