// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//==============================================================================
// Imports
//==============================================================================

use self::common::{
    action,
    Flag,
    Test,
};
use ::anyhow::Result;
use ::coopkernel::{
    ensure_eq,
    CoroutineHandle,
    CoroutineScope,
    FrameCount,
    Yield,
    YieldResult,
};
use ::parking_lot::Mutex;
use ::std::sync::Arc;

/// Body that never finishes on its own within a test.
fn forever() -> Vec<YieldResult> {
    vec![Ok(Yield::wait(FrameCount::new(i64::MAX)))]
}

//==============================================================================
// Cancellation
//==============================================================================

#[test]
fn cancel_reaches_every_descendant_scope() -> Result<()> {
    let test: Test = Test::new()?;
    let child: CoroutineScope = test.scope.child()?;
    let grandchild: CoroutineScope = child.child()?;
    let bystander: CoroutineScope = CoroutineScope::new(&test.scheduler)?;
    let order: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut handles: Vec<CoroutineHandle> = Vec::new();
    for (scope, name) in [(&grandchild, "grandchild"), (&child, "child"), (&test.scope, "root")] {
        let handle: CoroutineHandle = scope.launch(name, forever())?;
        let order_: Arc<Mutex<Vec<String>>> = order.clone();
        handle.on_complete(move |h| order_.lock().push(h.name().to_string()));
        handles.push(handle);
    }
    let survivor: CoroutineHandle = bystander.launch("bystander", forever())?;
    test.tick_n(1, 0.016)?;

    test.scope.cancel();
    for handle in &handles {
        ensure_eq!(handle.is_done(), true);
        ensure_eq!(handle.is_cancelled(), true);
    }
    // Own handles go first, then descendants.
    ensure_eq!(*order.lock(), vec!["root", "child", "grandchild"]);
    ensure_eq!(test.scope.is_active(), false);
    ensure_eq!(grandchild.is_active(), false);
    ensure_eq!(survivor.is_done(), false);

    test.tick_n(1, 0.016)?;
    ensure_eq!(test.scheduler.num_active(), 1);
    Ok(())
}

#[test]
fn cancelled_scope_rejects_launches_and_children() -> Result<()> {
    let test: Test = Test::new()?;
    test.scope.cancel();
    test.scope.cancel();
    match test.scope.launch("late", forever()) {
        Err(e) => ensure_eq!(e.errno, libc::ECANCELED),
        Ok(_) => anyhow::bail!("launch on a cancelled scope should be rejected"),
    }
    match test.scope.child() {
        Err(e) => ensure_eq!(e.errno, libc::ECANCELED),
        Ok(_) => anyhow::bail!("child of a cancelled scope should be rejected"),
    }
    ensure_eq!(test.scheduler.is_idle(), true);
    Ok(())
}

#[test]
fn pending_handles_never_start_once_cancelled() -> Result<()> {
    let test: Test = Test::new()?;
    let flag: Flag = Flag::default();
    let handle: CoroutineHandle = test.scope.launch("never", vec![flag.raise()])?;
    test.scope.cancel();
    ensure_eq!(handle.is_cancelled(), true);
    test.tick_n(1, 0.016)?;
    ensure_eq!(flag.is_set(), false);
    ensure_eq!(test.scheduler.is_idle(), true);
    Ok(())
}

#[test]
fn dropping_a_scope_tears_it_down() -> Result<()> {
    let test: Test = Test::new()?;
    let child: CoroutineScope = test.scope.child()?;
    let doomed: CoroutineHandle = child.launch("doomed", forever())?;
    let kept: CoroutineHandle = test.scope.launch("kept", forever())?;
    test.tick_n(1, 0.016)?;

    drop(child);
    ensure_eq!(doomed.is_cancelled(), true);
    ensure_eq!(kept.is_done(), false);
    ensure_eq!(doomed.context().is_scope_active(), false);
    ensure_eq!(test.scope.is_active(), true);
    ensure_eq!(test.scheduler.num_scopes(), 1);
    Ok(())
}

#[test]
fn body_may_cancel_its_own_scope() -> Result<()> {
    let test: Test = Test::new()?;
    let scope: Arc<CoroutineScope> = Arc::new(test.scope.child()?);
    let after: Flag = Flag::default();
    let completed: Flag = Flag::default();

    let scope_: Arc<CoroutineScope> = scope.clone();
    let handle: CoroutineHandle = scope.launch(
        "quitter",
        vec![
            Ok(Yield::wait(FrameCount::new(1))),
            action(move || scope_.cancel()),
            after.raise(),
        ],
    )?;
    let completed_: Flag = completed.clone();
    handle.on_complete(move |h| {
        assert!(h.is_cancelled());
        completed_.set();
    });

    test.tick_n(2, 0.016)?;
    ensure_eq!(handle.is_cancelled(), true);
    ensure_eq!(completed.is_set(), true);
    ensure_eq!(after.is_set(), false);
    ensure_eq!(scope.is_active(), false);
    test.tick_n(1, 0.016)?;
    ensure_eq!(test.scheduler.is_idle(), true);
    Ok(())
}

#[test]
fn completion_callbacks_may_launch_follow_ups() -> Result<()> {
    let test: Test = Test::new()?;
    let scope: Arc<CoroutineScope> = Arc::new(test.scope.child()?);
    let flag: Flag = Flag::default();
    let first: CoroutineHandle = scope.launch("first", Vec::<YieldResult>::new())?;

    let scope_: Arc<CoroutineScope> = scope.clone();
    let flag_: Flag = flag.clone();
    first.on_complete(move |_| {
        let _ = scope_.launch("second", vec![flag_.raise()]);
    });

    test.tick_n(1, 0.016)?;
    ensure_eq!(first.is_done(), true);
    ensure_eq!(flag.is_set(), false);
    test.tick_n(1, 0.016)?;
    ensure_eq!(flag.is_set(), true);
    Ok(())
}
