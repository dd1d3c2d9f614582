// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//==============================================================================
// Imports
//==============================================================================

use self::common::Test;
use ::anyhow::Result;
use ::coopkernel::{
    ensure_eq,
    Fail,
    SharedScheduler,
};
use ::std::thread;

//==============================================================================
// Thread Affinity
//==============================================================================

#[test]
fn foreign_thread_tick_fails_every_time() -> Result<()> {
    let test: Test = Test::new()?;
    test.tick_n(1, 0.016)?;

    let scheduler: SharedScheduler = test.scheduler.clone();
    let errnos: Vec<Option<i32>> = match thread::spawn(move || {
        (0..3)
            .map(|_| scheduler.tick(0.016).err().map(|e: Fail| e.errno))
            .collect::<Vec<Option<i32>>>()
    })
    .join()
    {
        Ok(errnos) => errnos,
        Err(_) => anyhow::bail!("ticking thread panicked"),
    };
    ensure_eq!(errnos, vec![Some(libc::EPERM); 3]);

    // The owner is unaffected.
    test.tick_n(1, 0.016)?;
    Ok(())
}

#[test]
fn first_ticking_thread_becomes_owner() -> Result<()> {
    let test: Test = Test::new()?;
    let scheduler: SharedScheduler = test.scheduler.clone();
    let first: Result<(), Fail> = match thread::spawn(move || scheduler.tick(0.016)).join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("ticking thread panicked"),
    };
    first?;

    match test.scheduler.tick(0.016) {
        Err(e) => ensure_eq!(e.errno, libc::EPERM),
        Ok(()) => anyhow::bail!("tick from a second thread should fail"),
    }
    Ok(())
}
