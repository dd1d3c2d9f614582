// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::instructions::Instruction;
use ::std::time::{
    Duration,
    Instant,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Waits until the scheduler's accumulated tick time reaches a number of seconds.
#[derive(Clone, Debug)]
pub struct Delay {
    duration: f64,
    elapsed: f64,
}

/// Waits for wall-clock time, regardless of the deltas passed to the scheduler.
#[derive(Clone, Debug)]
pub struct RealtimeDelay {
    deadline: Instant,
    now: Instant,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Delay {
    /// Negative and NaN durations clamp to zero.
    pub fn new(seconds: f64) -> Self {
        let duration: f64 = if seconds > 0.0 { seconds } else { 0.0 };
        Self { duration, elapsed: 0.0 }
    }

    pub fn remaining(&self) -> f64 {
        (self.duration - self.elapsed).max(0.0)
    }
}

impl RealtimeDelay {
    /// Starts counting at construction.
    pub fn new(duration: Duration) -> Self {
        let now: Instant = Instant::now();
        Self {
            deadline: now + duration,
            now,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Instruction for Delay {
    fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }

    fn update(&mut self, delta: f64) {
        if delta > 0.0 {
            self.elapsed += delta;
        }
    }
}

impl Instruction for RealtimeDelay {
    fn is_done(&self) -> bool {
        self.now >= self.deadline
    }

    fn update(&mut self, _delta: f64) {
        self.now = Instant::now();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        Delay,
        RealtimeDelay,
    };
    use crate::runtime::instructions::Instruction;
    use ::anyhow::Result;
    use ::std::{
        thread,
        time::Duration,
    };

    #[test]
    fn delay_accumulates_deltas() -> Result<()> {
        let mut delay: Delay = Delay::new(1.0);
        delay.update(0.5);
        crate::ensure_eq!(delay.is_done(), false);
        delay.update(0.5);
        crate::ensure_eq!(delay.is_done(), true);
        crate::ensure_eq!(delay.remaining(), 0.0);
        Ok(())
    }

    #[test]
    fn non_positive_delay_is_done_after_first_update() -> Result<()> {
        for seconds in [0.0, -3.0] {
            let mut delay: Delay = Delay::new(seconds);
            delay.update(0.0);
            crate::ensure_eq!(delay.is_done(), true);
        }
        Ok(())
    }

    #[test]
    fn realtime_delay_ignores_deltas() -> Result<()> {
        let mut delay: RealtimeDelay = RealtimeDelay::new(Duration::from_millis(20));
        delay.update(100.0);
        crate::ensure_eq!(delay.is_done(), false);
        thread::sleep(Duration::from_millis(30));
        delay.update(0.0);
        crate::ensure_eq!(delay.is_done(), true);
        Ok(())
    }
}
