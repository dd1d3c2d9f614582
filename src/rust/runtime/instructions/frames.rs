// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::instructions::Instruction;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Waits for a number of ticks.
#[derive(Clone, Debug)]
pub struct FrameCount {
    remaining: u64,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl FrameCount {
    /// Anything below one frame waits one frame.
    pub fn new(frames: i64) -> Self {
        Self {
            remaining: frames.max(1) as u64,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Instruction for FrameCount {
    fn is_done(&self) -> bool {
        self.remaining == 0
    }

    fn update(&mut self, _delta: f64) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::FrameCount;
    use crate::runtime::instructions::Instruction;
    use ::anyhow::Result;

    #[test]
    fn counts_updates_not_time() -> Result<()> {
        let mut frames: FrameCount = FrameCount::new(3);
        for _ in 0..2 {
            frames.update(10.0);
            crate::ensure_eq!(frames.is_done(), false);
        }
        frames.update(0.0);
        crate::ensure_eq!(frames.is_done(), true);
        Ok(())
    }

    #[test]
    fn clamps_to_one_frame() -> Result<()> {
        for n in [0, -5] {
            let mut frames: FrameCount = FrameCount::new(n);
            crate::ensure_eq!(frames.is_done(), false);
            frames.update(0.0);
            crate::ensure_eq!(frames.is_done(), true);
        }
        Ok(())
    }
}
