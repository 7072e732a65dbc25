//! Frame-budget countdown that halts the render loop.
//!
//! ```text
//!  Inactive ──arm(n)──▶ Counting(n) ──tick──▶ … ──tick──▶ Counting(0) ──tick──▶ Frozen
//!     ▲                                                                           │
//!     └─────────────────────────────── unfreeze ──────────────────────────────────┘
//! ```
//!
//! `freeze()` jumps to `Frozen` from anywhere; `disarm()` drops a countdown back to `Inactive`.

use tracing::{info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreezeState {
    #[default]
    Inactive,
    /// Ticks left before the tick that freezes.
    Counting(u32),
    Frozen,
}

/// What a single [`FreezeScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing armed.
    Idle,
    /// Counted down; carries the ticks still left.
    Counted(u32),
    /// This tick froze the loop.
    Froze,
    /// Ticked while already frozen. Logged and ignored.
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct FreezeScheduler {
    state: FreezeState,
}

impl FreezeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FreezeState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.state == FreezeState::Frozen
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, FreezeState::Counting(_))
    }

    /// `-1` when nothing is counting (inactive or already frozen), otherwise ticks remaining.
    pub fn frames_remaining(&self) -> i64 {
        match self.state {
            FreezeState::Counting(frames) => frames as i64,
            FreezeState::Inactive | FreezeState::Frozen => -1,
        }
    }

    /// Starts a countdown of `frames` ticks. Re-arming restarts the countdown.
    pub fn arm(&mut self, frames: u32) {
        if self.is_frozen() {
            warn!("arming while frozen; the loop resumes");
        }
        info!(frames, "armed freeze countdown");
        self.state = FreezeState::Counting(frames);
    }

    /// Returns `false` if already frozen.
    pub fn freeze(&mut self) -> bool {
        if self.is_frozen() {
            return false;
        }
        info!("render loop frozen");
        self.state = FreezeState::Frozen;
        true
    }

    /// Returns `false` if not frozen.
    pub fn unfreeze(&mut self) -> bool {
        if !self.is_frozen() {
            return false;
        }
        info!("render loop unfrozen");
        self.state = FreezeState::Inactive;
        true
    }

    /// Cancels a running countdown. Returns `false` if nothing was counting.
    pub fn disarm(&mut self) -> bool {
        let FreezeState::Counting(remaining) = self.state else {
            return false;
        };
        info!(remaining, "freeze countdown cancelled");
        self.state = FreezeState::Inactive;
        true
    }

    pub fn tick(&mut self) -> Tick {
        match self.state {
            FreezeState::Inactive => Tick::Idle,
            FreezeState::Counting(0) => {
                self.freeze();
                Tick::Froze
            }
            FreezeState::Counting(frames) => {
                self.state = FreezeState::Counting(frames - 1);
                trace!(remaining = frames - 1, "freeze countdown");
                Tick::Counted(frames - 1)
            }
            FreezeState::Frozen => {
                // The frame wrapper returns before drawing while frozen, so this is a caller bug.
                warn!("tick while frozen ignored");
                Tick::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_zero_freezes_on_next_tick() {
        let mut scheduler = FreezeScheduler::new();
        scheduler.arm(0);

        assert_eq!(scheduler.frames_remaining(), 0);
        assert_eq!(scheduler.tick(), Tick::Froze);
        assert!(scheduler.is_frozen());
    }

    #[test]
    fn budget_three_counts_down_before_freezing_on_fourth_tick() {
        let mut scheduler = FreezeScheduler::new();
        scheduler.arm(3);

        assert_eq!(scheduler.tick(), Tick::Counted(2));
        assert_eq!(scheduler.state(), FreezeState::Counting(2));
        assert_eq!(scheduler.tick(), Tick::Counted(1));
        assert_eq!(scheduler.state(), FreezeState::Counting(1));
        assert_eq!(scheduler.tick(), Tick::Counted(0));
        assert_eq!(scheduler.state(), FreezeState::Counting(0));
        assert!(!scheduler.is_frozen());
        assert_eq!(scheduler.tick(), Tick::Froze);
        assert_eq!(scheduler.state(), FreezeState::Frozen);
    }

    #[test]
    fn tick_is_noop_when_inactive() {
        let mut scheduler = FreezeScheduler::new();

        assert_eq!(scheduler.tick(), Tick::Idle);
        assert_eq!(scheduler.frames_remaining(), -1);
    }

    #[test]
    fn tick_while_frozen_is_ignored() {
        let mut scheduler = FreezeScheduler::new();
        scheduler.freeze();

        assert_eq!(scheduler.tick(), Tick::Ignored);
        assert!(scheduler.is_frozen());
    }

    #[test]
    fn unfreeze_returns_to_inactive() {
        let mut scheduler = FreezeScheduler::new();
        scheduler.arm(1);
        assert!(!scheduler.unfreeze());

        scheduler.freeze();
        assert!(!scheduler.freeze());
        assert!(scheduler.unfreeze());
        assert_eq!(scheduler.state(), FreezeState::Inactive);
    }

    #[test]
    fn disarm_cancels_countdown_but_not_freeze() {
        let mut scheduler = FreezeScheduler::new();
        assert!(!scheduler.disarm());

        scheduler.arm(4);
        scheduler.tick();
        assert!(scheduler.disarm());
        assert_eq!(scheduler.frames_remaining(), -1);
        assert_eq!(scheduler.tick(), Tick::Idle);

        scheduler.freeze();
        assert!(!scheduler.disarm());
        assert!(scheduler.is_frozen());
    }
}
