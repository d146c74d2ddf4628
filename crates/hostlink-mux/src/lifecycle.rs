//! Link lifecycle state
//!
//! The link is either running or mid-reset. The only way into the resetting
//! state is observing a second slave init event after the data path already
//! opened (the peer restarted underneath us); the transition back is
//! unconditional once teardown/rebuild finishes, even if the rebuild
//! reported an error. The policy is keep trying, not give up.

use std::sync::atomic::{AtomicU8, Ordering};

/// Process-wide link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Normal operation
    Running,
    /// Firmware restart detected, queues being rebuilt
    Resetting,
}

const RUNNING: u8 = 0;
const RESETTING: u8 = 1;

/// Atomic state cell with an idempotent reset guard
#[derive(Debug)]
pub(crate) struct LinkStateCell(AtomicU8);

impl LinkStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(RUNNING))
    }

    pub fn get(&self) -> LinkState {
        match self.0.load(Ordering::Acquire) {
            RESETTING => LinkState::Resetting,
            _ => LinkState::Running,
        }
    }

    /// Enter the resetting state; false if a reset is already in progress
    pub fn try_begin_reset(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, RESETTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Leave the resetting state unconditionally
    pub fn finish_reset(&self) {
        self.0.store(RUNNING, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_guard_is_idempotent() {
        let cell = LinkStateCell::new();
        assert_eq!(cell.get(), LinkState::Running);

        assert!(cell.try_begin_reset());
        assert_eq!(cell.get(), LinkState::Resetting);

        // Re-entering while a reset is active is refused
        assert!(!cell.try_begin_reset());

        cell.finish_reset();
        assert_eq!(cell.get(), LinkState::Running);

        // A fresh cycle is allowed again
        assert!(cell.try_begin_reset());
        cell.finish_reset();
    }
}
