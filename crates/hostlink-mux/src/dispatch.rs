//! Interrupt-to-work dispatch
//!
//! Both hardware lines (handshake and data-ready) funnel into one
//! [`IrqLine`]. Raising it stores at most a single pending wake, so a burst
//! of interrupts collapses into one unit of deferred work for the engine.
//! The interrupt side never takes a lock and never queues duplicates.

use std::sync::Arc;

use tokio::sync::Notify;

/// Coalescing wake signal between interrupt sources and the engine
#[derive(Debug, Clone, Default)]
pub struct IrqLine {
    notify: Arc<Notify>,
}

impl IrqLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that the engine has work
    ///
    /// Safe to call from any context, any number of times; extra raises
    /// while a wake is already pending are no-ops.
    pub fn raise(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next pending wake (engine side)
    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_one_wake() {
        let line = IrqLine::new();
        for _ in 0..50 {
            line.raise();
        }

        // One wake is pending...
        timeout(Duration::from_millis(10), line.wait())
            .await
            .expect("first wait should complete");

        // ...and only one
        assert!(timeout(Duration::from_millis(10), line.wait())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_raise_after_drain_wakes_again() {
        let line = IrqLine::new();
        line.raise();
        line.wait().await;

        line.raise();
        timeout(Duration::from_millis(10), line.wait())
            .await
            .expect("new raise should wake");
    }
}
