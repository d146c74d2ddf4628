//! Link counters
//!
//! Transport-level errors are invisible above the transport boundary except
//! through these counters; a dropped frame or failed cycle bumps a number
//! and nothing else.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters shared between the engine and handles
#[derive(Debug, Default)]
pub(crate) struct LinkStats {
    pub tx_frames: AtomicU64,
    pub rx_frames: AtomicU64,
    pub rx_dropped_malformed: AtomicU64,
    pub rx_dropped_checksum: AtomicU64,
    pub transfer_failures: AtomicU64,
    pub reinits: AtomicU64,
}

impl LinkStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            rx_dropped_malformed: self.rx_dropped_malformed.load(Ordering::Relaxed),
            rx_dropped_checksum: self.rx_dropped_checksum.load(Ordering::Relaxed),
            transfer_failures: self.transfer_failures.load(Ordering::Relaxed),
            reinits: self.reinits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the link counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Frames sent in completed exchanges
    pub tx_frames: u64,
    /// Frames received and delivered to the receive queues
    pub rx_frames: u64,
    /// Received buffers dropped for malformed headers
    pub rx_dropped_malformed: u64,
    /// Received frames dropped for checksum mismatches
    pub rx_dropped_checksum: u64,
    /// Exchange cycles aborted by bus errors
    pub transfer_failures: u64,
    /// Completed reinit cycles
    pub reinits: u64,
}
