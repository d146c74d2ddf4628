//! Unified event stream for the transport
//!
//! Lifecycle, negotiation and flow-control activity is emitted through a
//! single event channel, keeping observers (feature gating, statistics
//! displays, upstream producers watching for pause/resume) on one ordered
//! stream. Received data frames do not travel here; they go through the
//! receive queues.

use hostlink_wire::{Capabilities, ChipId, NegotiationError};

use crate::error::TransferError;

/// Events emitted by the transport engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A slave init event was accepted and the data path is (re)opening
    SlaveInit {
        /// Validated chip identity
        chip: ChipId,
        /// Negotiated capability bitmask
        capabilities: Capabilities,
        /// Firmware version was present and matched the supported release
        fw_checked: bool,
    },

    /// A slave init event was rejected
    NegotiationFailed {
        /// Why bring-up was refused
        error: NegotiationError,
    },

    /// The slave restarted after the data path was already open
    PeerReset,

    /// Reinit finished and the link is running again
    ReinitDone {
        /// Transmit frames dropped by the purge
        dropped_tx: usize,
        /// Receive frames dropped by the purge
        dropped_rx: usize,
    },

    /// Other-class transmit crossed the high watermark; producers must pause
    TxPaused {
        /// Pending Other-class frames at the moment of the pause
        pending: usize,
    },

    /// Pending count dropped below the low watermark; producers may resume
    TxResumed,

    /// One exchange cycle failed; the link continues
    TransferFailed {
        /// The bus error
        error: TransferError,
    },

    /// Peer signaled a power-save transition in a frame header
    PowerSave {
        /// true = entered power save, false = left it
        started: bool,
    },
}

impl LinkEvent {
    /// Flow-control event (pause/resume signaling)
    pub fn is_flow_control(&self) -> bool {
        matches!(self, LinkEvent::TxPaused { .. } | LinkEvent::TxResumed)
    }

    /// Lifecycle event (bring-up, restart, reinit)
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            LinkEvent::SlaveInit { .. }
                | LinkEvent::NegotiationFailed { .. }
                | LinkEvent::PeerReset
                | LinkEvent::ReinitDone { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        assert!(LinkEvent::TxPaused { pending: 10 }.is_flow_control());
        assert!(LinkEvent::TxResumed.is_flow_control());
        assert!(!LinkEvent::PeerReset.is_flow_control());

        assert!(LinkEvent::PeerReset.is_lifecycle());
        assert!(LinkEvent::ReinitDone {
            dropped_tx: 0,
            dropped_rx: 0
        }
        .is_lifecycle());
        assert!(!LinkEvent::PowerSave { started: true }.is_lifecycle());
    }
}
