//! Error types for the transport engine

use thiserror::Error;

use hostlink_wire::{NegotiationError, WireError};

/// Errors returned from the transmit entry point
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransmitError {
    /// Other-class traffic is paused; retry after a resume event
    #[error("transmit backpressure asserted")]
    Backpressure,

    /// Data path has not been opened (or the engine is resetting)
    #[error("data path is not open")]
    LinkDown,

    /// Payload cannot fit one fixed-size transfer
    #[error("payload of {len} bytes exceeds {max}-byte transfer")]
    TooLarge { len: usize, max: usize },

    /// Frame construction failed
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Errors from the hardware exchange primitive
///
/// Always recovered locally: a failed cycle frees its buffers and the next
/// cycle proceeds normally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Bus I/O failed mid-exchange
    #[error("bus I/O failed: {0}")]
    Io(String),

    /// No device is currently bound to the link
    #[error("link device not bound")]
    NotBound,
}

/// Why bring-up did not reach the running state
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BringUpError {
    /// The slave's init event was rejected
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// The engine task stopped before any init event arrived
    #[error("engine stopped before bring-up completed")]
    EngineStopped,
}
