//! Error types for wire parsing and capability negotiation

use thiserror::Error;

/// Errors that can occur while decoding or building wire frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer is too short to contain a full header
    #[error("truncated frame: {got} bytes, need at least {need}")]
    Truncated { got: usize, need: usize },

    /// Interface type nibble is outside the known range
    #[error("unknown interface type {0}")]
    UnknownInterface(u8),

    /// Interface sub-index does not fit the 4-bit field
    #[error("interface number {0} out of range (max 15)")]
    InterfaceNumOutOfRange(u8),

    /// Header declares a zero-length payload
    #[error("zero-length payload")]
    ZeroLength,

    /// Header offset field does not match the header size
    #[error("bad payload offset {found}, expected {expected}")]
    BadOffset { found: u16, expected: u16 },

    /// Declared payload runs past the end of the transfer buffer
    #[error("payload length {len} overruns {max}-byte transfer")]
    Overrun { len: u16, max: usize },

    /// Payload does not fit the fixed transfer size
    #[error("frame of {len} bytes exceeds transfer size {max}")]
    TooLarge { len: usize, max: usize },
}

/// Errors raised while processing a slave init event
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Event buffer is shorter than its declared length
    #[error("truncated init event")]
    Truncated,

    /// Event type byte is not a known event
    #[error("unsupported event type {0}")]
    UnsupportedEvent(u8),

    /// Chip identity missing or not in the allow-list
    #[error("unrecognized chip id 0x{0:02X}")]
    UnknownChip(u8),

    /// Firmware version failed the strict compatibility check
    #[error("incompatible slave firmware {0}")]
    IncompatibleFirmware(String),
}
