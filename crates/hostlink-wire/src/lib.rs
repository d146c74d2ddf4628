//! Hostlink Wire Format
//!
//! This crate provides the wire-level building blocks for the hostlink
//! transport: the packed payload header that fronts every transfer, the
//! owned [`Frame`] buffer that moves through the priority queues, and the
//! TLV init-event parsing used to negotiate capabilities with the slave.
//!
//! # Architecture
//!
//! Everything here is pure and synchronous, with no I/O and no async. The
//! transaction engine in `hostlink-mux` owns scheduling and buffer
//! lifecycles; this crate only answers "what do these bytes mean" and
//! "what bytes does this frame become":
//!
//! - [`header`]: 12-byte packed header encode/decode plus the additive
//!   checksum
//! - [`frame`]: owned header+payload buffers for both directions
//! - [`negotiation`]: slave init-event TLV stream, capability bitmask,
//!   chip identity allow-list, firmware version policy
//!
//! # Example
//!
//! ```rust
//! use hostlink_wire::{Frame, InterfaceType};
//!
//! // Build an outbound serial frame, checksummed
//! let frame = Frame::build(InterfaceType::Serial, 0, 0, b"ping", 1, true).unwrap();
//! assert!(frame.verify_checksum());
//!
//! // The receive side reconstructs it from the padded transfer buffer
//! let mut transfer = frame.as_bytes().to_vec();
//! transfer.resize(1600, 0);
//! let parsed = Frame::from_transfer(transfer).unwrap();
//! assert_eq!(parsed.payload(), b"ping");
//! ```

pub mod error;
pub mod frame;
pub mod header;
pub mod negotiation;

pub use error::{NegotiationError, WireError};
pub use frame::Frame;
pub use header::{
    compute_checksum, verify_checksum, InterfaceType, PayloadHeader, TypeTag, HEADER_SIZE,
};
pub use negotiation::{
    check_firmware, parse_init_event, Capabilities, ChipId, FirmwareVersion, FwCheckPolicy,
    InitEventBuilder, RawTpMode, SlaveReport,
};
