//! Payload header codec
//!
//! Every transfer on the link carries a fixed 12-byte packed header in front
//! of the payload, little-endian throughout.
//!
//! # Layout
//! ```text
//! byte 0      if_type (low nibble) | if_num (high nibble)
//! byte 1      flags
//! bytes 2-3   payload length (excluding header)
//! bytes 4-5   payload offset from frame start (always the header size)
//! bytes 6-7   additive checksum, 0 when unchecked
//! bytes 8-9   transmit sequence number (advisory)
//! byte 10     reserved
//! byte 11     per-interface type tag (HCI / priv packet type)
//! ```
//!
//! The checksum is a plain 16-bit wrapping byte sum over header plus payload
//! with the checksum field treated as zero, a deliberately weak check for a
//! link that is assumed reliable at the byte level.

use serde::{Deserialize, Serialize};

use crate::error::WireError;

/// Size of the packed payload header in bytes
pub const HEADER_SIZE: usize = 12;

/// Frame carries further fragments of the same unit
pub const FLAG_MORE_FRAGMENT: u8 = 1 << 0;
/// Frame is a wakeup packet
pub const FLAG_WAKEUP_PKT: u8 = 1 << 1;
/// Peer entered power-save mode
pub const FLAG_POWER_SAVE_STARTED: u8 = 1 << 2;
/// Peer left power-save mode
pub const FLAG_POWER_SAVE_STOPPED: u8 = 1 << 3;

/// Interface class carried in the low nibble of the first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceType {
    /// Wi-Fi station traffic
    Station,
    /// Wi-Fi SoftAP traffic
    Ap,
    /// Serial/control channel
    Serial,
    /// Bluetooth HCI
    HciBt,
    /// Private events and commands between host driver and slave firmware
    Priv,
    /// Raw throughput test traffic
    Test,
}

impl InterfaceType {
    /// Number of defined interface classes
    pub const COUNT: u8 = 6;

    /// Raw nibble value for encoding
    pub fn as_u8(self) -> u8 {
        match self {
            InterfaceType::Station => 0,
            InterfaceType::Ap => 1,
            InterfaceType::Serial => 2,
            InterfaceType::HciBt => 3,
            InterfaceType::Priv => 4,
            InterfaceType::Test => 5,
        }
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            InterfaceType::Station => "sta",
            InterfaceType::Ap => "ap",
            InterfaceType::Serial => "serial",
            InterfaceType::HciBt => "hci",
            InterfaceType::Priv => "priv",
            InterfaceType::Test => "test",
        }
    }
}

impl TryFrom<u8> for InterfaceType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(InterfaceType::Station),
            1 => Ok(InterfaceType::Ap),
            2 => Ok(InterfaceType::Serial),
            3 => Ok(InterfaceType::HciBt),
            4 => Ok(InterfaceType::Priv),
            5 => Ok(InterfaceType::Test),
            other => Err(WireError::UnknownInterface(other)),
        }
    }
}

/// Final header byte, repurposed per interface class
///
/// Only the HCI and priv interfaces define a meaning for this byte; for every
/// other class it is reserved padding and never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// No meaning for this interface class
    Reserved,
    /// HCI packet type (command/ACL/SCO/event)
    Hci(u8),
    /// Priv packet type (currently only the event marker)
    Priv(u8),
}

impl TypeTag {
    /// Raw byte written into the header
    pub fn raw(self) -> u8 {
        match self {
            TypeTag::Reserved => 0,
            TypeTag::Hci(t) | TypeTag::Priv(t) => t,
        }
    }

    fn resolve(if_type: InterfaceType, byte: u8) -> Self {
        match if_type {
            InterfaceType::HciBt => TypeTag::Hci(byte),
            InterfaceType::Priv => TypeTag::Priv(byte),
            _ => TypeTag::Reserved,
        }
    }
}

/// Decoded payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Interface class
    pub if_type: InterfaceType,
    /// Sub-index within the class (0..16)
    pub if_num: u8,
    /// Flag bits
    pub flags: u8,
    /// Payload length in bytes, excluding the header
    pub len: u16,
    /// Offset from frame start to payload start
    pub offset: u16,
    /// Stored checksum (0 = unchecked)
    pub checksum: u16,
    /// Advisory transmit sequence number
    pub seq_num: u16,
    /// Per-interface trailing tag
    pub type_tag: TypeTag,
}

impl PayloadHeader {
    /// Build a header for an outbound frame
    ///
    /// The checksum field starts at zero; [`crate::frame::Frame`] fills it in
    /// after the payload is in place.
    pub fn new(
        if_type: InterfaceType,
        if_num: u8,
        tag: u8,
        payload_len: u16,
        seq_num: u16,
    ) -> Result<Self, WireError> {
        if if_num > 0x0F {
            return Err(WireError::InterfaceNumOutOfRange(if_num));
        }
        if payload_len == 0 {
            return Err(WireError::ZeroLength);
        }
        Ok(Self {
            if_type,
            if_num,
            flags: 0,
            len: payload_len,
            offset: HEADER_SIZE as u16,
            checksum: 0,
            seq_num,
            type_tag: TypeTag::resolve(if_type, tag),
        })
    }

    /// Encode into the fixed 12-byte wire form
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0] = (self.if_type.as_u8() & 0x0F) | (self.if_num << 4);
        out[1] = self.flags;
        out[2..4].copy_from_slice(&self.len.to_le_bytes());
        out[4..6].copy_from_slice(&self.offset.to_le_bytes());
        out[6..8].copy_from_slice(&self.checksum.to_le_bytes());
        out[8..10].copy_from_slice(&self.seq_num.to_le_bytes());
        out[11] = self.type_tag.raw();
        out
    }

    /// Decode and validate a header from the front of a transfer buffer
    ///
    /// Rejects short buffers, unknown interface types, zero-length payloads
    /// and any offset that is not exactly the header size. Checksum
    /// verification is a separate step so callers can skip it when the
    /// capability is not negotiated.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::Truncated {
                got: buf.len(),
                need: HEADER_SIZE,
            });
        }

        let if_type = InterfaceType::try_from(buf[0] & 0x0F)?;
        let if_num = buf[0] >> 4;
        let len = u16::from_le_bytes([buf[2], buf[3]]);
        if len == 0 {
            return Err(WireError::ZeroLength);
        }

        let offset = u16::from_le_bytes([buf[4], buf[5]]);
        if offset != HEADER_SIZE as u16 {
            return Err(WireError::BadOffset {
                found: offset,
                expected: HEADER_SIZE as u16,
            });
        }

        Ok(Self {
            if_type,
            if_num,
            flags: buf[1],
            len,
            offset,
            checksum: u16::from_le_bytes([buf[6], buf[7]]),
            seq_num: u16::from_le_bytes([buf[8], buf[9]]),
            type_tag: TypeTag::resolve(if_type, buf[11]),
        })
    }
}

/// Additive 16-bit checksum over a full frame (header + payload)
///
/// The checksum field itself is treated as zero, so the same routine serves
/// both fill-in and verification.
pub fn compute_checksum(frame: &[u8]) -> u16 {
    let mut sum = 0u16;
    for (i, b) in frame.iter().enumerate() {
        if i == 6 || i == 7 {
            continue;
        }
        sum = sum.wrapping_add(*b as u16);
    }
    sum
}

/// Verify the stored checksum of a received frame
///
/// A stored value of zero means the transmitter did not checksum the frame;
/// such frames are accepted as-is.
pub fn verify_checksum(frame: &[u8], header: &PayloadHeader) -> bool {
    if header.checksum == 0 {
        return true;
    }
    compute_checksum(frame) == header.checksum
}
