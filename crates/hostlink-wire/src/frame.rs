//! Owned frame buffers
//!
//! A [`Frame`] is one contiguous allocation holding header plus payload.
//! Frames are moved, never copied, as they travel between the priority
//! queues and the transaction engine; whichever queue holds the frame owns
//! the buffer.

use crate::error::WireError;
use crate::header::{self, InterfaceType, PayloadHeader, HEADER_SIZE};

/// A single header-plus-payload unit exchanged over the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: PayloadHeader,
    buf: Vec<u8>,
}

impl Frame {
    /// Build an outbound frame around a payload
    ///
    /// Stamps the sequence number and, when `with_checksum` is set, computes
    /// and stores the additive checksum over the finished buffer. The tag
    /// byte is only meaningful for the HCI and priv interfaces and is
    /// ignored by the others.
    pub fn build(
        if_type: InterfaceType,
        if_num: u8,
        tag: u8,
        payload: &[u8],
        seq_num: u16,
        with_checksum: bool,
    ) -> Result<Self, WireError> {
        let len = u16::try_from(payload.len()).map_err(|_| WireError::TooLarge {
            len: payload.len(),
            max: u16::MAX as usize,
        })?;
        let mut hdr = PayloadHeader::new(if_type, if_num, tag, len, seq_num)?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&hdr.encode());
        buf.extend_from_slice(payload);

        if with_checksum {
            let sum = header::compute_checksum(&buf);
            hdr.checksum = sum;
            buf[6..8].copy_from_slice(&sum.to_le_bytes());
        }

        Ok(Self { header: hdr, buf })
    }

    /// Reconstruct a frame from a received fixed-size transfer buffer
    ///
    /// Decodes and validates the header, checks that the declared payload
    /// fits inside the physical transfer, and trims the buffer down to the
    /// declared size. Checksum verification is left to the caller since it
    /// depends on the negotiated capability.
    pub fn from_transfer(mut buf: Vec<u8>) -> Result<Self, WireError> {
        let header = PayloadHeader::decode(&buf)?;

        let total = HEADER_SIZE + header.len as usize;
        if total > buf.len() {
            return Err(WireError::Overrun {
                len: header.len,
                max: buf.len(),
            });
        }
        buf.truncate(total);

        Ok(Self { header, buf })
    }

    /// Set the flag bits, keeping the stored checksum consistent
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.header.flags = flags;
        self.buf[1] = flags;
        if self.header.checksum != 0 {
            let sum = header::compute_checksum(&self.buf);
            self.header.checksum = sum;
            self.buf[6..8].copy_from_slice(&sum.to_le_bytes());
        }
        self
    }

    /// Decoded header
    pub fn header(&self) -> &PayloadHeader {
        &self.header
    }

    /// Interface class of this frame
    pub fn if_type(&self) -> InterfaceType {
        self.header.if_type
    }

    /// Payload bytes, header excluded
    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_SIZE..]
    }

    /// Full wire bytes, header included
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Verify the stored checksum against the buffer contents
    pub fn verify_checksum(&self) -> bool {
        header::verify_checksum(&self.buf, &self.header)
    }

    /// Split into header and owned payload bytes
    pub fn into_parts(mut self) -> (PayloadHeader, Vec<u8>) {
        let payload = self.buf.split_off(HEADER_SIZE);
        (self.header, payload)
    }
}
