//! Wire format encoding and decoding.
//!
//! Implements the 5-byte frame header:
//! ```text
//! ┌───────────┬────────────┬───────────────┐
//! │ Body len  │ Frame type │ Body          │
//! │ 4 bytes   │ 1 byte     │ len bytes     │
//! │ uint32 BE │            │               │
//! └───────────┴────────────┴───────────────┘
//! ```
//!
//! The length field counts body bytes only, never the header.

use crate::error::{ImwireError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Default maximum body length (16 MiB).
///
/// A corrupt length field must never drive an unbounded allocation, so
/// every decoded header is checked against a cap before body buffering.
pub const DEFAULT_MAX_BODY_LEN: u32 = 16 * 1024 * 1024;

/// Frame type tag carried in the fifth header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Authentication request, first frame after the channel opens.
    Auth = 1,
    /// Client request envelope ([`ClientRequest`](crate::envelope::ClientRequest)).
    Request = 2,
    /// Authentication acknowledgement from the gateway.
    AuthAck = 3,
    /// Response envelope ([`ClientResponse`](crate::envelope::ClientResponse)),
    /// also used for server-initiated pushes.
    Response = 4,
}

impl FrameType {
    /// Parse a wire tag. Returns `None` for unknown values.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Auth),
            2 => Some(Self::Request),
            3 => Some(Self::AuthAck),
            4 => Some(Self::Response),
            _ => None,
        }
    }

    /// The byte written on the wire for this frame type.
    #[inline]
    pub fn wire_value(self) -> u8 {
        self as u8
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Exact byte length of the body that follows.
    pub body_len: u32,
    /// Frame type tag.
    pub frame_type: FrameType,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(frame_type: FrameType, body_len: u32) -> Self {
        Self {
            body_len,
            frame_type,
        }
    }

    /// Encode header to bytes (length Big Endian, then type tag).
    ///
    /// # Example
    ///
    /// ```
    /// use imwire_client::protocol::{FrameHeader, FrameType};
    ///
    /// let header = FrameHeader::new(FrameType::Request, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes, [0, 0, 0, 100, 2]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.body_len.to_be_bytes());
        buf[4] = self.frame_type.wire_value();
        buf
    }

    /// Decode a header from buffered bytes.
    ///
    /// Returns `Ok(None)` when fewer than [`HEADER_SIZE`] bytes are
    /// available; that is "need more data", not an error. An unknown
    /// frame type tag is a protocol error: the peer and this client no
    /// longer agree on framing, so the connection cannot be trusted.
    ///
    /// # Example
    ///
    /// ```
    /// use imwire_client::protocol::{FrameHeader, FrameType};
    ///
    /// assert!(FrameHeader::decode(&[0, 0]).unwrap().is_none());
    ///
    /// let header = FrameHeader::decode(&[0, 0, 0, 5, 4]).unwrap().unwrap();
    /// assert_eq!(header.body_len, 5);
    /// assert_eq!(header.frame_type, FrameType::Response);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let body_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let frame_type = FrameType::from_wire(buf[4])
            .ok_or_else(|| ImwireError::Protocol(format!("Unknown frame type: {}", buf[4])))?;

        Ok(Some(Self {
            body_len,
            frame_type,
        }))
    }

    /// Validate the claimed body length against a configured cap.
    pub fn validate(&self, max_body_len: u32) -> Result<()> {
        if self.body_len > max_body_len {
            return Err(ImwireError::Protocol(format!(
                "Body length {} exceeds maximum {}",
                self.body_len, max_body_len
            )));
        }
        Ok(())
    }
}
