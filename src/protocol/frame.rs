//! Frame struct and frame building.
//!
//! A [`Frame`] is one complete, typed unit of data on the wire. The body
//! is held as `bytes::Bytes` so the assembler can hand out frames without
//! copying. Frames are never mutated after construction.

use bytes::Bytes;

use super::wire_format::{FrameHeader, FrameType, HEADER_SIZE};
use crate::error::{ImwireError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame type tag.
    pub frame_type: FrameType,
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame. `body.len()` is the wire length by construction.
    pub fn new(frame_type: FrameType, body: Bytes) -> Self {
        Self { frame_type, body }
    }

    /// Create a frame from a raw byte slice (copies data).
    pub fn from_slice(frame_type: FrameType, body: &[u8]) -> Self {
        Self {
            frame_type,
            body: Bytes::copy_from_slice(body),
        }
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body length.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// The header this frame would carry on the wire.
    ///
    /// # Errors
    ///
    /// Fails when the body does not fit the 4-byte length field.
    #[inline]
    pub fn header(&self) -> Result<FrameHeader> {
        Ok(FrameHeader::new(
            self.frame_type,
            wire_body_len(self.body.len())?,
        ))
    }
}

/// Check that a body length fits the header's 4-byte length field.
fn wire_body_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        ImwireError::Protocol(format!(
            "Body length {len} does not fit the 4-byte length field"
        ))
    })
}

/// Build a complete frame as a single byte vector.
///
/// Produces exactly `5 + body.len()` bytes: Big Endian length, type tag,
/// then the body verbatim.
///
/// # Errors
///
/// Fails when the body does not fit the 4-byte length field; the length
/// is never silently truncated.
///
/// # Example
///
/// ```
/// use imwire_client::protocol::{build_frame, FrameType, HEADER_SIZE};
///
/// let bytes = build_frame(FrameType::Request, b"hello").unwrap();
/// assert_eq!(bytes.len(), HEADER_SIZE + 5);
/// assert_eq!(&bytes[HEADER_SIZE..], b"hello");
/// ```
pub fn build_frame(frame_type: FrameType, body: &[u8]) -> Result<Vec<u8>> {
    let header = FrameHeader::new(frame_type, wire_body_len(body.len())?);
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(body);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(FrameType::Response, Bytes::from_static(b"hello"));

        assert_eq!(frame.frame_type, FrameType::Response);
        assert_eq!(frame.body(), b"hello");
        assert_eq!(frame.body_len(), 5);
    }

    #[test]
    fn test_frame_from_slice() {
        let frame = Frame::from_slice(FrameType::Auth, b"token");
        assert_eq!(frame.frame_type, FrameType::Auth);
        assert_eq!(frame.body(), b"token");
    }

    #[test]
    fn test_frame_header_matches_body() {
        let frame = Frame::new(FrameType::Request, Bytes::from_static(b"abcd"));
        let header = frame.header().unwrap();
        assert_eq!(header.body_len, 4);
        assert_eq!(header.frame_type, FrameType::Request);
    }

    #[test]
    fn test_wire_body_len_bounds() {
        assert_eq!(wire_body_len(0).unwrap(), 0);
        assert_eq!(wire_body_len(u32::MAX as usize).unwrap(), u32::MAX);

        #[cfg(target_pointer_width = "64")]
        {
            let result = wire_body_len(u32::MAX as usize + 1);
            assert!(result.is_err());
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("does not fit the 4-byte length field"));
        }
    }

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(FrameType::Request, b"hello").unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        assert_eq!(&bytes[0..4], &5u32.to_be_bytes());
        assert_eq!(bytes[4], FrameType::Request.wire_value());
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_body() {
        let bytes = build_frame(FrameType::AuthAck, b"").unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_build_frame_parse_roundtrip() {
        let bytes = build_frame(FrameType::Response, b"payload").unwrap();
        let header = FrameHeader::decode(&bytes).unwrap().unwrap();

        assert_eq!(header.frame_type, FrameType::Response);
        assert_eq!(header.body_len, 7);
        assert_eq!(&bytes[HEADER_SIZE..], b"payload");
    }
}
