//! Frame buffer for accumulating partial channel reads.
//!
//! The channel delivers chunks at arbitrary boundaries: a single read may
//! carry half a header, or several complete frames back to back. The
//! buffer accumulates everything in one growable `BytesMut` and extracts
//! complete frames in arrival order, with zero loss or duplication.
//!
//! A reconnect must discard the buffer ([`FrameBuffer::clear`] or simply
//! a fresh instance) so frames from a previous connection never mix with
//! a new one.
//!
//! # Example
//!
//! ```
//! use imwire_client::protocol::{build_frame, FrameBuffer, FrameType};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = build_frame(FrameType::Response, b"hi").unwrap();
//!
//! // Chunk boundaries don't matter
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].body(), b"hi");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{FrameHeader, DEFAULT_MAX_BODY_LEN, HEADER_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame extraction.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header (need 5 bytes).
    WaitingForHeader,
    /// Header consumed, waiting for the full body.
    WaitingForBody { header: FrameHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// Owned by exactly one receive loop; never shared across tasks.
pub struct FrameBuffer {
    /// Accumulated bytes from channel reads.
    buffer: BytesMut,
    /// Current extraction state.
    state: State,
    /// Maximum allowed body length.
    max_body_len: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Initial capacity 64 KiB, body cap [`DEFAULT_MAX_BODY_LEN`].
    pub fn new() -> Self {
        Self::with_max_body_len(DEFAULT_MAX_BODY_LEN)
    }

    /// Create a new frame buffer with a custom body length cap.
    pub fn with_max_body_len(max_body_len: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_body_len,
        }
    }

    /// Push a chunk into the buffer and extract all complete frames.
    ///
    /// Returns the frames completed by this chunk, in arrival order (the
    /// vector may be empty while a frame is still partial).
    ///
    /// # Errors
    ///
    /// Returns an error when a header carries an unknown frame type or a
    /// body length over the cap. After either, the byte stream can no
    /// longer be trusted to resynchronize; the caller must drop the
    /// connection (and this buffer with it).
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    let Some(header) = FrameHeader::decode(&self.buffer)? else {
                        return Ok(None);
                    };
                    header.validate(self.max_body_len)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);

                    if header.body_len == 0 {
                        return Ok(Some(Frame::new(header.frame_type, Bytes::new())));
                    }

                    self.state = State::WaitingForBody { header };
                }

                State::WaitingForBody { header } => {
                    let body_len = header.body_len as usize;
                    if self.buffer.len() < body_len {
                        return Ok(None);
                    }

                    // Zero-copy slice of the body out of the buffer.
                    let body = self.buffer.split_to(body_len).freeze();
                    let frame_type = header.frame_type;

                    self.state = State::WaitingForHeader;
                    return Ok(Some(Frame::new(frame_type, body)));
                }
            }
        }
    }

    /// Get the number of buffered bytes not yet part of a complete frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes and reset the state machine.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, FrameType};

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = build_frame(FrameType::Response, b"hello").unwrap();

        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FrameType::Response);
        assert_eq!(frames[0].body(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut buffer = FrameBuffer::new();

        let mut combined = build_frame(FrameType::AuthAck, b"first").unwrap();
        combined.extend(build_frame(FrameType::Response, b"second").unwrap());
        combined.extend(build_frame(FrameType::Response, b"third").unwrap());

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].body(), b"first");
        assert_eq!(frames[1].body(), b"second");
        assert_eq!(frames[2].body(), b"third");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = build_frame(FrameType::Response, b"test").unwrap();

        // First three header bytes only
        let frames = buffer.push(&bytes[..3]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let frames = buffer.push(&bytes[3..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), b"test");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_body() {
        let mut buffer = FrameBuffer::new();
        let body = b"a longer body that arrives in two reads";
        let bytes = build_frame(FrameType::Response, body).unwrap();

        let split = HEADER_SIZE + 10;
        let frames = buffer.push(&bytes[..split]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");

        let frames = buffer.push(&bytes[split..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), &body[..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = build_frame(FrameType::Request, b"hi").unwrap();

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].body(), b"hi");
    }

    #[test]
    fn test_arbitrary_splits_preserve_order_and_count() {
        // Same frames, three different chunkings, identical output.
        let mut stream = Vec::new();
        for i in 0u8..5 {
            stream.extend(build_frame(FrameType::Response, &[i; 7]).unwrap());
        }

        for split_at in [1, 4, HEADER_SIZE, HEADER_SIZE + 3, 17] {
            let mut buffer = FrameBuffer::new();
            let mut frames = Vec::new();
            for chunk in stream.chunks(split_at) {
                frames.extend(buffer.push(chunk).unwrap());
            }

            assert_eq!(frames.len(), 5, "split_at={split_at}");
            for (i, frame) in frames.iter().enumerate() {
                assert_eq!(frame.body(), &[i as u8; 7]);
            }
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn test_empty_body_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&build_frame(FrameType::AuthAck, b"").unwrap()).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].body.is_empty());
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let first = build_frame(FrameType::Response, b"first").unwrap();
        let second = build_frame(FrameType::Response, b"second").unwrap();

        let mut data = first.clone();
        data.extend_from_slice(&second[..3]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), b"first");

        let frames = buffer.push(&second[3..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), b"second");
    }

    #[test]
    fn test_oversized_body_len_rejected_before_buffering() {
        let mut buffer = FrameBuffer::with_max_body_len(100);

        // Header claims a 1000-byte body; no body bytes ever sent.
        let header = FrameHeader::new(FrameType::Response, 1000);
        let result = buffer.push(&header.encode());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let mut buffer = FrameBuffer::new();
        let result = buffer.push(&[0, 0, 0, 0, 42]);

        assert!(result.is_err());
    }

    #[test]
    fn test_clear_resets_state_and_buffer() {
        let mut buffer = FrameBuffer::new();
        let bytes = build_frame(FrameType::Response, b"test").unwrap();

        buffer.push(&bytes[..HEADER_SIZE + 1]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForBody");
        assert!(!buffer.is_empty());

        buffer.clear();

        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());

        // A fresh frame parses normally after the reset.
        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_large_body() {
        let mut buffer = FrameBuffer::new();
        let body = vec![0xAB; 512 * 1024];
        let frames = buffer.push(&build_frame(FrameType::Response, &body).unwrap()).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body_len(), body.len());
        assert!(frames[0].body.iter().all(|&b| b == 0xAB));
    }
}
