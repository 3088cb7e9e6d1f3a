//! Protocol module - wire format, framing, and frame assembly.
//!
//! This module implements the binary framing layer:
//! - 5-byte header encoding/decoding with a body-size guard
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{FrameHeader, FrameType, DEFAULT_MAX_BODY_LEN, HEADER_SIZE};
