//! Error types for imwire-client.

use thiserror::Error;

/// Main error type for all imwire operations.
#[derive(Debug, Error)]
pub enum ImwireError {
    /// I/O error on the underlying channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MessagePack serialization error (envelope encoding).
    #[error("MsgPack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization error (envelope decoding).
    #[error("MsgPack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Protocol error (bad frame header, oversized body, unknown tags).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation requires a connected session.
    #[error("Not connected")]
    NotConnected,

    /// Channel closed while frames were still queued or expected.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connect attempt was superseded by a disconnect or a newer connect.
    #[error("Connection attempt aborted")]
    ConnectionAborted,
}

/// Result type alias using ImwireError.
pub type Result<T> = std::result::Result<T, ImwireError>;
