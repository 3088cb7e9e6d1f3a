//! Codec module - serialization/deserialization for frame bodies.
//!
//! Frame bodies carry MessagePack-encoded envelopes; the inner payloads
//! inside those envelopes stay opaque bytes owned by a versioned external
//! schema.
//!
//! The codec is a marker struct with static methods rather than a trait
//! object, so there is no per-call dispatch and no codec state.
//!
//! # Example
//!
//! ```
//! use imwire_client::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
