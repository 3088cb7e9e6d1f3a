//! Request/response envelopes carried inside Request/Response frames.
//!
//! Every request the client sends is wrapped in a [`ClientRequest`] with
//! a unique `req_id`; the gateway answers with a [`ClientResponse`]
//! echoing that `req_id` (or `None` for server-initiated pushes). The
//! inner `payload` bytes belong to a versioned external schema and are
//! opaque to this crate; only the envelope fields are interpreted here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ImwireError;

/// Discriminator for request payload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RequestPayload {
    /// Periodic liveness probe.
    Heartbeat = 1,
    /// Chat message send.
    ChatSend = 2,
    /// Room operation (create/join/leave/ready/seat).
    Room = 3,
    /// In-game action.
    Game = 4,
}

impl From<RequestPayload> for u8 {
    fn from(value: RequestPayload) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for RequestPayload {
    type Error = ImwireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::ChatSend),
            3 => Ok(Self::Room),
            4 => Ok(Self::Game),
            other => Err(ImwireError::Protocol(format!(
                "Unknown request payload type: {other}"
            ))),
        }
    }
}

/// Discriminator for response payload kinds.
///
/// Handlers register against these tags; see
/// [`MessageDispatcher`](crate::dispatcher::MessageDispatcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ResponsePayload {
    /// No payload (plain status responses, e.g. auth acks).
    None = 0,
    /// Heartbeat response with server time.
    Heartbeat = 1,
    /// Acknowledgement that a sent chat message was persisted.
    ChatSendAck = 2,
    /// Incoming chat message push.
    ChatPush = 3,
    /// Room operation response.
    Room = 4,
    /// Room state push (joins, leaves, seat changes, game start).
    RoomPush = 5,
    /// Game operation response.
    Game = 6,
    /// Game state push.
    GamePush = 7,
}

impl From<ResponsePayload> for u8 {
    fn from(value: ResponsePayload) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for ResponsePayload {
    type Error = ImwireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::ChatSendAck),
            3 => Ok(Self::ChatPush),
            4 => Ok(Self::Room),
            5 => Ok(Self::RoomPush),
            6 => Ok(Self::Game),
            7 => Ok(Self::GamePush),
            other => Err(ImwireError::Protocol(format!(
                "Unknown response payload type: {other}"
            ))),
        }
    }
}

/// Body of a `Request` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Correlation identifier, unique per in-flight request.
    pub req_id: String,
    /// Client wall-clock time at build, unix milliseconds.
    pub timestamp: i64,
    /// Payload discriminator.
    pub payload_type: RequestPayload,
    /// Opaque payload bytes (external schema).
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl ClientRequest {
    /// Build a request with a freshly generated `req_id`.
    pub fn new(payload_type: RequestPayload, payload: Vec<u8>) -> Self {
        Self {
            req_id: generate_req_id(),
            timestamp: unix_millis(),
            payload_type,
            payload,
        }
    }
}

/// Body of a `Response` (or `AuthAck`) frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    /// Correlation identifier; `None` for server-initiated pushes.
    pub req_id: Option<String>,
    /// Status code; `0` is success.
    pub code: i32,
    /// Optional human-readable status message.
    pub msg: Option<String>,
    /// Payload discriminator.
    pub payload_type: ResponsePayload,
    /// Opaque payload bytes (external schema), absent on bare acks.
    #[serde(with = "serde_bytes")]
    pub payload: Option<Vec<u8>>,
}

impl ClientResponse {
    /// Whether the response reports success.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Whether this is a server-initiated push (no matching request).
    #[inline]
    pub fn is_push(&self) -> bool {
        self.req_id.is_none()
    }
}

/// Body of the `Auth` frame, transmitted immediately after the channel
/// opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Session token obtained out of band (login REST flow).
    pub token: String,
    /// Stable per-install device identifier.
    pub device_id: String,
    /// Client platform label (e.g. "desktop", "web").
    pub platform: String,
}

/// Generate a request identifier: unix-millis timestamp plus a random
/// hex suffix.
///
/// The suffix mixes the clock, the process ID, and a process-local
/// counter, so identifiers stay unique even for requests built within
/// the same millisecond.
pub fn generate_req_id() -> String {
    format!("{}-{:012x}", unix_millis(), rand_suffix() & 0xFFFF_FFFF_FFFF)
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn rand_suffix() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id() as u64;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

    nanos
        .wrapping_mul(0x517cc1b727220a95)
        .wrapping_add(seq.wrapping_mul(0x2545F4914F6CDD1D))
        ^ pid
}
