//! # imwire-client
//!
//! Client-side transport layer for the imwire chat/game gateway.
//!
//! Carries all application traffic over a single long-lived
//! bidirectional byte stream: a length-prefixed binary frame protocol,
//! MessagePack envelopes with request/response correlation, automatic
//! reconnect with exponential backoff, heartbeats, and round-trip
//! latency instrumentation.
//!
//! ## Architecture
//!
//! - **protocol**: 5-byte frame header codec and stream reassembly
//! - **envelope**: request/response envelopes and payload tags
//! - **session**: connection lifecycle, reconnect, send path
//! - **dispatcher**: typed fan-out of inbound responses to handlers
//! - **latency**: round-trip statistics and anomaly detection
//!
//! ## Example
//!
//! ```ignore
//! use imwire_client::{AuthRequest, RequestPayload, ResponsePayload, Session};
//! use imwire_client::transport::TcpConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::builder(
//!         TcpConnector::new("gateway.example.net:4433"),
//!         AuthRequest {
//!             token: std::env::var("IMWIRE_TOKEN")?,
//!             device_id: "dev-1".to_string(),
//!             platform: "desktop".to_string(),
//!         },
//!     )
//!     .build();
//!
//!     session.dispatcher().register(ResponsePayload::ChatPush, |resp| {
//!         println!("push: {:?}", resp.payload);
//!         Ok(())
//!     });
//!
//!     session.connect().await?;
//!     session.send(RequestPayload::ChatSend, b"hello".to_vec()).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod heartbeat;
pub mod latency;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

pub use dispatcher::{HandlerId, MessageDispatcher};
pub use envelope::{AuthRequest, ClientRequest, ClientResponse, RequestPayload, ResponsePayload};
pub use error::{ImwireError, Result};
pub use latency::{AnomalyReport, LatencyAnalyzer, LatencyStats};
pub use session::{ConnectionState, ObserverId, Session, SessionBuilder, SessionConfig};
