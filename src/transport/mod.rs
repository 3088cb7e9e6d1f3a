//! Transport module - the channel abstraction the session runs over.
//!
//! The session only needs a bidirectional, ordered, reliable byte
//! stream. [`Channel`] captures that as a trait alias over tokio's async
//! I/O traits, and [`Connector`] is the injected factory that opens a
//! fresh channel per connection attempt. Production code uses
//! [`TcpConnector`], tests substitute in-memory duplex pipes.

mod tcp;

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

pub use tcp::TcpConnector;

/// Bidirectional, ordered, reliable byte stream.
///
/// Blanket-implemented for anything satisfying tokio's async I/O
/// traits, so `TcpStream`, TLS wrappers, and `tokio::io::duplex` halves
/// all qualify.
pub trait Channel: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Channel for T {}

/// Owned, type-erased channel handle.
pub type BoxedChannel = Box<dyn Channel>;

/// Boxed future returned by [`Connector::connect`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Factory that opens a fresh channel for each connection attempt.
///
/// The session calls this on initial connect and on every reconnect;
/// a previous channel is never reused.
pub trait Connector: Send + Sync + 'static {
    /// Open a new channel to the configured endpoint.
    fn connect(&self) -> BoxFuture<'_, Result<BoxedChannel>>;
}
