//! TCP connector.
//!
//! Opens a plain `TcpStream` to a configured address with `TCP_NODELAY`
//! set, since the traffic is many small latency-sensitive frames.

use tokio::net::TcpStream;
use tracing::debug;

use super::{BoxFuture, BoxedChannel, Connector};
use crate::error::Result;

/// Connector that dials a TCP endpoint.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Endpoint in `host:port` form.
    addr: String,
}

impl TcpConnector {
    /// Create a connector for the given `host:port` endpoint.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Get the configured endpoint address.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> BoxFuture<'_, Result<BoxedChannel>> {
        Box::pin(async move {
            debug!(addr = %self.addr, "Dialing");
            let stream = TcpStream::connect(&self.addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxedChannel)
        })
    }
}
