/// Byte-stream transport to the relay process
///
/// The channel only needs a duplex byte stream; how it is obtained is behind
/// [`RelayConnector`]. TCP is the production transport, tests plug in
/// in-memory duplex pipes.

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Any duplex byte stream usable as a relay connection
pub trait RelayStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> RelayStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedRelayStream = Box<dyn RelayStream>;

/// Opens one new connection to the relay per call
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self) -> Result<BoxedRelayStream>;

    /// Human-readable target used in log lines
    fn describe(&self) -> String {
        "relay".to_string()
    }
}

/// Plain TCP connection to the relay
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl RelayConnector for TcpConnector {
    async fn connect(&self) -> Result<BoxedRelayStream> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to relay at {}: {}", self.address, e))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}
