//! TCP transport for the Tinkerforge Brick Daemon

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::TcpStream;

#[async_trait]
impl TransportStream for TcpStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

/// TCP connector for a "host:port" address
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
impl TransportConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<Self::Stream> {
        let stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("Failed to connect to {}", self.address))?;
        // Requests are tiny and latency-bound
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "TCP"
    }

    fn endpoint(&self) -> String {
        self.address.clone()
    }
}
