//! Byte-stream transports the device drivers talk over

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A transport stream that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn shutdown(&mut self) -> Result<()>;
}

/// Factory for opening a link to one device
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt to connect, returning a stream on success
    async fn connect(&self) -> Result<Self::Stream>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;

    /// Where the link points ("COM4", "localhost:4223"), for messages
    fn endpoint(&self) -> String;
}

#[async_trait]
impl TransportStream for tokio::io::DuplexStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

/// Connector handing out pre-built in-memory streams, one per `connect`
#[cfg(test)]
pub struct DuplexConnector {
    streams: std::sync::Mutex<Vec<tokio::io::DuplexStream>>,
}

#[cfg(test)]
impl DuplexConnector {
    /// Create a connector and the device ends of `count` links
    pub fn pair(count: usize) -> (Self, Vec<tokio::io::DuplexStream>) {
        let mut ours = Vec::with_capacity(count);
        let mut theirs = Vec::with_capacity(count);
        for _ in 0..count {
            let (a, b) = tokio::io::duplex(1024);
            ours.push(a);
            theirs.push(b);
        }
        ours.reverse();
        (
            Self {
                streams: std::sync::Mutex::new(ours),
            },
            theirs,
        )
    }
}

#[cfg(test)]
#[async_trait]
impl TransportConnector for DuplexConnector {
    type Stream = tokio::io::DuplexStream;

    async fn connect(&self) -> Result<Self::Stream> {
        self.streams
            .lock()
            .map_err(|_| anyhow::anyhow!("duplex connector poisoned"))?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no more in-memory links"))
    }

    fn name(&self) -> &'static str {
        "Duplex"
    }

    fn endpoint(&self) -> String {
        "memory".into()
    }
}
