//! Serial transport for the ESP301 motion controller

use crate::transport::traits::{TransportConnector, TransportStream};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

#[async_trait]
impl TransportStream for SerialStream {
    async fn shutdown(&mut self) -> Result<()> {
        tokio::io::AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

/// Opens a serial port with 8N1 framing and hardware handshake
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

#[async_trait]
impl TransportConnector for SerialConnector {
    type Stream = SerialStream;

    async fn connect(&self) -> Result<Self::Stream> {
        debug!("Opening serial port {} at {} baud", self.port, self.baud_rate);

        tokio_serial::new(&self.port, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::Hardware)
            .open_native_async()
            .with_context(|| format!("Failed to open serial port {}", self.port))
    }

    fn name(&self) -> &'static str {
        "Serial"
    }

    fn endpoint(&self) -> String {
        self.port.clone()
    }
}
