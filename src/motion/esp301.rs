//! ESP301 ASCII command protocol
//!
//! Commands are `\r` terminated, replies `\r\n` terminated. Only queries
//! (`?` commands and `TP`) produce a reply. After every command the controller
//! error code is read back with `TE?`; that code is the returned status.

use crate::devices::{MotionController, StatusCode};
use crate::transport::{TransportConnector, TransportStream};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Rotation stage on one axis of an ESP301
pub struct RotationStage<C: TransportConnector> {
    connector: C,
    axis: u8,
    read_timeout: Duration,
    link: Option<BufReader<C::Stream>>,
}

impl<C: TransportConnector> RotationStage<C> {
    pub fn new(connector: C, axis: u8, read_timeout: Duration) -> Self {
        Self {
            connector,
            axis,
            read_timeout,
            link: None,
        }
    }

    pub fn axis(&self) -> u8 {
        self.axis
    }

    fn link(&mut self) -> Result<&mut BufReader<C::Stream>> {
        self.link
            .as_mut()
            .ok_or_else(|| anyhow!("Motion controller on {} is not connected", self.connector.endpoint()))
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        debug!("ESP301 <- {}", command);
        let link = self.link()?;
        link.write_all(command.as_bytes()).await?;
        link.write_all(b"\r").await?;
        link.flush().await?;
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.send(command).await?;

        let read_timeout = self.read_timeout;
        let link = self.link()?;
        let mut line = String::new();
        let read = timeout(read_timeout, link.read_line(&mut line))
            .await
            .with_context(|| format!("No reply to '{}' within {:?}", command, read_timeout))??;

        if read == 0 {
            bail!("Motion controller closed the link");
        }

        let reply = line.trim().to_string();
        debug!("ESP301 -> {}", reply);
        Ok(reply)
    }

    async fn error_code(&mut self) -> Result<StatusCode> {
        let reply = self.query("TE?").await?;
        reply
            .parse()
            .with_context(|| format!("Unexpected error code reply '{}'", reply))
    }

    /// Send a command that produces no reply and read back its status
    async fn command(&mut self, command: &str) -> Result<StatusCode> {
        self.send(command).await?;
        let status = self.error_code().await?;
        if status != 0 {
            warn!("ESP301 command '{}' returned error {}", command, status);
        }
        Ok(status)
    }

    async fn axis_command(&mut self, mnemonic: &str, argument: Option<f64>) -> Result<StatusCode> {
        let command = match argument {
            Some(value) => format!("{}{}{}", self.axis, mnemonic, value),
            None => format!("{}{}", self.axis, mnemonic),
        };
        self.command(&command).await
    }

    async fn parse_axis_query(&mut self, mnemonic: &str) -> Result<f64> {
        let command = format!("{}{}", self.axis, mnemonic);
        let reply = self.query(&command).await?;
        reply
            .parse()
            .with_context(|| format!("Unexpected reply '{}' to '{}'", reply, command))
    }
}

#[async_trait]
impl<C: TransportConnector> MotionController for RotationStage<C> {
    async fn connect(&mut self) -> Result<StatusCode> {
        let stream = self.connector.connect().await?;
        self.link = Some(BufReader::new(stream));

        let version = self.query("VE?").await?;
        info!("Connected to {} on {}", version, self.connector.endpoint());
        self.error_code().await
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut link) = self.link.take() {
            TransportStream::shutdown(link.get_mut()).await?;
            debug!("Disconnected from motion controller on {}", self.connector.endpoint());
        }
        Ok(())
    }

    async fn get_angle(&mut self) -> Result<(StatusCode, f64)> {
        let angle = self.parse_axis_query("TP").await?;
        let status = self.error_code().await?;
        Ok((status, angle))
    }

    async fn move_relative(&mut self, delta: f64, wait: bool) -> Result<StatusCode> {
        let status = self.axis_command("PR", Some(delta)).await?;
        if wait {
            self.wait_for_motion().await?;
        }
        Ok(status)
    }

    async fn move_absolute(&mut self, theta: f64, wait: bool) -> Result<StatusCode> {
        let status = self.axis_command("PA", Some(theta)).await?;
        if wait {
            self.wait_for_motion().await?;
        }
        Ok(status)
    }

    async fn is_moving(&mut self) -> Result<bool> {
        // MD? answers 1 once motion is done
        let done = self.parse_axis_query("MD?").await?;
        Ok(done == 0.0)
    }

    async fn set_velocity(&mut self, velocity: f64) -> Result<StatusCode> {
        self.axis_command("VA", Some(velocity)).await
    }

    async fn get_velocity(&mut self) -> Result<Option<f64>> {
        let velocity = self.parse_axis_query("VA?").await?;
        let status = self.error_code().await?;
        Ok((status == 0).then_some(velocity))
    }

    async fn stop(&mut self) -> Result<StatusCode> {
        self.axis_command("ST", None).await
    }

    async fn reset_to_home(&mut self) -> Result<StatusCode> {
        self.axis_command("OR", None).await
    }
}
