//! Beam profiler behind a vendor bridge process
//!
//! The bridge wraps the Thorlabs driver and talks JSON lines on stdio:
//!
//! ```text
//! -> {"command":"connect"}
//! <- {"status":0}
//! -> {"command":"measure"}
//! <- {"status":0,"measurement":{"centroid_x":...,"beam_width_x":...}}
//! ```
//!
//! A non-zero status may carry a `message`.

use crate::devices::{BeamProfiler, Measurement, StatusCode};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
enum Request {
    Connect,
    Measure,
    Disconnect,
}

#[derive(Debug, Deserialize)]
struct Reply {
    status: StatusCode,
    #[serde(default)]
    measurement: Option<Measurement>,
    #[serde(default)]
    message: Option<String>,
}

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl BridgeProcess {
    fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start beam profiler bridge '{}'", command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("bridge stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("bridge stdout not captured"))?;

        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }

    async fn call(&mut self, request: Request) -> Result<Reply> {
        let mut buf = serde_json::to_vec(&request)?;
        buf.push(b'\n');
        self.stdin.write_all(&buf).await?;
        self.stdin.flush().await?;

        loop {
            let line = self
                .lines
                .next_line()
                .await?
                .ok_or_else(|| anyhow!("Beam profiler bridge exited"))?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!("Bridge -> {}", trimmed);
            return serde_json::from_str(trimmed)
                .with_context(|| format!("Malformed bridge reply: {}", trimmed));
        }
    }
}

/// Thorlabs beam profiler driven through the bridge executable
pub struct BridgeBeamProfiler {
    command: String,
    args: Vec<String>,
    process: Option<BridgeProcess>,
}

impl BridgeBeamProfiler {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            process: None,
        }
    }

    fn process(&mut self) -> Result<&mut BridgeProcess> {
        self.process
            .as_mut()
            .ok_or_else(|| anyhow!("Beam profiler is not connected"))
    }
}

#[async_trait]
impl BeamProfiler for BridgeBeamProfiler {
    async fn connect(&mut self) -> Result<StatusCode> {
        if self.process.is_none() {
            self.process = Some(BridgeProcess::spawn(&self.command, &self.args)?);
        }

        let reply = self.process()?.call(Request::Connect).await?;
        if reply.status == 0 {
            info!("Beam profiler connected via {}", self.command);
        } else {
            warn!(
                "Beam profiler connect returned {}: {}",
                reply.status,
                reply.message.as_deref().unwrap_or("no message")
            );
        }
        Ok(reply.status)
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };

        let result = process.call(Request::Disconnect).await.map(drop);
        // Closing stdin tells the bridge to exit
        drop(process.stdin);
        if let Err(e) = process.child.wait().await {
            warn!("Beam profiler bridge did not exit cleanly: {}", e);
        }
        result
    }

    async fn get_measurement(&mut self) -> Result<Measurement> {
        let reply = self.process()?.call(Request::Measure).await?;
        if reply.status != 0 {
            bail!(
                "Measurement failed with status {}: {}",
                reply.status,
                reply.message.unwrap_or_default()
            );
        }
        reply
            .measurement
            .ok_or_else(|| anyhow!("Bridge reply carried no measurement"))
    }
}
