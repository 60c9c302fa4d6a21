//! Stepper brick with an IO-4 limit switch
//!
//! The stepper is open loop: the only absolute reference is the limit switch
//! wired to one IO-4 channel, which reads high while the carriage is in bounds.

use crate::devices::SteppedActuator;
use crate::tinkerforge::bricklets::{Io4Bricklet, IoChannel, StepperBrick};
use crate::tinkerforge::ip_connection::IpConnection;
use crate::transport::TransportConnector;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause after stopping and after the retreat, to let the carriage settle
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(500);

/// Stepper brick plus the IO-4 channel of its limit switch
pub struct TfStepper<C: TransportConnector> {
    ipcon: IpConnection<C>,
    stepper: StepperBrick,
    io: Io4Bricklet,
    channel: IoChannel,
    retreat_steps: i32,
    settle_time: Duration,
}

impl<C: TransportConnector> TfStepper<C> {
    pub fn new(
        ipcon: IpConnection<C>,
        stepper: StepperBrick,
        io: Io4Bricklet,
        channel: IoChannel,
        retreat_steps: i32,
    ) -> Self {
        Self {
            ipcon,
            stepper,
            io,
            channel,
            retreat_steps,
            settle_time: DEFAULT_SETTLE_TIME,
        }
    }

    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    async fn home(&mut self) -> Result<()> {
        let ipcon = &mut self.ipcon;

        self.stepper.enable(ipcon).await?;

        // Seek one step at a time until the switch opens the circuit
        self.stepper.set_steps(ipcon, -1).await?;
        let mut seek_steps = 1u64;
        while self.io.get_value(ipcon).await?.is_high(self.channel) {
            if self.stepper.get_remaining_steps(ipcon).await? == 0 {
                self.stepper.set_steps(ipcon, -1).await?;
                seek_steps += 1;
            }
        }

        self.stepper.stop(ipcon).await?;
        debug!("Limit switch reached after {} seek steps", seek_steps);
        tokio::time::sleep(self.settle_time).await;

        self.stepper.set_current_position(ipcon, 0).await?;

        self.stepper.set_steps(ipcon, self.retreat_steps).await?;
        while self.stepper.get_remaining_steps(ipcon).await? != 0 {}

        tokio::time::sleep(self.settle_time).await;
        self.stepper.disable(ipcon).await?;

        info!("Stepper homed, {} steps from the limit switch", self.retreat_steps);
        Ok(())
    }
}

#[async_trait]
impl<C: TransportConnector> SteppedActuator for TfStepper<C> {
    async fn is_in_bounds(&mut self) -> Result<bool> {
        self.ipcon.ensure_connected().await?;
        Ok(self.io.get_value(&mut self.ipcon).await?.is_high(self.channel))
    }

    async fn reset_position(&mut self) -> Result<()> {
        self.ipcon.ensure_connected().await?;

        let result = self.home().await;
        if result.is_err() {
            // Never leave the coils energized after a failed homing run
            if let Err(e) = self.stepper.disable(&mut self.ipcon).await {
                warn!("Failed to disable stepper after homing error: {}", e);
            }
        }
        result
    }
}
