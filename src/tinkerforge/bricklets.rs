//! Tinkerforge device bindings used by the rig
//!
//! Each device is just its decoded UID; calls go through the shared
//! [`IpConnection`].

use crate::tinkerforge::ip_connection::IpConnection;
use crate::transport::TransportConnector;
use anyhow::{bail, Context, Result};
use bytes::{Buf, Bytes};
use ior_shared::codec::decode_uid;
use thiserror::Error;

mod function {
    pub const HUMIDITY_GET_HUMIDITY: u8 = 1;
    pub const TEMPERATURE_GET_TEMPERATURE: u8 = 1;
    pub const IO4_GET_VALUE: u8 = 2;

    pub const STEPPER_SET_CURRENT_POSITION: u8 = 7;
    pub const STEPPER_SET_STEPS: u8 = 11;
    pub const STEPPER_GET_REMAINING_STEPS: u8 = 13;
    pub const STEPPER_STOP: u8 = 18;
    pub const STEPPER_ENABLE: u8 = 24;
    pub const STEPPER_DISABLE: u8 = 25;
}

fn parse_uid(uid: &str) -> Result<u32> {
    decode_uid(uid).with_context(|| format!("Bad Tinkerforge UID '{}'", uid))
}

fn expect_len(payload: &Bytes, len: usize, what: &str) -> Result<()> {
    if payload.len() < len {
        bail!("Short {} response: {} of {} bytes", what, payload.len(), len);
    }
    Ok(())
}

/// Humidity bricklet, reads in 0.1 %RH
#[derive(Debug, Clone, Copy)]
pub struct HumidityBricklet {
    uid: u32,
}

impl HumidityBricklet {
    pub fn new(uid: &str) -> Result<Self> {
        Ok(Self { uid: parse_uid(uid)? })
    }

    /// Relative humidity in %RH
    pub async fn get_humidity<C: TransportConnector>(&self, ipcon: &mut IpConnection<C>) -> Result<f64> {
        let mut payload = ipcon.request(self.uid, function::HUMIDITY_GET_HUMIDITY, &[]).await?;
        expect_len(&payload, 2, "humidity")?;
        Ok(f64::from(payload.get_u16_le()) / 10.0)
    }
}

/// Temperature bricklet, reads in 0.01 °C
#[derive(Debug, Clone, Copy)]
pub struct TemperatureBricklet {
    uid: u32,
}

impl TemperatureBricklet {
    pub fn new(uid: &str) -> Result<Self> {
        Ok(Self { uid: parse_uid(uid)? })
    }

    /// Temperature in °C
    pub async fn get_temperature<C: TransportConnector>(&self, ipcon: &mut IpConnection<C>) -> Result<f64> {
        let mut payload = ipcon
            .request(self.uid, function::TEMPERATURE_GET_TEMPERATURE, &[])
            .await?;
        expect_len(&payload, 2, "temperature")?;
        Ok(f64::from(payload.get_i16_le()) / 100.0)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("IO-4 channel {0} out of range (0-3)")]
pub struct InvalidChannel(pub u8);

/// One of the four IO-4 pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoChannel(u8);

impl IoChannel {
    pub fn new(index: u8) -> Result<Self, InvalidChannel> {
        if index > 3 {
            return Err(InvalidChannel(index));
        }
        Ok(Self(index))
    }

    pub fn index(&self) -> u8 {
        self.0
    }
}

/// The 4-bit input word of an IO-4, bit N is channel N
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalInputs(u8);

impl DigitalInputs {
    pub fn new(mask: u8) -> Self {
        Self(mask & 0x0F)
    }

    pub fn mask(&self) -> u8 {
        self.0
    }

    pub fn is_high(&self, channel: IoChannel) -> bool {
        (self.0 >> channel.index()) & 1 == 1
    }
}

/// IO-4 digital input bricklet
#[derive(Debug, Clone, Copy)]
pub struct Io4Bricklet {
    uid: u32,
}

impl Io4Bricklet {
    pub fn new(uid: &str) -> Result<Self> {
        Ok(Self { uid: parse_uid(uid)? })
    }

    pub async fn get_value<C: TransportConnector>(&self, ipcon: &mut IpConnection<C>) -> Result<DigitalInputs> {
        let payload = ipcon.request(self.uid, function::IO4_GET_VALUE, &[]).await?;
        expect_len(&payload, 1, "IO-4 value")?;
        Ok(DigitalInputs::new(payload[0]))
    }
}

/// Stepper brick
#[derive(Debug, Clone, Copy)]
pub struct StepperBrick {
    uid: u32,
}

impl StepperBrick {
    pub fn new(uid: &str) -> Result<Self> {
        Ok(Self { uid: parse_uid(uid)? })
    }

    pub async fn enable<C: TransportConnector>(&self, ipcon: &mut IpConnection<C>) -> Result<()> {
        ipcon.request(self.uid, function::STEPPER_ENABLE, &[]).await.map(drop)
    }

    pub async fn disable<C: TransportConnector>(&self, ipcon: &mut IpConnection<C>) -> Result<()> {
        ipcon.request(self.uid, function::STEPPER_DISABLE, &[]).await.map(drop)
    }

    /// Stop with the configured deceleration
    pub async fn stop<C: TransportConnector>(&self, ipcon: &mut IpConnection<C>) -> Result<()> {
        ipcon.request(self.uid, function::STEPPER_STOP, &[]).await.map(drop)
    }

    /// Move `steps` relative to the current position (negative moves backward)
    pub async fn set_steps<C: TransportConnector>(&self, ipcon: &mut IpConnection<C>, steps: i32) -> Result<()> {
        ipcon
            .request(self.uid, function::STEPPER_SET_STEPS, &steps.to_le_bytes())
            .await
            .map(drop)
    }

    pub async fn get_remaining_steps<C: TransportConnector>(&self, ipcon: &mut IpConnection<C>) -> Result<i32> {
        let mut payload = ipcon
            .request(self.uid, function::STEPPER_GET_REMAINING_STEPS, &[])
            .await?;
        expect_len(&payload, 4, "remaining steps")?;
        Ok(payload.get_i32_le())
    }

    /// Redefine the current position without moving
    pub async fn set_current_position<C: TransportConnector>(
        &self,
        ipcon: &mut IpConnection<C>,
        position: i32,
    ) -> Result<()> {
        ipcon
            .request(self.uid, function::STEPPER_SET_CURRENT_POSITION, &position.to_le_bytes())
            .await
            .map(drop)
    }
}
