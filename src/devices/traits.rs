//! Device capability traits
//!
//! The initialization procedures only ever talk to hardware through these
//! traits. Connection settings (port, host, UIDs) are given to each
//! implementation at construction, so `connect` takes no arguments.

use anyhow::Result;
use async_trait::async_trait;
use ior_shared::RigError;
use serde::{Deserialize, Serialize};

/// Vendor status code; 0 means success
pub type StatusCode = i32;

/// Rotation stage behind a motion controller
#[async_trait]
pub trait MotionController: Send {
    /// Open the link to the controller
    async fn connect(&mut self) -> Result<StatusCode>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Actual stage angle in degrees (may differ slightly from the commanded one)
    async fn get_angle(&mut self) -> Result<(StatusCode, f64)>;

    /// Move by `delta` degrees; with `wait`, return once motion is done
    async fn move_relative(&mut self, delta: f64, wait: bool) -> Result<StatusCode>;

    /// Move to `theta` degrees from the zero position
    async fn move_absolute(&mut self, theta: f64, wait: bool) -> Result<StatusCode>;

    async fn is_moving(&mut self) -> Result<bool>;

    /// Set the velocity used for moves, in degrees/second
    async fn set_velocity(&mut self, velocity: f64) -> Result<StatusCode>;

    /// Velocity used for moves, `None` if the controller reported an error
    async fn get_velocity(&mut self) -> Result<Option<f64>>;

    async fn stop(&mut self) -> Result<StatusCode>;

    /// Return to the persistent home position
    async fn reset_to_home(&mut self) -> Result<StatusCode>;

    /// Poll `is_moving` back to back until the stage reports done
    async fn wait_for_motion(&mut self) -> Result<()> {
        while self.is_moving().await? {}
        Ok(())
    }
}

/// One beam profiler reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Centroid position, µm
    pub centroid_x: f64,
    pub centroid_y: f64,
    /// Beam width (clip level), µm
    pub beam_width_x: f64,
    pub beam_width_y: f64,
    pub peak_intensity: f64,
}

#[async_trait]
pub trait BeamProfiler: Send {
    async fn connect(&mut self) -> Result<StatusCode>;

    async fn disconnect(&mut self) -> Result<()>;

    async fn get_measurement(&mut self) -> Result<Measurement>;
}

/// Network link to the sensor bricks
#[async_trait]
pub trait SensorBrickConnection: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Relative humidity in %RH
    async fn read_humidity(&mut self, uid: &str) -> Result<f64>;

    /// Temperature in °C
    async fn read_temperature(&mut self, uid: &str) -> Result<f64>;
}

/// Open-loop linear actuator with a limit switch at one end
#[async_trait]
pub trait SteppedActuator: Send {
    /// Whether the limit switch is still open
    async fn is_in_bounds(&mut self) -> Result<bool>;

    /// Seek the limit switch, define it as zero, then retreat toward center
    async fn reset_position(&mut self) -> Result<()>;
}

/// Software layer a device category depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    /// OS serial port enumeration (motion controller)
    SerialPorts,
    /// Tinkerforge Brick Daemon
    BrickDaemon,
    /// Beam profiler vendor bridge executable
    BeamProfilerBridge,
}

impl Driver {
    pub fn label(&self) -> &'static str {
        match self {
            Driver::SerialPorts => "Serial ports",
            Driver::BrickDaemon => "Brick Daemon",
            Driver::BeamProfilerBridge => "Beam profiler bridge",
        }
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Blocking availability check for one driver
pub trait DriverProbe: Send + Sync {
    fn driver(&self) -> Driver;

    /// `Err(RigError::DriverUnavailable)` when the driver cannot be reached
    fn probe(&self) -> Result<(), RigError>;
}
