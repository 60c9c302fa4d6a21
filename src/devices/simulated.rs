//! Simulated rig for dry runs and tests
//!
//! Every device answers like healthy hardware unless a [`Fault`] is injected
//! for it. Attempts are counted per device across all handles built by the
//! same rig, so tests can assert how often a check actually ran.

use crate::devices::traits::{
    BeamProfiler, Driver, DriverProbe, Measurement, MotionController, SensorBrickConnection,
    StatusCode, SteppedActuator,
};
use crate::devices::DeviceProvider;
use anyhow::{bail, Result};
use async_trait::async_trait;
use ior_shared::RigError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEVICE_COUNT: usize = 5;

/// Simulated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimDevice {
    RotationStage = 0,
    BeamProfiler = 1,
    HumiditySensor = 2,
    TemperatureSensor = 3,
    Stepper = 4,
}

impl SimDevice {
    pub fn label(&self) -> &'static str {
        match self {
            SimDevice::RotationStage => "Rotation stage",
            SimDevice::BeamProfiler => "Beam profiler",
            SimDevice::HumiditySensor => "Humidity sensor",
            SimDevice::TemperatureSensor => "Temperature sensor",
            SimDevice::Stepper => "Stepper",
        }
    }
}

/// Misbehavior to inject into a device's connect (or read) call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every attempt raises an error
    Fail,
    /// The first N attempts raise, later ones succeed
    FailFirst(u32),
    /// The call never returns
    Hang,
    /// The vendor call returns this status code
    Status(StatusCode),
}

type Attempts = Arc<[AtomicU32; DEVICE_COUNT]>;

/// Provider of simulated devices
#[derive(Debug, Clone, Default)]
pub struct SimulatedRig {
    faults: HashMap<SimDevice, Fault>,
    missing_drivers: HashSet<Driver>,
    attempts: Attempts,
}

impl SimulatedRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(mut self, device: SimDevice, fault: Fault) -> Self {
        self.faults.insert(device, fault);
        self
    }

    pub fn with_missing_driver(mut self, driver: Driver) -> Self {
        self.missing_drivers.insert(driver);
        self
    }

    /// Number of times `device` has been exercised so far
    pub fn attempts(&self, device: SimDevice) -> u32 {
        self.attempts[device as usize].load(Ordering::SeqCst)
    }

    fn injector(&self, device: SimDevice) -> Injector {
        Injector {
            device,
            fault: self.faults.get(&device).copied(),
            attempts: self.attempts.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct Injector {
    device: SimDevice,
    fault: Option<Fault>,
    attempts: Attempts,
}

impl Injector {
    /// Count one attempt and play out the injected fault
    async fn attempt(&self) -> Result<StatusCode> {
        let attempt = self.attempts[self.device as usize].fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Simulated {} attempt {}", self.device.label(), attempt);

        match self.fault {
            None => Ok(0),
            Some(Fault::FailFirst(n)) if attempt > n => Ok(0),
            Some(Fault::Fail | Fault::FailFirst(_)) => {
                bail!("{} not responding (simulated)", self.device.label())
            }
            Some(Fault::Hang) => std::future::pending().await,
            Some(Fault::Status(code)) => Ok(code),
        }
    }

    /// Like `attempt`, for calls without a status code
    async fn check(&self) -> Result<()> {
        match self.attempt().await? {
            0 => Ok(()),
            code => Err(RigError::status(self.device.label(), code).into()),
        }
    }
}

struct SimMotionController {
    injector: Injector,
    connected: bool,
    position: f64,
    velocity: f64,
    moving_polls: u32,
}

impl SimMotionController {
    fn ensure_connected(&self) -> Result<()> {
        if !self.connected {
            bail!("Motion controller is not connected");
        }
        Ok(())
    }

    fn start_move(&mut self, target: f64) {
        self.position = target;
        self.moving_polls = 2;
    }
}

#[async_trait]
impl MotionController for SimMotionController {
    async fn connect(&mut self) -> Result<StatusCode> {
        let status = self.injector.attempt().await?;
        self.connected = status == 0;
        Ok(status)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn get_angle(&mut self) -> Result<(StatusCode, f64)> {
        self.ensure_connected()?;
        Ok((0, self.position))
    }

    async fn move_relative(&mut self, delta: f64, wait: bool) -> Result<StatusCode> {
        self.ensure_connected()?;
        self.start_move(self.position + delta);
        if wait {
            self.wait_for_motion().await?;
        }
        Ok(0)
    }

    async fn move_absolute(&mut self, theta: f64, wait: bool) -> Result<StatusCode> {
        self.ensure_connected()?;
        self.start_move(theta);
        if wait {
            self.wait_for_motion().await?;
        }
        Ok(0)
    }

    async fn is_moving(&mut self) -> Result<bool> {
        self.ensure_connected()?;
        if self.moving_polls == 0 {
            return Ok(false);
        }
        self.moving_polls -= 1;
        Ok(true)
    }

    async fn set_velocity(&mut self, velocity: f64) -> Result<StatusCode> {
        self.ensure_connected()?;
        self.velocity = velocity;
        Ok(0)
    }

    async fn get_velocity(&mut self) -> Result<Option<f64>> {
        self.ensure_connected()?;
        Ok(Some(self.velocity))
    }

    async fn stop(&mut self) -> Result<StatusCode> {
        self.ensure_connected()?;
        self.moving_polls = 0;
        Ok(0)
    }

    async fn reset_to_home(&mut self) -> Result<StatusCode> {
        self.ensure_connected()?;
        self.start_move(0.0);
        Ok(0)
    }
}

struct SimBeamProfiler {
    injector: Injector,
    connected: bool,
}

#[async_trait]
impl BeamProfiler for SimBeamProfiler {
    async fn connect(&mut self) -> Result<StatusCode> {
        let status = self.injector.attempt().await?;
        self.connected = true;
        Ok(status)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn get_measurement(&mut self) -> Result<Measurement> {
        if !self.connected {
            bail!("Beam profiler is not connected");
        }
        Ok(Measurement {
            centroid_x: 12.5,
            centroid_y: -3.0,
            beam_width_x: 850.0,
            beam_width_y: 910.5,
            peak_intensity: 0.82,
        })
    }
}

struct SimSensorBricks {
    humidity: Injector,
    temperature: Injector,
    daemon_missing: bool,
    connected: bool,
}

impl SimSensorBricks {
    fn ensure_connected(&self) -> Result<()> {
        if !self.connected {
            bail!("Not connected to Brick Daemon");
        }
        Ok(())
    }
}

#[async_trait]
impl SensorBrickConnection for SimSensorBricks {
    async fn connect(&mut self) -> Result<()> {
        if self.daemon_missing {
            bail!("Brick Daemon refused the connection (simulated)");
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn read_humidity(&mut self, _uid: &str) -> Result<f64> {
        self.ensure_connected()?;
        self.humidity.check().await?;
        Ok(45.2)
    }

    async fn read_temperature(&mut self, _uid: &str) -> Result<f64> {
        self.ensure_connected()?;
        self.temperature.check().await?;
        Ok(21.5)
    }
}

struct SimStepper {
    injector: Injector,
}

#[async_trait]
impl SteppedActuator for SimStepper {
    async fn is_in_bounds(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn reset_position(&mut self) -> Result<()> {
        self.injector.check().await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }
}

struct SimProbe {
    driver: Driver,
    missing: bool,
}

impl DriverProbe for SimProbe {
    fn driver(&self) -> Driver {
        self.driver
    }

    fn probe(&self) -> Result<(), RigError> {
        if self.missing {
            return Err(RigError::driver_unavailable(
                self.driver.label(),
                "not installed (simulated)",
            ));
        }
        Ok(())
    }
}

impl DeviceProvider for SimulatedRig {
    fn motion_controller(&self) -> Box<dyn MotionController> {
        Box::new(SimMotionController {
            injector: self.injector(SimDevice::RotationStage),
            connected: false,
            position: 0.0,
            velocity: 20.0,
            moving_polls: 0,
        })
    }

    fn beam_profiler(&self) -> Box<dyn BeamProfiler> {
        Box::new(SimBeamProfiler {
            injector: self.injector(SimDevice::BeamProfiler),
            connected: false,
        })
    }

    fn sensor_bricks(&self) -> Box<dyn SensorBrickConnection> {
        Box::new(SimSensorBricks {
            humidity: self.injector(SimDevice::HumiditySensor),
            temperature: self.injector(SimDevice::TemperatureSensor),
            daemon_missing: self.missing_drivers.contains(&Driver::BrickDaemon),
            connected: false,
        })
    }

    fn stepped_actuator(&self) -> Result<Box<dyn SteppedActuator>> {
        Ok(Box::new(SimStepper {
            injector: self.injector(SimDevice::Stepper),
        }))
    }

    fn driver_probes(&self) -> Vec<Arc<dyn DriverProbe>> {
        [Driver::SerialPorts, Driver::BrickDaemon, Driver::BeamProfilerBridge]
            .into_iter()
            .map(|driver| {
                Arc::new(SimProbe {
                    driver,
                    missing: self.missing_drivers.contains(&driver),
                }) as Arc<dyn DriverProbe>
            })
            .collect()
    }
}
