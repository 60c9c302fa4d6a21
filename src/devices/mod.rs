//! Device capabilities and the providers that build them

pub mod probes;
pub mod simulated;
pub mod traits;

pub use simulated::{Fault, SimDevice, SimulatedRig};
pub use traits::{
    BeamProfiler, Driver, DriverProbe, Measurement, MotionController, SensorBrickConnection,
    StatusCode, SteppedActuator,
};

use crate::beam::BridgeBeamProfiler;
use crate::config::RigConfig;
use crate::motion::RotationStage;
use crate::tinkerforge::{Io4Bricklet, IoChannel, IpConnection, StepperBrick, TfStepper};
use crate::transport::{SerialConnector, TcpConnector};
use anyhow::{bail, Result};
use probes::{BrickDaemonProbe, BridgeProbe, SerialPortsProbe};
use std::sync::Arc;

/// Builds fresh device handles, one set per attempt
pub trait DeviceProvider: Send + Sync + 'static {
    fn motion_controller(&self) -> Box<dyn MotionController>;

    fn beam_profiler(&self) -> Box<dyn BeamProfiler>;

    fn sensor_bricks(&self) -> Box<dyn SensorBrickConnection>;

    fn stepped_actuator(&self) -> Result<Box<dyn SteppedActuator>>;

    /// Probes for every driver the rig depends on, in check order
    fn driver_probes(&self) -> Vec<Arc<dyn DriverProbe>>;
}

/// The real rig, wired from [`RigConfig`]
pub struct HardwareRig {
    config: RigConfig,
}

impl HardwareRig {
    pub fn new(config: RigConfig) -> Self {
        Self { config }
    }

    fn brick_daemon(&self) -> IpConnection<TcpConnector> {
        IpConnection::new(
            TcpConnector::new(self.config.tinkerforge.address()),
            self.config.timeouts.tf_response(),
        )
    }
}

impl DeviceProvider for HardwareRig {
    fn motion_controller(&self) -> Box<dyn MotionController> {
        let motion = &self.config.motion;
        Box::new(RotationStage::new(
            SerialConnector::new(&motion.port, motion.baud_rate),
            motion.axis,
            self.config.timeouts.serial_read(),
        ))
    }

    fn beam_profiler(&self) -> Box<dyn BeamProfiler> {
        let bridge = &self.config.beam_profiler;
        Box::new(BridgeBeamProfiler::new(&bridge.bridge_command, bridge.bridge_args.clone()))
    }

    fn sensor_bricks(&self) -> Box<dyn SensorBrickConnection> {
        Box::new(self.brick_daemon())
    }

    fn stepped_actuator(&self) -> Result<Box<dyn SteppedActuator>> {
        let tf = &self.config.tinkerforge;
        if tf.io_uid.is_empty() {
            bail!(
                "No IO-4 UID configured for the stepper limit switch (set tinkerforge.io_uid in {})",
                self.config.source_hint()
            );
        }

        Ok(Box::new(TfStepper::new(
            self.brick_daemon(),
            StepperBrick::new(&tf.stepper_uid)?,
            Io4Bricklet::new(&tf.io_uid)?,
            IoChannel::new(tf.io_channel)?,
            tf.homing_retreat_steps,
        )))
    }

    fn driver_probes(&self) -> Vec<Arc<dyn DriverProbe>> {
        vec![
            Arc::new(SerialPortsProbe),
            Arc::new(BrickDaemonProbe::new(
                self.config.tinkerforge.address(),
                self.config.timeouts.driver_probe(),
            )),
            Arc::new(BridgeProbe::new(&self.config.beam_profiler.bridge_command)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_rig_probes_every_driver() {
        let rig = HardwareRig::new(RigConfig::default());
        let drivers: Vec<Driver> = rig.driver_probes().iter().map(|p| p.driver()).collect();
        assert_eq!(
            drivers,
            vec![Driver::SerialPorts, Driver::BrickDaemon, Driver::BeamProfilerBridge]
        );
    }

    #[test]
    fn test_stepper_requires_io_uid() {
        let rig = HardwareRig::new(RigConfig::default());
        let err = rig.stepped_actuator().err().expect("missing io_uid");
        assert!(err.to_string().contains("tinkerforge.io_uid"));

        let mut config = RigConfig::default();
        config.tinkerforge.io_uid = "hAH".into();
        config.tinkerforge.io_channel = 3;
        assert!(HardwareRig::new(config).stepped_actuator().is_ok());
    }
}
