//! Device checks as bounded actions
//!
//! Every check opens its own connection, does the smallest call that proves
//! the device answers, and closes the connection again.

use crate::config::RigConfig;
use crate::devices::{DeviceProvider, Driver, DriverProbe, Measurement};
use ior_shared::{DeviceAction, RigError};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const NEWPORT_SOFTWARE_URL: &str = "https://www.newport.com/p/ESP301-3N";
pub const THORLABS_SOFTWARE_URL: &str = "https://www.thorlabs.com/software_pages/ViewSoftwarePage.cfm?Code=Beam";
pub const TINKERFORGE_DOWNLOADS_URL: &str = "https://www.tinkerforge.com/en/doc/Downloads.html#downloads-tools";

const STEP: &str = "     ";
const DETAIL: &str = "          ";

/// Convert a driver error into the shared taxonomy, keeping `RigError`s intact
pub fn into_rig_error(device: &str, err: anyhow::Error) -> RigError {
    match err.downcast::<RigError>() {
        Ok(rig_error) => rig_error,
        Err(err) => RigError::device(device, format!("{:#}", err)),
    }
}

#[derive(Debug, Clone, Copy)]
enum Sensor {
    Humidity,
    Temperature,
}

impl Sensor {
    fn name(self) -> &'static str {
        match self {
            Sensor::Humidity => "Humidity sensor",
            Sensor::Temperature => "Temperature sensor",
        }
    }
}

/// Both Tinkerforge sensor readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReadings {
    /// %RH
    pub humidity: f64,
    /// °C
    pub temperature: f64,
}

/// Builds the device checks of the initialization procedures
#[derive(Clone)]
pub struct RigChecks {
    provider: Arc<dyn DeviceProvider>,
    config: Arc<RigConfig>,
}

impl RigChecks {
    pub fn new(provider: Arc<dyn DeviceProvider>, config: RigConfig) -> Self {
        Self {
            provider,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn DeviceProvider> {
        &self.provider
    }

    /// Connect to the motion controller and disconnect again
    pub fn stage_connect(&self, limit: Duration) -> DeviceAction<()> {
        let provider = self.provider.clone();

        DeviceAction::new("Rotation stage", limit, self.stage_diagnostic(), move || {
            let provider = provider.clone();
            async move {
                const DEVICE: &str = "Rotation stage";
                let mut stage = provider.motion_controller();

                let status = stage.connect().await.map_err(|e| into_rig_error(DEVICE, e))?;
                if let Err(e) = stage.disconnect().await {
                    warn!("Failed to disconnect from motion controller: {:#}", e);
                }

                match status {
                    0 => Ok(()),
                    code => Err(RigError::status(DEVICE, code)),
                }
            }
        })
    }

    /// Connect to the beam profiler and take one measurement
    pub fn beam_profiler(&self) -> DeviceAction<Measurement> {
        let provider = self.provider.clone();

        DeviceAction::new(
            "Beam profiler",
            self.config.timeouts.beam_profiler_connect(),
            self.beam_profiler_diagnostic(),
            move || {
                let provider = provider.clone();
                async move {
                    const DEVICE: &str = "Beam profiler";
                    let mut profiler = provider.beam_profiler();

                    let status = profiler.connect().await.map_err(|e| into_rig_error(DEVICE, e))?;
                    let measurement = match status {
                        0 => profiler.get_measurement().await.map_err(|e| into_rig_error(DEVICE, e)),
                        code => Err(RigError::status(DEVICE, code)),
                    };

                    if let Err(e) = profiler.disconnect().await {
                        warn!("Failed to disconnect from beam profiler: {:#}", e);
                    }
                    measurement
                }
            },
        )
    }

    /// Open and close a Brick Daemon connection
    pub fn brick_daemon(&self) -> DeviceAction<()> {
        let provider = self.provider.clone();

        DeviceAction::new(
            "Tinkerforge brick",
            self.config.timeouts.sensor_check(),
            self.tinkerforge_diagnostic(),
            move || {
                let provider = provider.clone();
                async move {
                    let mut bricks = provider.sensor_bricks();
                    bricks
                        .connect()
                        .await
                        .map_err(|e| into_rig_error("Tinkerforge brick", e))?;
                    bricks
                        .disconnect()
                        .await
                        .map_err(|e| into_rig_error("Tinkerforge brick", e))
                }
            },
        )
    }

    pub fn humidity(&self) -> DeviceAction<f64> {
        self.sensor_read(Sensor::Humidity)
    }

    pub fn temperature(&self) -> DeviceAction<f64> {
        self.sensor_read(Sensor::Temperature)
    }

    fn sensor_read(&self, sensor: Sensor) -> DeviceAction<f64> {
        let provider = self.provider.clone();
        let tf = &self.config.tinkerforge;
        let uid = match sensor {
            Sensor::Humidity => tf.humidity_uid.clone(),
            Sensor::Temperature => tf.temperature_uid.clone(),
        };

        DeviceAction::new(
            sensor.name(),
            self.config.timeouts.sensor_check(),
            self.tinkerforge_diagnostic(),
            move || {
                let provider = provider.clone();
                let uid = uid.clone();
                async move {
                    let mut bricks = provider.sensor_bricks();
                    bricks
                        .connect()
                        .await
                        .map_err(|e| into_rig_error(sensor.name(), e))?;

                    let reading = match sensor {
                        Sensor::Humidity => bricks.read_humidity(&uid).await,
                        Sensor::Temperature => bricks.read_temperature(&uid).await,
                    };

                    if let Err(e) = bricks.disconnect().await {
                        warn!("Failed to disconnect from Brick Daemon: {:#}", e);
                    }
                    reading.map_err(|e| into_rig_error(sensor.name(), e))
                }
            },
        )
    }

    /// Read both sensors over one connection; fails if either read fails
    pub fn sensors(&self) -> DeviceAction<SensorReadings> {
        let provider = self.provider.clone();
        let config = self.config.clone();

        DeviceAction::new(
            "Tinkerforge sensors",
            self.config.timeouts.sensor_check(),
            self.tinkerforge_diagnostic(),
            move || {
                let provider = provider.clone();
                let config = config.clone();
                async move {
                    let tf = &config.tinkerforge;
                    let mut bricks = provider.sensor_bricks();
                    bricks
                        .connect()
                        .await
                        .map_err(|e| into_rig_error("Tinkerforge brick", e))?;

                    let humidity = bricks.read_humidity(&tf.humidity_uid).await;
                    let temperature = bricks.read_temperature(&tf.temperature_uid).await;

                    if let Err(e) = bricks.disconnect().await {
                        warn!("Failed to disconnect from Brick Daemon: {:#}", e);
                    }

                    match (humidity, temperature) {
                        (Ok(humidity), Ok(temperature)) => Ok(SensorReadings {
                            humidity,
                            temperature,
                        }),
                        (Err(e), Ok(_)) => Err(into_rig_error("Humidity sensor", e)),
                        (Ok(_), Err(e)) => Err(into_rig_error("Temperature sensor", e)),
                        (Err(h), Err(t)) => Err(RigError::device(
                            "Tinkerforge sensors",
                            format!("humidity: {:#}; temperature: {:#}", h, t),
                        )),
                    }
                }
            },
        )
    }

    pub fn driver_probes(&self) -> Vec<Arc<dyn DriverProbe>> {
        self.provider.driver_probes()
    }

    /// What to do when `driver` is missing
    pub fn install_hint(&self, driver: Driver) -> String {
        let config = &self.config;
        match driver {
            Driver::SerialPorts => format!(
                "The operating system could not list its serial ports. Make sure the USB driver\n\
                 for the motion controller is installed; it ships with the Newport software:\n{STEP}{}",
                NEWPORT_SOFTWARE_URL
            ),
            Driver::BrickDaemon => format!(
                "The Brick Daemon is not reachable at {}. Make sure that it is installed and running:\n{STEP}{}",
                config.tinkerforge.address(),
                TINKERFORGE_DOWNLOADS_URL
            ),
            Driver::BeamProfilerBridge => format!(
                "The beam profiler bridge '{}' could not be found. Install the Thorlabs beam software\n\
                 and put the bridge on the PATH (or set beam_profiler.bridge_command in {}):\n{STEP}{}",
                config.beam_profiler.bridge_command,
                config.source_hint(),
                THORLABS_SOFTWARE_URL
            ),
        }
    }

    fn stage_diagnostic(&self) -> String {
        let motion = &self.config.motion;
        let source = self.config.source_hint();
        [
            "Since the rotation stage could not be found, please follow these diagnostic steps:".to_string(),
            format!("{STEP}1. Make sure that the motion controller is plugged in and powered on"),
            format!(
                "{STEP}2. Make sure that the rotation stage is plugged into the motion controller in slot {}",
                motion.axis
            ),
            format!("{DETAIL}If you would like to change this slot number, see {}", source),
            format!(
                "{STEP}3. Make sure that the motion controller is plugged into the computer via USB and is detected on the port {}",
                motion.port
            ),
            format!("{DETAIL}If you would like to change this port, see {}", source),
            format!("{DETAIL}If it is not detected by the computer, use the manufacturer provided software to troubleshoot:"),
            format!("{DETAIL}{}", NEWPORT_SOFTWARE_URL),
            format!("{DETAIL}You will likely need the USB driver that is installed along with that software"),
        ]
        .join("\n")
    }

    fn beam_profiler_diagnostic(&self) -> String {
        [
            "Since the beam profiler could not be found, please follow these diagnostic steps:".to_string(),
            format!("{STEP}1. Make sure that the beam profiler is plugged into the computer"),
            format!("{STEP}2. Make sure that the beam profiler is detected by the manufacturer software:"),
            format!("{DETAIL}{}", THORLABS_SOFTWARE_URL),
        ]
        .join("\n")
    }

    fn tinkerforge_diagnostic(&self) -> String {
        let tf = &self.config.tinkerforge;
        [
            "Since at least one of the tinkerforge bricks could not be found, please follow these diagnostic steps:".to_string(),
            format!("{STEP}1. Make sure that the tinkerforge brick is plugged into the computer (there should be an active LED on the board)"),
            format!("{STEP}2. Make sure that the brick daemon is installed and currently running:"),
            format!("{DETAIL}{}", TINKERFORGE_DOWNLOADS_URL),
            format!("{STEP}3. Ensure that there is no other process running on the following host:port combination:"),
            format!("{DETAIL}{}", tf.address()),
            format!("{STEP}4. Ensure that the following UIDs are correct. They are shown in the Brick Viewer program,"),
            format!("{STEP}and any changes should be made in {}:", self.config.source_hint()),
            format!("{DETAIL}Humidity: {}", tf.humidity_uid),
            format!("{DETAIL}Temperature: {}", tf.temperature_uid),
        ]
        .join("\n")
    }
}
