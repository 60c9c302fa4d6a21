//! Rig configuration
//!
//! Loaded from (later sources win):
//! 1. built-in lab defaults
//! 2. a TOML file (`--config <path>`, or `ior-rig.toml` in the working directory)
//! 3. environment variables prefixed with `IOR_RIG_`, with `__` between nested
//!    keys (e.g. `IOR_RIG_MOTION__PORT=/dev/ttyUSB0`)
//!
//! The core never interprets these values; they are handed to the device
//! constructors and quoted in diagnostic hints.
//!
//! ```toml
//! [motion]
//! port = "COM4"
//! axis = 1
//!
//! [tinkerforge]
//! host = "localhost"
//! port = 4223
//! humidity_uid = "keg"
//! temperature_uid = "6Jf"
//! ```

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use ior_shared::{defaults, timeouts};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "ior-rig.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "IOR_RIG_";

/// Top-level rig configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RigConfig {
    /// ESP301 motion controller
    pub motion: MotionConfig,
    /// Tinkerforge bricks
    pub tinkerforge: TinkerforgeConfig,
    /// Thorlabs beam profiler bridge
    pub beam_profiler: BeamProfilerConfig,
    /// Deadlines for device operations
    pub timeouts: TimeoutConfig,
    /// File the configuration was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Motion controller settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    /// Serial port (e.g. "COM4" or "/dev/ttyUSB0")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Slot the rotation stage is plugged into
    pub axis: u8,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            port: defaults::MOTION_CONTROLLER_PORT.into(),
            baud_rate: defaults::ESP301_BAUD_RATE,
            axis: defaults::ROTATION_STAGE_AXIS,
        }
    }
}

/// Tinkerforge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TinkerforgeConfig {
    /// Brick Daemon host
    pub host: String,
    /// Brick Daemon port
    pub port: u16,
    pub humidity_uid: String,
    pub temperature_uid: String,
    pub stepper_uid: String,
    /// UID of the IO-4 bricklet wired to the stepper limit switch
    pub io_uid: String,
    /// IO-4 channel (0-3) the limit switch is wired to
    pub io_channel: u8,
    /// Steps moved back toward center after homing
    pub homing_retreat_steps: i32,
}

impl Default for TinkerforgeConfig {
    fn default() -> Self {
        Self {
            host: defaults::TF_HOST.into(),
            port: defaults::TF_PORT,
            humidity_uid: defaults::TF_HUMIDITY_UID.into(),
            temperature_uid: defaults::TF_TEMPERATURE_UID.into(),
            stepper_uid: defaults::TF_STEPPER_UID.into(),
            io_uid: String::new(),
            io_channel: 0,
            homing_retreat_steps: defaults::HOMING_RETREAT_STEPS,
        }
    }
}

impl TinkerforgeConfig {
    /// Brick Daemon address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Beam profiler bridge settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BeamProfilerConfig {
    /// Bridge executable (looked up on PATH when not absolute)
    pub bridge_command: String,
    /// Extra arguments for the bridge
    pub bridge_args: Vec<String>,
}

impl Default for BeamProfilerConfig {
    fn default() -> Self {
        Self {
            bridge_command: "tlbp2-bridge".into(),
            bridge_args: Vec::new(),
        }
    }
}

/// Deadlines, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub fast_stage_connect_ms: u64,
    pub guided_stage_connect_ms: u64,
    pub beam_profiler_connect_ms: u64,
    pub sensor_check_ms: u64,
    pub driver_probe_ms: u64,
    pub motion_command_ms: u64,
    pub homing_ms: u64,
    pub serial_read_ms: u64,
    pub tf_response_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fast_stage_connect_ms: timeouts::FAST_STAGE_CONNECT_MS,
            guided_stage_connect_ms: timeouts::GUIDED_STAGE_CONNECT_MS,
            beam_profiler_connect_ms: timeouts::BEAM_PROFILER_CONNECT_MS,
            sensor_check_ms: timeouts::SENSOR_CHECK_MS,
            driver_probe_ms: timeouts::DRIVER_PROBE_MS,
            motion_command_ms: timeouts::MOTION_COMMAND_MS,
            homing_ms: timeouts::HOMING_MS,
            serial_read_ms: timeouts::SERIAL_READ_MS,
            tf_response_ms: timeouts::TF_RESPONSE_MS,
        }
    }
}

impl TimeoutConfig {
    pub fn fast_stage_connect(&self) -> Duration {
        Duration::from_millis(self.fast_stage_connect_ms)
    }

    pub fn guided_stage_connect(&self) -> Duration {
        Duration::from_millis(self.guided_stage_connect_ms)
    }

    pub fn beam_profiler_connect(&self) -> Duration {
        Duration::from_millis(self.beam_profiler_connect_ms)
    }

    pub fn sensor_check(&self) -> Duration {
        Duration::from_millis(self.sensor_check_ms)
    }

    pub fn driver_probe(&self) -> Duration {
        Duration::from_millis(self.driver_probe_ms)
    }

    pub fn motion_command(&self) -> Duration {
        Duration::from_millis(self.motion_command_ms)
    }

    pub fn homing(&self) -> Duration {
        Duration::from_millis(self.homing_ms)
    }

    pub fn serial_read(&self) -> Duration {
        Duration::from_millis(self.serial_read_ms)
    }

    pub fn tf_response(&self) -> Duration {
        Duration::from_millis(self.tf_response_ms)
    }
}

impl RigConfig {
    /// Load configuration from defaults, an optional TOML file and the environment.
    ///
    /// An explicit `path` must exist; without one, `ior-rig.toml` is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                if !p.exists() {
                    bail!("Config file not found: {}", p.display());
                }
                Some(p.to_path_buf())
            }
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_FILE);
                p.exists().then_some(p)
            }
        };

        let mut figment = Figment::from(Serialized::defaults(RigConfig::default()));
        if let Some(file) = &file {
            figment = figment.merge(Toml::file(file));
        }

        let mut config: RigConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Invalid rig configuration")?;

        config.source = file;
        Ok(config)
    }

    /// Where the user should go to change a setting, for diagnostic hints
    pub fn source_hint(&self) -> String {
        match &self.source {
            Some(path) => format!("the configuration file ({})", path.display()),
            None => format!(
                "a {} configuration file (or {}* environment variables)",
                DEFAULT_CONFIG_FILE, ENV_PREFIX
            ),
        }
    }
}
