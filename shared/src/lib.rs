//! IOR Rig Shared Types
//!
//! This crate provides the bounded device operation runner, the guided retry
//! state machine, the error taxonomy and the Tinkerforge packet codec used by
//! the rig initialization tools.

pub mod bounded;
pub mod codec;
pub mod error;
pub mod retry;

pub use bounded::{run_future_with_timeout, run_with_timeout, DeviceAction, OperationOutcome};
pub use error::RigError;
pub use retry::{CheckOutcome, GuidedRetry, RetryDecision, RetryEvent, RetryState};

/// Lab defaults for the rig hardware
pub mod defaults {
    /// Serial port of the ESP301 motion controller
    pub const MOTION_CONTROLLER_PORT: &str = "COM4";

    /// The ESP301 only talks at this rate over USB
    pub const ESP301_BAUD_RATE: u32 = 921_600;

    /// Slot the rotation stage is plugged into on the motion controller
    pub const ROTATION_STAGE_AXIS: u8 = 1;

    /// Brick Daemon host
    pub const TF_HOST: &str = "localhost";

    /// Brick Daemon port
    pub const TF_PORT: u16 = 4223;

    pub const TF_STEPPER_UID: &str = "6e6afb";
    pub const TF_HUMIDITY_UID: &str = "keg";
    pub const TF_TEMPERATURE_UID: &str = "6Jf";

    /// Steps moved back toward center after the limit switch is hit
    pub const HOMING_RETREAT_STEPS: i32 = 25_000;
}

/// Deadlines for device operations, in milliseconds
pub mod timeouts {
    /// Fast check of the motion controller connection
    pub const FAST_STAGE_CONNECT_MS: u64 = 2_000;

    /// Guided check of the motion controller connection
    pub const GUIDED_STAGE_CONNECT_MS: u64 = 4_000;

    /// Beam profiler connection; the drum has to spin up first (~10 s)
    pub const BEAM_PROFILER_CONNECT_MS: u64 = 20_000;

    /// Connect to the Brick Daemon and read one sensor
    pub const SENSOR_CHECK_MS: u64 = 5_000;

    /// Driver availability probe
    pub const DRIVER_PROBE_MS: u64 = 2_000;

    /// Direct stage commands (moves may take a while)
    pub const MOTION_COMMAND_MS: u64 = 60_000;

    /// Full stepper homing sequence
    pub const HOMING_MS: u64 = 120_000;

    /// Single serial query to the ESP301
    pub const SERIAL_READ_MS: u64 = 1_000;

    /// Single request/response round trip to the Brick Daemon
    pub const TF_RESPONSE_MS: u64 = 2_500;
}
