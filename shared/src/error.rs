//! Error taxonomy for bounded device operations
//!
//! Every failure a device check can produce falls into one of three buckets:
//!
//! - **`Timeout`**: the operation did not finish before its deadline.
//! - **`Device`**: the vendor call returned a non-zero status or raised.
//! - **`DriverUnavailable`**: the software layer behind a device (serial port
//!   enumeration, Brick Daemon, beam profiler bridge) could not be reached at all.
//!
//! Guided mode routes `Timeout` and `Device` through the same retry prompt.
//! `DriverUnavailable` is reported separately by the driver pre-check.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by device operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RigError {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("{device} error: {message}")]
    Device { device: String, message: String },

    #[error("Driver '{driver}' unavailable: {reason}")]
    DriverUnavailable { driver: String, reason: String },
}

impl RigError {
    /// Create a device error
    pub fn device(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a device error for a vendor call that returned a non-zero status code
    pub fn status(device: impl Into<String>, code: i32) -> Self {
        Self::device(device, format!("returned status code {}", code))
    }

    /// Create a driver-unavailable error
    pub fn driver_unavailable(driver: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DriverUnavailable {
            driver: driver.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the driver itself is missing
    pub fn is_driver_unavailable(&self) -> bool {
        matches!(self, Self::DriverUnavailable { .. })
    }
}
