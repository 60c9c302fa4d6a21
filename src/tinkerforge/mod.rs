//! Tinkerforge Brick Daemon client
//!
//! Speaks the TCP/IP protocol directly (see [`ior_shared::codec`]) for the few
//! devices on the rig: humidity and temperature bricklets, an IO-4 bricklet
//! and a stepper brick.

pub mod bricklets;
pub mod ip_connection;
pub mod stepper;

#[cfg(test)]
pub(crate) mod fake_daemon;

pub use bricklets::{DigitalInputs, Io4Bricklet, IoChannel, StepperBrick};
pub use ip_connection::IpConnection;
pub use stepper::TfStepper;
