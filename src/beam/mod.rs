//! Thorlabs beam profiler

pub mod bridge;

pub use bridge::BridgeBeamProfiler;
