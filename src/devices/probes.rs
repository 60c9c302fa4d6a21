//! Driver availability probes
//!
//! Each probe is a plain blocking call; callers run it through
//! [`ior_shared::run_with_timeout`] so a hung OS call cannot stall the check.

use crate::devices::traits::{Driver, DriverProbe};
use ior_shared::RigError;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Serial port enumeration works on this machine
pub struct SerialPortsProbe;

impl DriverProbe for SerialPortsProbe {
    fn driver(&self) -> Driver {
        Driver::SerialPorts
    }

    fn probe(&self) -> Result<(), RigError> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| RigError::driver_unavailable(self.driver().label(), e.to_string()))?;

        debug!(
            "Serial ports: {:?}",
            ports.iter().map(|p| p.port_name.as_str()).collect::<Vec<_>>()
        );
        Ok(())
    }
}

/// The Brick Daemon accepts TCP connections
pub struct BrickDaemonProbe {
    address: String,
    connect_timeout: Duration,
}

impl BrickDaemonProbe {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }
}

impl DriverProbe for BrickDaemonProbe {
    fn driver(&self) -> Driver {
        Driver::BrickDaemon
    }

    fn probe(&self) -> Result<(), RigError> {
        let unavailable = |reason: String| RigError::driver_unavailable(Driver::BrickDaemon.label(), reason);

        let addr = self
            .address
            .to_socket_addrs()
            .map_err(|e| unavailable(format!("cannot resolve {}: {}", self.address, e)))?
            .next()
            .ok_or_else(|| unavailable(format!("no address for {}", self.address)))?;

        TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map(drop)
            .map_err(|e| unavailable(format!("{} not reachable: {}", self.address, e)))
    }
}

/// The beam profiler bridge executable can be found
pub struct BridgeProbe {
    command: String,
}

impl BridgeProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl DriverProbe for BridgeProbe {
    fn driver(&self) -> Driver {
        Driver::BeamProfilerBridge
    }

    fn probe(&self) -> Result<(), RigError> {
        let path = which::which(&self.command).map_err(|e| {
            RigError::driver_unavailable(self.driver().label(), format!("{}: {}", self.command, e))
        })?;
        debug!("Beam profiler bridge at {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_brick_daemon_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let address = listener.local_addr().expect("addr").to_string();

        let probe = BrickDaemonProbe::new(address.clone(), Duration::from_millis(500));
        assert!(probe.probe().is_ok());

        drop(listener);
        let err = probe.probe().unwrap_err();
        assert!(err.is_driver_unavailable());
    }

    #[test]
    fn test_bridge_probe_missing_executable() {
        let probe = BridgeProbe::new("definitely-not-a-beam-profiler-bridge");
        let err = probe.probe().unwrap_err();
        assert!(err.is_driver_unavailable());
        assert_eq!(probe.driver(), Driver::BeamProfilerBridge);
    }
}
