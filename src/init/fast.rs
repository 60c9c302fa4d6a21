//! Fast initialization: one bounded attempt per device, no prompts

use crate::console::Console;
use crate::devices::{Driver, DriverProbe};
use crate::init::checks::RigChecks;
use ior_shared::{run_with_timeout, DeviceAction, OperationOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Width the dotted label is padded to before "Working"/"Error"
const LINE_WIDTH: usize = 34;

/// One line of the fast check
#[derive(Debug, Clone)]
pub struct FastCheck {
    pub label: String,
    /// Sub-checks are indented under their parent line
    pub indented: bool,
    pub action: DeviceAction<()>,
}

impl FastCheck {
    pub fn new<T: Send + 'static>(action: DeviceAction<T>, indented: bool) -> Self {
        Self {
            label: action.name().to_string(),
            indented,
            action: action.map(drop),
        }
    }

    fn leader(&self) -> String {
        let label = if self.indented {
            format!("     {}", self.label)
        } else {
            self.label.clone()
        };
        format!("{:.<width$}", label, width = LINE_WIDTH)
    }
}

/// Driver probes followed by the device checks
#[derive(Clone)]
pub struct FastChecks {
    pub probes: Vec<Arc<dyn DriverProbe>>,
    /// Deadline for each probe
    pub probe_limit: Duration,
    pub devices: Vec<FastCheck>,
}

/// The standard fast check list for the rig
pub fn rig_fast_checks(checks: &RigChecks) -> FastChecks {
    let stage_limit = checks.config().timeouts.fast_stage_connect();
    FastChecks {
        probes: checks.driver_probes(),
        probe_limit: checks.config().timeouts.driver_probe(),
        devices: vec![
            FastCheck::new(checks.stage_connect(stage_limit), false),
            FastCheck::new(checks.beam_profiler(), false),
            FastCheck::new(checks.brick_daemon(), false),
            FastCheck::new(checks.humidity(), true),
            FastCheck::new(checks.temperature(), true),
        ],
    }
}

async fn missing_drivers(probes: &[Arc<dyn DriverProbe>], limit: Duration) -> Vec<Driver> {
    let mut missing = Vec::new();
    for probe in probes {
        let driver = probe.driver();
        let probe = Arc::clone(probe);
        match run_with_timeout(move || probe.probe(), limit).await {
            OperationOutcome::Success(()) => {}
            OperationOutcome::TimedOut => {
                warn!("{} probe timed out after {:?}", driver, limit);
                missing.push(driver);
            }
            OperationOutcome::Failed(err) => {
                warn!("{}", err);
                missing.push(driver);
            }
        }
    }
    missing
}

/// Probe the drivers, then run every device check once, in order, and report
/// whether everything passed.
///
/// Missing drivers and failing checks clear the flag but never stop the checks
/// after them. With `print_info` off nothing is printed.
pub async fn fast_initialization(checks: &FastChecks, console: &mut dyn Console, print_info: bool) -> bool {
    let missing = missing_drivers(&checks.probes, checks.probe_limit).await;
    let mut failed = !missing.is_empty();

    if print_info && failed {
        console.println("Not all drivers are available:");
        for driver in &missing {
            console.println(&format!("     {}", driver));
        }
    }

    for check in &checks.devices {
        if print_info {
            console.print(&check.leader());
        }

        let working = match check.action.run().await {
            OperationOutcome::Success(()) => true,
            OperationOutcome::TimedOut => {
                warn!("{} timed out after {:?}", check.label, check.action.limit());
                false
            }
            OperationOutcome::Failed(err) => {
                warn!("{} failed: {}", check.label, err);
                false
            }
        };

        failed |= !working;
        if print_info {
            console.println(if working { "Working" } else { "Error" });
        }
    }

    if print_info {
        console.println("Initialization complete!");
    }
    !failed
}
