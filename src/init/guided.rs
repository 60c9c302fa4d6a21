//! Guided initialization
//!
//! Walks the operator through every device category with diagnostics and the
//! retry/skip/exit loop. Each category sits behind a press-enter checkpoint
//! where typing `skip` skips it.
//!
//! The driver check runs every probe before any hardware is touched. A missing
//! beam profiler bridge ends the procedure there; other missing drivers are
//! only reported.

use crate::console::Console;
use crate::devices::Driver;
use crate::init::checks::RigChecks;
use crate::init::retry_loop::{run_guided, GuidedOutcome};
use anyhow::Result;
use ior_shared::retry::{gate_skipped, CheckOutcome};
use ior_shared::{run_with_timeout, OperationOutcome};
use tracing::{info, warn};

const BANNER_RULE: usize = 50;
const BANNER_INDENT: usize = 15;
const DRIVER_LINE_WIDTH: usize = 26;

const COMPONENTS: [&str; 4] = [
    "Rotation stage",
    "Beam profiler",
    "Tinkerforge humidity sensor",
    "Tinkerforge temperature sensor",
];

/// Device categories of the guided procedure, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Drivers,
    RotationStage,
    BeamProfiler,
    Tinkerforge,
}

impl Category {
    fn title(&self) -> &'static str {
        match self {
            Category::Drivers => "DRIVER INITIALIZATION",
            Category::RotationStage => "ROTATION STAGE INITIALIZATION",
            Category::BeamProfiler => "BEAM PROFILER INITIALIZATION",
            Category::Tinkerforge => "TINKERFORGE INITIALIZATION",
        }
    }

    fn checkpoint(&self) -> &'static str {
        match self {
            Category::Drivers => "\n\nPress enter to continue on to checking that all drivers are available!",
            Category::RotationStage => "\n\nPress enter to continue on to checking the rotation stage!",
            Category::BeamProfiler => "\n\nPress enter to continue on to checking the beam profiler!",
            Category::Tinkerforge => "\n\nPress enter to continue on to checking the tinkerforge components!",
        }
    }
}

/// How the guided procedure ended
#[derive(Debug, Clone, PartialEq)]
pub enum GuidedReport {
    /// Every category ran or was skipped
    Completed(Vec<(Category, CheckOutcome)>),
    /// The operator typed `exit` (or something unrecognized) in a category
    Aborted(Category),
    /// A required driver is missing
    Halted(Vec<Driver>),
}

/// Categories that talk to hardware, in check order
#[derive(Debug, Clone, Copy)]
enum Hardware {
    RotationStage,
    BeamProfiler,
    Tinkerforge,
}

const HARDWARE: [Hardware; 3] = [Hardware::RotationStage, Hardware::BeamProfiler, Hardware::Tinkerforge];

impl Hardware {
    fn category(self) -> Category {
        match self {
            Hardware::RotationStage => Category::RotationStage,
            Hardware::BeamProfiler => Category::BeamProfiler,
            Hardware::Tinkerforge => Category::Tinkerforge,
        }
    }
}

async fn check_hardware(checks: &RigChecks, hardware: Hardware, console: &mut dyn Console) -> Result<CheckOutcome> {
    let outcome = match hardware {
        Hardware::RotationStage => {
            let action = checks.stage_connect(checks.config().timeouts.guided_stage_connect());
            run_guided(&action, "Attempting to connect to the motion controller...", console)
                .await?
                .check_outcome()
        }
        Hardware::BeamProfiler => {
            let action = checks.beam_profiler();
            let outcome = run_guided(&action, "Attempting to connect to the beam profiler...", console).await?;
            if let GuidedOutcome::Succeeded(measurement) = &outcome {
                info!("Beam profiler measurement: {:?}", measurement);
            }
            outcome.check_outcome()
        }
        Hardware::Tinkerforge => {
            let action = checks.sensors();
            let outcome = run_guided(&action, "Attempting to connect to tinkerforge bricks...", console).await?;
            if let GuidedOutcome::Succeeded(readings) = &outcome {
                console.println(&format!(
                    "     Humidity: {:.1} %RH, temperature: {:.2} °C",
                    readings.humidity, readings.temperature
                ));
            }
            outcome.check_outcome()
        }
    };
    Ok(outcome)
}

fn banner(console: &mut dyn Console, title: &str) {
    let rule = "=".repeat(BANNER_RULE);
    console.println(&rule);
    console.println(&format!("{}{}", " ".repeat(BANNER_INDENT), title));
    console.println(&rule);
}

/// Print the checkpoint, wait for input and open the category's banner.
/// Returns false if the operator skipped the category.
async fn enter_category(console: &mut dyn Console, category: Category) -> Result<bool> {
    console.println(category.checkpoint());
    let input = console.prompt().await?;

    banner(console, category.title());
    if gate_skipped(&input) {
        console.println("Skipped");
        info!("{:?} skipped at checkpoint", category);
        return Ok(false);
    }
    Ok(true)
}

fn introduction(console: &mut dyn Console) {
    banner(console, "COMPONENT INITIALIZATION");
    console.println("Howdy!\n");
    console.println(
        "This procedure makes sure that all of the components for the index of refraction\n\
         measurement are available and ready to be controlled.\n\n\
         It addresses issues with driver installations, hardware connections,\n\
         and whatever else might be wrong.",
    );
    console.println(
        "\nThe program will ask for input whenever there is an issue. Typing \"retry\" will\n\
         run that check again, giving you a chance to fix whatever was brought up. You may\n\
         also type \"skip\" to skip that check, though the component may then not work later on.",
    );
    console.println(&format!(
        "There are {} components that will be checked as a part of this process:",
        COMPONENTS.len()
    ));
    for component in COMPONENTS {
        console.println(&format!("     {}", component));
    }
}

/// Probe every driver, print the results and hints. Returns the missing ones.
async fn check_drivers(checks: &RigChecks, console: &mut dyn Console) -> Vec<Driver> {
    let limit = checks.config().timeouts.driver_probe();
    let mut missing = Vec::new();

    for probe in checks.driver_probes() {
        let driver = probe.driver();
        console.print(&format!("{:.<width$}", format!("     {}", driver), width = DRIVER_LINE_WIDTH));

        let outcome = run_with_timeout(move || probe.probe(), limit).await;
        match outcome {
            OperationOutcome::Success(()) => console.println("Working"),
            OperationOutcome::TimedOut => {
                warn!("{} probe timed out after {:?}", driver, limit);
                console.println("Error");
                missing.push(driver);
            }
            OperationOutcome::Failed(err) => {
                warn!("{}", err);
                console.println("Error");
                missing.push(driver);
            }
        }
    }

    for driver in &missing {
        console.println(&format!("\n{}", checks.install_hint(*driver)));
    }
    missing
}

/// Run the full guided procedure.
///
/// `Err` only comes from console I/O; device problems are part of the report.
pub async fn full_initialization(checks: &RigChecks, console: &mut dyn Console) -> Result<GuidedReport> {
    let mut results = Vec::new();

    introduction(console);

    if enter_category(console, Category::Drivers).await? {
        let missing = check_drivers(checks, console).await;
        if missing.contains(&Driver::BeamProfilerBridge) {
            console.println(
                "\n\nDriver issues must be resolved before continuing on to hardware initialization!\n\n\
                 Please follow the directions above and rerun this program once they have been resolved.",
            );
            return Ok(GuidedReport::Halted(missing));
        }
        results.push((Category::Drivers, CheckOutcome::Succeeded));
    } else {
        results.push((Category::Drivers, CheckOutcome::Skipped));
    }

    for hardware in HARDWARE {
        let category = hardware.category();
        if !enter_category(console, category).await? {
            results.push((category, CheckOutcome::Skipped));
            continue;
        }

        let outcome = check_hardware(checks, hardware, console).await?;
        if outcome == CheckOutcome::Aborted {
            info!("Guided initialization aborted at {:?}", category);
            return Ok(GuidedReport::Aborted(category));
        }
        results.push((category, outcome));
    }

    console.println("Initialization complete!");
    Ok(GuidedReport::Completed(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RigConfig;
    use crate::console::ScriptedConsole;
    use crate::devices::{Fault, SimDevice, SimulatedRig};
    use std::sync::Arc;

    fn checks(rig: &SimulatedRig) -> RigChecks {
        RigChecks::new(Arc::new(rig.clone()), RigConfig::default())
    }

    #[tokio::test]
    async fn test_all_categories_pass() {
        let rig = SimulatedRig::new();
        let mut console = ScriptedConsole::new(["", "", "", ""]);

        let report = full_initialization(&checks(&rig), &mut console).await.expect("guided");

        assert_eq!(
            report,
            GuidedReport::Completed(vec![
                (Category::Drivers, CheckOutcome::Succeeded),
                (Category::RotationStage, CheckOutcome::Succeeded),
                (Category::BeamProfiler, CheckOutcome::Succeeded),
                (Category::Tinkerforge, CheckOutcome::Succeeded),
            ])
        );

        let output = console.output();
        assert!(output.starts_with(&format!("{}\n{}COMPONENT INITIALIZATION\n", "=".repeat(50), " ".repeat(15))));
        assert!(output.contains("     Serial ports.........Working\n"));
        assert!(output.contains("Attempting to connect to the motion controller...connection successful!"));
        assert!(output.ends_with("Initialization complete!\n"));
        assert_eq!(console.prompts(), 4);
    }

    #[tokio::test]
    async fn test_missing_bridge_halts_before_hardware() {
        let rig = SimulatedRig::new().with_missing_driver(Driver::BeamProfilerBridge);
        let mut console = ScriptedConsole::new([""]);

        let report = full_initialization(&checks(&rig), &mut console).await.expect("guided");

        assert_eq!(report, GuidedReport::Halted(vec![Driver::BeamProfilerBridge]));
        assert_eq!(rig.attempts(SimDevice::RotationStage), 0);
        assert_eq!(rig.attempts(SimDevice::HumiditySensor), 0);
        assert_eq!(rig.attempts(SimDevice::TemperatureSensor), 0);
        assert!(console.output().contains("tlbp2-bridge"));
        assert!(!console.output().contains("Initialization complete!"));
    }

    #[tokio::test]
    async fn test_other_missing_drivers_continue() {
        let rig = SimulatedRig::new().with_missing_driver(Driver::SerialPorts);
        let mut console = ScriptedConsole::new(["", "skip", "skip", "skip"]);

        let report = full_initialization(&checks(&rig), &mut console).await.expect("guided");

        assert!(matches!(report, GuidedReport::Completed(_)));
        // Every probe ran before the hint was printed
        let output = console.output();
        let last_probe = output.find("     Beam profiler bridge").expect("bridge probe");
        let hint = output.find("could not list its serial ports").expect("hint");
        assert!(last_probe < hint);
    }

    #[tokio::test]
    async fn test_exit_aborts_procedure() {
        let rig = SimulatedRig::new().with_fault(SimDevice::RotationStage, Fault::Fail);
        let mut console = ScriptedConsole::new(["", "", "exit"]);

        let report = full_initialization(&checks(&rig), &mut console).await.expect("guided");

        assert_eq!(report, GuidedReport::Aborted(Category::RotationStage));
        assert_eq!(rig.attempts(SimDevice::RotationStage), 1);
        assert_eq!(rig.attempts(SimDevice::BeamProfiler), 0);
        assert!(console.output().contains("in slot 1"));
    }

    #[tokio::test]
    async fn test_retry_until_fixed_then_skip_rest() {
        let rig = SimulatedRig::new().with_fault(SimDevice::BeamProfiler, Fault::FailFirst(2));
        // drivers, stage skipped, beam profiler: retry twice, tinkerforge skipped
        let mut console = ScriptedConsole::new(["skip", "skip", "", "retry", "retry", "skip"]);

        let report = full_initialization(&checks(&rig), &mut console).await.expect("guided");

        assert_eq!(
            report,
            GuidedReport::Completed(vec![
                (Category::Drivers, CheckOutcome::Skipped),
                (Category::RotationStage, CheckOutcome::Skipped),
                (Category::BeamProfiler, CheckOutcome::Succeeded),
                (Category::Tinkerforge, CheckOutcome::Skipped),
            ])
        );
        assert_eq!(rig.attempts(SimDevice::BeamProfiler), 3);
        assert_eq!(rig.attempts(SimDevice::RotationStage), 0);
    }

    #[test]
    fn test_hardware_order_matches_categories() {
        let categories: Vec<Category> = HARDWARE.iter().map(|h| h.category()).collect();
        assert_eq!(
            categories,
            vec![Category::RotationStage, Category::BeamProfiler, Category::Tinkerforge]
        );
    }

    #[tokio::test]
    async fn test_sensor_failure_skipped() {
        let rig = SimulatedRig::new().with_fault(SimDevice::HumiditySensor, Fault::Fail);
        let mut console = ScriptedConsole::new(["", "", "", "", "skip"]);

        let report = full_initialization(&checks(&rig), &mut console).await.expect("guided");

        match report {
            GuidedReport::Completed(results) => {
                assert_eq!(results.last(), Some(&(Category::Tinkerforge, CheckOutcome::Skipped)));
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert!(console.output().contains("Humidity: keg"));
    }
}
