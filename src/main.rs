//! Index-of-refraction rig initialization
//!
//! Without a subcommand the guided initialization runs interactively. The
//! `fast` subcommand runs the non-interactive check; `stage` and
//! `home-stepper` drive the hardware directly.

mod beam;
mod config;
mod console;
mod devices;
mod init;
mod motion;
mod ops;
mod tinkerforge;
mod transport;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::RigConfig;
use console::{Console, StdConsole};
use devices::{DeviceProvider, HardwareRig, SimulatedRig};
use init::{fast_initialization, full_initialization, rig_fast_checks, GuidedReport, RigChecks};
use ops::StageOp;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ior-rig")]
#[command(about = "Hardware checks for the index-of-refraction measurement rig", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ior-rig.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use simulated devices instead of the hardware
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every device once without prompting
    Fast {
        /// Print nothing
        #[arg(long)]
        quiet: bool,
    },

    /// Operate the rotation stage
    Stage {
        #[command(subcommand)]
        op: StageOp,
    },

    /// Home the linear stepper against its limit switch
    HomeStepper,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Console output belongs to the procedures; logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = RigConfig::load(cli.config.as_deref())?;
    debug!("Configuration: {:?}", config);

    let provider: Arc<dyn DeviceProvider> = if cli.simulate {
        info!("Using simulated devices");
        Arc::new(SimulatedRig::new())
    } else {
        Arc::new(HardwareRig::new(config.clone()))
    };

    let mut console = StdConsole::new();

    match cli.command {
        None => {
            let checks = RigChecks::new(provider, config);
            match full_initialization(&checks, &mut console).await? {
                GuidedReport::Completed(results) => info!("Guided initialization finished: {:?}", results),
                GuidedReport::Aborted(category) => info!("Guided initialization exited at {:?}", category),
                GuidedReport::Halted(missing) => warn!("Guided initialization halted, missing drivers: {:?}", missing),
            }
        }
        Some(Commands::Fast { quiet }) => {
            let checks = RigChecks::new(provider, config);
            let all_working = fast_initialization(&rig_fast_checks(&checks), &mut console, !quiet).await;
            info!("Fast initialization: all devices working = {}", all_working);
        }
        Some(Commands::Stage { op }) => {
            let line = ops::run_stage_op(provider, &config, op).await?;
            console.println(&line);
        }
        Some(Commands::HomeStepper) => {
            ops::home_stepper(provider, &config).await?;
            console.println("Stepper homed");
        }
    }

    Ok(())
}
