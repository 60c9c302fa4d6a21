//! Direct device operations for the command line
//!
//! Each operation opens its own connection, runs under the configured
//! deadline and closes the connection again.

use crate::config::RigConfig;
use crate::devices::{DeviceProvider, MotionController, StatusCode};
use crate::init::checks::into_rig_error;
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use ior_shared::{run_future_with_timeout, RigError};
use std::sync::Arc;
use tracing::{info, warn};

const STAGE: &str = "Rotation stage";
const STEPPER: &str = "Stepper";

/// Motion controller operations
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum StageOp {
    /// Print the current stage angle
    Angle,
    /// Move by a relative angle in degrees
    MoveRel {
        #[arg(allow_hyphen_values = true)]
        delta: f64,
        /// Return as soon as the move has been issued
        #[arg(long)]
        no_wait: bool,
    },
    /// Move to an absolute angle in degrees
    MoveAbs {
        #[arg(allow_hyphen_values = true)]
        theta: f64,
        #[arg(long)]
        no_wait: bool,
    },
    /// Show the move velocity, or set it when a value is given (degrees/second)
    Velocity { value: Option<f64> },
    /// Stop any motion in progress
    Stop,
    /// Return to the home position
    Home,
}

fn check_status(action: &str, status: StatusCode) -> Result<()> {
    if status != 0 {
        bail!(RigError::device(STAGE, format!("{} returned status {}", action, status)));
    }
    Ok(())
}

async fn apply(stage: &mut dyn MotionController, op: &StageOp) -> Result<String> {
    match *op {
        StageOp::Angle => {
            let (status, angle) = stage.get_angle().await?;
            check_status("angle query", status)?;
            Ok(format!("{:.3}", angle))
        }
        StageOp::MoveRel { delta, no_wait } => {
            check_status("relative move", stage.move_relative(delta, !no_wait).await?)?;
            Ok(format!("Moved by {:.3}", delta))
        }
        StageOp::MoveAbs { theta, no_wait } => {
            check_status("absolute move", stage.move_absolute(theta, !no_wait).await?)?;
            Ok(format!("Moved to {:.3}", theta))
        }
        StageOp::Velocity { value: Some(velocity) } => {
            check_status("set velocity", stage.set_velocity(velocity).await?)?;
            Ok(format!("Velocity set to {:.3}", velocity))
        }
        StageOp::Velocity { value: None } => match stage.get_velocity().await? {
            Some(velocity) => Ok(format!("{:.3}", velocity)),
            None => bail!(RigError::device(STAGE, "controller reported an error reading the velocity")),
        },
        StageOp::Stop => {
            check_status("stop", stage.stop().await?)?;
            Ok("Stopped".to_string())
        }
        StageOp::Home => {
            check_status("home", stage.reset_to_home().await?)?;
            stage.wait_for_motion().await?;
            Ok("Home".to_string())
        }
    }
}

/// Run one stage operation and return the line to print
pub async fn run_stage_op(provider: Arc<dyn DeviceProvider>, config: &RigConfig, op: StageOp) -> Result<String> {
    let limit = config.timeouts.motion_command();
    info!("Stage operation {:?} (limit {:?})", op, limit);

    let outcome = run_future_with_timeout(
        async move {
            let mut stage = provider.motion_controller();
            let status = stage.connect().await.map_err(|e| into_rig_error(STAGE, e))?;
            if status != 0 {
                return Err(RigError::status(STAGE, status));
            }

            let result = apply(stage.as_mut(), &op).await;
            if let Err(e) = stage.disconnect().await {
                warn!("Failed to disconnect from motion controller: {:#}", e);
            }
            result.map_err(|e| into_rig_error(STAGE, e))
        },
        limit,
    )
    .await;

    outcome.into_result(limit).context("Stage operation failed")
}

/// Home the stepper against its limit switch
pub async fn home_stepper(provider: Arc<dyn DeviceProvider>, config: &RigConfig) -> Result<()> {
    let limit = config.timeouts.homing();
    let mut stepper = provider.stepped_actuator()?;

    info!("Homing stepper (limit {:?})", limit);
    let outcome = run_future_with_timeout(
        async move { stepper.reset_position().await.map_err(|e| into_rig_error(STEPPER, e)) },
        limit,
    )
    .await;

    outcome.into_result(limit).context("Stepper homing failed")
}
