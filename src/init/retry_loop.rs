//! Interactive retry loop around one device action

use crate::console::Console;
use anyhow::{anyhow, Result};
use ior_shared::retry::{CheckOutcome, GuidedRetry, RetryDecision, RetryEvent, RetryState, TransitionResult};
use ior_shared::{DeviceAction, OperationOutcome};
use tracing::{info, warn};

pub const RETRY_INSTRUCTIONS: &str = "\nOnce you have gone through these steps, you may type 'retry' to attempt connection again, 'skip' to skip to the next\npart, or 'exit' to exit the initialization procedure (possibly to edit the configuration).";

/// How a guided check ended
#[derive(Debug, Clone, PartialEq)]
pub enum GuidedOutcome<T> {
    Succeeded(T),
    Skipped,
    Aborted,
}

impl<T> GuidedOutcome<T> {
    pub fn check_outcome(&self) -> CheckOutcome {
        match self {
            GuidedOutcome::Succeeded(_) => CheckOutcome::Succeeded,
            GuidedOutcome::Skipped => CheckOutcome::Skipped,
            GuidedOutcome::Aborted => CheckOutcome::Aborted,
        }
    }
}

/// Run `action` until it succeeds or the user skips or exits.
///
/// Each attempt prints `announce`, then "connection successful!" or
/// "connection failed!" followed by the cause, the action's diagnostic and the
/// retry prompt.
pub async fn run_guided<T: Send + 'static>(
    action: &DeviceAction<T>,
    announce: &str,
    console: &mut dyn Console,
) -> Result<GuidedOutcome<T>> {
    let mut fsm = GuidedRetry::new();
    let mut value = None;

    loop {
        let transition = match fsm.state() {
            RetryState::Start => {
                console.print(announce);

                let event = match action.run().await {
                    OperationOutcome::Success(v) => {
                        console.println("connection successful!");
                        value = Some(v);
                        RetryEvent::Succeeded
                    }
                    OperationOutcome::TimedOut => {
                        console.println("connection failed!");
                        console.println(&format!("     (no response within {:?})", action.limit()));
                        RetryEvent::TimedOut
                    }
                    OperationOutcome::Failed(err) => {
                        console.println("connection failed!");
                        console.println(&format!("     ({})", err));
                        RetryEvent::Failed
                    }
                };

                if event != RetryEvent::Succeeded {
                    warn!("{} check failed on attempt {}", action.name(), fsm.attempts() + 1);
                }
                fsm.process_event(event)
            }
            RetryState::AwaitingUserChoice => {
                console.println("");
                console.println(action.diagnostic());
                console.println(RETRY_INSTRUCTIONS);

                let input = console.prompt().await?;
                fsm.process_event(RetryEvent::Decision(RetryDecision::from_input(&input)))
            }
            RetryState::Done(outcome) => {
                info!("{} check finished: {:?} after {} attempt(s)", action.name(), outcome, fsm.attempts());
                return match outcome {
                    CheckOutcome::Succeeded => value
                        .take()
                        .map(GuidedOutcome::Succeeded)
                        .ok_or_else(|| anyhow!("{} succeeded without a result", action.name())),
                    CheckOutcome::Skipped => Ok(GuidedOutcome::Skipped),
                    CheckOutcome::Aborted => Ok(GuidedOutcome::Aborted),
                };
            }
        };

        if let TransitionResult::Invalid { from, event } = transition {
            return Err(anyhow!("Invalid retry transition from {:?} on {:?}", from, event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ScriptedConsole;
    use ior_shared::RigError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn always_failing(attempts: Arc<AtomicU32>) -> DeviceAction<()> {
        DeviceAction::new("Rotation stage", Duration::from_millis(100), "Check the cable", move || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(RigError::status("Rotation stage", 1))
            }
        })
    }

    #[tokio::test]
    async fn test_retry_retry_skip() {
        let attempts = Arc::new(AtomicU32::new(0));
        let action = always_failing(attempts.clone());
        let mut console = ScriptedConsole::new(["retry", "retry", "skip"]);

        let outcome = run_guided(&action, "Attempting...", &mut console).await.expect("loop");

        assert_eq!(outcome, GuidedOutcome::Skipped);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(console.prompts(), 3);
        assert_eq!(console.output().matches("Check the cable").count(), 3);
    }

    #[tokio::test]
    async fn test_exit_on_first_failure() {
        let attempts = Arc::new(AtomicU32::new(0));
        let action = always_failing(attempts.clone());
        let mut console = ScriptedConsole::new(["exit", "retry"]);

        let outcome = run_guided(&action, "Attempting...", &mut console).await.expect("loop");

        assert_eq!(outcome, GuidedOutcome::Aborted);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(console.remaining(), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_input_aborts() {
        let action = always_failing(Arc::new(AtomicU32::new(0)));
        let mut console = ScriptedConsole::new(["RETRY"]);

        let outcome = run_guided(&action, "Attempting...", &mut console).await.expect("loop");
        assert_eq!(outcome, GuidedOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_timeout_then_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let action = DeviceAction::new("Beam profiler", Duration::from_millis(50), "Plug it in", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok(7)
            }
        });
        let mut console = ScriptedConsole::new(["retry"]);

        let outcome = run_guided(&action, "Attempting to connect...", &mut console)
            .await
            .expect("loop");

        assert_eq!(outcome, GuidedOutcome::Succeeded(7));
        let output = console.output();
        assert!(output.contains("Attempting to connect...connection failed!\n     (no response within 50ms)"));
        assert!(output.ends_with("Attempting to connect...connection successful!\n"));
    }
}
