//! Guided Retry State Machine
//!
//! Turns a single device action into a user-supervised check with three exits:
//!
//! ```text
//!   Start --Succeeded--> Done(Succeeded)
//!   Start --TimedOut/Failed--> AwaitingUserChoice
//!   AwaitingUserChoice --retry--> Start
//!   AwaitingUserChoice --skip---> Done(Skipped)
//!   AwaitingUserChoice --exit/other--> Done(Aborted)
//! ```
//!
//! There is no backoff and no retry limit; the loop only ends when the action
//! succeeds or the user skips or exits.

/// Prompt token that re-runs the action
pub const RETRY_TOKEN: &str = "retry";
/// Prompt token that skips the action (or a whole gated category)
pub const SKIP_TOKEN: &str = "skip";
/// Prompt token that exits the procedure
pub const EXIT_TOKEN: &str = "exit";

/// What the user chose after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Skip,
    Abort,
}

impl RetryDecision {
    /// Parse user input. Tokens are matched verbatim (case-sensitive);
    /// anything unrecognized aborts.
    pub fn from_input(input: &str) -> Self {
        match input {
            RETRY_TOKEN => Self::Retry,
            SKIP_TOKEN => Self::Skip,
            _ => Self::Abort,
        }
    }
}

/// Whether input at a press-enter checkpoint skips the gated category.
/// Only the exact `skip` token does; blank or anything else continues.
pub fn gate_skipped(input: &str) -> bool {
    input == SKIP_TOKEN
}

/// Terminal result of a guided check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Succeeded,
    Skipped,
    Aborted,
}

/// States of the guided loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// About to run the action
    Start,
    /// Last attempt failed; waiting for retry/skip/exit
    AwaitingUserChoice,
    /// Loop finished
    Done(CheckOutcome),
}

/// Events that drive the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    /// The attempt returned a value
    Succeeded,
    /// The attempt exceeded its deadline
    TimedOut,
    /// The attempt raised or returned a bad status
    Failed,
    /// The user answered the retry prompt
    Decision(RetryDecision),
}

/// Result of a transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid
    Success(RetryState),
    /// Event is not valid in the current state
    Invalid { from: RetryState, event: RetryEvent },
}

/// State machine for one guided check
#[derive(Debug)]
pub struct GuidedRetry {
    state: RetryState,
    attempts: u32,
}

impl Default for GuidedRetry {
    fn default() -> Self {
        Self::new()
    }
}

impl GuidedRetry {
    /// Create a new loop in the `Start` state
    pub fn new() -> Self {
        Self {
            state: RetryState::Start,
            attempts: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Number of attempts whose outcome has been recorded
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Number of times the user chose to retry
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Terminal outcome, if the loop has finished
    pub fn outcome(&self) -> Option<CheckOutcome> {
        match self.state {
            RetryState::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: RetryEvent) -> TransitionResult {
        match self.next_state(event) {
            Some(state) => {
                if self.state == RetryState::Start {
                    self.attempts += 1;
                }
                self.state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.state,
                event,
            },
        }
    }

    fn next_state(&self, event: RetryEvent) -> Option<RetryState> {
        use RetryEvent::*;
        use RetryState::*;

        match (self.state, event) {
            (Start, Succeeded) => Some(Done(CheckOutcome::Succeeded)),
            (Start, TimedOut | Failed) => Some(AwaitingUserChoice),

            (AwaitingUserChoice, Decision(RetryDecision::Retry)) => Some(Start),
            (AwaitingUserChoice, Decision(RetryDecision::Skip)) => Some(Done(CheckOutcome::Skipped)),
            (AwaitingUserChoice, Decision(RetryDecision::Abort)) => Some(Done(CheckOutcome::Aborted)),

            _ => None,
        }
    }
}
