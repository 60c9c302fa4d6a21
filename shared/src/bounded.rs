//! Bounded device operations
//!
//! Runs a device operation under a hard wall-clock deadline. The operation is
//! started on its own OS thread (futures get a private runtime on that thread)
//! so a vendor call that never returns cannot hold the caller past the deadline.
//!
//! A timed-out worker is detached, not killed: it may keep running in the
//! background and its result is discarded. Callers must tolerate that leak.

use crate::RigError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::runtime;
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Result of running an operation under a deadline
#[derive(Debug)]
pub enum OperationOutcome<T> {
    /// Operation finished in time with a value
    Success(T),
    /// Deadline elapsed first (or was zero)
    TimedOut,
    /// Operation finished in time with an error
    Failed(RigError),
}

impl<T> OperationOutcome<T> {
    /// Check if the operation succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into a `Result`, turning `TimedOut` into [`RigError::Timeout`]
    pub fn into_result(self, limit: Duration) -> Result<T, RigError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::TimedOut => Err(RigError::Timeout(limit)),
            Self::Failed(err) => Err(err),
        }
    }

    /// Map the success value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationOutcome<U> {
        match self {
            Self::Success(value) => OperationOutcome::Success(f(value)),
            Self::TimedOut => OperationOutcome::TimedOut,
            Self::Failed(err) => OperationOutcome::Failed(err),
        }
    }
}

/// Run a blocking operation on a dedicated thread, waiting at most `limit`.
///
/// A zero `limit` returns `TimedOut` without starting `op`.
pub async fn run_with_timeout<T, F>(op: F, limit: Duration) -> OperationOutcome<T>
where
    F: FnOnce() -> Result<T, RigError> + Send + 'static,
    T: Send + 'static,
{
    if limit.is_zero() {
        return OperationOutcome::TimedOut;
    }

    let (result_tx, result_rx) = oneshot::channel();

    let spawned = thread::Builder::new()
        .name("bounded-op".into())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(op))
                .unwrap_or_else(|payload| Err(RigError::device("worker", panic_message(payload))));

            // The receiver is gone once the deadline has passed
            let _ = result_tx.send(result);
        });

    if let Err(e) = spawned {
        return OperationOutcome::Failed(RigError::device(
            "executor",
            format!("failed to spawn worker thread: {}", e),
        ));
    }

    match timeout(limit, result_rx).await {
        Ok(Ok(Ok(value))) => OperationOutcome::Success(value),
        Ok(Ok(Err(err))) => OperationOutcome::Failed(err),
        Ok(Err(_)) => OperationOutcome::Failed(RigError::device(
            "worker",
            "worker exited without reporting a result",
        )),
        Err(_) => OperationOutcome::TimedOut,
    }
}

/// Run a device future on a dedicated thread with its own single-threaded
/// runtime, waiting at most `limit`.
///
/// Device futures may block without yielding (a serial open, a vendor call),
/// so they never share the caller's runtime workers. On timeout the thread is
/// detached together with its runtime. A zero `limit` returns `TimedOut`
/// without ever polling `future`.
pub async fn run_future_with_timeout<T, Fut>(future: Fut, limit: Duration) -> OperationOutcome<T>
where
    Fut: Future<Output = Result<T, RigError>> + Send + 'static,
    T: Send + 'static,
{
    run_with_timeout(
        move || {
            let runtime = runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| RigError::device("executor", format!("failed to build worker runtime: {}", e)))?;
            runtime.block_on(future)
        },
        limit,
    )
    .await
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", s)
    } else {
        "worker panicked".to_string()
    }
}

type ActionFn<T> = dyn Fn() -> BoxFuture<'static, Result<T, RigError>> + Send + Sync;

/// One unit of device work: an operation, its deadline and the steps to take
/// when it fails.
///
/// The operation is a factory so that every run starts from scratch.
pub struct DeviceAction<T> {
    name: String,
    limit: Duration,
    diagnostic: String,
    op: Arc<ActionFn<T>>,
}

impl<T: Send + 'static> DeviceAction<T> {
    /// Create a new device action
    pub fn new<F, Fut>(
        name: impl Into<String>,
        limit: Duration,
        diagnostic: impl Into<String>,
        op: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RigError>> + Send + 'static,
    {
        let op: Arc<ActionFn<T>> = Arc::new(move || op().boxed());

        Self {
            name: name.into(),
            limit,
            diagnostic: diagnostic.into(),
            op,
        }
    }

    /// Run the operation once under the action's deadline
    pub async fn run(&self) -> OperationOutcome<T> {
        run_future_with_timeout((self.op)(), self.limit).await
    }

    /// The same action with its success value transformed
    pub fn map<U, F>(self, f: F) -> DeviceAction<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let op = self.op;
        let f = Arc::new(f);
        let mapped: Arc<ActionFn<U>> = Arc::new(move || {
            let f = Arc::clone(&f);
            op().map(move |result| result.map(|value| f(value))).boxed()
        });

        DeviceAction {
            name: self.name,
            limit: self.limit,
            diagnostic: self.diagnostic,
            op: mapped,
        }
    }
}

impl<T> DeviceAction<T> {
    /// Human-readable name of the action
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deadline for a single run
    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Steps to resolve a failure
    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }
}

impl<T> Clone for DeviceAction<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            limit: self.limit,
            diagnostic: self.diagnostic.clone(),
            op: Arc::clone(&self.op),
        }
    }
}

impl<T> fmt::Debug for DeviceAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAction")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn test_blocking_op_times_out_before_it_finishes() {
        let limit = Duration::from_millis(200);
        let start = Instant::now();

        let outcome = run_with_timeout(
            move || {
                thread::sleep(limit * 2);
                Ok(())
            },
            limit,
        )
        .await;

        assert!(matches!(outcome, OperationOutcome::TimedOut));
        assert!(start.elapsed() < limit + Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_blocking_op_success_preserves_value() {
        let limit = Duration::from_millis(400);

        let outcome = run_with_timeout(
            move || {
                thread::sleep(limit / 2);
                Ok(vec![1.5_f64, -2.0, 3.25])
            },
            limit,
        )
        .await;

        match outcome {
            OperationOutcome::Success(values) => assert_eq!(values, vec![1.5, -2.0, 3.25]),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_limit_never_starts_op() {
        let started = Arc::new(AtomicBool::new(false));
        let flag = started.clone();

        let outcome = run_with_timeout(
            move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            Duration::ZERO,
        )
        .await;

        assert!(matches!(outcome, OperationOutcome::TimedOut));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_preserves_cause() {
        let outcome: OperationOutcome<()> = run_with_timeout(
            || Err(RigError::status("Rotation stage", 7)),
            Duration::from_secs(1),
        )
        .await;

        match outcome {
            OperationOutcome::Failed(err) => assert_eq!(err, RigError::status("Rotation stage", 7)),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panic_reported_as_failure() {
        let outcome: OperationOutcome<()> =
            run_with_timeout(|| panic!("vendor library crashed"), Duration::from_secs(1)).await;

        match outcome {
            OperationOutcome::Failed(RigError::Device { message, .. }) => {
                assert!(message.contains("vendor library crashed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timed_out_worker_is_detached_not_killed() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let outcome = run_with_timeout(
            move || {
                thread::sleep(Duration::from_millis(100));
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_millis(20),
        )
        .await;

        assert!(matches!(outcome, OperationOutcome::TimedOut));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_future_times_out() {
        let limit = Duration::from_millis(100);
        let start = Instant::now();

        let outcome = run_future_with_timeout(
            async move {
                tokio::time::sleep(limit * 2).await;
                Ok(42)
            },
            limit,
        )
        .await;

        assert!(matches!(outcome, OperationOutcome::TimedOut));
        assert!(start.elapsed() < limit * 2);
    }

    #[tokio::test]
    async fn test_future_success_and_zero_limit() {
        let outcome = run_future_with_timeout(async { Ok("ok") }, Duration::from_millis(100)).await;
        assert!(matches!(outcome, OperationOutcome::Success("ok")));

        let polled = Arc::new(AtomicBool::new(false));
        let flag = polled.clone();
        let outcome = run_future_with_timeout(
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            Duration::ZERO,
        )
        .await;

        assert!(matches!(outcome, OperationOutcome::TimedOut));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!polled.load(Ordering::SeqCst));
    }

    fn blocking_action(limit: Duration) -> DeviceAction<()> {
        DeviceAction::new("Rotation stage", limit, "Check the serial cable", || async {
            // A vendor call that never yields to the runtime
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_blocking_action_times_out_on_current_thread_runtime() {
        let limit = Duration::from_millis(100);
        let start = Instant::now();

        let outcome = blocking_action(limit).run().await;

        assert!(matches!(outcome, OperationOutcome::TimedOut));
        assert!(start.elapsed() < limit * 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_blocking_action_times_out_with_one_worker() {
        let limit = Duration::from_millis(100);
        let start = Instant::now();

        let outcome = blocking_action(limit).run().await;

        assert!(matches!(outcome, OperationOutcome::TimedOut));
        assert!(start.elapsed() < limit * 2);
    }

    #[tokio::test]
    async fn test_future_panic_reported_as_failure() {
        let crashed = true;
        let outcome: OperationOutcome<()> = run_future_with_timeout(
            async move {
                if crashed {
                    panic!("bridge crashed");
                }
                Ok(())
            },
            Duration::from_secs(1),
        )
        .await;

        match outcome {
            OperationOutcome::Failed(RigError::Device { message, .. }) => {
                assert!(message.contains("bridge crashed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_future_runs_timers_on_worker_runtime() {
        let outcome = run_future_with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(5)
            },
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(outcome, OperationOutcome::Success(5)));
    }

    #[tokio::test]
    async fn test_device_action_reruns_from_scratch() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let action = DeviceAction::new(
            "Humidity sensor",
            Duration::from_millis(200),
            "Check the bricklet cable",
            move || {
                let counter = counter.clone();
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1) }
            },
        );

        assert!(matches!(action.run().await, OperationOutcome::Success(1)));
        assert!(matches!(action.clone().run().await, OperationOutcome::Success(2)));

        let labelled = action.clone().map(|n| format!("attempt {}", n));
        match labelled.run().await {
            OperationOutcome::Success(label) => assert_eq!(label, "attempt 3"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(action.name(), "Humidity sensor");
        assert_eq!(action.diagnostic(), "Check the bricklet cable");
    }

    #[test]
    fn test_outcome_into_result() {
        let limit = Duration::from_secs(4);
        let timed_out: OperationOutcome<()> = OperationOutcome::TimedOut;
        assert_eq!(timed_out.into_result(limit), Err(RigError::Timeout(limit)));
        assert_eq!(OperationOutcome::Success(3).map(|v| v * 2).into_result(limit), Ok(6));
    }
}
