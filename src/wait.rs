//! Wait engine
//!
//! Polls a [`Condition`] against a deadline. Transient server errors
//! count as a non-matching poll; fatal errors abort immediately. The
//! poll sleep is clamped to the remaining budget so a wait never
//! overshoots its timeout by more than one evaluator call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::condition::Condition;
use crate::error::{DriverError, ErrorKind, Result};
use crate::session::SessionHandle;

/// Caller-supplied cancellation signal, checked before every poll and
/// every action attempt. Cloning shares the signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What the wait engine reports when the deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadlineBehavior {
    /// Treat an unmet condition as a timeout failure (default).
    #[default]
    Fail,
    /// Report the last observation; the caller proceeds on stale state.
    ReturnLast,
}

/// Polling deadline configuration, supplied per call or defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub deadline_behavior: DeadlineBehavior,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            deadline_behavior: DeadlineBehavior::Fail,
        }
    }
}

impl WaitPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            deadline_behavior: DeadlineBehavior::Fail,
        }
    }

    pub fn with_deadline_behavior(mut self, behavior: DeadlineBehavior) -> Self {
        self.deadline_behavior = behavior;
        self
    }

    /// Zero-timeout policy: evaluate exactly once.
    pub fn check_once() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

/// Result of one wait: whether the condition was observed true, how
/// many polls ran, and how long the wait took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    pub met: bool,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Kind of the last transient error swallowed during polling, if
    /// the final poll before the deadline was an error rather than a
    /// clean negative.
    pub last_error: Option<ErrorKind>,
}

/// Poll `condition` until it holds or `policy.timeout` elapses.
///
/// At least one evaluation always runs, even with a zero timeout.
/// Returns `Err` only for cancellation and fatal (non-transient)
/// evaluator errors; an unmet deadline is a normal `met = false`
/// outcome, left to the caller's deadline behavior.
pub async fn wait_for(
    condition: &Condition,
    session: &SessionHandle,
    policy: &WaitPolicy,
    cancel: &CancelToken,
) -> Result<WaitOutcome> {
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        if cancel.is_cancelled() {
            debug!("wait cancelled after {} polls: {}", attempts, condition);
            return Err(DriverError::Cancelled);
        }

        attempts += 1;
        match condition.evaluate(session).await {
            Ok(true) => {
                trace!("condition met on poll {}: {}", attempts, condition);
                return Ok(WaitOutcome {
                    met: true,
                    attempts,
                    elapsed: start.elapsed(),
                    last_error: None,
                });
            }
            Ok(false) => {
                last_error = None;
            }
            Err(err) if err.is_transient() => {
                trace!("transient error on poll {}: {}", attempts, err);
                last_error = Some(err.kind());
            }
            Err(err) => return Err(err),
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(
                "condition not met within {:?} ({} polls): {}",
                policy.timeout, attempts, condition
            );
            return Ok(WaitOutcome {
                met: false,
                attempts,
                elapsed: start.elapsed(),
                last_error,
            });
        }

        // Never sleep past the deadline; the final poll lands on it.
        let sleep_for = policy.poll_interval.min(deadline - now);
        tokio::time::sleep(sleep_for).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::fake::FakeBackend;
    use crate::locator::Locator;
    use crate::session::{Capabilities, SessionHandle, SessionManager};

    async fn session_for(backend: Arc<FakeBackend>) -> (SessionManager, SessionHandle) {
        let manager = SessionManager::new(backend, Capabilities::new());
        let handle = manager.start().await.unwrap();
        (manager, handle)
    }

    fn clickable_login() -> Condition {
        Condition::clickable(Locator::id("login_button").unwrap())
    }

    #[tokio::test]
    async fn test_returns_immediately_when_met() {
        let backend = Arc::new(FakeBackend::with_element(FakeBackend::clickable()));
        let (_manager, handle) = session_for(backend).await;

        let policy = WaitPolicy::new(Duration::from_secs(5), Duration::from_millis(200));
        let outcome = wait_for(&clickable_login(), &handle, &policy, &CancelToken::new())
            .await
            .unwrap();

        assert!(outcome.met);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.elapsed < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_never_overshoots_deadline() {
        let backend = Arc::new(FakeBackend::new());
        let (_manager, handle) = session_for(backend).await;

        let policy = WaitPolicy::new(Duration::from_millis(300), Duration::from_millis(50));
        let start = Instant::now();
        let outcome = wait_for(&clickable_login(), &handle, &policy, &CancelToken::new())
            .await
            .unwrap();

        assert!(!outcome.met);
        assert!(outcome.elapsed >= Duration::from_millis(300));
        // budget + at most one poll cycle of slack
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_zero_timeout_checks_once() {
        let backend = Arc::new(FakeBackend::new());
        let (_manager, handle) = session_for(backend).await;

        let outcome = wait_for(
            &clickable_login(),
            &handle,
            &WaitPolicy::check_once(),
            &CancelToken::new(),
        )
        .await
        .unwrap();

        assert!(!outcome.met);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_condition_met_after_delay() {
        let backend = Arc::new(FakeBackend::with_element(FakeBackend::clickable()));
        backend.appear_after(Duration::from_millis(150));
        let (_manager, handle) = session_for(backend).await;

        let policy = WaitPolicy::new(Duration::from_secs(2), Duration::from_millis(25));
        let outcome = wait_for(&clickable_login(), &handle, &policy, &CancelToken::new())
            .await
            .unwrap();

        assert!(outcome.met);
        assert!(outcome.attempts > 1);
        assert!(outcome.elapsed >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_transient_errors_count_as_failed_polls() {
        let backend = Arc::new(FakeBackend::with_element(FakeBackend::clickable()));
        backend.fail_queries_transient(2);
        let (_manager, handle) = session_for(backend).await;

        let policy = WaitPolicy::new(Duration::from_secs(2), Duration::from_millis(20));
        let outcome = wait_for(&clickable_login(), &handle, &policy, &CancelToken::new())
            .await
            .unwrap();

        assert!(outcome.met);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_transient_errors_reported_on_exhausted_deadline() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_queries_transient(u32::MAX);
        let (_manager, handle) = session_for(backend).await;

        let policy = WaitPolicy::new(Duration::from_millis(100), Duration::from_millis(20));
        let outcome = wait_for(&clickable_login(), &handle, &policy, &CancelToken::new())
            .await
            .unwrap();

        assert!(!outcome.met);
        assert_eq!(outcome.last_error, Some(ErrorKind::SessionTransient));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_immediately() {
        let backend = Arc::new(FakeBackend::new());
        let (manager, handle) = session_for(backend).await;
        manager.terminate(&handle).await.unwrap();

        let policy = WaitPolicy::new(Duration::from_secs(5), Duration::from_millis(20));
        let start = Instant::now();
        let err = wait_for(&clickable_login(), &handle, &policy, &CancelToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SessionInactive);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_cancellation_cuts_the_wait_short() {
        let backend = Arc::new(FakeBackend::new());
        let (_manager, handle) = session_for(backend).await;

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            trigger.cancel();
        });

        let policy = WaitPolicy::new(Duration::from_secs(10), Duration::from_millis(25));
        let start = Instant::now();
        let err = wait_for(&clickable_login(), &handle, &policy, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        // surfaced within one poll interval of the signal
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
