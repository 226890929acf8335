//! Action executor
//!
//! Performs a device action after resolving its precondition through
//! the wait engine, retrying classified transient failures with
//! backoff. Timeouts are a distinct failure mode: a precondition that
//! never became true is not retried, whatever the retry policy says.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::backend::{ActionRequest, DeviceKey, SwipeDirection};
use crate::condition::Condition;
use crate::error::ErrorKind;
use crate::locator::Locator;
use crate::retry::RetryPolicy;
use crate::session::SessionHandle;
use crate::wait::{self, CancelToken, DeadlineBehavior, WaitPolicy};

/// Device action, described independently of its target element.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tap,
    DoubleTap,
    LongPress {
        duration: Duration,
    },
    /// Type into the target; clears existing content first unless
    /// appending.
    TypeText {
        text: String,
        clear_first: bool,
    },
    /// Swipe on the target scrollable container.
    Swipe {
        direction: SwipeDirection,
        duration: Option<Duration>,
    },
    /// Device-scoped key press; no element precondition.
    PressKey {
        key: DeviceKey,
    },
}

impl Action {
    /// Condition that must hold before this action is safe to perform.
    fn required_condition(&self, target: &Locator) -> Option<Condition> {
        match self {
            Action::Tap | Action::DoubleTap | Action::LongPress { .. } => {
                Some(Condition::clickable(target.clone()))
            }
            // Typing needs the field present and accepting input, which
            // is exactly the clickable predicate.
            Action::TypeText { .. } => Some(Condition::clickable(target.clone())),
            Action::Swipe { .. } => Some(Condition::present(target.clone())),
            Action::PressKey { .. } => None,
        }
    }

    fn to_request(&self, target: &Locator) -> ActionRequest {
        match self {
            Action::Tap => ActionRequest::Tap {
                locator: target.clone(),
            },
            Action::DoubleTap => ActionRequest::DoubleTap {
                locator: target.clone(),
            },
            Action::LongPress { duration } => ActionRequest::LongPress {
                locator: target.clone(),
                duration: *duration,
            },
            Action::TypeText { text, clear_first } => ActionRequest::TypeText {
                locator: target.clone(),
                text: text.clone(),
                clear_first: *clear_first,
            },
            Action::Swipe {
                direction,
                duration,
            } => ActionRequest::Swipe {
                container: target.clone(),
                direction: *direction,
                duration: duration.unwrap_or(Duration::from_millis(300)),
            },
            Action::PressKey { key } => ActionRequest::PressKey { key: *key },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    TimedOut,
    Failed,
    Cancelled,
}

/// What one `perform` call produced: the outcome, how many dispatch
/// attempts were made, and the elapsed time across all attempts
/// (precondition waits and backoff sleeps included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionResult {
    pub outcome: ActionOutcome,
    pub attempts_made: u32,
    pub elapsed: Duration,
    pub error: Option<ErrorKind>,
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        self.outcome == ActionOutcome::Success
    }

    fn finished(outcome: ActionOutcome, attempts: u32, start: Instant, error: Option<ErrorKind>) -> Self {
        Self {
            outcome,
            attempts_made: attempts,
            elapsed: start.elapsed(),
            error,
        }
    }
}

/// Drives actions through precondition waits and classified retries.
/// Stateless apart from the cancellation token; one executor can serve
/// any number of sequential calls.
#[derive(Debug, Clone, Default)]
pub struct ActionExecutor {
    cancel: CancelToken,
}

impl ActionExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor whose calls abort with CANCELLED once `cancel` fires.
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Perform `action` on `target`.
    ///
    /// Per attempt: wait for the action's precondition under
    /// `wait_policy`, then dispatch. A precondition that never holds
    /// ends the call with TIMED_OUT before anything is dispatched
    /// (under `DeadlineBehavior::ReturnLast` the dispatch proceeds on
    /// the last observed state instead). Dispatch errors whose kind is
    /// retryable under `retry_policy` trigger a backoff sleep and a
    /// fresh attempt, precondition included, since device state may
    /// have moved between attempts.
    pub async fn perform(
        &self,
        action: &Action,
        target: &Locator,
        session: &SessionHandle,
        wait_policy: &WaitPolicy,
        retry_policy: &RetryPolicy,
    ) -> ActionResult {
        let start = Instant::now();
        let request = action.to_request(target);
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return ActionResult::finished(
                    ActionOutcome::Cancelled,
                    attempts,
                    start,
                    Some(ErrorKind::Cancelled),
                );
            }

            if let Some(condition) = action.required_condition(target) {
                match wait::wait_for(&condition, session, wait_policy, &self.cancel).await {
                    Ok(outcome) if outcome.met => {}
                    Ok(outcome) => {
                        if wait_policy.deadline_behavior == DeadlineBehavior::ReturnLast {
                            warn!(
                                "precondition unmet after {} polls, proceeding on last state: {}",
                                outcome.attempts, condition
                            );
                        } else {
                            return ActionResult::finished(
                                ActionOutcome::TimedOut,
                                attempts,
                                start,
                                Some(ErrorKind::TimedOut),
                            );
                        }
                    }
                    Err(err) if err.kind() == ErrorKind::Cancelled => {
                        return ActionResult::finished(
                            ActionOutcome::Cancelled,
                            attempts,
                            start,
                            Some(ErrorKind::Cancelled),
                        );
                    }
                    Err(err) => {
                        return ActionResult::finished(
                            ActionOutcome::Failed,
                            attempts,
                            start,
                            Some(err.kind()),
                        );
                    }
                }
            }

            attempts += 1;
            match session.execute(&request).await {
                Ok(()) => {
                    debug!("{:?} on {} succeeded (attempt {})", action, target, attempts);
                    return ActionResult::finished(ActionOutcome::Success, attempts, start, None);
                }
                Err(err) => {
                    let kind = err.kind();
                    if retry_policy.is_retryable(kind) && attempts < retry_policy.max_attempts() {
                        let delay = retry_policy.delay_after(attempts);
                        warn!(
                            "{:?} on {} failed (attempt {}/{}): {}; retrying in {:?}",
                            action,
                            target,
                            attempts,
                            retry_policy.max_attempts(),
                            err,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return ActionResult::finished(
                        ActionOutcome::Failed,
                        attempts,
                        start,
                        Some(kind),
                    );
                }
            }
        }
    }
}
