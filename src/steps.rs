//! Scenario steps
//!
//! High-level test operations composed from the engine's public
//! surface: the action executor, the wait engine and a session handle.
//! Each step resolves its own preconditions, so scenarios read as
//! intent ("tap the login button") without find-then-assume plumbing.

use std::time::Duration;

use log::info;

use crate::backend::{DeviceKey, SwipeDirection};
use crate::error::{DriverError, ErrorKind, Result};
use crate::executor::{Action, ActionExecutor, ActionOutcome, ActionResult};
use crate::locator::Locator;
use crate::retry::RetryPolicy;
use crate::session::SessionHandle;
use crate::wait::{self, CancelToken, WaitPolicy};

/// Scenario-level step runner bound to one session.
///
/// Policies set here are the defaults for every step; waits that take
/// an explicit timeout override the wait policy's deadline for that
/// call only.
pub struct Steps {
    session: SessionHandle,
    executor: ActionExecutor,
    wait: WaitPolicy,
    retry: RetryPolicy,
}

impl Steps {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            executor: ActionExecutor::new(),
            wait: WaitPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policies(mut self, wait: WaitPolicy, retry: RetryPolicy) -> Self {
        self.wait = wait;
        self.retry = retry;
        self
    }

    /// Abort in-flight steps once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.executor = ActionExecutor::with_cancel(cancel);
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn check(&self, result: ActionResult) -> Result<ActionResult> {
        match result.outcome {
            ActionOutcome::Success => Ok(result),
            ActionOutcome::TimedOut => Err(DriverError::TimedOut {
                timeout: self.wait.timeout,
            }),
            ActionOutcome::Cancelled => Err(DriverError::Cancelled),
            ActionOutcome::Failed => Err(match result.error {
                Some(ErrorKind::SessionInactive) => DriverError::SessionInactive,
                Some(kind) => DriverError::ActionFailed(format!(
                    "step failed after {} attempts ({:?})",
                    result.attempts_made, kind
                )),
                None => DriverError::ActionFailed("step failed".into()),
            }),
        }
    }

    async fn run(&self, action: Action, target: &Locator) -> Result<ActionResult> {
        let result = self
            .executor
            .perform(&action, target, &self.session, &self.wait, &self.retry)
            .await;
        self.check(result)
    }

    pub async fn tap(&self, target: &Locator) -> Result<()> {
        info!("tap {}", target);
        self.run(Action::Tap, target).await.map(|_| ())
    }

    pub async fn double_tap(&self, target: &Locator) -> Result<()> {
        info!("double tap {}", target);
        self.run(Action::DoubleTap, target).await.map(|_| ())
    }

    pub async fn long_press(&self, target: &Locator, duration: Duration) -> Result<()> {
        info!("long press {} for {:?}", target, duration);
        self.run(Action::LongPress { duration }, target)
            .await
            .map(|_| ())
    }

    /// Type into a field. `append` keeps the existing content instead
    /// of clearing it first.
    pub async fn set_text(&self, target: &Locator, text: &str, append: bool) -> Result<()> {
        info!("set text on {}", target);
        self.run(
            Action::TypeText {
                text: text.to_string(),
                clear_first: !append,
            },
            target,
        )
        .await
        .map(|_| ())
    }

    /// Swipe on a scrollable container `repeat` times, pausing
    /// `interval` between swipes.
    pub async fn swipe(
        &self,
        container: &Locator,
        direction: SwipeDirection,
        repeat: u32,
        interval: Duration,
    ) -> Result<()> {
        info!("swipe {:?} x{} on {}", direction, repeat, container);
        for i in 0..repeat {
            self.run(
                Action::Swipe {
                    direction,
                    duration: None,
                },
                container,
            )
            .await?;
            if i + 1 < repeat {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(())
    }

    pub async fn press_key(&self, key: DeviceKey) -> Result<()> {
        info!("press {:?}", key);
        // Target is ignored for device-scoped keys; any valid locator works.
        let placeholder = Locator::xpath("/*")?;
        self.run(Action::PressKey { key }, &placeholder)
            .await
            .map(|_| ())
    }

    pub async fn go_back(&self) -> Result<()> {
        self.press_key(DeviceKey::Back).await
    }

    pub async fn go_home(&self) -> Result<()> {
        self.press_key(DeviceKey::Home).await
    }

    /// Wait until the element is visible, failing with TIMED_OUT
    /// otherwise.
    pub async fn wait_visible(&self, target: &Locator, timeout: Duration) -> Result<()> {
        let policy = WaitPolicy::new(timeout, self.wait.poll_interval);
        let outcome = wait::wait_for(
            &crate::condition::Condition::visible(target.clone()),
            &self.session,
            &policy,
            self.executor.cancel_token(),
        )
        .await?;
        if outcome.met {
            Ok(())
        } else {
            Err(DriverError::TimedOut { timeout })
        }
    }

    /// Wait until no element matches the locator.
    pub async fn wait_gone(&self, target: &Locator, timeout: Duration) -> Result<()> {
        let policy = WaitPolicy::new(timeout, self.wait.poll_interval);
        let outcome = wait::wait_for(
            &crate::condition::Condition::absent(target.clone()),
            &self.session,
            &policy,
            self.executor.cancel_token(),
        )
        .await?;
        if outcome.met {
            Ok(())
        } else {
            Err(DriverError::TimedOut { timeout })
        }
    }

    /// Wait until the element's text equals `expected` exactly.
    pub async fn wait_for_text(
        &self,
        target: &Locator,
        expected: &str,
        timeout: Duration,
    ) -> Result<()> {
        let policy = WaitPolicy::new(timeout, self.wait.poll_interval);
        let outcome = wait::wait_for(
            &crate::condition::Condition::text_equals(target.clone(), expected),
            &self.session,
            &policy,
            self.executor.cancel_token(),
        )
        .await?;
        if outcome.met {
            Ok(())
        } else {
            Err(DriverError::TimedOut { timeout })
        }
    }

    /// Single-shot presence check; no waiting.
    pub async fn is_present(&self, target: &Locator) -> Result<bool> {
        let outcome = wait::wait_for(
            &crate::condition::Condition::present(target.clone()),
            &self.session,
            &WaitPolicy::check_once(),
            self.executor.cancel_token(),
        )
        .await?;
        Ok(outcome.met)
    }

    /// Single-shot visibility check; no waiting.
    pub async fn is_visible(&self, target: &Locator) -> Result<bool> {
        let outcome = wait::wait_for(
            &crate::condition::Condition::visible(target.clone()),
            &self.session,
            &WaitPolicy::check_once(),
            self.executor.cancel_token(),
        )
        .await?;
        Ok(outcome.met)
    }

    /// Wait for the element, then read its text.
    pub async fn read_text(&self, target: &Locator, timeout: Duration) -> Result<String> {
        let policy = WaitPolicy::new(timeout, self.wait.poll_interval);
        let outcome = wait::wait_for(
            &crate::condition::Condition::present(target.clone()),
            &self.session,
            &policy,
            self.executor.cancel_token(),
        )
        .await?;
        if !outcome.met {
            return Err(DriverError::TimedOut { timeout });
        }
        self.session
            .read_text(target)
            .await?
            .ok_or_else(|| DriverError::ActionFailed(format!("element vanished: {}", target)))
    }

    /// Capture the current screen as PNG bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.session.screenshot().await
    }
}
