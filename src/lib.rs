//! Resilient action execution for mobile UI automation.
//!
//! A client-side engine over a WebDriver-compatible automation server
//! that tolerates the flakiness of real devices: every action names its
//! precondition as a [`Condition`], the wait engine polls it to a
//! deadline, and dispatch failures are retried under a declared
//! [`RetryPolicy`] instead of ad-hoc exception catching.
//!
//! Sessions are explicitly owned values: one [`SessionManager`] per
//! device slot hands out the [`SessionHandle`] that every call takes.
//! A handle must not be used by two concurrent executor calls; run
//! parallel tests by creating independent managers. All polling and
//! backoff suspends the calling task only; no background threads or
//! timers are spawned.

pub mod backend;
pub mod condition;
pub mod error;
pub mod executor;
pub mod locator;
pub mod retry;
pub mod session;
pub mod steps;
pub mod wait;

// Re-export common items
pub use backend::{DeviceKey, ElementSnapshot, SwipeDirection, UiBackend};
pub use condition::{Condition, ConditionKind};
pub use error::{DriverError, ErrorKind, Result};
pub use executor::{Action, ActionExecutor, ActionOutcome, ActionResult};
pub use locator::{Locator, Strategy};
pub use retry::{Backoff, RetryPolicy};
pub use session::wire::WireClient;
pub use session::{Capabilities, SessionHandle, SessionManager};
pub use steps::Steps;
pub use wait::{wait_for, CancelToken, DeadlineBehavior, WaitOutcome, WaitPolicy};
