//! Error taxonomy for the automation engine
//!
//! Every failure carries a stable [`ErrorKind`] so that retry decisions
//! can be made from data (a `RetryPolicy` holds a set of retryable
//! kinds) instead of being buried in control flow.

use std::time::Duration;
use thiserror::Error;

/// Stable classification of a failure, independent of its message.
///
/// `SessionTransient` is the only kind the wait engine absorbs on its
/// own; everything else propagates to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or cyclic locator. Caller bug, never retried.
    InvalidLocator,
    /// Session was terminated or never started. Fatal to the call.
    SessionInactive,
    /// Automation server unreachable or rejected the capabilities.
    SessionStartFailed,
    /// Flaky connectivity during a query. Absorbed by polling.
    SessionTransient,
    /// Device rejected the action (e.g. stale element).
    ActionFailed,
    /// Caller-initiated abort. Always surfaced, never retried.
    Cancelled,
    /// Precondition never became true within the wait policy.
    TimedOut,
}

/// Engine error with context. Use [`DriverError::kind`] for
/// classification; the `Display` form is for logs and reports.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    #[error("session is not active")]
    SessionInactive,

    #[error("failed to start session: {0}")]
    SessionStartFailed(String),

    #[error("transient automation server failure: {0}")]
    SessionTransient(String),

    #[error("device rejected action: {0}")]
    ActionFailed(String),

    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("condition not met within {timeout:?}")]
    TimedOut { timeout: Duration },
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::InvalidLocator(_) => ErrorKind::InvalidLocator,
            DriverError::SessionInactive => ErrorKind::SessionInactive,
            DriverError::SessionStartFailed(_) => ErrorKind::SessionStartFailed,
            DriverError::SessionTransient(_) => ErrorKind::SessionTransient,
            DriverError::ActionFailed(_) => ErrorKind::ActionFailed,
            DriverError::Cancelled => ErrorKind::Cancelled,
            DriverError::TimedOut { .. } => ErrorKind::TimedOut,
        }
    }

    /// Transient errors are expected to self-resolve and are treated as
    /// a failed poll by the wait engine rather than raised.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::SessionTransient
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
