//! Backend seam between the engine and the automation server
//!
//! [`UiBackend`] is the only surface the engine uses to talk to a
//! device: session lifecycle, read-only element queries and action
//! dispatch. `session::wire::WireClient` implements it over HTTP; tests
//! run the whole engine against an in-memory fake.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::locator::Locator;
use crate::session::Capabilities;

/// Point-in-time observation of one matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSnapshot {
    /// Rendered and within the viewport.
    pub displayed: bool,
    /// Enabled / accepting interaction.
    pub enabled: bool,
    /// Visible text content, empty when the element has none.
    pub text: String,
}

/// Swipe direction relative to the scrollable container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Physical / synthetic device key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKey {
    Back,
    Home,
    Enter,
    Delete,
}

/// One concrete device interaction, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Tap {
        locator: Locator,
    },
    DoubleTap {
        locator: Locator,
    },
    LongPress {
        locator: Locator,
        duration: Duration,
    },
    TypeText {
        locator: Locator,
        text: String,
        clear_first: bool,
    },
    Swipe {
        container: Locator,
        direction: SwipeDirection,
        duration: Duration,
    },
    PressKey {
        key: DeviceKey,
    },
}

/// Client contract for a WebDriver-compatible automation server.
///
/// All methods are single-shot: no retry, no waiting. Resilience lives
/// in the wait engine and action executor on top of this trait.
#[async_trait]
pub trait UiBackend: Send + Sync {
    /// Create a session on the server, returning its wire id.
    async fn create_session(&self, capabilities: &Capabilities) -> Result<String>;

    /// Delete a session. Unknown ids are the server's business; callers
    /// guard idempotence above this layer.
    async fn delete_session(&self, wire_id: &str) -> Result<()>;

    /// Reset the application under test without dropping the session.
    async fn reset_app(&self, wire_id: &str) -> Result<()>;

    /// Find all elements matching `locator` and read their state.
    /// Zero matches is an empty vec, not an error.
    async fn query(&self, wire_id: &str, locator: &Locator) -> Result<Vec<ElementSnapshot>>;

    /// Dispatch one device action.
    async fn execute(&self, wire_id: &str, request: &ActionRequest) -> Result<()>;

    /// Capture the current screen as PNG bytes.
    async fn screenshot(&self, wire_id: &str) -> Result<Vec<u8>>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory backend for engine tests: one scriptable element slot
    //! plus counters for queries and dispatches.

    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;
    use crate::error::DriverError;

    #[derive(Default)]
    struct FakeState {
        element: Option<ElementSnapshot>,
        appear_at: Option<Instant>,
        transient_query_failures: u32,
        dispatch_failures: u32,
        reject_sessions: bool,
        dispatched: Vec<ActionRequest>,
        queries: u32,
        sessions_created: u32,
        sessions_deleted: u32,
        resets: u32,
    }

    pub struct FakeBackend {
        state: Mutex<FakeState>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(FakeState::default()),
            }
        }

        /// Backend whose single element is present from the start.
        pub fn with_element(snapshot: ElementSnapshot) -> Self {
            let backend = Self::new();
            backend.state.lock().unwrap().element = Some(snapshot);
            backend
        }

        pub fn clickable() -> ElementSnapshot {
            ElementSnapshot {
                displayed: true,
                enabled: true,
                text: String::new(),
            }
        }

        pub fn set_element(&self, snapshot: Option<ElementSnapshot>) {
            self.state.lock().unwrap().element = snapshot;
        }

        /// Element stays hidden until `delay` from now has passed.
        pub fn appear_after(&self, delay: Duration) {
            self.state.lock().unwrap().appear_at = Some(Instant::now() + delay);
        }

        /// Next `count` queries fail with a transient error.
        pub fn fail_queries_transient(&self, count: u32) {
            self.state.lock().unwrap().transient_query_failures = count;
        }

        /// Next `count` dispatches fail with ACTION_FAILED.
        pub fn fail_dispatches(&self, count: u32) {
            self.state.lock().unwrap().dispatch_failures = count;
        }

        pub fn reject_sessions(&self) {
            self.state.lock().unwrap().reject_sessions = true;
        }

        pub fn dispatched(&self) -> Vec<ActionRequest> {
            self.state.lock().unwrap().dispatched.clone()
        }

        pub fn query_count(&self) -> u32 {
            self.state.lock().unwrap().queries
        }

        pub fn sessions_deleted(&self) -> u32 {
            self.state.lock().unwrap().sessions_deleted
        }

        pub fn resets(&self) -> u32 {
            self.state.lock().unwrap().resets
        }
    }

    #[async_trait]
    impl UiBackend for FakeBackend {
        async fn create_session(&self, _capabilities: &Capabilities) -> Result<String> {
            let mut state = self.state.lock().unwrap();
            if state.reject_sessions {
                return Err(DriverError::SessionStartFailed(
                    "capabilities rejected".into(),
                ));
            }
            state.sessions_created += 1;
            Ok(format!("fake-session-{}", state.sessions_created))
        }

        async fn delete_session(&self, _wire_id: &str) -> Result<()> {
            self.state.lock().unwrap().sessions_deleted += 1;
            Ok(())
        }

        async fn reset_app(&self, _wire_id: &str) -> Result<()> {
            self.state.lock().unwrap().resets += 1;
            Ok(())
        }

        async fn query(&self, _wire_id: &str, _locator: &Locator) -> Result<Vec<ElementSnapshot>> {
            let mut state = self.state.lock().unwrap();
            state.queries += 1;
            if state.transient_query_failures > 0 {
                state.transient_query_failures -= 1;
                return Err(DriverError::SessionTransient("connection reset".into()));
            }
            if let Some(appear_at) = state.appear_at {
                if Instant::now() < appear_at {
                    return Ok(Vec::new());
                }
            }
            Ok(state.element.iter().cloned().collect())
        }

        async fn execute(&self, _wire_id: &str, request: &ActionRequest) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.dispatch_failures > 0 {
                state.dispatch_failures -= 1;
                return Err(DriverError::ActionFailed("stale element reference".into()));
            }
            state.dispatched.push(request.clone());
            Ok(())
        }

        async fn screenshot(&self, _wire_id: &str) -> Result<Vec<u8>> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
    }
}
