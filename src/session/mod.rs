//! Session lifecycle
//!
//! [`SessionManager`] owns at most one live automation session per
//! device slot and hands out [`SessionHandle`]s. A handle is an
//! explicitly owned value passed into every engine call, never a
//! process-wide singleton, so parallel sessions are safe by
//! construction (one manager per device).

pub mod wire;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::{ActionRequest, ElementSnapshot, UiBackend};
use crate::error::{DriverError, Result};
use crate::locator::Locator;

/// W3C capability set sent when creating a session.
///
/// Well-known fields get builder methods; anything else goes through
/// [`Capabilities::set`].
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    platform_name: Option<String>,
    device_name: Option<String>,
    app: Option<String>,
    automation_name: Option<String>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn platform(mut self, name: impl Into<String>) -> Self {
        self.platform_name = Some(name.into());
        self
    }

    pub fn device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// App package / bundle id to launch with the session.
    pub fn app(mut self, id: impl Into<String>) -> Self {
        self.app = Some(id.into());
        self
    }

    pub fn automation(mut self, name: impl Into<String>) -> Self {
        self.automation_name = Some(name.into());
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Render as a W3C `{"capabilities": {"alwaysMatch": …}}` request
    /// body. Non-standard keys carry the `appium:` vendor prefix.
    pub fn to_wire(&self) -> serde_json::Value {
        let mut always_match = serde_json::Map::new();
        if let Some(ref platform) = self.platform_name {
            always_match.insert("platformName".into(), platform.clone().into());
        }
        if let Some(ref device) = self.device_name {
            always_match.insert("appium:deviceName".into(), device.clone().into());
        }
        if let Some(ref app) = self.app {
            always_match.insert("appium:app".into(), app.clone().into());
        }
        if let Some(ref automation) = self.automation_name {
            always_match.insert("appium:automationName".into(), automation.clone().into());
        }
        for (key, value) in &self.extra {
            always_match.insert(key.clone(), value.clone());
        }
        serde_json::json!({ "capabilities": { "alwaysMatch": always_match } })
    }
}

/// Opaque reference to one live automation session.
///
/// Cloning shares the same underlying session; the active flag is
/// shared so a terminate through the manager invalidates every copy.
/// A handle must not be used concurrently from two executor calls
/// (documented caller precondition, see crate docs).
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    wire_id: String,
    backend: Arc<dyn UiBackend>,
    active: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Server-side session id, useful for logs.
    pub fn wire_id(&self) -> &str {
        &self.wire_id
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DriverError::SessionInactive)
        }
    }

    pub(crate) async fn query(&self, locator: &Locator) -> Result<Vec<ElementSnapshot>> {
        self.ensure_active()?;
        self.backend.query(&self.wire_id, locator).await
    }

    pub(crate) async fn execute(&self, request: &ActionRequest) -> Result<()> {
        self.ensure_active()?;
        self.backend.execute(&self.wire_id, request).await
    }

    /// Read the text of the first element matching `locator`, or
    /// `None` when nothing matches.
    pub async fn read_text(&self, locator: &Locator) -> Result<Option<String>> {
        let matches = self.query(locator).await?;
        Ok(matches.into_iter().next().map(|e| e.text))
    }

    /// Capture the current screen as PNG bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.ensure_active()?;
        self.backend.screenshot(&self.wire_id).await
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("wire_id", &self.wire_id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owns the lifecycle of the underlying automation session for one
/// device slot: at most one active handle at a time.
pub struct SessionManager {
    backend: Arc<dyn UiBackend>,
    capabilities: Capabilities,
    slot: Mutex<Option<SessionHandle>>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn UiBackend>, capabilities: Capabilities) -> Self {
        Self {
            backend,
            capabilities,
            slot: Mutex::new(None),
        }
    }

    /// Create a session on the automation server.
    ///
    /// The returned handle is guaranteed active at return time. Fails
    /// with `SESSION_START_FAILED` if the server is unreachable,
    /// rejects the capabilities, or this slot already holds a live
    /// session.
    pub async fn start(&self) -> Result<SessionHandle> {
        let mut slot = self.slot.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.is_active() {
                return Err(DriverError::SessionStartFailed(format!(
                    "session {} already active on this slot",
                    existing.wire_id
                )));
            }
        }

        let wire_id = self.backend.create_session(&self.capabilities).await?;
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            wire_id,
            backend: Arc::clone(&self.backend),
            active: Arc::new(AtomicBool::new(true)),
        };
        debug!("session started: {}", handle.wire_id);
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// Restore the session's application to its initial state without
    /// dropping the connection. Fails with `SESSION_INACTIVE` on a
    /// terminated handle.
    pub async fn reset(&self, handle: &SessionHandle) -> Result<()> {
        handle.ensure_active()?;
        debug!("resetting session {}", handle.wire_id);
        self.backend.reset_app(&handle.wire_id).await
    }

    /// Terminate the session. Idempotent: a second call on the same
    /// handle is a no-op, never an error.
    pub async fn terminate(&self, handle: &SessionHandle) -> Result<()> {
        // swap claims the one shot at server-side deletion
        if !handle.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("terminating session {}", handle.wire_id);
        if let Err(err) = self.backend.delete_session(&handle.wire_id).await {
            // Handle is already inactive either way; the server will
            // reap the orphan on its own timeout.
            warn!("session {} delete failed: {}", handle.wire_id, err);
        }
        let mut slot = self.slot.lock().await;
        if slot.as_ref().map(|h| h.id) == Some(handle.id) {
            *slot = None;
        }
        Ok(())
    }
}
