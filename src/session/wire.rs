//! HTTP client for the automation server
//!
//! Implements [`UiBackend`] against a WebDriver-compatible endpoint
//! (Appium and friends). Transport failures map to SESSION_TRANSIENT;
//! protocol-level rejections map to ACTION_FAILED or SESSION_INACTIVE
//! depending on the server's error code. All calls are single-shot;
//! resilience lives above this layer.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use log::trace;
use serde::Deserialize;
use serde_json::json;

use crate::backend::{ActionRequest, DeviceKey, ElementSnapshot, SwipeDirection, UiBackend};
use crate::error::{DriverError, Result};
use crate::locator::{Locator, Strategy};
use crate::session::Capabilities;

/// Default Appium server port.
pub const DEFAULT_PORT: u16 = 4723;

/// W3C element id key in find-element responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub struct WireClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WireResponse<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct WireErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusValue {
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct RectValue {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl WireClient {
    pub fn new(port: u16) -> Result<Self> {
        Self::with_host("localhost", port)
    }

    pub fn with_host(host: &str, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DriverError::SessionStartFailed(format!("http client: {}", e)))?;

        Ok(Self {
            base_url: format!("http://{}:{}", host, port),
            client,
        })
    }

    /// Readiness probe. Unreachable servers report `false`, not an
    /// error, so callers can poll this before starting a session.
    pub async fn status(&self) -> bool {
        let url = format!("{}/status", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<WireResponse<StatusValue>>()
                .await
                .map(|s| s.value.ready)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn transport_error(err: reqwest::Error) -> DriverError {
        DriverError::SessionTransient(err.to_string())
    }

    /// Map a W3C error body onto the engine taxonomy.
    fn protocol_error(body: &str) -> DriverError {
        if let Ok(parsed) = serde_json::from_str::<WireResponse<WireErrorValue>>(body) {
            let detail = if parsed.value.message.is_empty() {
                parsed.value.error.clone()
            } else {
                format!("{}: {}", parsed.value.error, parsed.value.message)
            };
            return match parsed.value.error.as_str() {
                "invalid session id" => DriverError::SessionInactive,
                _ => DriverError::ActionFailed(detail),
            };
        }
        DriverError::ActionFailed(format!("unrecognized server error: {}", body))
    }

    async fn check<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        if resp.status().is_success() {
            let parsed: WireResponse<T> = resp.json().await.map_err(Self::transport_error)?;
            Ok(parsed.value)
        } else {
            let body = resp.text().await.map_err(Self::transport_error)?;
            Err(Self::protocol_error(&body))
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        trace!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(resp).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        trace!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::check(resp).await
    }

    /// Find element ids for `locator`, honoring its scope chain.
    async fn find_element_ids(&self, wire_id: &str, locator: &Locator) -> Result<Vec<String>> {
        let (using, value) = wire_selector(locator);
        let body = json!({ "using": using, "value": value });

        let path = match locator.scope() {
            None => format!("/session/{}/elements", wire_id),
            Some(scope) => {
                let mut scope_ids = Box::pin(self.find_element_ids(wire_id, scope)).await?;
                scope_ids.truncate(1);
                match scope_ids.pop() {
                    // Scope not on screen: nothing can match inside it.
                    None => return Ok(Vec::new()),
                    Some(scope_id) => {
                        format!("/session/{}/element/{}/elements", wire_id, scope_id)
                    }
                }
            }
        };

        let found: Vec<serde_json::Map<String, serde_json::Value>> =
            self.post(&path, &body).await?;
        Ok(found
            .into_iter()
            .filter_map(|mut entry| entry.remove(ELEMENT_KEY))
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect())
    }

    /// Read one element's state. `None` when the element went stale
    /// between find and read; the caller treats it as not matched.
    async fn read_state(&self, wire_id: &str, element_id: &str) -> Result<Option<ElementSnapshot>> {
        let base = format!("/session/{}/element/{}", wire_id, element_id);
        let displayed = match self.get::<bool>(&format!("{}/displayed", base)).await {
            Ok(v) => v,
            Err(DriverError::ActionFailed(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let enabled = match self.get::<bool>(&format!("{}/enabled", base)).await {
            Ok(v) => v,
            Err(DriverError::ActionFailed(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let text = match self.get::<String>(&format!("{}/text", base)).await {
            Ok(v) => v,
            Err(DriverError::ActionFailed(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(ElementSnapshot {
            displayed,
            enabled,
            text,
        }))
    }

    /// Resolve the locator to exactly one element for dispatch. A
    /// vanished element is ACTION_FAILED, which retry policies
    /// typically classify as retryable.
    async fn find_required(&self, wire_id: &str, locator: &Locator) -> Result<String> {
        let mut ids = self.find_element_ids(wire_id, locator).await?;
        ids.truncate(1);
        ids.pop()
            .ok_or_else(|| DriverError::ActionFailed(format!("no element matches {}", locator)))
    }

    async fn element_center(&self, wire_id: &str, element_id: &str) -> Result<(f64, f64)> {
        let rect: RectValue = self
            .get(&format!("/session/{}/element/{}/rect", wire_id, element_id))
            .await?;
        Ok((rect.x + rect.width / 2.0, rect.y + rect.height / 2.0))
    }

    /// One-finger W3C pointer sequence: move to start, press, optional
    /// glide, release.
    async fn pointer_sequence(
        &self,
        wire_id: &str,
        from: (f64, f64),
        to: Option<(f64, f64)>,
        hold: Duration,
    ) -> Result<()> {
        let mut sequence = vec![
            json!({"type": "pointerMove", "duration": 0, "x": from.0 as i64, "y": from.1 as i64}),
            json!({"type": "pointerDown", "button": 0}),
        ];
        if !hold.is_zero() && to.is_none() {
            sequence.push(json!({"type": "pause", "duration": hold.as_millis() as u64}));
        }
        if let Some(to) = to {
            sequence.push(json!({
                "type": "pointerMove",
                "duration": hold.as_millis().max(1) as u64,
                "x": to.0 as i64,
                "y": to.1 as i64,
            }));
        }
        sequence.push(json!({"type": "pointerUp", "button": 0}));

        let body = json!({
            "actions": [{
                "type": "pointer",
                "id": "finger1",
                "parameters": {"pointerType": "touch"},
                "actions": sequence,
            }]
        });
        self.post::<serde_json::Value>(&format!("/session/{}/actions", wire_id), &body)
            .await?;
        Ok(())
    }
}

/// Locator → W3C `{using, value}` pair. The protocol has no text
/// strategy, so TEXT locators become an XPath over the common
/// text-bearing attributes.
fn wire_selector(locator: &Locator) -> (&'static str, String) {
    match locator.strategy() {
        Strategy::Id => ("id", locator.value().to_string()),
        Strategy::XPath => ("xpath", locator.value().to_string()),
        Strategy::AccessibilityId => ("accessibility id", locator.value().to_string()),
        Strategy::ClassName => ("class name", locator.value().to_string()),
        Strategy::Text => {
            let literal = xpath_literal(locator.value());
            (
                "xpath",
                format!(
                    "//*[@text={lit} or @label={lit} or @name={lit}]",
                    lit = literal
                ),
            )
        }
    }
}

/// Quote a string as an XPath literal. XPath has no escape character,
/// so strings containing both quote kinds need concat().
fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{}\"", value)
    } else if !value.contains('\'') {
        format!("'{}'", value)
    } else {
        let parts: Vec<String> = value
            .split('"')
            .map(|part| format!("\"{}\"", part))
            .collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

/// Android keycode for the device-key endpoint.
fn keycode(key: DeviceKey) -> u32 {
    match key {
        DeviceKey::Home => 3,
        DeviceKey::Back => 4,
        DeviceKey::Enter => 66,
        DeviceKey::Delete => 67,
    }
}

/// Swipe start/end as fractions of the container rect.
fn swipe_endpoints(rect: &RectValue, direction: SwipeDirection) -> ((f64, f64), (f64, f64)) {
    let cx = rect.x + rect.width / 2.0;
    let cy = rect.y + rect.height / 2.0;
    match direction {
        SwipeDirection::Up => (
            (cx, rect.y + rect.height * 0.75),
            (cx, rect.y + rect.height * 0.25),
        ),
        SwipeDirection::Down => (
            (cx, rect.y + rect.height * 0.25),
            (cx, rect.y + rect.height * 0.75),
        ),
        SwipeDirection::Left => (
            (rect.x + rect.width * 0.75, cy),
            (rect.x + rect.width * 0.25, cy),
        ),
        SwipeDirection::Right => (
            (rect.x + rect.width * 0.25, cy),
            (rect.x + rect.width * 0.75, cy),
        ),
    }
}

#[async_trait]
impl UiBackend for WireClient {
    async fn create_session(&self, capabilities: &Capabilities) -> Result<String> {
        let url = format!("{}/session", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&capabilities.to_wire())
            .send()
            .await
            .map_err(|e| DriverError::SessionStartFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("unreadable error body: {}", e));
            return Err(DriverError::SessionStartFailed(body));
        }

        let parsed: WireResponse<SessionValue> = resp
            .json()
            .await
            .map_err(|e| DriverError::SessionStartFailed(format!("bad session response: {}", e)))?;
        Ok(parsed.value.session_id)
    }

    async fn delete_session(&self, wire_id: &str) -> Result<()> {
        let url = format!("{}/session/{}", self.base_url, wire_id);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let body = resp.text().await.map_err(Self::transport_error)?;
            Err(Self::protocol_error(&body))
        }
    }

    async fn reset_app(&self, wire_id: &str) -> Result<()> {
        self.post::<serde_json::Value>(
            &format!("/session/{}/appium/app/reset", wire_id),
            &json!({}),
        )
        .await?;
        Ok(())
    }

    async fn query(&self, wire_id: &str, locator: &Locator) -> Result<Vec<ElementSnapshot>> {
        let ids = self.find_element_ids(wire_id, locator).await?;
        let mut snapshots = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(snapshot) = self.read_state(wire_id, &id).await? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    async fn execute(&self, wire_id: &str, request: &ActionRequest) -> Result<()> {
        match request {
            ActionRequest::Tap { locator } => {
                let id = self.find_required(wire_id, locator).await?;
                self.post::<serde_json::Value>(
                    &format!("/session/{}/element/{}/click", wire_id, id),
                    &json!({}),
                )
                .await?;
                Ok(())
            }
            ActionRequest::DoubleTap { locator } => {
                let id = self.find_required(wire_id, locator).await?;
                let center = self.element_center(wire_id, &id).await?;
                self.pointer_sequence(wire_id, center, None, Duration::ZERO)
                    .await?;
                self.pointer_sequence(wire_id, center, None, Duration::ZERO)
                    .await
            }
            ActionRequest::LongPress { locator, duration } => {
                let id = self.find_required(wire_id, locator).await?;
                let center = self.element_center(wire_id, &id).await?;
                self.pointer_sequence(wire_id, center, None, *duration).await
            }
            ActionRequest::TypeText {
                locator,
                text,
                clear_first,
            } => {
                let id = self.find_required(wire_id, locator).await?;
                if *clear_first {
                    self.post::<serde_json::Value>(
                        &format!("/session/{}/element/{}/clear", wire_id, id),
                        &json!({}),
                    )
                    .await?;
                }
                self.post::<serde_json::Value>(
                    &format!("/session/{}/element/{}/value", wire_id, id),
                    &json!({ "text": text }),
                )
                .await?;
                Ok(())
            }
            ActionRequest::Swipe {
                container,
                direction,
                duration,
            } => {
                let id = self.find_required(wire_id, container).await?;
                let rect: RectValue = self
                    .get(&format!("/session/{}/element/{}/rect", wire_id, id))
                    .await?;
                let (from, to) = swipe_endpoints(&rect, *direction);
                self.pointer_sequence(wire_id, from, Some(to), *duration).await
            }
            ActionRequest::PressKey { key } => {
                self.post::<serde_json::Value>(
                    &format!("/session/{}/appium/device/press_keycode", wire_id),
                    &json!({ "keycode": keycode(*key) }),
                )
                .await?;
                Ok(())
            }
        }
    }

    async fn screenshot(&self, wire_id: &str) -> Result<Vec<u8>> {
        let encoded: String = self
            .get(&format!("/session/{}/screenshot", wire_id))
            .await?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| DriverError::ActionFailed(format!("undecodable screenshot: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_base_url() {
        let client = WireClient::new(4723).unwrap();
        assert_eq!(client.base_url, "http://localhost:4723");

        let client = WireClient::with_host("192.168.1.50", 4444).unwrap();
        assert_eq!(client.base_url, "http://192.168.1.50:4444");
    }

    #[test]
    fn test_wire_selector_mapping() {
        let (using, value) = wire_selector(&Locator::id("login").unwrap());
        assert_eq!((using, value.as_str()), ("id", "login"));

        let (using, _) = wire_selector(&Locator::accessibility_id("Login").unwrap());
        assert_eq!(using, "accessibility id");

        let (using, _) = wire_selector(&Locator::class_name("android.widget.Button").unwrap());
        assert_eq!(using, "class name");
    }

    #[test]
    fn test_text_strategy_becomes_xpath() {
        let (using, value) = wire_selector(&Locator::text("Sign in").unwrap());
        assert_eq!(using, "xpath");
        assert_eq!(
            value,
            "//*[@text=\"Sign in\" or @label=\"Sign in\" or @name=\"Sign in\"]"
        );
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("plain"), "\"plain\"");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(xpath_literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(
            xpath_literal("it's \"both\""),
            "concat(\"it's \", '\"', \"both\", '\"', \"\")"
        );
    }

    #[test]
    fn test_protocol_error_mapping() {
        let stale = r#"{"value":{"error":"stale element reference","message":"gone"}}"#;
        assert_eq!(
            WireClient::protocol_error(stale).kind(),
            crate::error::ErrorKind::ActionFailed
        );

        let dead = r#"{"value":{"error":"invalid session id","message":""}}"#;
        assert_eq!(
            WireClient::protocol_error(dead).kind(),
            crate::error::ErrorKind::SessionInactive
        );
    }

    #[test]
    fn test_swipe_endpoints() {
        let rect = RectValue {
            x: 0.0,
            y: 0.0,
            width: 400.0,
            height: 800.0,
        };
        let (from, to) = swipe_endpoints(&rect, SwipeDirection::Up);
        assert_eq!(from, (200.0, 600.0));
        assert_eq!(to, (200.0, 200.0));

        let (from, to) = swipe_endpoints(&rect, SwipeDirection::Left);
        assert_eq!(from, (300.0, 400.0));
        assert_eq!(to, (100.0, 400.0));
    }

    #[test]
    fn test_keycodes() {
        assert_eq!(keycode(DeviceKey::Back), 4);
        assert_eq!(keycode(DeviceKey::Home), 3);
        assert_eq!(keycode(DeviceKey::Enter), 66);
    }
}
