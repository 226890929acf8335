//! Single-shot condition evaluation
//!
//! A [`Condition`] names a boolean predicate about UI state. Evaluation
//! queries the automation server exactly once and applies the
//! kind-specific predicate; it never retries or waits (that is the wait
//! engine's job). An element that is simply not there is a normal
//! negative result, not a fault.

use crate::error::Result;
use crate::locator::Locator;
use crate::session::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    /// At least one element matches the locator.
    Present,
    /// A matching element is rendered on screen.
    Visible,
    /// A matching element is visible and enabled.
    Clickable,
    /// No element matches the locator.
    Absent,
    /// A matching element's text equals the expected string.
    TextEquals,
    /// A matching element's text contains the expected substring.
    TextContains,
}

/// Predicate over UI state, checked via polling by the wait engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    kind: ConditionKind,
    locator: Locator,
    expected: Option<String>,
}

impl Condition {
    pub fn present(locator: Locator) -> Self {
        Self {
            kind: ConditionKind::Present,
            locator,
            expected: None,
        }
    }

    pub fn visible(locator: Locator) -> Self {
        Self {
            kind: ConditionKind::Visible,
            locator,
            expected: None,
        }
    }

    pub fn clickable(locator: Locator) -> Self {
        Self {
            kind: ConditionKind::Clickable,
            locator,
            expected: None,
        }
    }

    pub fn absent(locator: Locator) -> Self {
        Self {
            kind: ConditionKind::Absent,
            locator,
            expected: None,
        }
    }

    pub fn text_equals(locator: Locator, expected: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::TextEquals,
            locator,
            expected: Some(expected.into()),
        }
    }

    pub fn text_contains(locator: Locator, expected: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::TextContains,
            locator,
            expected: Some(expected.into()),
        }
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn expected(&self) -> Option<&str> {
        self.expected.as_deref()
    }

    /// Check the condition against the live session, querying the
    /// server once. Fails with `SESSION_INACTIVE` on a dead handle;
    /// wire flakiness surfaces as `SESSION_TRANSIENT` for the wait
    /// engine to absorb.
    pub async fn evaluate(&self, session: &SessionHandle) -> Result<bool> {
        let matches = session.query(&self.locator).await?;

        let met = match self.kind {
            ConditionKind::Present => !matches.is_empty(),
            ConditionKind::Absent => matches.is_empty(),
            ConditionKind::Visible => matches.iter().any(|e| e.displayed),
            ConditionKind::Clickable => matches.iter().any(|e| e.displayed && e.enabled),
            ConditionKind::TextEquals => {
                let expected = self.expected.as_deref().unwrap_or_default();
                matches.iter().any(|e| e.text == expected)
            }
            ConditionKind::TextContains => {
                let expected = self.expected.as_deref().unwrap_or_default();
                matches.iter().any(|e| e.text.contains(expected))
            }
        };
        Ok(met)
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.expected {
            Some(expected) => write!(f, "{:?}({}, {:?})", self.kind, self.locator, expected),
            None => write!(f, "{:?}({})", self.kind, self.locator),
        }
    }
}
