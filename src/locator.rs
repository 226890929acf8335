//! Element locators
//!
//! A [`Locator`] is an immutable description of how to find a UI
//! element: a strategy, a selector string and an optional scoping
//! locator (search inside the scope's match instead of the whole
//! screen). Validation happens at construction so the engine never
//! sees a malformed locator.

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Element lookup strategy, mirroring what the automation server
/// supports natively. `Text` is translated to an XPath on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Id,
    XPath,
    AccessibilityId,
    ClassName,
    Text,
}

/// Immutable description of how to find a UI element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    strategy: Strategy,
    value: String,
    scope: Option<Box<Locator>>,
}

impl Locator {
    /// Create a locator. Fails with `InvalidLocator` if `value` is
    /// empty.
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DriverError::InvalidLocator(format!(
                "empty selector value for strategy {:?}",
                strategy
            )));
        }
        Ok(Self {
            strategy,
            value,
            scope: None,
        })
    }

    pub fn id(value: impl Into<String>) -> Result<Self> {
        Self::new(Strategy::Id, value)
    }

    pub fn xpath(value: impl Into<String>) -> Result<Self> {
        Self::new(Strategy::XPath, value)
    }

    pub fn accessibility_id(value: impl Into<String>) -> Result<Self> {
        Self::new(Strategy::AccessibilityId, value)
    }

    pub fn class_name(value: impl Into<String>) -> Result<Self> {
        Self::new(Strategy::ClassName, value)
    }

    pub fn text(value: impl Into<String>) -> Result<Self> {
        Self::new(Strategy::Text, value)
    }

    /// Scope this locator to search within another locator's match.
    ///
    /// Fails with `InvalidLocator` if the scope chain would contain a
    /// node equal to this locator (a locator may not scope to itself,
    /// directly or transitively).
    pub fn within(mut self, scope: Locator) -> Result<Self> {
        let mut node = Some(&scope);
        while let Some(current) = node {
            if current.strategy == self.strategy && current.value == self.value {
                return Err(DriverError::InvalidLocator(format!(
                    "cyclic scope: {:?}={} appears in its own scope chain",
                    self.strategy, self.value
                )));
            }
            node = current.scope.as_deref();
        }
        self.scope = Some(Box::new(scope));
        Ok(self)
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn scope(&self) -> Option<&Locator> {
        self.scope.as_deref()
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{:?}={} (within {})", self.strategy, self.value, scope),
            None => write!(f, "{:?}={}", self.strategy, self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_rejects_empty_value() {
        let err = Locator::id("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocator);

        let err = Locator::xpath("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocator);
    }

    #[test]
    fn test_equality() {
        let a = Locator::id("login_button").unwrap();
        let b = Locator::id("login_button").unwrap();
        let c = Locator::accessibility_id("login_button").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_scoping() {
        let list = Locator::id("contact_list").unwrap();
        let row = Locator::text("Alice").unwrap().within(list.clone()).unwrap();
        assert_eq!(row.scope(), Some(&list));
    }

    #[test]
    fn test_rejects_cyclic_scope() {
        let outer = Locator::id("panel").unwrap();
        let err = Locator::id("panel").unwrap().within(outer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocator);
    }

    #[test]
    fn test_rejects_transitive_cycle() {
        let a = Locator::id("a").unwrap();
        let b = Locator::id("b").unwrap().within(a).unwrap();
        // "a" already sits in b's chain, so scoping a new "a" to b cycles
        let err = Locator::id("a").unwrap().within(b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocator);
    }
}
