//! Browser automation seam used by the crawl walker.

use std::time::Duration;

/// Error type for browser session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// An element did not appear within the allowed time.
    #[error("timed out after {timeout:?} waiting for {selector}")]
    Timeout {
        /// The CSS selector that was awaited.
        selector: String,
        /// How long the session waited.
        timeout: Duration,
    },

    /// A previously located element is no longer attached to the page.
    #[error("element is no longer attached to the page")]
    StaleElement,

    /// No element matches the selector.
    #[error("no element matches {selector}")]
    NotFound {
        /// The CSS selector that matched nothing.
        selector: String,
    },

    /// The browser or its driver failed.
    #[error("browser driver error: {0}")]
    Driver(String),
}

impl SessionError {
    /// Creates a timeout error.
    pub fn timeout(selector: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            selector: selector.into(),
            timeout,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(selector: impl Into<String>) -> Self {
        Self::NotFound {
            selector: selector.into(),
        }
    }

    /// Creates a driver error from any displayable failure.
    pub fn driver(error: impl std::fmt::Display) -> Self {
        Self::Driver(error.to_string())
    }

    /// Whether the element simply is not there (as opposed to a broken session).
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::NotFound { .. })
    }
}

/// A stateful browser the walker drives through catalog pages.
///
/// Implementations own one tab. Element handles are only valid until the
/// next navigation; using one afterwards yields [`SessionError::StaleElement`].
pub trait BrowserSession {
    /// Handle to an element of the current page.
    type Element;

    /// Loads `url` in the tab.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Driver`] if the page cannot be loaded.
    fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Waits until an element matching `selector` is present.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] if none appears within `timeout`.
    fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), SessionError>;

    /// Current rendered markup of the page.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Driver`] if the markup cannot be read.
    fn page_source(&mut self) -> Result<String, SessionError>;

    /// First element matching `selector`, waiting up to `timeout` for it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] or [`SessionError::NotFound`] when
    /// nothing matches.
    fn find(&mut self, selector: &str, timeout: Duration) -> Result<Self::Element, SessionError>;

    /// Every element currently matching `selector`, without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Driver`] if the query fails.
    fn find_all(&mut self, selector: &str) -> Result<Vec<Self::Element>, SessionError>;

    /// Value of an attribute of `element`, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StaleElement`] if the element went away.
    fn attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    /// Value of an attribute of the parent of `element`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StaleElement`] if the element went away.
    fn parent_attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    /// Whether `element` is rendered and visible to the user.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StaleElement`] if the element went away.
    fn is_displayed(&mut self, element: &Self::Element) -> Result<bool, SessionError>;

    /// Clicks `element` from script, bypassing overlays that intercept
    /// pointer events.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StaleElement`] if the element went away.
    fn script_click(&mut self, element: &Self::Element) -> Result<(), SessionError>;

    /// Shuts the browser down. Called exactly once by the walker.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Driver`] if shutdown fails.
    fn close(&mut self) -> Result<(), SessionError>;
}
