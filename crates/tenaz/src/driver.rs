//! Abstract page-driver boundary.
//!
//! The core consumes the target application only through this capability
//! set: navigate, query the DOM by strategy, read/write input values,
//! click/hover/press keys, read the current URL, observe teardown. A
//! backend (CDP, WebDriver, an in-memory fake) implements [`PageDriver`];
//! everything above it stays backend-agnostic.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  PageDriver (abstract trait)                                     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────┐  ┌────────────────┐  ┌───────────────────┐  │
//! │  │  CDP backend   │  │  WebDriver     │  │  fake::FakePage   │  │
//! │  │  (external)    │  │  (external)    │  │  (unit tests)     │  │
//! │  └────────────────┘  └────────────────┘  └───────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use crate::locator::Strategy;
use crate::result::TenazResult;
use crate::session::AuthState;

/// A point-in-time handle to one DOM element.
///
/// Transient by design: the DOM mutates between steps, so a handle is
/// never reused beyond the single action it was resolved for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-internal element identifier
    pub id: String,
    /// Accessible role
    pub role: String,
    /// Accessible name
    pub name: String,
    /// Text content
    pub text: String,
    /// Whether the element is currently rendered
    pub visible: bool,
    /// Whether the element is still attached to the document
    pub attached: bool,
    /// Whether the element accepts input
    pub enabled: bool,
}

impl ElementHandle {
    /// Whether this element is a valid resolution target (visible and
    /// attached; enablement is an action-time concern, not a
    /// resolution-time one)
    #[must_use]
    pub const fn is_interactable_target(&self) -> bool {
        self.visible && self.attached
    }
}

/// Why a single interaction attempt failed.
///
/// Distinguishes the failure modes the two-phase executor reacts to: an
/// interception or stability problem is worth a forced retry, a detached
/// target is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionErrorKind {
    /// Another element intercepted the pointer (overlay, toast, modal)
    Intercepted,
    /// The element was still animating or being re-laid-out
    NotStable,
    /// The element is disabled
    Disabled,
    /// The element left the document between resolution and action
    Detached,
    /// Backend-specific failure
    Other,
}

/// Failure of one interaction attempt at the driver boundary
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct InteractionError {
    /// Failure classification
    pub kind: InteractionErrorKind,
    /// Backend-provided detail
    pub message: String,
}

impl InteractionError {
    /// Create an interaction error
    #[must_use]
    pub fn new(kind: InteractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Pointer was intercepted by another element
    #[must_use]
    pub fn intercepted(by: &str) -> Self {
        Self::new(
            InteractionErrorKind::Intercepted,
            format!("pointer intercepted by {by}"),
        )
    }

    /// Element is disabled
    #[must_use]
    pub fn disabled(element: &str) -> Self {
        Self::new(
            InteractionErrorKind::Disabled,
            format!("element {element} is disabled"),
        )
    }

    /// Element is no longer attached
    #[must_use]
    pub fn detached(element: &str) -> Self {
        Self::new(
            InteractionErrorKind::Detached,
            format!("element {element} is detached from the document"),
        )
    }
}

/// Driver/session configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Run the backend headless
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Timeout for navigations
    pub navigation_timeout: Duration,
    /// User agent override
    pub user_agent: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            navigation_timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

impl DriverConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set the navigation timeout
    #[must_use]
    pub const fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Set a user agent override
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }
}

/// The generic capability set the core consumes from a page backend.
///
/// Interaction methods take a `force` flag: `false` is the standard
/// actionability-checked path, `true` is the documented fallback that
/// bypasses overlay interception. Which path ran is the executor's
/// business to record, never the backend's to hide.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> TenazResult<()>;

    /// Read the current URL
    async fn current_url(&self) -> TenazResult<String>;

    /// Query the DOM for every element matching one strategy
    async fn query(&self, strategy: &Strategy) -> TenazResult<Vec<ElementHandle>>;

    /// Click an element
    async fn click(&self, target: &ElementHandle, force: bool) -> Result<(), InteractionError>;

    /// Fill an input element with text
    async fn fill(
        &self,
        target: &ElementHandle,
        text: &str,
        force: bool,
    ) -> Result<(), InteractionError>;

    /// Hover over an element
    async fn hover(&self, target: &ElementHandle, force: bool) -> Result<(), InteractionError>;

    /// Send a key press to the focused element
    async fn press_key(&self, key: &str) -> Result<(), InteractionError>;

    /// Read an input element's current value
    async fn read_value(&self, target: &ElementHandle) -> TenazResult<String>;

    /// Seed the session with a previously captured credential bundle.
    ///
    /// The bundle is an opaque precondition artifact the core consumes
    /// but never creates.
    async fn apply_session(&self, state: &AuthState) -> TenazResult<()>;

    /// Capture a screenshot (PNG bytes) for failure diagnostics
    async fn screenshot(&self) -> TenazResult<Vec<u8>>;

    /// Whether the page/context has been torn down
    fn is_closed(&self) -> bool;

    /// A signal that flips to `true` when the page closes.
    ///
    /// Waits select on this so cancellation propagates promptly instead
    /// of surfacing as a masked not-found.
    fn closed_signal(&self) -> watch::Receiver<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_target_requires_visible_and_attached() {
        let mut handle = ElementHandle {
            id: "e1".to_string(),
            role: "button".to_string(),
            name: "Send".to_string(),
            text: String::new(),
            visible: true,
            attached: true,
            enabled: false,
        };
        // Disabled elements still resolve; actions decide what to do.
        assert!(handle.is_interactable_target());

        handle.visible = false;
        assert!(!handle.is_interactable_target());

        handle.visible = true;
        handle.attached = false;
        assert!(!handle.is_interactable_target());
    }

    #[test]
    fn test_interaction_error_kinds() {
        assert_eq!(
            InteractionError::intercepted("div.overlay").kind,
            InteractionErrorKind::Intercepted
        );
        assert_eq!(
            InteractionError::disabled("e3").kind,
            InteractionErrorKind::Disabled
        );
        assert_eq!(
            InteractionError::detached("e9").kind,
            InteractionErrorKind::Detached
        );
    }

    #[test]
    fn test_driver_config_builders() {
        let config = DriverConfig::new()
            .headless(false)
            .viewport(1280, 720)
            .navigation_timeout(Duration::from_secs(10))
            .user_agent("tenaz-test");

        assert!(!config.headless);
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.viewport_height, 720);
        assert_eq!(config.navigation_timeout, Duration::from_secs(10));
        assert_eq!(config.user_agent.as_deref(), Some("tenaz-test"));
    }
}
