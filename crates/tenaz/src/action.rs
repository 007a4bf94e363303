//! Two-phase action execution with typed outcomes.
//!
//! Every interaction runs a standard primary attempt and, on failure, one
//! documented forced fallback that bypasses overlay interception. Which
//! phase succeeded is a typed value in the result and a structured log
//! line, never a silent try/catch: UI automation failures are frequently
//! non-deterministic, and the phase trail is what makes them debuggable
//! after the fact.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::{ElementHandle, InteractionError, PageDriver};
use crate::result::{TenazError, TenazResult};

/// Default upper bound for the forced fallback attempt (2 seconds)
pub const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 2_000;

/// An interaction to perform on a resolved element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiAction {
    /// Click the element
    Click,
    /// Fill the element with text
    Fill {
        /// Text to enter
        text: String,
    },
    /// Hover over the element
    Hover,
    /// Press a key with the element focused
    Press {
        /// Key name (e.g. "Enter")
        key: String,
    },
}

impl fmt::Display for UiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click => write!(f, "click"),
            Self::Fill { text } => write!(f, "fill '{text}'"),
            Self::Hover => write!(f, "hover"),
            Self::Press { key } => write!(f, "press '{key}'"),
        }
    }
}

/// Which execution path completed an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPhase {
    /// The standard interaction succeeded
    Primary,
    /// The standard interaction failed and the forced fallback succeeded
    Fallback,
}

/// A completed action with its phase trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Action description
    pub action: String,
    /// Element the action targeted
    pub target: String,
    /// Phase that completed the action
    pub phase: ActionPhase,
    /// Primary-phase failure when the fallback had to run
    pub primary_failure: Option<String>,
}

/// Options for the executor
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Upper bound for the forced fallback attempt
    pub fallback_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            fallback_timeout: Duration::from_millis(DEFAULT_FALLBACK_TIMEOUT_MS),
        }
    }
}

impl ExecutorOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback timeout
    #[must_use]
    pub const fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }
}

/// Performs interactions through the driver with the two-phase policy
pub struct ActionExecutor {
    driver: Arc<dyn PageDriver>,
    options: ExecutorOptions,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    /// Create an executor with default options
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            driver,
            options: ExecutorOptions::default(),
        }
    }

    /// Create an executor with custom options
    #[must_use]
    pub fn with_options(driver: Arc<dyn PageDriver>, options: ExecutorOptions) -> Self {
        Self { driver, options }
    }

    /// Perform an action on a resolved element.
    ///
    /// Phase one is the standard interaction. If it fails (intercepted,
    /// unstable, disabled-looking), phase two retries once with the
    /// forced path inside a short secondary timeout. Both failing
    /// propagates the primary error annotated with what each phase saw.
    ///
    /// # Errors
    ///
    /// `ActionFailed` when both phases fail, `Cancelled` when the page is
    /// already gone.
    pub async fn perform(
        &self,
        action: &UiAction,
        target: &ElementHandle,
    ) -> TenazResult<ActionOutcome> {
        if self.driver.is_closed() {
            return Err(TenazError::Cancelled {
                during: format!("{action} on '{}'", target.name),
            });
        }

        match self.attempt(action, target, false).await {
            Ok(()) => {
                tracing::debug!(
                    action = %action,
                    target = %target.name,
                    phase = "primary",
                    "interaction succeeded"
                );
                Ok(ActionOutcome {
                    action: action.to_string(),
                    target: target.name.clone(),
                    phase: ActionPhase::Primary,
                    primary_failure: None,
                })
            }
            Err(primary) => {
                tracing::warn!(
                    action = %action,
                    target = %target.name,
                    phase = "primary",
                    error = %primary,
                    "interaction failed, forcing fallback"
                );
                self.fallback(action, target, primary).await
            }
        }
    }

    async fn fallback(
        &self,
        action: &UiAction,
        target: &ElementHandle,
        primary: InteractionError,
    ) -> TenazResult<ActionOutcome> {
        let forced = tokio::time::timeout(
            self.options.fallback_timeout,
            self.attempt(action, target, true),
        )
        .await;

        match forced {
            Ok(Ok(())) => {
                tracing::info!(
                    action = %action,
                    target = %target.name,
                    phase = "fallback",
                    primary_error = %primary,
                    "forced fallback succeeded"
                );
                Ok(ActionOutcome {
                    action: action.to_string(),
                    target: target.name.clone(),
                    phase: ActionPhase::Fallback,
                    primary_failure: Some(primary.to_string()),
                })
            }
            Ok(Err(fallback)) => {
                tracing::error!(
                    action = %action,
                    target = %target.name,
                    primary_error = %primary,
                    fallback_error = %fallback,
                    "both interaction phases failed"
                );
                Err(TenazError::ActionFailed {
                    action: format!("{action} on '{}'", target.name),
                    primary: primary.to_string(),
                    fallback: fallback.to_string(),
                })
            }
            Err(_elapsed) => {
                tracing::error!(
                    action = %action,
                    target = %target.name,
                    primary_error = %primary,
                    "forced fallback timed out"
                );
                Err(TenazError::ActionFailed {
                    action: format!("{action} on '{}'", target.name),
                    primary: primary.to_string(),
                    fallback: format!(
                        "forced attempt timed out after {}ms",
                        self.options.fallback_timeout.as_millis()
                    ),
                })
            }
        }
    }

    async fn attempt(
        &self,
        action: &UiAction,
        target: &ElementHandle,
        force: bool,
    ) -> Result<(), InteractionError> {
        match action {
            UiAction::Click => self.driver.click(target, force).await,
            UiAction::Fill { text } => self.driver.fill(target, text, force).await,
            UiAction::Hover => self.driver.hover(target, force).await,
            // Key presses have no forced variant; the fallback re-sends.
            UiAction::Press { key } => self.driver.press_key(key).await,
        }
    }
}
