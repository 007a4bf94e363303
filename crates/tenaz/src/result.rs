//! Result and error types for Tenaz.
//!
//! Every failure a flow can hit is a typed variant carrying the context an
//! operator needs for triage: which intent, which condition, which step,
//! which attempt. UI flakiness is expected here, not exceptional, so the
//! taxonomy is part of the public contract rather than an implementation
//! detail.

use thiserror::Error;

/// Result type for Tenaz operations
pub type TenazResult<T> = Result<T, TenazError>;

/// Errors that can occur while driving a UI flow
#[derive(Debug, Error)]
pub enum TenazError {
    /// No locator strategy produced a match
    #[error("no element matched intent '{intent}' (strategies tried: {tried})")]
    NotFound {
        /// Intent that failed to resolve
        intent: String,
        /// Comma-separated list of strategies that were probed
        tried: String,
    },

    /// A strategy matched more than one element and no index was given
    #[error("intent '{intent}' matched {count} elements via {strategy} with no disambiguation")]
    AmbiguousMatch {
        /// Intent that resolved ambiguously
        intent: String,
        /// Strategy that produced the multi-match
        strategy: String,
        /// How many elements matched
        count: usize,
    },

    /// A condition never became true within its timeout
    #[error("condition '{condition}' not met after {waited_ms}ms (last observed: {last_observed})")]
    Timeout {
        /// Human-readable condition description
        condition: String,
        /// Total time spent polling
        waited_ms: u64,
        /// Last value the predicate observed, for diagnostics
        last_observed: String,
    },

    /// Both the primary and the forced fallback interaction failed
    #[error("{action} failed in both phases (primary: {primary}; fallback: {fallback})")]
    ActionFailed {
        /// Action description
        action: String,
        /// Primary-phase failure
        primary: String,
        /// Fallback-phase failure
        fallback: String,
    },

    /// The page or context was torn down mid-operation
    #[error("page closed during '{during}'")]
    Cancelled {
        /// Operation that was in progress
        during: String,
    },

    /// A step failed with no matching remediation rule
    #[error(
        "flow '{flow}' aborted at step {step} ('{description}') on attempt {attempt}: {reason}"
    )]
    FatalFlow {
        /// Flow name
        flow: String,
        /// Step number, as reported to operators
        step: u32,
        /// Step description, as reported to operators
        description: String,
        /// Attempt number the failure occurred on
        attempt: u32,
        /// Underlying failure
        reason: String,
    },

    /// Every attempt of a flow was consumed by remediation retries
    #[error("flow '{flow}' exhausted its {attempts} attempts: {reasons}")]
    RetryBudgetExceeded {
        /// Flow name
        flow: String,
        /// Number of attempts that ran
        attempts: u32,
        /// Each attempt's failure reason, in order
        reasons: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TenazError {
    /// Whether a flow-level remediation rule may recover from this error.
    ///
    /// Cancellation and exhausted budgets are terminal; everything that
    /// describes a page-state problem is a remediation candidate.
    #[must_use]
    pub const fn is_remediable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AmbiguousMatch { .. }
                | Self::Timeout { .. }
                | Self::ActionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_lists_strategies() {
        let err = TenazError::NotFound {
            intent: "send button".to_string(),
            tried: "test-id, role, text".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("send button"));
        assert!(msg.contains("test-id, role, text"));
    }

    #[test]
    fn test_timeout_carries_last_observed() {
        let err = TenazError::Timeout {
            condition: "message count >= 5".to_string(),
            waited_ms: 11_000,
            last_observed: "count=3".to_string(),
        };
        assert!(err.to_string().contains("count=3"));
        assert!(err.to_string().contains("11000ms"));
    }

    #[test]
    fn test_fatal_flow_names_step_and_attempt() {
        let err = TenazError::FatalFlow {
            flow: "launch agent".to_string(),
            step: 4,
            description: "confirm launch".to_string(),
            attempt: 2,
            reason: "dialog never opened".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("step 4"));
        assert!(msg.contains("attempt 2"));
        assert!(msg.contains("confirm launch"));
    }

    #[test]
    fn test_remediable_classification() {
        let remediable = TenazError::ActionFailed {
            action: "click".to_string(),
            primary: "intercepted".to_string(),
            fallback: "intercepted".to_string(),
        };
        assert!(remediable.is_remediable());

        let terminal = TenazError::Cancelled {
            during: "wait".to_string(),
        };
        assert!(!terminal.is_remediable());
    }
}
