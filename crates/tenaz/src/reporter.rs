//! Structured step/attempt diagnostics.
//!
//! Every flow run produces a [`FlowRecord`]: which steps ran, on which
//! attempt, what failed, which remediation fired, and an optional failure
//! screenshot. External reporting consumes the JSON archive; the core
//! only produces it. Step numbers exist for operator diagnosis, so they
//! are preserved verbatim in every record.
//!
//! - **Genchi Genbutsu**: the record shows what actually executed, not
//!   what the flow intended
//! - **Andon Cord**: a fatal step stops the attempt immediately and the
//!   record says exactly where the cord was pulled

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use uuid::Uuid;

use crate::result::TenazResult;

/// Outcome of a single step within an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Step completed
    Passed,
    /// Step failed
    Failed,
}

/// One executed step, preserved with its operator-facing identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step number within the flow
    pub number: u32,
    /// Step description as declared
    pub description: String,
    /// Outcome
    pub status: StepStatus,
    /// Failure detail, if any
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl StepRecord {
    /// Record a passed step
    #[must_use]
    pub fn passed(number: u32, description: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            number,
            description: description.into(),
            status: StepStatus::Passed,
            error: None,
            duration_ms,
        }
    }

    /// Record a failed step
    #[must_use]
    pub fn failed(
        number: u32,
        description: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            number,
            description: description.into(),
            status: StepStatus::Failed,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// Lifecycle state of one flow attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptState {
    /// Created, not yet started
    Pending,
    /// Steps are executing
    Running,
    /// Every step passed
    Succeeded,
    /// A remediation rule fired; the attempt was abandoned for a fresh one
    RemediatedRetry,
    /// A step failed with no matching remediation
    FatalFailed,
}

/// One attempt of a flow, start to terminal outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Attempt number, 1-based
    pub number: u32,
    /// Terminal (or current) state
    pub state: AttemptState,
    /// Name of the remediation rule that fired, if any
    pub remediation: Option<String>,
    /// The failure that ended the attempt, if any
    pub failure: Option<String>,
    /// Steps executed in this attempt, in order
    pub steps: Vec<StepRecord>,
}

impl AttemptRecord {
    /// Create a pending attempt
    #[must_use]
    pub fn new(number: u32) -> Self {
        Self {
            number,
            state: AttemptState::Pending,
            remediation: None,
            failure: None,
            steps: Vec::new(),
        }
    }

    /// Mark the attempt as running
    pub fn start(&mut self) {
        self.state = AttemptState::Running;
    }

    /// Terminal: every step passed
    pub fn succeed(&mut self) {
        self.state = AttemptState::Succeeded;
    }

    /// Terminal: a rule fired and the attempt was abandoned
    pub fn remediate(&mut self, rule: impl Into<String>, failure: impl Into<String>) {
        self.state = AttemptState::RemediatedRetry;
        self.remediation = Some(rule.into());
        self.failure = Some(failure.into());
    }

    /// Terminal: unremediated step failure
    pub fn fail(&mut self, failure: impl Into<String>) {
        self.state = AttemptState::FatalFailed;
        self.failure = Some(failure.into());
    }
}

/// Terminal outcome of a whole flow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowOutcome {
    /// Some attempt succeeded
    Succeeded,
    /// A fatal step failure or an exhausted retry budget
    FatalFailed,
}

/// A failure screenshot embedded in the record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotArtifact {
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Raw size before encoding
    pub byte_len: usize,
    /// PNG bytes, base64-encoded for JSON transport
    pub png_base64: String,
}

impl ScreenshotArtifact {
    /// Wrap raw PNG bytes
    #[must_use]
    pub fn from_png(bytes: &[u8]) -> Self {
        Self {
            captured_at: Utc::now(),
            byte_len: bytes.len(),
            png_base64: BASE64.encode(bytes),
        }
    }

    /// Recover the raw PNG bytes
    pub fn decode(&self) -> TenazResult<Vec<u8>> {
        BASE64
            .decode(&self.png_base64)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}

/// The full diagnostic record of one flow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Unique run identifier
    pub id: Uuid,
    /// Flow name
    pub flow: String,
    /// Run start time
    pub started_at: DateTime<Utc>,
    /// Run end time, once terminal
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal outcome, once terminal
    pub outcome: Option<FlowOutcome>,
    /// Attempts in order
    pub attempts: Vec<AttemptRecord>,
    /// Screenshot captured at the fatal failure, if any
    pub failure_screenshot: Option<ScreenshotArtifact>,
}

impl FlowRecord {
    /// Start a record for a flow run
    #[must_use]
    pub fn new(flow: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow: flow.into(),
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
            attempts: Vec::new(),
            failure_screenshot: None,
        }
    }

    /// Append a finished attempt
    pub fn push_attempt(&mut self, attempt: AttemptRecord) {
        self.attempts.push(attempt);
    }

    /// Mark the run terminal
    pub fn finish(&mut self, outcome: FlowOutcome) {
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    /// Number of attempts that ran
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// How many attempts ended in a remediation retry
    #[must_use]
    pub fn remediated_count(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.state == AttemptState::RemediatedRetry)
            .count()
    }

    /// Whether the run ended in success
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == Some(FlowOutcome::Succeeded)
    }

    /// Each attempt's failure reason, in order (for aggregate errors)
    #[must_use]
    pub fn failure_reasons(&self) -> Vec<String> {
        self.attempts
            .iter()
            .filter_map(|a| {
                a.failure
                    .as_ref()
                    .map(|f| format!("attempt {}: {f}", a.number))
            })
            .collect()
    }
}

/// A JSON archive of flow records for external reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowReportArchive {
    /// Archive creation time
    pub generated_at: DateTime<Utc>,
    /// Records, in run order
    pub records: Vec<FlowRecord>,
}

impl FlowReportArchive {
    /// Create an archive from records
    #[must_use]
    pub fn new(records: Vec<FlowRecord>) -> Self {
        Self {
            generated_at: Utc::now(),
            records,
        }
    }

    /// Save the archive as pretty JSON
    pub fn save_json(&self, path: &Path) -> TenazResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load an archive from JSON
    pub fn load_json(path: &Path) -> TenazResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let archive: Self = serde_json::from_str(&json)?;
        Ok(archive)
    }

    /// Records that did not succeed
    #[must_use]
    pub fn failures(&self) -> Vec<&FlowRecord> {
        self.records.iter().filter(|r| !r.succeeded()).collect()
    }
}

/// Install the process-wide tracing subscriber, honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
