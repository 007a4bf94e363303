//! Flow sequencing with remediation-rule retries.
//!
//! A [`Flow`] is a named, numbered sequence of steps representing one
//! end-to-end user journey. Steps execute strictly in order within an
//! attempt. A step failure with no matching [`RemediationRule`] is fatal
//! and aborts the attempt immediately; a failure a rule matches runs the
//! rule's remedy, abandons the rest of the attempt, and starts a fresh
//! attempt from step one, up to the attempt budget. Step numbers exist
//! for operator diagnosis and are preserved verbatim in every record and
//! error.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::action::{ActionExecutor, ActionOutcome, UiAction};
use crate::driver::PageDriver;
use crate::locator::{Intent, Resolver};
use crate::reporter::{
    AttemptRecord, FlowOutcome, FlowRecord, FlowReportArchive, ScreenshotArtifact, StepRecord,
};
use crate::result::{TenazError, TenazResult};
use crate::wait::Waiter;

/// Default attempt budget per flow
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Everything a step needs to drive the page: the driver plus the
/// resolver, waiter, and executor built over it. Cheap to clone; each
/// step body receives its own copy.
#[derive(Clone)]
pub struct StepContext {
    driver: Arc<dyn PageDriver>,
    resolver: Arc<Resolver>,
    waiter: Arc<Waiter>,
    executor: Arc<ActionExecutor>,
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext").finish_non_exhaustive()
    }
}

impl StepContext {
    /// Build a context with default resolver/waiter/executor options
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            resolver: Arc::new(Resolver::new(Arc::clone(&driver))),
            waiter: Arc::new(Waiter::new(Arc::clone(&driver))),
            executor: Arc::new(ActionExecutor::new(Arc::clone(&driver))),
            driver,
        }
    }

    /// The underlying driver
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    /// The locator resolver
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// The condition waiter
    #[must_use]
    pub fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    /// The action executor
    #[must_use]
    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Resolve an intent and click it
    pub async fn click(&self, intent: &Intent) -> TenazResult<ActionOutcome> {
        let handle = self.resolver.resolve(intent).await?;
        self.executor.perform(&UiAction::Click, &handle).await
    }

    /// Resolve the nth match of an intent and click it
    pub async fn click_nth(&self, intent: &Intent, index: usize) -> TenazResult<ActionOutcome> {
        let handle = self.resolver.resolve_nth(intent, index).await?;
        self.executor.perform(&UiAction::Click, &handle).await
    }

    /// Resolve an intent and fill it with text
    pub async fn fill(&self, intent: &Intent, text: &str) -> TenazResult<ActionOutcome> {
        let handle = self.resolver.resolve(intent).await?;
        self.executor
            .perform(
                &UiAction::Fill {
                    text: text.to_string(),
                },
                &handle,
            )
            .await
    }

    /// Resolve an intent and hover over it
    pub async fn hover(&self, intent: &Intent) -> TenazResult<ActionOutcome> {
        let handle = self.resolver.resolve(intent).await?;
        self.executor.perform(&UiAction::Hover, &handle).await
    }

    /// Resolve an intent, focus it, and press a key
    pub async fn press(&self, intent: &Intent, key: &str) -> TenazResult<ActionOutcome> {
        let handle = self.resolver.resolve(intent).await?;
        self.executor
            .perform(
                &UiAction::Press {
                    key: key.to_string(),
                },
                &handle,
            )
            .await
    }
}

type StepFn = Arc<dyn Fn(StepContext) -> BoxFuture<'static, TenazResult<()>> + Send + Sync>;
type TriggerFn = Arc<dyn Fn(StepContext) -> BoxFuture<'static, TenazResult<bool>> + Send + Sync>;

/// One ordered unit of a flow: a description plus its assertion+action
/// body
pub struct FlowStep {
    /// Step number within the flow, 1-based
    pub number: u32,
    /// Operator-facing description
    pub description: String,
    body: StepFn,
}

impl fmt::Debug for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowStep")
            .field("number", &self.number)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A recovery rule for a specific interstitial UI state.
///
/// When a step fails and the trigger condition holds, the remedy runs,
/// the current attempt is abandoned, and a fresh attempt starts from the
/// top. A rule never affects more than one attempt's outcome.
pub struct RemediationRule {
    name: String,
    trigger: TriggerFn,
    remedy: StepFn,
}

impl fmt::Debug for RemediationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemediationRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl RemediationRule {
    /// Create a rule from a trigger condition and a remedial action
    pub fn new<T, TFut, R, RFut>(name: impl Into<String>, trigger: T, remedy: R) -> Self
    where
        T: Fn(StepContext) -> TFut + Send + Sync + 'static,
        TFut: Future<Output = TenazResult<bool>> + Send + 'static,
        R: Fn(StepContext) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = TenazResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            trigger: Arc::new(move |cx| Box::pin(trigger(cx))),
            remedy: Arc::new(move |cx| Box::pin(remedy(cx))),
        }
    }

    /// The rule's name, used in records and logs
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named, ordered sequence of steps plus its remediation rules
#[derive(Debug)]
pub struct Flow {
    name: String,
    steps: Vec<FlowStep>,
    rules: Vec<RemediationRule>,
}

impl Flow {
    /// Start building a flow
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder {
            name: name.into(),
            steps: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Flow name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in execution order
    #[must_use]
    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    /// Remediation rules in declaration order
    #[must_use]
    pub fn rules(&self) -> &[RemediationRule] {
        &self.rules
    }
}

/// Builder for [`Flow`]
pub struct FlowBuilder {
    name: String,
    steps: Vec<(String, StepFn)>,
    rules: Vec<RemediationRule>,
}

impl fmt::Debug for FlowBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowBuilder")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish_non_exhaustive()
    }
}

impl FlowBuilder {
    /// Append a step; numbering follows declaration order
    #[must_use]
    pub fn step<F, Fut>(mut self, description: impl Into<String>, body: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TenazResult<()>> + Send + 'static,
    {
        let body: StepFn = Arc::new(move |cx| Box::pin(body(cx)));
        self.steps.push((description.into(), body));
        self
    }

    /// Attach a remediation rule
    #[must_use]
    pub fn remediation(mut self, rule: RemediationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Finish the flow, assigning step numbers
    #[must_use]
    pub fn build(self) -> Flow {
        let steps = self
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, (description, body))| FlowStep {
                number: (i + 1) as u32,
                description,
                body,
            })
            .collect();
        Flow {
            name: self.name,
            steps,
            rules: self.rules,
        }
    }
}

/// Options for the sequencer
#[derive(Debug, Clone)]
pub struct SequencerOptions {
    /// Attempt budget per flow
    pub max_attempts: u32,
    /// Capture a screenshot into the record on fatal failure
    pub capture_failure_screenshot: bool,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            capture_failure_screenshot: true,
        }
    }
}

impl SequencerOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt budget
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Toggle failure screenshots
    #[must_use]
    pub const fn with_failure_screenshot(mut self, capture: bool) -> Self {
        self.capture_failure_screenshot = capture;
        self
    }
}

/// Successful result of a flow run
#[derive(Debug, Clone)]
pub struct FlowResult {
    /// The full diagnostic record of the run
    pub record: FlowRecord,
}

impl FlowResult {
    /// Total attempts the run took
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.record.attempt_count()
    }

    /// How many attempts ended in remediation retries
    #[must_use]
    pub fn remediated_count(&self) -> usize {
        self.record.remediated_count()
    }
}

enum AttemptDisposition {
    Succeeded,
    Remediated,
    Fatal {
        step: u32,
        description: String,
        reason: String,
    },
}

/// Drives flows to a terminal outcome, recording every attempt
pub struct FlowSequencer {
    ctx: StepContext,
    options: SequencerOptions,
    records: Mutex<Vec<FlowRecord>>,
}

impl fmt::Debug for FlowSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowSequencer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl FlowSequencer {
    /// Create a sequencer with default options
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self::with_options(driver, SequencerOptions::default())
    }

    /// Create a sequencer with custom options
    #[must_use]
    pub fn with_options(driver: Arc<dyn PageDriver>, options: SequencerOptions) -> Self {
        Self {
            ctx: StepContext::new(driver),
            options,
            records: Mutex::new(Vec::new()),
        }
    }

    /// A context clone, for driving the page outside a flow
    #[must_use]
    pub fn context(&self) -> StepContext {
        self.ctx.clone()
    }

    /// Records accumulated so far, newest last
    #[must_use]
    pub fn reports(&self) -> Vec<FlowRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Drain the accumulated records into an archive for export
    #[must_use]
    pub fn take_archive(&self) -> FlowReportArchive {
        let records = std::mem::take(&mut *self.records.lock().unwrap());
        FlowReportArchive::new(records)
    }

    /// Run a flow to a terminal outcome.
    ///
    /// # Errors
    ///
    /// `FatalFlow` when a step fails with no matching remediation rule,
    /// `RetryBudgetExceeded` when every attempt was consumed by
    /// remediation retries, `Cancelled` when the page goes away
    /// mid-flow. Whatever the outcome, the full record lands in
    /// [`Self::reports`].
    pub async fn run(&self, flow: &Flow) -> TenazResult<FlowResult> {
        let mut record = FlowRecord::new(flow.name());
        tracing::info!(
            flow = flow.name(),
            steps = flow.steps().len(),
            max_attempts = self.options.max_attempts,
            "flow starting"
        );

        let budget = self.options.max_attempts.max(1);
        for attempt_no in 1..=budget {
            let mut attempt = AttemptRecord::new(attempt_no);
            attempt.start();

            let disposition = match self.run_attempt(flow, attempt_no, &mut attempt).await {
                Ok(disposition) => disposition,
                Err(err) => {
                    record.push_attempt(attempt);
                    record.finish(FlowOutcome::FatalFailed);
                    self.store(record);
                    return Err(err);
                }
            };

            match disposition {
                AttemptDisposition::Succeeded => {
                    record.push_attempt(attempt);
                    record.finish(FlowOutcome::Succeeded);
                    tracing::info!(flow = flow.name(), attempts = attempt_no, "flow succeeded");
                    self.store(record.clone());
                    return Ok(FlowResult { record });
                }
                AttemptDisposition::Remediated => {
                    record.push_attempt(attempt);
                }
                AttemptDisposition::Fatal {
                    step,
                    description,
                    reason,
                } => {
                    record.push_attempt(attempt);
                    self.capture_failure(&mut record).await;
                    record.finish(FlowOutcome::FatalFailed);
                    self.store(record);
                    return Err(TenazError::FatalFlow {
                        flow: flow.name().to_string(),
                        step,
                        description,
                        attempt: attempt_no,
                        reason,
                    });
                }
            }
        }

        let reasons = record.failure_reasons().join("; ");
        record.finish(FlowOutcome::FatalFailed);
        tracing::error!(
            flow = flow.name(),
            attempts = budget,
            "retry budget exhausted"
        );
        self.store(record);
        Err(TenazError::RetryBudgetExceeded {
            flow: flow.name().to_string(),
            attempts: budget,
            reasons,
        })
    }

    async fn run_attempt(
        &self,
        flow: &Flow,
        attempt_no: u32,
        attempt: &mut AttemptRecord,
    ) -> TenazResult<AttemptDisposition> {
        for step in flow.steps() {
            if self.ctx.driver().is_closed() {
                attempt.fail("page closed");
                return Err(TenazError::Cancelled {
                    during: format!("step {} ('{}')", step.number, step.description),
                });
            }

            tracing::info!(
                flow = flow.name(),
                step = step.number,
                description = %step.description,
                attempt = attempt_no,
                "step starting"
            );
            let started = tokio::time::Instant::now();

            match (step.body)(self.ctx.clone()).await {
                Ok(()) => {
                    attempt.steps.push(StepRecord::passed(
                        step.number,
                        &step.description,
                        started.elapsed().as_millis() as u64,
                    ));
                }
                Err(TenazError::Cancelled { during }) => {
                    attempt.steps.push(StepRecord::failed(
                        step.number,
                        &step.description,
                        format!("cancelled during {during}"),
                        started.elapsed().as_millis() as u64,
                    ));
                    attempt.fail(format!("cancelled during {during}"));
                    return Err(TenazError::Cancelled { during });
                }
                Err(err) => {
                    let reason = err.to_string();
                    attempt.steps.push(StepRecord::failed(
                        step.number,
                        &step.description,
                        &reason,
                        started.elapsed().as_millis() as u64,
                    ));
                    tracing::warn!(
                        flow = flow.name(),
                        step = step.number,
                        attempt = attempt_no,
                        error = %reason,
                        "step failed"
                    );

                    if err.is_remediable() {
                        if let Some(rule) = self.match_rule(flow).await {
                            tracing::warn!(
                                flow = flow.name(),
                                rule = rule.name(),
                                attempt = attempt_no,
                                "remediation triggered; abandoning attempt"
                            );
                            if let Err(remedy_err) = (rule.remedy)(self.ctx.clone()).await {
                                let remedy_reason = format!(
                                    "remediation '{}' failed: {remedy_err}",
                                    rule.name()
                                );
                                attempt.fail(&remedy_reason);
                                return Err(TenazError::FatalFlow {
                                    flow: flow.name().to_string(),
                                    step: step.number,
                                    description: step.description.clone(),
                                    attempt: attempt_no,
                                    reason: remedy_reason,
                                });
                            }
                            attempt.remediate(rule.name(), &reason);
                            return Ok(AttemptDisposition::Remediated);
                        }
                    }

                    attempt.fail(&reason);
                    return Ok(AttemptDisposition::Fatal {
                        step: step.number,
                        description: step.description.clone(),
                        reason,
                    });
                }
            }
        }

        attempt.succeed();
        Ok(AttemptDisposition::Succeeded)
    }

    /// First rule whose trigger condition currently holds.
    ///
    /// A trigger that itself errors is logged and treated as not
    /// matching; remediation must never convert one failure into a
    /// murkier one.
    async fn match_rule<'a>(&self, flow: &'a Flow) -> Option<&'a RemediationRule> {
        for rule in flow.rules() {
            match (rule.trigger)(self.ctx.clone()).await {
                Ok(true) => return Some(rule),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(rule = rule.name(), error = %err, "trigger probe failed");
                }
            }
        }
        None
    }

    async fn capture_failure(&self, record: &mut FlowRecord) {
        if !self.options.capture_failure_screenshot {
            return;
        }
        match self.ctx.driver().screenshot().await {
            Ok(bytes) => record.failure_screenshot = Some(ScreenshotArtifact::from_png(&bytes)),
            Err(err) => {
                tracing::warn!(error = %err, "failure screenshot unavailable");
            }
        }
    }

    fn store(&self, record: FlowRecord) {
        self.records.lock().unwrap().push(record);
    }
}
