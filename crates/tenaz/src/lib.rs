//! Tenaz: resilient UI automation driver for end-to-end browser flows.
//!
//! Tenaz (Spanish: "tenacious") is the orchestration core for driving a
//! live, frequently-changing web UI: locator resolution with ordered
//! fallback strategies, polling waits with increasing intervals,
//! two-phase action execution with typed outcomes, and named, numbered
//! flow sequencing with remediation-rule retries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     TENAZ Architecture                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐                                                 │
//! │   │ Flow       │  drives page models, owns retries/remediation   │
//! │   │ Sequencer  │                                                 │
//! │   └─────┬──────┘                                                 │
//! │         │                                                        │
//! │   ┌─────▼──────┐   ┌───────────┐   ┌────────────┐                │
//! │   │ Page Model │──►│ Resolver  │   │  Executor  │                │
//! │   │ (intents)  │   │ (locator) │   │ (2-phase)  │                │
//! │   └─────┬──────┘   └─────┬─────┘   └─────┬──────┘                │
//! │         │                │               │                       │
//! │         └────────────────▼───────────────▼──── Waiter ─────┐     │
//! │                    ┌──────────────────────────────────┐    │     │
//! │                    │  PageDriver (abstract boundary)  │◄───┘     │
//! │                    └──────────────────────────────────┘          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every test case owns one driver session and one logical task; waits
//! suspend cooperatively and cancellation propagates promptly out of any
//! in-progress wait.

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

pub mod action;
pub mod driver;
pub mod fake;
pub mod flow;
pub mod ledger;
pub mod locator;
pub mod page;
pub mod reporter;
pub mod result;
pub mod session;
pub mod wait;

pub use action::{ActionExecutor, ActionOutcome, ActionPhase, ExecutorOptions, UiAction};
pub use driver::{DriverConfig, ElementHandle, InteractionError, InteractionErrorKind, PageDriver};
pub use flow::{
    Flow, FlowBuilder, FlowResult, FlowSequencer, FlowStep, RemediationRule, SequencerOptions,
    StepContext,
};
pub use ledger::ResourceLedger;
pub use locator::{Intent, Resolver, ResolverOptions, Strategy};
pub use page::{open_page, DeclaredPage, IntentSet, PageModel, PageModelBuilder, UrlPattern};
pub use reporter::{
    init_tracing, AttemptRecord, AttemptState, FlowOutcome, FlowRecord, FlowReportArchive,
    ScreenshotArtifact, StepRecord, StepStatus,
};
pub use result::{TenazError, TenazResult};
pub use session::{AuthState, Cookie};
pub use wait::{Observation, WaitOptions, Waiter};
