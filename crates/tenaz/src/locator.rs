//! Locator intents and the fallback-chain resolver.
//!
//! An [`Intent`] is a semantic description of an element ("the send
//! button"), independent of any concrete selector. Resolution walks the
//! intent's strategies in declared priority order and returns the first
//! strategy that yields exactly one visible, attached element. Handles are
//! transient: the DOM mutates between steps, so a resolution is never
//! cached beyond the single action it feeds.
//!
//! - **Poka-Yoke**: role+name matching defaults to exact, so "Select
//!   agent" can never resolve a "Deselect agent" node
//! - **Jidoka**: a multi-match with no disambiguation index stops the
//!   flow instead of clicking an arbitrary element

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::driver::{ElementHandle, PageDriver};
use crate::result::{TenazError, TenazResult};

/// Default per-strategy probe timeout (2 seconds).
///
/// Bounds each strategy attempt so a dead strategy never stalls total
/// resolution.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Default probe re-query interval (250ms)
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 250;

/// One way of finding an element, tried as part of an intent's chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Explicit test identifier (`data-testid` or equivalent)
    ById(String),
    /// Accessible role plus accessible name
    ByRole {
        /// Accessible role (e.g. "button")
        role: String,
        /// Accessible name to match
        name: String,
        /// Require the full name to match, not a substring
        exact: bool,
    },
    /// Free-text content match
    ByText(String),
    /// Structural/CSS match
    ByStructure(String),
}

impl Strategy {
    /// Short label used in error messages and logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ById(_) => "test-id",
            Self::ByRole { .. } => "role",
            Self::ByText(_) => "text",
            Self::ByStructure(_) => "structure",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "test-id '{id}'"),
            Self::ByRole { role, name, exact } => {
                let mode = if *exact { "exact" } else { "substring" };
                write!(f, "role '{role}' named '{name}' ({mode})")
            }
            Self::ByText(text) => write!(f, "text '{text}'"),
            Self::ByStructure(selector) => write!(f, "structure '{selector}'"),
        }
    }
}

/// A semantic element identity with an ordered fallback chain.
///
/// Declared once at page-model construction and immutable afterwards.
/// Strategy order is priority order: explicit test id first, then
/// role+name, then structure, then free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    name: String,
    strategies: Vec<Strategy>,
}

impl Intent {
    /// Start a new intent with the given semantic name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategies: Vec::new(),
        }
    }

    /// Add an explicit test-identifier strategy
    #[must_use]
    pub fn by_test_id(mut self, id: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ById(id.into()));
        self
    }

    /// Add an exact role+name strategy.
    ///
    /// Exact is the default because substring matching conflates
    /// semantically opposite states ("Select agent" vs "Deselect agent").
    #[must_use]
    pub fn by_role(mut self, role: impl Into<String>, name: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ByRole {
            role: role.into(),
            name: name.into(),
            exact: true,
        });
        self
    }

    /// Add a substring role+name strategy.
    ///
    /// Only safe when no other declared intent's name contains this one;
    /// [`crate::page::IntentSet`] upgrades overlapping substring
    /// strategies back to exact on registration.
    #[must_use]
    pub fn by_role_contains(mut self, role: impl Into<String>, name: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ByRole {
            role: role.into(),
            name: name.into(),
            exact: false,
        });
        self
    }

    /// Add a free-text strategy
    #[must_use]
    pub fn by_text(mut self, text: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ByText(text.into()));
        self
    }

    /// Add a structural/CSS strategy
    #[must_use]
    pub fn by_structure(mut self, selector: impl Into<String>) -> Self {
        self.strategies.push(Strategy::ByStructure(selector.into()));
        self
    }

    /// The intent's semantic name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared strategy chain, in priority order
    #[must_use]
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Every role+name strategy name declared on this intent
    #[must_use]
    pub fn role_names(&self) -> Vec<&str> {
        self.strategies
            .iter()
            .filter_map(|s| match s {
                Strategy::ByRole { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Force every role+name strategy on this intent to exact matching
    pub fn require_exact(&mut self) {
        for strategy in &mut self.strategies {
            if let Strategy::ByRole { exact, .. } = strategy {
                *exact = true;
            }
        }
    }

    /// Whether any role+name strategy still uses substring matching
    #[must_use]
    pub fn has_substring_role(&self) -> bool {
        self.strategies
            .iter()
            .any(|s| matches!(s, Strategy::ByRole { exact: false, .. }))
    }
}

/// Options for the resolver's per-strategy probing
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Upper bound for a single strategy probe
    pub probe_timeout: Duration,
    /// Re-query interval within one probe
    pub probe_interval: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            probe_interval: Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS),
        }
    }
}

impl ResolverOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-strategy probe timeout
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the re-query interval
    #[must_use]
    pub const fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }
}

/// Resolves intents against the live page through the driver boundary
pub struct Resolver {
    driver: Arc<dyn PageDriver>,
    options: ResolverOptions,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver with default probing options
    #[must_use]
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            driver,
            options: ResolverOptions::default(),
        }
    }

    /// Create a resolver with custom probing options
    #[must_use]
    pub fn with_options(driver: Arc<dyn PageDriver>, options: ResolverOptions) -> Self {
        Self { driver, options }
    }

    /// Resolve an intent to exactly one visible, attached element.
    ///
    /// # Errors
    ///
    /// `NotFound` when no strategy matches within its probe timeout,
    /// `AmbiguousMatch` when the winning strategy matches more than one
    /// element, `Cancelled` when the page closes mid-resolution.
    pub async fn resolve(&self, intent: &Intent) -> TenazResult<ElementHandle> {
        self.select(intent, None).await
    }

    /// Resolve an intent where multiple matches are expected, picking the
    /// element at `index` among the winning strategy's visible matches.
    pub async fn resolve_nth(&self, intent: &Intent, index: usize) -> TenazResult<ElementHandle> {
        self.select(intent, Some(index)).await
    }

    /// Count the visible, attached elements a single strategy matches
    /// right now. No probing: a count is a point-in-time observation that
    /// waits re-evaluate each tick.
    pub async fn count(&self, strategy: &Strategy) -> TenazResult<usize> {
        let matches = self.driver.query(strategy).await?;
        Ok(matches.iter().filter(|m| m.is_interactable_target()).count())
    }

    async fn select(&self, intent: &Intent, index: Option<usize>) -> TenazResult<ElementHandle> {
        for strategy in intent.strategies() {
            if let Some(handle) = self.probe_strategy(intent, strategy, index).await? {
                tracing::debug!(
                    intent = intent.name(),
                    strategy = %strategy,
                    element = %handle.id,
                    "intent resolved"
                );
                return Ok(handle);
            }
        }

        let tried = intent
            .strategies()
            .iter()
            .map(Strategy::label)
            .collect::<Vec<_>>()
            .join(", ");
        Err(TenazError::NotFound {
            intent: intent.name().to_string(),
            tried,
        })
    }

    /// Probe one strategy until it yields matches or its timeout elapses.
    ///
    /// Returns `Ok(None)` when the strategy stayed empty for the whole
    /// probe, so the caller can fall through to the next strategy.
    async fn probe_strategy(
        &self,
        intent: &Intent,
        strategy: &Strategy,
        index: Option<usize>,
    ) -> TenazResult<Option<ElementHandle>> {
        let deadline = tokio::time::Instant::now() + self.options.probe_timeout;

        loop {
            if self.driver.is_closed() {
                return Err(TenazError::Cancelled {
                    during: format!("resolving intent '{}'", intent.name()),
                });
            }

            let matches: Vec<ElementHandle> = self
                .driver
                .query(strategy)
                .await?
                .into_iter()
                .filter(ElementHandle::is_interactable_target)
                .collect();

            let found = matches.len();
            if found > 0 {
                return match index {
                    None if found == 1 => Ok(matches.into_iter().next()),
                    Some(i) if i < found => Ok(matches.into_iter().nth(i)),
                    _ => Err(TenazError::AmbiguousMatch {
                        intent: intent.name().to_string(),
                        strategy: strategy.to_string(),
                        count: found,
                    }),
                };
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let delay = self.options.probe_interval.min(deadline - now);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeNode, FakePage};

    fn page_with_agents() -> Arc<FakePage> {
        Arc::new(
            FakePage::new()
                .with_node(FakeNode::new("button", "Select agent"))
                .with_node(FakeNode::new("button", "Select agent"))
                .with_node(FakeNode::new("button", "Deselect agent"))
                .with_node(FakeNode::new("button", "Deselect agent"))
                .with_node(FakeNode::new("button", "Deselect agent")),
        )
    }

    mod intent_tests {
        use super::*;

        #[test]
        fn test_strategy_order_is_declaration_order() {
            let intent = Intent::new("send button")
                .by_test_id("send")
                .by_role("button", "Send")
                .by_structure("button.send")
                .by_text("Send");

            let labels: Vec<_> = intent.strategies().iter().map(Strategy::label).collect();
            assert_eq!(labels, vec!["test-id", "role", "structure", "text"]);
        }

        #[test]
        fn test_by_role_defaults_to_exact() {
            let intent = Intent::new("select").by_role("button", "Select agent");
            assert!(matches!(
                intent.strategies()[0],
                Strategy::ByRole { exact: true, .. }
            ));
        }

        #[test]
        fn test_require_exact_upgrades_substring_strategies() {
            let mut intent = Intent::new("select").by_role_contains("button", "Select");
            assert!(intent.has_substring_role());
            intent.require_exact();
            assert!(!intent.has_substring_role());
        }

        #[test]
        fn test_role_names_collects_only_role_strategies() {
            let intent = Intent::new("x")
                .by_test_id("x")
                .by_role("button", "Select agent")
                .by_text("agent");
            assert_eq!(intent.role_names(), vec!["Select agent"]);
        }
    }

    mod resolver_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_resolves_unique_test_id_first() {
            let page = Arc::new(
                FakePage::new()
                    .with_node(FakeNode::new("button", "Send").with_test_id("send-btn"))
                    .with_node(FakeNode::new("button", "Send message elsewhere")),
            );
            let resolver = Resolver::new(page);

            let intent = Intent::new("send button")
                .by_test_id("send-btn")
                .by_role_contains("button", "Send");
            let handle = resolver.resolve(&intent).await.unwrap();
            assert_eq!(handle.name, "Send");
        }

        #[tokio::test(start_paused = true)]
        async fn test_exact_never_returns_overlapping_variant() {
            let page = page_with_agents();
            let resolver = Resolver::new(page);

            let select = Intent::new("select button").by_role("button", "Select agent");
            let handle = resolver.resolve_nth(&select, 0).await.unwrap();
            assert_eq!(handle.name, "Select agent");
        }

        #[tokio::test(start_paused = true)]
        async fn test_resolve_nth_picks_among_winning_strategy_matches() {
            let page = page_with_agents();
            let resolver = Resolver::new(page);

            let select = Intent::new("select button").by_role("button", "Select agent");
            for i in 0..2 {
                let handle = resolver.resolve_nth(&select, i).await.unwrap();
                assert_eq!(handle.name, "Select agent", "index {i} crossed intents");
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_multi_match_without_index_is_ambiguous() {
            let page = page_with_agents();
            let resolver = Resolver::new(page);

            let select = Intent::new("select button").by_role("button", "Select agent");
            let err = resolver.resolve(&select).await.unwrap_err();
            assert!(matches!(
                err,
                TenazError::AmbiguousMatch { count: 2, .. }
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn test_substring_match_is_ambiguous_across_variants() {
            let page = page_with_agents();
            let resolver = Resolver::new(page);

            // "Select" is a substring of both names; all 5 buttons match.
            let sloppy = Intent::new("select button").by_role_contains("button", "Select agent");
            let err = resolver.resolve(&sloppy).await.unwrap_err();
            assert!(matches!(err, TenazError::AmbiguousMatch { count: 5, .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_not_found_lists_strategies_tried() {
            let page = Arc::new(FakePage::new());
            let resolver = Resolver::with_options(
                page,
                ResolverOptions::new().with_probe_timeout(Duration::from_millis(300)),
            );

            let intent = Intent::new("ghost")
                .by_test_id("ghost")
                .by_text("not here");
            let err = resolver.resolve(&intent).await.unwrap_err();
            match err {
                TenazError::NotFound { intent, tried } => {
                    assert_eq!(intent, "ghost");
                    assert_eq!(tried, "test-id, text");
                }
                other => panic!("expected NotFound, got {other}"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_probe_waits_for_late_appearing_element() {
            let page = Arc::new(FakePage::new());
            page.script(
                Duration::from_millis(800),
                crate::fake::Mutation::AddNode(
                    FakeNode::new("button", "Send").with_test_id("send-btn"),
                ),
            );
            let resolver = Resolver::new(Arc::clone(&page) as Arc<dyn PageDriver>);

            let intent = Intent::new("send button").by_test_id("send-btn");
            let handle = resolver.resolve(&intent).await.unwrap();
            assert_eq!(handle.name, "Send");
        }

        #[tokio::test(start_paused = true)]
        async fn test_hidden_elements_do_not_resolve() {
            let page = Arc::new(
                FakePage::new().with_node(FakeNode::new("button", "Send").hidden()),
            );
            let resolver = Resolver::with_options(
                page,
                ResolverOptions::new().with_probe_timeout(Duration::from_millis(300)),
            );

            let intent = Intent::new("send button").by_role("button", "Send");
            assert!(matches!(
                resolver.resolve(&intent).await,
                Err(TenazError::NotFound { .. })
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn test_falls_back_to_later_strategy() {
            let page = Arc::new(
                FakePage::new()
                    .with_node(FakeNode::new("button", "Launch").with_css("btn-launch")),
            );
            let resolver = Resolver::with_options(
                page,
                ResolverOptions::new().with_probe_timeout(Duration::from_millis(200)),
            );

            let intent = Intent::new("launch button")
                .by_test_id("launch")
                .by_structure("btn-launch");
            let handle = resolver.resolve(&intent).await.unwrap();
            assert_eq!(handle.name, "Launch");
        }

        #[tokio::test(start_paused = true)]
        async fn test_resolution_cancelled_when_page_closes() {
            let page = Arc::new(FakePage::new());
            page.script(Duration::from_millis(500), crate::fake::Mutation::ClosePage);
            let resolver = Resolver::new(Arc::clone(&page) as Arc<dyn PageDriver>);

            let intent = Intent::new("ghost").by_test_id("ghost");
            let err = resolver.resolve(&intent).await.unwrap_err();
            assert!(matches!(err, TenazError::Cancelled { .. }));
        }
    }
}
